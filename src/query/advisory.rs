//! Non-fatal advisories raised by terminal calls
//!
//! Advisories never stop a call. They are logged at `warn` level as they are
//! raised and kept on the finalized [`Query`](super::Query) so callers can
//! inspect them.

/// A non-fatal diagnostic about how a query was executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Advisory {
    /// Pipeline steps were dropped because device reads cannot use them
    PipelineIgnoredOnDeviceRead,
    /// Pipeline steps were passed to a monitor call, which ignores them
    PipelineIgnoredOnMonitor,
    /// `latest()` was called instead of `single("latest")`
    LatestDeprecated,
}

impl Advisory {
    /// Message shown to the caller
    pub fn message(&self) -> &'static str {
        match self {
            Self::PipelineIgnoredOnDeviceRead => {
                "Pipeline functions passed to device reads have no effect"
            }
            Self::PipelineIgnoredOnMonitor => {
                "Pipeline functions passed to monitor call currently have no effect"
            }
            Self::LatestDeprecated => {
                "The latest() method has been deprecated. Please use single(\"latest\") instead."
            }
        }
    }
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}
