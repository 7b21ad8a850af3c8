//! Pipeline steps applied to sensor reads
//!
//! Steps are appended in call order and only normalized when the query is
//! finalized, so that the read's own time range can fill in any start/end
//! left open when the step was added.

use crate::query::error::{QueryError, QueryResult};
use chrono::{DateTime, Utc};

pub(crate) const ROLLUP_BOUNDS_MSG: &str =
    "Rollup, find, and multi-rollup must have a start and end passed to them";

/// A single transformation in a read pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineStep {
    /// Collapse all selected series into one
    Aggregation { function: String },
    /// Downsample to one point per period
    Rollup {
        function: String,
        period: String,
        start: Option<DateTime<Utc>>,
    },
    /// Several rollups over the same period
    MultiRollup {
        functions: Vec<String>,
        period: String,
        start: Option<DateTime<Utc>>,
    },
    /// Pick one point per period (e.g. max, first)
    Find {
        function: String,
        period: String,
        start: Option<DateTime<Utc>>,
    },
    /// Fill points on a regular grid
    Interpolation {
        function: String,
        period: String,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },
    /// Shift timestamps into a timezone
    ConvertTz { timezone: String },
}

impl PipelineStep {
    /// Wire name of the step
    pub fn name(&self) -> &'static str {
        match self {
            Self::Aggregation { .. } => "aggregation",
            Self::Rollup { .. } => "rollup",
            Self::MultiRollup { .. } => "multi_rollup",
            Self::Find { .. } => "find",
            Self::Interpolation { .. } => "interpolate",
            Self::ConvertTz { .. } => "convert_tz",
        }
    }

    /// Whether the step needs a closed time range to be evaluated
    pub fn requires_bounds(&self) -> bool {
        matches!(
            self,
            Self::Rollup { .. } | Self::MultiRollup { .. } | Self::Find { .. }
        )
    }
}

/// Fill open time bounds of each step from the read range
///
/// Rollup, multi-rollup and find fail without both bounds; interpolation
/// accepts an open range and only fills what it can.
pub(crate) fn normalize(
    steps: &mut [PipelineStep],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> QueryResult<()> {
    for step in steps.iter_mut() {
        if step.requires_bounds() && (start.is_none() || end.is_none()) {
            return Err(QueryError::validation(ROLLUP_BOUNDS_MSG));
        }
        match step {
            PipelineStep::Rollup { start: s, .. }
            | PipelineStep::MultiRollup { start: s, .. }
            | PipelineStep::Find { start: s, .. } => {
                if s.is_none() {
                    *s = start;
                }
            }
            PipelineStep::Interpolation {
                start: s, end: e, ..
            } => {
                if s.is_none() {
                    *s = start;
                }
                if e.is_none() {
                    *e = end;
                }
            }
            PipelineStep::Aggregation { .. } | PipelineStep::ConvertTz { .. } => {}
        }
    }
    Ok(())
}
