//! Transport layer
//!
//! The query builder never talks HTTP itself. It hands finalized queries to
//! a [`Transport`], and rule reads to the transport's [`Monitoring`] side:
//!
//! - **Transport**: sensor reads, device search, single-point lookups, deletes
//! - **Monitoring**: keyed reads and deletes of monitoring rules
//! - **HttpClient**: the reqwest implementation of both
//!
//! Every completed exchange comes back as a [`RawResponse`], whatever its
//! status code; classification happens in [`crate::response`].

mod encoder;
mod http;

pub use encoder::{encode_operation, encode_pipeline, encode_query, encode_rule, encode_selector};
pub use http::{HttpClient, HttpClientConfig};

use crate::query::Query;
use crate::rule::Rule;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Status, reason and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status_code: u16,
    pub reason: String,
    pub text: String,
}

impl RawResponse {
    pub fn new(status_code: u16, reason: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            status_code,
            reason: reason.into(),
            text: text.into(),
        }
    }
}

/// Operations the query builder delegates to
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read datapoints for the selected sensors
    async fn read_sensors(&self, query: &Query) -> Result<RawResponse, TransportError>;

    /// List the selected devices
    async fn search_devices(&self, query: &Query) -> Result<RawResponse, TransportError>;

    /// Look up one datapoint per selected sensor
    async fn single(&self, query: &Query) -> Result<RawResponse, TransportError>;

    /// Delete the selected devices
    async fn delete_device(&self, query: &Query) -> Result<RawResponse, TransportError>;

    /// Delete a range of datapoints from one sensor
    async fn delete_from_sensors(
        &self,
        device_key: &str,
        sensor_key: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<RawResponse, TransportError>;

    /// Create a monitoring rule over the rule's attached selection
    async fn monitor(&self, rule: &Rule) -> Result<RawResponse, TransportError>;

    /// Monitoring side of the transport
    fn monitoring(&self) -> &dyn Monitoring;
}

/// Keyed monitoring rule operations
#[async_trait]
pub trait Monitoring: Send + Sync {
    async fn get_rule(&self, key: &str) -> Result<RawResponse, TransportError>;

    async fn get_annotations(&self, key: &str) -> Result<RawResponse, TransportError>;

    async fn get_changelog(&self, key: &str) -> Result<RawResponse, TransportError>;

    async fn get_logs(&self, key: &str) -> Result<RawResponse, TransportError>;

    async fn get_usage(&self, key: &str) -> Result<RawResponse, TransportError>;

    async fn delete_rule(&self, key: &str) -> Result<RawResponse, TransportError>;
}

/// Errors that prevent a request from completing
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Platform unavailable")]
    Unavailable,

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    /// Classify a reqwest failure the way the rest of the crate reports it
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Unavailable
        } else {
            TransportError::Request(e)
        }
    }
}
