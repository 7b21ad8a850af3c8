//! Response classification
//!
//! Wraps a [`RawResponse`] and works out whether the call succeeded:
//!
//! | status      | outcome   | error     |
//! |-------------|-----------|-----------|
//! | 207         | `Partial` | body text |
//! | 200..=299   | `Success` | none      |
//! | anything else | `Failure` | body text |
//!
//! Write-style calls return a JSON object with one entry per written key.
//! [`WriteResponse`] decodes it and lets the body, not the status code,
//! decide the outcome.

use crate::client::RawResponse;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// HTTP status the platform uses for multi-status (partially applied) calls
pub const MULTI_STATUS: u16 = 207;

/// Tri-state result of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
    Partial,
}

impl Outcome {
    /// Numeric code: 0 success, 1 failure, 2 partial
    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Partial => 2,
        }
    }

    fn from_status(status: u16) -> Self {
        match status {
            MULTI_STATUS => Self::Partial,
            200..=299 => Self::Success,
            _ => Self::Failure,
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

/// A classified transport result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    reason: String,
    successful: Outcome,
    error: Option<String>,
    body: String,
}

impl Response {
    /// Classify a raw transport result by its status code
    pub fn new(raw: RawResponse) -> Self {
        let successful = Outcome::from_status(raw.status_code);
        Self::with_outcome(raw, successful)
    }

    fn with_outcome(raw: RawResponse, successful: Outcome) -> Self {
        let error = match successful {
            Outcome::Success => None,
            Outcome::Failure | Outcome::Partial => Some(raw.text.clone()),
        };
        Self {
            status: raw.status_code,
            reason: raw.reason,
            successful,
            error,
            body: raw.text,
        }
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Alias of [`Response::status`]
    pub fn status_code(&self) -> u16 {
        self.status
    }

    /// HTTP reason phrase
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Classified outcome
    pub fn successful(&self) -> Outcome {
        self.successful
    }

    /// Error message, present for failures and partial successes
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Raw body text
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ResponseError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// State of a device after a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    Existing,
    Created,
    Modified,
}

/// Per-key result of a write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteStatus {
    pub device_state: DeviceState,
    pub message: Option<String>,
    pub success: bool,
}

/// A classified multi-key write result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResponse {
    response: Response,
    statuses: BTreeMap<String, WriteStatus>,
}

impl WriteResponse {
    /// Decode the per-key body and classify from its contents
    ///
    /// All entries successful is a success, none is a failure, anything in
    /// between is partial. An empty body object counts as a success.
    pub fn new(raw: RawResponse) -> Result<Self, ResponseError> {
        let statuses: BTreeMap<String, WriteStatus> = serde_json::from_str(&raw.text)?;

        let succeeded = statuses.values().filter(|s| s.success).count();
        let successful = if succeeded == statuses.len() {
            Outcome::Success
        } else if succeeded == 0 {
            Outcome::Failure
        } else {
            Outcome::Partial
        };

        Ok(Self {
            response: Response::with_outcome(raw, successful),
            statuses,
        })
    }

    /// Keys that failed, with the platform's message
    pub fn failures(&self) -> impl Iterator<Item = (&str, Option<&str>)> + '_ {
        self.statuses
            .iter()
            .filter(|(_, s)| !s.success)
            .map(|(k, s)| (k.as_str(), s.message.as_deref()))
    }

    /// Keys whose device was created by the write
    pub fn created(&self) -> impl Iterator<Item = &str> + '_ {
        self.successful_in(DeviceState::Created)
    }

    /// Keys whose device already existed unchanged
    pub fn existing(&self) -> impl Iterator<Item = &str> + '_ {
        self.successful_in(DeviceState::Existing)
    }

    /// Keys whose device was modified by the write
    pub fn modified(&self) -> impl Iterator<Item = &str> + '_ {
        self.successful_in(DeviceState::Modified)
    }

    fn successful_in(&self, state: DeviceState) -> impl Iterator<Item = &str> + '_ {
        self.statuses
            .iter()
            .filter(move |(_, s)| s.success && s.device_state == state)
            .map(|(k, _)| k.as_str())
    }
}

impl std::ops::Deref for WriteResponse {
    type Target = Response;

    fn deref(&self) -> &Response {
        &self.response
    }
}

impl TryFrom<RawResponse> for WriteResponse {
    type Error = ResponseError;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<RawResponse> for Response {
    fn from(raw: RawResponse) -> Self {
        Self::new(raw)
    }
}

/// Errors raised while interpreting a response body
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("Failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}
