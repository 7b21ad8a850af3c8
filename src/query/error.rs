//! Query error types
//!
//! Defines all error conditions that can occur while building and executing a query.

use crate::client::TransportError;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Wrong kind of argument, or a terminal call on the wrong object type
    #[error("Argument type error: {0}")]
    ArgumentType(String),

    /// Accumulated state cannot produce a valid request
    #[error("Validation error: {0}")]
    Validation(String),

    /// The transport failed to complete the request
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl QueryError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub(crate) fn argument_type(msg: impl Into<String>) -> Self {
        Self::ArgumentType(msg.into())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
