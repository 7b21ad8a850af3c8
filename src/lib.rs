//! # tempo-client
//!
//! Query builder and response classification for a time-series platform's
//! REST API. Devices own sensors, sensors hold datapoints, and monitoring
//! rules watch selections of them.
//!
//! ## Features
//!
//! - **Fluent queries**: select devices, sensors, or rules and chain pipeline steps
//! - **Fail-fast validation**: malformed queries never reach the network
//! - **Classified responses**: success, failure, or partial, down to each written key
//! - **Pluggable transport**: reqwest-based HTTP client, or any [`client::Transport`]
//!
//! ## Modules
//!
//! - [`query`]: Selection, pipeline, and the query builder
//! - [`response`]: Response and write-response classification
//! - [`client`]: Transport contracts, HTTP client, and request encoding
//! - [`rule`]: Monitoring rule handles
//! - [`config`]: Configuration loading
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::{Duration, Utc};
//! use tempo_client::client::{HttpClient, HttpClientConfig};
//! use tempo_client::query::{SelectionType, Selector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::new(HttpClientConfig::default())?;
//!
//!     let end = Utc::now();
//!     let start = end - Duration::days(1);
//!
//!     let execution = client
//!         .query(SelectionType::Sensors)
//!         .filter(Selector::key(SelectionType::Devices, "thermostat.1"))?
//!         .filter(Selector::key(SelectionType::Sensors, "temperature"))?
//!         .rollup("mean", "1hour", None)
//!         .read(start, end)
//!         .await?;
//!
//!     println!("{}: {}", execution.response.successful(), execution.response.body());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod query;
pub mod response;
pub mod rule;

// Re-export top-level types for convenience
pub use client::{
    HttpClient, HttpClientConfig, Monitoring, RawResponse, Transport, TransportError,
};

pub use query::{
    Advisory, Execution, Operation, PipelineStep, Query, QueryBuilder, QueryError, QueryResult,
    SelectionType, Selector,
};

pub use response::{DeviceState, Outcome, Response, ResponseError, WriteResponse, WriteStatus};

pub use rule::Rule;

pub use config::{ClientConfig, Config, ConfigError, LoggingConfig};
