//! Query construction
//!
//! Builds a description of what to select, how to transform it, and what to
//! do with it, then executes it through a [`Transport`](crate::client::Transport):
//!
//! - **Selection**: selector expressions per entity category
//! - **Pipeline**: transformations applied to sensor reads
//! - **Builder**: the fluent builder and its terminal calls
//! - **Advisory**: non-fatal diagnostics raised while finalizing
//!
//! # Examples
//!
//! ```rust,ignore
//! use tempo_client::query::{SelectionType, Selector};
//!
//! let execution = client
//!     .query(SelectionType::Sensors)
//!     .filter(Selector::key(SelectionType::Devices, "thermostat.1"))?
//!     .filter(Selector::key(SelectionType::Sensors, "temperature"))?
//!     .rollup("mean", "1hour", None)
//!     .convert_timezone("Europe/Helsinki")
//!     .read(start, end)
//!     .await?;
//!
//! println!("{}", execution.response.body());
//! ```

mod advisory;
mod builder;
mod error;
mod pipeline;
mod selection;

pub use advisory::Advisory;
pub use builder::{
    extract_key_for_monitoring, Execution, MonitoringRead, Operation, Quantifier, Query,
    QueryBuilder,
};
pub use error::{QueryError, QueryResult};
pub use pipeline::PipelineStep;
pub use selection::{Selection, SelectionType, Selector, SelectorAttribute, Selections};
