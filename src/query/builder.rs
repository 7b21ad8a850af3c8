//! Fluent query builder
//!
//! A [`QueryBuilder`] collects selectors and pipeline steps, then a terminal
//! call consumes it, validates what was collected, freezes it into a
//! [`Query`], and hands that to the transport.
//!
//! ```text
//! filter/rollup/...  →  terminal call  →  validate + normalize  →  Query  →  Transport
//! ```
//!
//! Which transport operation runs depends on the object type the builder was
//! created for:
//!
//! | terminal    | sensors              | devices          | rules             |
//! |-------------|----------------------|------------------|-------------------|
//! | read        | `read_sensors`       | `search_devices` | `get_rule`        |
//! | single      | `single`             | error            | error             |
//! | delete      | `delete_from_sensors`| `delete_device`  | `delete_rule`     |
//! | annotations, changes, logs, usage | error | error     | monitoring read   |
//!
//! Validation errors are always raised before the transport is called.

use crate::client::{Monitoring, RawResponse, Transport, TransportError};
use crate::query::advisory::Advisory;
use crate::query::error::{QueryError, QueryResult};
use crate::query::pipeline::{self, PipelineStep};
use crate::query::selection::{Selection, SelectionType, Selector, Selections};
use crate::response::Response;
use crate::rule::Rule;
use chrono::{DateTime, Utc};

const READ_BOUNDS_MSG: &str = "Reading sensor data requires a start and end time";
const DELETE_BOUNDS_MSG: &str = "Deleting data from sensors requires a start and end time";
const DELETE_KEY_MSG: &str =
    "Deleting data from a sensor requires a selection specifying one device key and one sensor key only";
const DELETE_DEVICE_MSG: &str = "Start and end are invalid arguments for deleting devices. \
     Did you mean to delete datapoints through a sensor query instead?";
const MULTI_KEY_MSG: &str = "monitoring rules may only be read out by one key at a time";
const MISSING_KEY_MSG: &str = "monitoring rule reads require a key selector";

/// How many entities an operation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    All,
}

/// The terminal action a query was finalized with
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Read datapoints in `[start, stop)`
    Read {
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    },
    /// Find entities matching the selection
    Find { quantifier: Quantifier },
    /// One datapoint per sensor
    Single {
        function: String,
        timestamp: Option<DateTime<Utc>>,
        include_selection: bool,
    },
    /// Delete a range of datapoints from one sensor
    Delete {
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        device_key: String,
        sensor_key: String,
    },
}

impl Operation {
    /// Wire name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read { .. } => "read",
            Self::Find { .. } => "find",
            Self::Single { .. } => "single",
            Self::Delete { .. } => "delete",
        }
    }
}

/// A finalized, immutable query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    object_type: SelectionType,
    selections: Selections,
    pipeline: Vec<PipelineStep>,
    operation: Option<Operation>,
    advisories: Vec<Advisory>,
}

impl Query {
    /// Entity type the query returns
    pub fn object_type(&self) -> SelectionType {
        self.object_type
    }

    /// Selections for all categories
    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    /// Normalized pipeline steps
    pub fn pipeline(&self) -> &[PipelineStep] {
        &self.pipeline
    }

    /// Terminal operation, absent for rule reads and monitor calls
    pub fn operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }

    /// Advisories raised while finalizing
    pub fn advisories(&self) -> &[Advisory] {
        &self.advisories
    }
}

/// Result of a terminal call
#[derive(Debug, Clone)]
pub struct Execution {
    /// The query as it was sent
    pub query: Query,
    /// Classified transport result
    pub response: Response,
}

/// Monitoring reads keyed by a single rule key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitoringRead {
    Rule,
    Annotations,
    Changelog,
    Logs,
    Usage,
}

impl MonitoringRead {
    fn label(&self) -> &'static str {
        match self {
            Self::Rule => "Rule reads",
            Self::Annotations => "Annotations",
            Self::Changelog => "Changes",
            Self::Logs => "Logs",
            Self::Usage => "Usage",
        }
    }

    async fn call(
        self,
        monitoring: &dyn Monitoring,
        key: &str,
    ) -> Result<RawResponse, TransportError> {
        match self {
            Self::Rule => monitoring.get_rule(key).await,
            Self::Annotations => monitoring.get_annotations(key).await,
            Self::Changelog => monitoring.get_changelog(key).await,
            Self::Logs => monitoring.get_logs(key).await,
            Self::Usage => monitoring.get_usage(key).await,
        }
    }
}

/// Extract the single rule key a monitoring call applies to
///
/// The rules selection must be one scalar selector, or a combination that
/// wraps exactly one scalar selector.
pub fn extract_key_for_monitoring(selection: &Selection) -> QueryResult<String> {
    let root = selection
        .root()
        .ok_or_else(|| QueryError::validation(MISSING_KEY_MSG))?;

    let key = match root {
        Selector::Scalar { value, .. } => Some(value.as_str()),
        Selector::And(children) | Selector::Or(children) => match children.as_slice() {
            [only] => only.value(),
            [] => None,
            _ => return Err(QueryError::validation(MULTI_KEY_MSG)),
        },
        Selector::Compound { .. } => None,
    };

    key.map(str::to_string)
        .ok_or_else(|| QueryError::validation(MISSING_KEY_MSG))
}

/// Builder for constructing and executing queries
pub struct QueryBuilder<'a> {
    transport: &'a dyn Transport,
    object_type: SelectionType,
    selections: Selections,
    pipeline: Vec<PipelineStep>,
    advisories: Vec<Advisory>,
}

impl<'a> QueryBuilder<'a> {
    /// Create a builder for the given entity type
    pub fn new(transport: &'a dyn Transport, object_type: SelectionType) -> Self {
        Self {
            transport,
            object_type,
            selections: Selections::default(),
            pipeline: Vec::new(),
            advisories: Vec::new(),
        }
    }

    /// Entity type the builder was created for
    pub fn object_type(&self) -> SelectionType {
        self.object_type
    }

    /// Selections collected so far
    pub fn selections(&self) -> &Selections {
        &self.selections
    }

    /// Pipeline steps collected so far
    pub fn pipeline(&self) -> &[PipelineStep] {
        &self.pipeline
    }

    /// Narrow the query with a scalar selector or an `and`/`or` combination
    ///
    /// Repeated calls refine the selection of the selector's category.
    pub fn filter(mut self, selector: Selector) -> QueryResult<Self> {
        let selection_type = match (&selector, selector.selection_type()) {
            (Selector::Compound { .. }, _) | (_, None) => {
                return Err(QueryError::argument_type(format!(
                    "Invalid object for filter: \"{}\"",
                    selector
                )));
            }
            (_, Some(selection_type)) => selection_type,
        };
        self.selections.get_mut(selection_type).add(selector);
        Ok(self)
    }

    /// Aggregate all selected series with the given function
    pub fn aggregate(mut self, function: impl Into<String>) -> Self {
        self.pipeline.push(PipelineStep::Aggregation {
            function: function.into(),
        });
        self
    }

    /// Apply a rollup function over each period
    ///
    /// Without an explicit `start` the first period begins at the read's start.
    pub fn rollup(
        mut self,
        function: impl Into<String>,
        period: impl Into<String>,
        start: Option<DateTime<Utc>>,
    ) -> Self {
        self.pipeline.push(PipelineStep::Rollup {
            function: function.into(),
            period: period.into(),
            start,
        });
        self
    }

    /// Apply several rollup functions over the same periods
    pub fn multi_rollup<I, S>(
        mut self,
        functions: I,
        period: impl Into<String>,
        start: Option<DateTime<Utc>>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pipeline.push(PipelineStep::MultiRollup {
            functions: functions.into_iter().map(Into::into).collect(),
            period: period.into(),
            start,
        });
        self
    }

    /// Find one point per period with the given function
    pub fn find(
        mut self,
        function: impl Into<String>,
        period: impl Into<String>,
        start: Option<DateTime<Utc>>,
    ) -> Self {
        self.pipeline.push(PipelineStep::Find {
            function: function.into(),
            period: period.into(),
            start,
        });
        self
    }

    /// Interpolate the sensor data (`"zoh"` or `"linear"`)
    pub fn interpolate(
        mut self,
        function: impl Into<String>,
        period: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.pipeline.push(PipelineStep::Interpolation {
            function: function.into(),
            period: period.into(),
            start,
            end,
        });
        self
    }

    /// Convert result timestamps to the given time zone
    pub fn convert_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.pipeline.push(PipelineStep::ConvertTz {
            timezone: timezone.into(),
        });
        self
    }

    // ============================================
    // Terminal calls
    // ============================================

    /// Read sensor datapoints in `[start, end)`
    ///
    /// For device and rule queries the bounds are ignored.
    pub async fn read(self, start: DateTime<Utc>, end: DateTime<Utc>) -> QueryResult<Execution> {
        self.read_range(Some(start), Some(end)).await
    }

    /// Read without time bounds: lists devices or fetches one rule
    pub async fn read_all(self) -> QueryResult<Execution> {
        self.read_range(None, None).await
    }

    /// Read with optional bounds; sensor reads require both
    pub async fn read_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> QueryResult<Execution> {
        match self.object_type {
            SelectionType::Sensors => {
                pipeline::normalize(&mut self.pipeline, start, end)?;
                let (start, end) = match (start, end) {
                    (Some(start), Some(end)) => (start, end),
                    _ => return Err(QueryError::validation(READ_BOUNDS_MSG)),
                };
                let (transport, query) = self.finish(Some(Operation::Read { start, stop: end }));
                let raw = transport.read_sensors(&query).await?;
                Ok(Execution::new(query, raw))
            }
            SelectionType::Devices => {
                if !self.pipeline.is_empty() {
                    self.pipeline.clear();
                    self.advise(Advisory::PipelineIgnoredOnDeviceRead);
                }
                let (transport, query) = self.finish(Some(Operation::Find {
                    quantifier: Quantifier::All,
                }));
                let raw = transport.search_devices(&query).await?;
                Ok(Execution::new(query, raw))
            }
            SelectionType::Rules => self.monitoring_read(MonitoringRead::Rule).await,
        }
    }

    /// Fetch one datapoint per selected sensor
    ///
    /// `function` picks the point, e.g. `earliest`, `latest`, `before`, `after`;
    /// all but `earliest` and `latest` need a timestamp.
    pub async fn single(
        self,
        function: impl Into<String>,
        timestamp: Option<DateTime<Utc>>,
        include_selection: bool,
    ) -> QueryResult<Execution> {
        if self.object_type != SelectionType::Sensors {
            return Err(QueryError::argument_type(
                "Single value only applies to sensors",
            ));
        }
        let (transport, query) = self.finish(Some(Operation::Single {
            function: function.into(),
            timestamp,
            include_selection,
        }));
        let raw = transport.single(&query).await?;
        Ok(Execution::new(query, raw))
    }

    /// Deprecated shortcut for `single("latest", None, include_selection)`
    pub async fn latest(mut self, include_selection: bool) -> QueryResult<Execution> {
        self.advise(Advisory::LatestDeprecated);
        self.single("latest", None, include_selection).await
    }

    /// Delete what the query selects
    ///
    /// Device queries delete whole devices and take no bounds. Sensor queries
    /// delete datapoints in `[start, end)` from exactly one device/sensor pair.
    /// Rule queries delete one rule.
    pub async fn delete(
        self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> QueryResult<Execution> {
        match self.object_type {
            SelectionType::Devices => {
                if start.is_some() || end.is_some() {
                    return Err(QueryError::validation(DELETE_DEVICE_MSG));
                }
                let (transport, query) = self.finish(Some(Operation::Find {
                    quantifier: Quantifier::All,
                }));
                let raw = transport.delete_device(&query).await?;
                Ok(Execution::new(query, raw))
            }
            SelectionType::Sensors => {
                let (start, end) = match (start, end) {
                    (Some(start), Some(end)) => (start, end),
                    _ => return Err(QueryError::validation(DELETE_BOUNDS_MSG)),
                };
                let (device_key, sensor_key) = self.datapoint_delete_keys()?;
                let (transport, query) = self.finish(Some(Operation::Delete {
                    start,
                    stop: end,
                    device_key: device_key.clone(),
                    sensor_key: sensor_key.clone(),
                }));
                let raw = transport
                    .delete_from_sensors(&device_key, &sensor_key, start, end)
                    .await?;
                Ok(Execution::new(query, raw))
            }
            SelectionType::Rules => {
                let key = extract_key_for_monitoring(&self.selections.rules)?;
                let (transport, query) = self.finish(None);
                tracing::debug!(rule = %key, "Deleting monitoring rule");
                let raw = transport.monitoring().delete_rule(&key).await?;
                Ok(Execution::new(query, raw))
            }
        }
    }

    /// Create a monitoring rule over this query's selection
    ///
    /// The selection is attached to `rule`. Pipeline steps are kept on the
    /// query but have no effect on the rule.
    pub async fn monitor(mut self, rule: &mut Rule) -> QueryResult<Execution> {
        if !self.pipeline.is_empty() {
            self.advise(Advisory::PipelineIgnoredOnMonitor);
        }
        rule.selection = Some(self.selections.clone());
        let (transport, query) = self.finish(None);
        let raw = transport.monitor(rule).await?;
        Ok(Execution::new(query, raw))
    }

    /// Annotations of the selected monitoring rule
    pub async fn annotations(self) -> QueryResult<Execution> {
        self.rule_read(MonitoringRead::Annotations).await
    }

    /// Change log of the selected monitoring rule
    pub async fn changes(self) -> QueryResult<Execution> {
        self.rule_read(MonitoringRead::Changelog).await
    }

    /// Evaluation logs of the selected monitoring rule
    pub async fn logs(self) -> QueryResult<Execution> {
        self.rule_read(MonitoringRead::Logs).await
    }

    /// Usage statistics of the selected monitoring rule
    pub async fn usage(self) -> QueryResult<Execution> {
        self.rule_read(MonitoringRead::Usage).await
    }

    async fn rule_read(self, read: MonitoringRead) -> QueryResult<Execution> {
        if self.object_type != SelectionType::Rules {
            return Err(QueryError::argument_type(format!(
                "{} only applies to monitoring rules",
                read.label()
            )));
        }
        self.monitoring_read(read).await
    }

    async fn monitoring_read(self, read: MonitoringRead) -> QueryResult<Execution> {
        let key = extract_key_for_monitoring(&self.selections.rules)?;
        let (transport, query) = self.finish(None);
        tracing::debug!(rule = %key, read = ?read, "Reading monitoring rule");
        let raw = read.call(transport.monitoring(), &key).await?;
        Ok(Execution::new(query, raw))
    }

    fn datapoint_delete_keys(&self) -> QueryResult<(String, String)> {
        let device_key = self.selections.devices.simple_value();
        let sensor_key = self.selections.sensors.simple_value();
        match (device_key, sensor_key) {
            (Some(device_key), Some(sensor_key)) => {
                Ok((device_key.to_string(), sensor_key.to_string()))
            }
            _ => Err(QueryError::validation(DELETE_KEY_MSG)),
        }
    }

    fn advise(&mut self, advisory: Advisory) {
        tracing::warn!(advisory = ?advisory, "{}", advisory.message());
        self.advisories.push(advisory);
    }

    fn finish(self, operation: Option<Operation>) -> (&'a dyn Transport, Query) {
        tracing::debug!(
            object_type = %self.object_type,
            operation = operation.as_ref().map(Operation::name).unwrap_or("none"),
            pipeline_steps = self.pipeline.len(),
            "Dispatching query"
        );
        let query = Query {
            object_type: self.object_type,
            selections: self.selections,
            pipeline: self.pipeline,
            operation,
            advisories: self.advisories,
        };
        (self.transport, query)
    }
}

impl std::fmt::Debug for QueryBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("object_type", &self.object_type)
            .field("selections", &self.selections)
            .field("pipeline", &self.pipeline)
            .field("advisories", &self.advisories)
            .finish_non_exhaustive()
    }
}

impl Execution {
    fn new(query: Query, raw: RawResponse) -> Self {
        Self {
            query,
            response: Response::new(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Outcome;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        ReadSensors(Query),
        SearchDevices(Query),
        Single(Query),
        DeleteDevice(Query),
        DeleteFromSensors(String, String, DateTime<Utc>, DateTime<Utc>),
        Monitor(Rule),
        Monitoring(&'static str, String),
    }

    /// Transport double that records every call and answers 200 OK
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingTransport {
        fn record(&self, call: Call) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push(call);
            Ok(RawResponse::new(200, "OK", "{}"))
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn read_sensors(&self, query: &Query) -> Result<RawResponse, TransportError> {
            self.record(Call::ReadSensors(query.clone()))
        }

        async fn search_devices(&self, query: &Query) -> Result<RawResponse, TransportError> {
            self.record(Call::SearchDevices(query.clone()))
        }

        async fn single(&self, query: &Query) -> Result<RawResponse, TransportError> {
            self.record(Call::Single(query.clone()))
        }

        async fn delete_device(&self, query: &Query) -> Result<RawResponse, TransportError> {
            self.record(Call::DeleteDevice(query.clone()))
        }

        async fn delete_from_sensors(
            &self,
            device_key: &str,
            sensor_key: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<RawResponse, TransportError> {
            self.record(Call::DeleteFromSensors(
                device_key.to_string(),
                sensor_key.to_string(),
                start,
                end,
            ))
        }

        async fn monitor(&self, rule: &Rule) -> Result<RawResponse, TransportError> {
            self.record(Call::Monitor(rule.clone()))
        }

        fn monitoring(&self) -> &dyn Monitoring {
            self
        }
    }

    #[async_trait]
    impl Monitoring for RecordingTransport {
        async fn get_rule(&self, key: &str) -> Result<RawResponse, TransportError> {
            self.record(Call::Monitoring("get_rule", key.to_string()))
        }

        async fn get_annotations(&self, key: &str) -> Result<RawResponse, TransportError> {
            self.record(Call::Monitoring("get_annotations", key.to_string()))
        }

        async fn get_changelog(&self, key: &str) -> Result<RawResponse, TransportError> {
            self.record(Call::Monitoring("get_changelog", key.to_string()))
        }

        async fn get_logs(&self, key: &str) -> Result<RawResponse, TransportError> {
            self.record(Call::Monitoring("get_logs", key.to_string()))
        }

        async fn get_usage(&self, key: &str) -> Result<RawResponse, TransportError> {
            self.record(Call::Monitoring("get_usage", key.to_string()))
        }

        async fn delete_rule(&self, key: &str) -> Result<RawResponse, TransportError> {
            self.record(Call::Monitoring("delete_rule", key.to_string()))
        }
    }

    /// Transport double whose every call fails to connect
    struct UnreachableTransport;

    #[async_trait]
    impl Transport for UnreachableTransport {
        async fn read_sensors(&self, _: &Query) -> Result<RawResponse, TransportError> {
            Err(TransportError::Unavailable)
        }

        async fn search_devices(&self, _: &Query) -> Result<RawResponse, TransportError> {
            Err(TransportError::Unavailable)
        }

        async fn single(&self, _: &Query) -> Result<RawResponse, TransportError> {
            Err(TransportError::Unavailable)
        }

        async fn delete_device(&self, _: &Query) -> Result<RawResponse, TransportError> {
            Err(TransportError::Unavailable)
        }

        async fn delete_from_sensors(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> Result<RawResponse, TransportError> {
            Err(TransportError::Unavailable)
        }

        async fn monitor(&self, _: &Rule) -> Result<RawResponse, TransportError> {
            Err(TransportError::Unavailable)
        }

        fn monitoring(&self) -> &dyn Monitoring {
            unreachable!("monitoring is not used by these tests")
        }
    }

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn device(key: &str) -> Selector {
        Selector::key(SelectionType::Devices, key)
    }

    fn sensor(key: &str) -> Selector {
        Selector::key(SelectionType::Sensors, key)
    }

    fn rule(key: &str) -> Selector {
        Selector::key(SelectionType::Rules, key)
    }

    #[test]
    fn test_filter_accumulates_per_category() {
        let transport = RecordingTransport::default();
        let builder = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(device("d1"))
            .unwrap()
            .filter(sensor("temperature"))
            .unwrap()
            .filter(device("d2"))
            .unwrap();

        let devices = builder.selections().devices.root().unwrap();
        assert_eq!(devices, &Selector::And(vec![device("d1"), device("d2")]));
        assert!(builder.selections().sensors.is_simple());
        assert!(builder.selections().rules.is_empty());
    }

    #[test]
    fn test_filter_rejects_compound_selector() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Devices)
            .filter(Selector::attributes(SelectionType::Devices, [("building", "hq")]))
            .unwrap_err();
        assert!(matches!(err, QueryError::ArgumentType(ref m) if m.starts_with("Invalid object for filter")));
    }

    #[test]
    fn test_filter_rejects_empty_combination() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Devices)
            .filter(Selector::or([]))
            .unwrap_err();
        assert!(matches!(err, QueryError::ArgumentType(_)));
    }

    #[test]
    fn test_pipeline_appends_in_order() {
        let transport = RecordingTransport::default();
        let builder = QueryBuilder::new(&transport, SelectionType::Sensors)
            .rollup("mean", "1hour", None)
            .aggregate("sum")
            .convert_timezone("UTC");
        let names: Vec<_> = builder.pipeline().iter().map(PipelineStep::name).collect();
        assert_eq!(names, vec!["rollup", "aggregation", "convert_tz"]);
    }

    #[tokio::test]
    async fn test_sensor_read_backfills_rollup_start() {
        let transport = RecordingTransport::default();
        let execution = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(sensor("temperature"))
            .unwrap()
            .rollup("mean", "1hour", None)
            .interpolate("linear", "1min", None, None)
            .read(ts(1), ts(2))
            .await
            .unwrap();

        let query = &execution.query;
        assert_eq!(
            query.operation(),
            Some(&Operation::Read {
                start: ts(1),
                stop: ts(2)
            })
        );
        assert!(matches!(
            query.pipeline()[0],
            PipelineStep::Rollup { start: Some(s), .. } if s == ts(1)
        ));
        assert!(matches!(
            query.pipeline()[1],
            PipelineStep::Interpolation { start: Some(s), end: Some(e), .. } if s == ts(1) && e == ts(2)
        ));
        assert_eq!(transport.calls(), vec![Call::ReadSensors(query.clone())]);
        assert_eq!(execution.response.successful(), Outcome::Success);
    }

    #[tokio::test]
    async fn test_sensor_read_without_bounds_fails_before_transport() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(sensor("temperature"))
            .unwrap()
            .read_range(Some(ts(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(ref m) if m == READ_BOUNDS_MSG));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_sensor_rollup_without_end_reports_rollup_bounds() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Sensors)
            .rollup("mean", "1hour", None)
            .read_range(Some(ts(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(ref m) if m == pipeline::ROLLUP_BOUNDS_MSG));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_device_read_discards_pipeline() {
        let transport = RecordingTransport::default();
        let execution = QueryBuilder::new(&transport, SelectionType::Devices)
            .filter(device("d1"))
            .unwrap()
            .rollup("mean", "1hour", None)
            .read_all()
            .await
            .unwrap();

        let query = &execution.query;
        assert!(query.pipeline().is_empty());
        assert_eq!(query.advisories(), &[Advisory::PipelineIgnoredOnDeviceRead]);
        assert_eq!(
            query.operation(),
            Some(&Operation::Find {
                quantifier: Quantifier::All
            })
        );
        assert_eq!(transport.calls(), vec![Call::SearchDevices(query.clone())]);
    }

    #[tokio::test]
    async fn test_device_read_without_pipeline_has_no_advisory() {
        let transport = RecordingTransport::default();
        let execution = QueryBuilder::new(&transport, SelectionType::Devices)
            .read(ts(1), ts(2))
            .await
            .unwrap();
        assert!(execution.query.advisories().is_empty());
    }

    #[tokio::test]
    async fn test_rule_read_uses_single_key() {
        let transport = RecordingTransport::default();
        let execution = QueryBuilder::new(&transport, SelectionType::Rules)
            .filter(rule("high-temp"))
            .unwrap()
            .read_all()
            .await
            .unwrap();
        assert!(execution.query.operation().is_none());
        assert_eq!(
            transport.calls(),
            vec![Call::Monitoring("get_rule", "high-temp".into())]
        );
    }

    #[tokio::test]
    async fn test_single_on_sensors() {
        let transport = RecordingTransport::default();
        let execution = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(sensor("temperature"))
            .unwrap()
            .single("before", Some(ts(3)), true)
            .await
            .unwrap();
        assert_eq!(
            execution.query.operation(),
            Some(&Operation::Single {
                function: "before".into(),
                timestamp: Some(ts(3)),
                include_selection: true,
            })
        );
        assert!(matches!(transport.calls().as_slice(), [Call::Single(_)]));
    }

    #[tokio::test]
    async fn test_single_on_devices_is_type_error() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Devices)
            .single("latest", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ArgumentType(ref m) if m == "Single value only applies to sensors"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_latest_warns_and_forwards() {
        let transport = RecordingTransport::default();
        let execution = QueryBuilder::new(&transport, SelectionType::Sensors)
            .latest(false)
            .await
            .unwrap();
        assert_eq!(execution.query.advisories(), &[Advisory::LatestDeprecated]);
        assert_eq!(
            execution.query.operation(),
            Some(&Operation::Single {
                function: "latest".into(),
                timestamp: None,
                include_selection: false,
            })
        );
    }

    #[tokio::test]
    async fn test_delete_devices_rejects_bounds() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Devices)
            .filter(device("d1"))
            .unwrap()
            .delete(Some(ts(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_devices() {
        let transport = RecordingTransport::default();
        let execution = QueryBuilder::new(&transport, SelectionType::Devices)
            .filter(device("d1"))
            .unwrap()
            .delete(None, None)
            .await
            .unwrap();
        assert_eq!(
            execution.query.operation(),
            Some(&Operation::Find {
                quantifier: Quantifier::All
            })
        );
        assert!(matches!(transport.calls().as_slice(), [Call::DeleteDevice(_)]));
    }

    #[tokio::test]
    async fn test_delete_datapoints() {
        let transport = RecordingTransport::default();
        let execution = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(device("d1"))
            .unwrap()
            .filter(sensor("temperature"))
            .unwrap()
            .delete(Some(ts(1)), Some(ts(2)))
            .await
            .unwrap();
        assert_eq!(
            execution.query.operation(),
            Some(&Operation::Delete {
                start: ts(1),
                stop: ts(2),
                device_key: "d1".into(),
                sensor_key: "temperature".into(),
            })
        );
        assert_eq!(
            transport.calls(),
            vec![Call::DeleteFromSensors(
                "d1".into(),
                "temperature".into(),
                ts(1),
                ts(2)
            )]
        );
    }

    #[tokio::test]
    async fn test_delete_datapoints_requires_bounds() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(device("d1"))
            .unwrap()
            .filter(sensor("temperature"))
            .unwrap()
            .delete(Some(ts(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(ref m) if m == DELETE_BOUNDS_MSG));
    }

    #[tokio::test]
    async fn test_delete_datapoints_rejects_combined_device_selection() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(Selector::or([device("d1"), device("d2")]))
            .unwrap()
            .filter(sensor("temperature"))
            .unwrap()
            .delete(Some(ts(1)), Some(ts(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(ref m) if m == DELETE_KEY_MSG));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_datapoints_rejects_attribute_device_selection() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(Selector::and([Selector::attributes(
                SelectionType::Devices,
                [("building", "hq")],
            )]))
            .unwrap()
            .filter(sensor("temperature"))
            .unwrap()
            .delete(Some(ts(1)), Some(ts(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(ref m) if m == DELETE_KEY_MSG));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_datapoints_requires_sensor_key() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(device("d1"))
            .unwrap()
            .delete(Some(ts(1)), Some(ts(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Validation(ref m) if m == DELETE_KEY_MSG));
    }

    #[tokio::test]
    async fn test_delete_rule() {
        let transport = RecordingTransport::default();
        QueryBuilder::new(&transport, SelectionType::Rules)
            .filter(rule("high-temp"))
            .unwrap()
            .delete(None, None)
            .await
            .unwrap();
        assert_eq!(
            transport.calls(),
            vec![Call::Monitoring("delete_rule", "high-temp".into())]
        );
    }

    #[tokio::test]
    async fn test_monitor_attaches_selection_and_keeps_pipeline() {
        let transport = RecordingTransport::default();
        let mut new_rule = Rule::new("high-temp", "High temperature");
        let execution = QueryBuilder::new(&transport, SelectionType::Sensors)
            .filter(sensor("temperature"))
            .unwrap()
            .rollup("max", "5min", None)
            .monitor(&mut new_rule)
            .await
            .unwrap();

        assert_eq!(execution.query.advisories(), &[Advisory::PipelineIgnoredOnMonitor]);
        assert_eq!(execution.query.pipeline().len(), 1);
        let attached = new_rule.selection.as_ref().unwrap();
        assert_eq!(attached.sensors.simple_value(), Some("temperature"));
        assert_eq!(transport.calls(), vec![Call::Monitor(new_rule.clone())]);
    }

    #[tokio::test]
    async fn test_rule_reads_dispatch_to_monitoring() {
        let transport = RecordingTransport::default();
        let builder = || {
            QueryBuilder::new(&transport, SelectionType::Rules)
                .filter(rule("r1"))
                .unwrap()
        };
        builder().annotations().await.unwrap();
        builder().changes().await.unwrap();
        builder().logs().await.unwrap();
        builder().usage().await.unwrap();

        let methods: Vec<_> = transport
            .calls()
            .into_iter()
            .map(|c| match c {
                Call::Monitoring(method, key) => {
                    assert_eq!(key, "r1");
                    method
                }
                other => panic!("unexpected call {:?}", other),
            })
            .collect();
        assert_eq!(
            methods,
            vec!["get_annotations", "get_changelog", "get_logs", "get_usage"]
        );
    }

    #[tokio::test]
    async fn test_rule_reads_require_rule_queries() {
        let transport = RecordingTransport::default();
        let err = QueryBuilder::new(&transport, SelectionType::Sensors)
            .annotations()
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ArgumentType(ref m) if m == "Annotations only applies to monitoring rules"));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let err = QueryBuilder::new(&UnreachableTransport, SelectionType::Sensors)
            .read(ts(1), ts(2))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Transport(TransportError::Unavailable)));
    }

    #[test]
    fn test_extract_key_single_scalar() {
        let mut selection = Selection::new();
        selection.add(rule("r1"));
        assert_eq!(extract_key_for_monitoring(&selection).unwrap(), "r1");
    }

    #[test]
    fn test_extract_key_wrapped_scalar() {
        let mut selection = Selection::new();
        selection.add(Selector::or([rule("r1")]));
        assert_eq!(extract_key_for_monitoring(&selection).unwrap(), "r1");
    }

    #[test]
    fn test_extract_key_rejects_multiple_keys() {
        let mut selection = Selection::new();
        selection.add(rule("r1"));
        selection.add(rule("r2"));
        let err = extract_key_for_monitoring(&selection).unwrap_err();
        assert!(matches!(err, QueryError::Validation(ref m) if m == MULTI_KEY_MSG));
    }

    #[test]
    fn test_extract_key_rejects_empty_selection() {
        let err = extract_key_for_monitoring(&Selection::new()).unwrap_err();
        assert!(matches!(err, QueryError::Validation(ref m) if m == MISSING_KEY_MSG));
    }
}
