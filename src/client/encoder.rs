//! Request body encoding
//!
//! Turns finalized queries and rules into the platform's JSON request
//! dialect:
//!
//! ```text
//! {
//!   "search":   { "select": "sensors", "filters": { "devices": ..., "sensors": ... } },
//!   "pipeline": { "functions": [ { "name": "rollup", "arguments": [...] } ] },
//!   "read":     { "start": "...", "stop": "..." }
//! }
//! ```

use crate::query::{Operation, PipelineStep, Quantifier, Query, Selection, Selector, Selections};
use crate::query::{SelectionType, SelectorAttribute};
use crate::rule::Rule;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

fn timestamp(ts: &DateTime<Utc>) -> Value {
    Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

fn optional_timestamp(ts: &Option<DateTime<Utc>>) -> Value {
    ts.as_ref().map(timestamp).unwrap_or(Value::Null)
}

/// Encode one selector expression
pub fn encode_selector(selector: &Selector) -> Value {
    match selector {
        Selector::Scalar {
            attribute, value, ..
        } => match attribute {
            SelectorAttribute::Key => json!({ "key": value }),
            SelectorAttribute::Name => json!({ "name": value }),
            SelectorAttribute::Attribute(name) => json!({ "attributes": { name: value } }),
        },
        Selector::And(children) => {
            json!({ "and": children.iter().map(encode_selector).collect::<Vec<_>>() })
        }
        Selector::Or(children) => {
            json!({ "or": children.iter().map(encode_selector).collect::<Vec<_>>() })
        }
        Selector::Compound { attributes, .. } => json!({ "attributes": attributes }),
    }
}

fn encode_selection(selection: &Selection) -> Value {
    selection
        .root()
        .map(encode_selector)
        .unwrap_or_else(|| Value::String("all".to_string()))
}

fn encode_filters(selections: &Selections, categories: &[SelectionType]) -> Value {
    let filters: Map<String, Value> = categories
        .iter()
        .map(|c| (c.to_string(), encode_selection(selections.get(*c))))
        .collect();
    Value::Object(filters)
}

/// Encode pipeline steps as a list of named functions
pub fn encode_pipeline(steps: &[PipelineStep]) -> Value {
    let functions: Vec<Value> = steps
        .iter()
        .map(|step| {
            let arguments = match step {
                PipelineStep::Aggregation { function } => json!([function]),
                PipelineStep::Rollup {
                    function,
                    period,
                    start,
                }
                | PipelineStep::Find {
                    function,
                    period,
                    start,
                } => json!([function, period, optional_timestamp(start)]),
                PipelineStep::MultiRollup {
                    functions,
                    period,
                    start,
                } => json!([functions, period, optional_timestamp(start)]),
                PipelineStep::Interpolation {
                    function,
                    period,
                    start,
                    end,
                } => json!([
                    function,
                    period,
                    optional_timestamp(start),
                    optional_timestamp(end)
                ]),
                PipelineStep::ConvertTz { timezone } => json!([timezone]),
            };
            json!({ "name": step.name(), "arguments": arguments })
        })
        .collect();
    json!({ "functions": functions })
}

/// Encode the terminal operation's arguments
pub fn encode_operation(operation: &Operation) -> Value {
    match operation {
        Operation::Read { start, stop } => json!({
            "start": timestamp(start),
            "stop": timestamp(stop),
        }),
        Operation::Find { quantifier } => match quantifier {
            Quantifier::All => json!({ "quantifier": "all" }),
        },
        Operation::Single {
            function,
            timestamp: ts,
            include_selection,
        } => {
            let mut args = json!({
                "function": function,
                "include_selection": include_selection,
            });
            if let (Some(ts), Some(obj)) = (ts, args.as_object_mut()) {
                obj.insert("timestamp".to_string(), timestamp(ts));
            }
            args
        }
        Operation::Delete {
            start,
            stop,
            device_key,
            sensor_key,
        } => json!({
            "start": timestamp(start),
            "stop": timestamp(stop),
            "device_key": device_key,
            "sensor_key": sensor_key,
        }),
    }
}

/// Encode a finalized query as a request body
pub fn encode_query(query: &Query) -> Value {
    let mut body = Map::new();
    body.insert(
        "search".to_string(),
        json!({
            "select": query.object_type().to_string(),
            "filters": encode_filters(
                query.selections(),
                &[SelectionType::Devices, SelectionType::Sensors],
            ),
        }),
    );
    if !query.pipeline().is_empty() {
        body.insert("pipeline".to_string(), encode_pipeline(query.pipeline()));
    }
    if let Some(operation) = query.operation() {
        body.insert(operation.name().to_string(), encode_operation(operation));
    }
    Value::Object(body)
}

/// Encode a monitoring rule together with its attached selection
pub fn encode_rule(rule: &Rule) -> Value {
    let filters = rule
        .selection
        .as_ref()
        .map(|s| encode_filters(s, &[SelectionType::Devices, SelectionType::Sensors]))
        .unwrap_or_else(|| json!({ "devices": "all", "sensors": "all" }));

    json!({
        "rule": {
            "key": rule.key,
            "name": rule.name,
            "conditions": rule.conditions,
            "actions": rule.actions,
        },
        "search": {
            "select": "sensors",
            "filters": filters,
        },
    })
}
