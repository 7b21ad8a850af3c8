//! Monitoring rules
//!
//! A rule is an alerting definition the platform evaluates against a
//! selection of devices and sensors. The client treats its conditions and
//! actions as opaque JSON; only the key and the attached selection matter
//! to query building.

use crate::query::Selections;
use serde_json::Value;

/// A monitoring rule handle
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    /// Unique rule key
    pub key: String,
    /// Human-readable name
    pub name: String,
    /// Conditions that trigger the rule
    pub conditions: Value,
    /// Actions taken when the rule triggers
    pub actions: Value,
    /// Selection the rule watches, attached by `QueryBuilder::monitor`
    pub selection: Option<Selections>,
}

impl Rule {
    /// Create a rule with no conditions or actions
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            conditions: Value::Array(Vec::new()),
            actions: Value::Array(Vec::new()),
            selection: None,
        }
    }

    /// Builder method: set conditions
    pub fn conditions(mut self, conditions: Value) -> Self {
        self.conditions = conditions;
        self
    }

    /// Builder method: set actions
    pub fn actions(mut self, actions: Value) -> Self {
        self.actions = actions;
        self
    }
}
