//! Selection expressions
//!
//! A selection picks out a subset of devices, sensors, or monitoring rules.
//! Each category holds one expression tree built from:
//!
//! - **Scalar**: equality on one attribute (`key`, `name`, or a custom attribute)
//! - **And / Or**: boolean combination of other selectors
//! - **Compound**: a dictionary of attribute/value pairs that must all match
//!
//! ```text
//! devices: And(key = "thermostat.1", attributes.building = "hq")
//! sensors: Or(key = "temperature", key = "humidity")
//! rules:   key = "high-temperature"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Category of entity a selector applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionType {
    Devices,
    Sensors,
    Rules,
}

impl SelectionType {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "devices" | "device" => Some(Self::Devices),
            "sensors" | "sensor" => Some(Self::Sensors),
            "rules" | "rule" => Some(Self::Rules),
            _ => None,
        }
    }

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Devices => "devices",
            Self::Sensors => "sensors",
            Self::Rules => "rules",
        }
    }
}

impl fmt::Display for SelectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attribute a scalar selector compares against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorAttribute {
    /// The entity's unique key
    Key,
    /// The entity's display name
    Name,
    /// A user-defined attribute
    Attribute(String),
}

impl fmt::Display for SelectorAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key => write!(f, "key"),
            Self::Name => write!(f, "name"),
            Self::Attribute(name) => write!(f, "attributes.{}", name),
        }
    }
}

/// A selection expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Equality on a single attribute
    Scalar {
        selection_type: SelectionType,
        attribute: SelectorAttribute,
        value: String,
    },
    /// All children must match
    And(Vec<Selector>),
    /// Any child may match
    Or(Vec<Selector>),
    /// Every attribute/value pair in the map must match
    Compound {
        selection_type: SelectionType,
        attributes: BTreeMap<String, String>,
    },
}

impl Selector {
    /// Select by entity key
    pub fn key(selection_type: SelectionType, value: impl Into<String>) -> Self {
        Self::Scalar {
            selection_type,
            attribute: SelectorAttribute::Key,
            value: value.into(),
        }
    }

    /// Select by entity name
    pub fn name(selection_type: SelectionType, value: impl Into<String>) -> Self {
        Self::Scalar {
            selection_type,
            attribute: SelectorAttribute::Name,
            value: value.into(),
        }
    }

    /// Select by a single user-defined attribute
    pub fn attribute(
        selection_type: SelectionType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::Scalar {
            selection_type,
            attribute: SelectorAttribute::Attribute(name.into()),
            value: value.into(),
        }
    }

    /// Select by a map of attributes that must all match
    pub fn attributes<K, V>(
        selection_type: SelectionType,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Compound {
            selection_type,
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Combine selectors so that all must match
    pub fn and(selectors: impl IntoIterator<Item = Selector>) -> Self {
        Self::And(selectors.into_iter().collect())
    }

    /// Combine selectors so that any may match
    pub fn or(selectors: impl IntoIterator<Item = Selector>) -> Self {
        Self::Or(selectors.into_iter().collect())
    }

    /// Category this selector applies to
    ///
    /// Combinations take the category of their first child; an empty
    /// combination has none.
    pub fn selection_type(&self) -> Option<SelectionType> {
        match self {
            Self::Scalar { selection_type, .. } | Self::Compound { selection_type, .. } => {
                Some(*selection_type)
            }
            Self::And(children) | Self::Or(children) => {
                children.first().and_then(Selector::selection_type)
            }
        }
    }

    /// Value of a scalar selector
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Child selectors of a combination
    pub fn selectors(&self) -> Option<&[Selector]> {
        match self {
            Self::And(children) | Self::Or(children) => Some(children),
            _ => None,
        }
    }

    /// Whether this is a single scalar selector
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Scalar { .. })
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar {
                selection_type,
                attribute,
                value,
            } => write!(f, "{}.{} = '{}'", selection_type, attribute, value),
            Self::And(children) | Self::Or(children) => {
                let op = if matches!(self, Self::And(_)) { " AND " } else { " OR " };
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(op)?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
            Self::Compound {
                selection_type,
                attributes,
            } => {
                write!(f, "{}.attributes = {{", selection_type)?;
                for (i, (k, v)) in attributes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: '{}'", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// The selection expression for one category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    root: Option<Selector>,
}

impl Selection {
    /// Create an empty selection (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a selector, refining whatever was selected before
    ///
    /// Selectors accumulate in call order under a top-level `And`.
    pub fn add(&mut self, selector: Selector) {
        self.root = Some(match self.root.take() {
            None => selector,
            Some(Selector::And(mut children)) => {
                children.push(selector);
                Selector::And(children)
            }
            Some(existing) => Selector::And(vec![existing, selector]),
        });
    }

    /// Root expression, if anything was selected
    pub fn root(&self) -> Option<&Selector> {
        self.root.as_ref()
    }

    /// Check if nothing was selected
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// A selection is simple when its root is one scalar selector
    pub fn is_simple(&self) -> bool {
        self.root.as_ref().map(Selector::is_scalar).unwrap_or(false)
    }

    /// Value of the root selector when the selection is simple
    pub fn simple_value(&self) -> Option<&str> {
        self.root.as_ref().and_then(Selector::value)
    }
}

/// Selections for all three categories
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selections {
    pub devices: Selection,
    pub sensors: Selection,
    pub rules: Selection,
}

impl Selections {
    /// Get the selection for a category
    pub fn get(&self, selection_type: SelectionType) -> &Selection {
        match selection_type {
            SelectionType::Devices => &self.devices,
            SelectionType::Sensors => &self.sensors,
            SelectionType::Rules => &self.rules,
        }
    }

    /// Get the selection for a category mutably
    pub fn get_mut(&mut self, selection_type: SelectionType) -> &mut Selection {
        match selection_type {
            SelectionType::Devices => &mut self.devices,
            SelectionType::Sensors => &mut self.sensors,
            SelectionType::Rules => &mut self.rules,
        }
    }
}
