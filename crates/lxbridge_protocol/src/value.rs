//! Value model shared by controller events, host writes and the host store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single state value.
///
/// Serialized untagged, so it maps one-to-one onto JSON scalars.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// No value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Numeric value. The controller reports every analog value as a double.
    Number(f64),
    /// Text value.
    Text(String),
}

/// Declared type of a host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Numeric state.
    Number,
    /// Boolean state.
    Boolean,
    /// Text state.
    String,
    /// Any JSON scalar; stored as received.
    #[default]
    Mixed,
}

impl StateValue {
    /// Returns the value as a number, if it has a numeric reading.
    ///
    /// Booleans read as 0/1 and numeric text is parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Null => None,
            StateValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            StateValue::Number(n) => Some(*n),
            StateValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Returns the value as a boolean, if it has a boolean reading.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Null => None,
            StateValue::Bool(b) => Some(*b),
            StateValue::Number(n) => Some(*n != 0.0),
            StateValue::Text(s) => match s.trim() {
                "true" | "on" => Some(true),
                "false" | "off" => Some(false),
                other => other.parse::<f64>().ok().map(|n| n != 0.0),
            },
        }
    }

    /// Returns true for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    /// Converts a raw controller value to the declared object type.
    ///
    /// Values without a reading in the target type become `Null`.
    pub fn coerce_to(&self, value_type: ValueType) -> StateValue {
        match value_type {
            ValueType::Number => self.as_f64().map_or(StateValue::Null, StateValue::Number),
            ValueType::Boolean => self.as_bool().map_or(StateValue::Null, StateValue::Bool),
            ValueType::String => match self {
                StateValue::Null => StateValue::Null,
                other => StateValue::Text(other.to_string()),
            },
            ValueType::Mixed => self.clone(),
        }
    }

    /// Rounds the value to an integer and clamps it into `[min, max]`.
    ///
    /// Returns `None` when the value has no numeric reading.
    pub fn to_clamped_integer(&self, min: Option<i64>, max: Option<i64>) -> Option<StateValue> {
        let n = self.as_f64()?;
        if !n.is_finite() {
            return None;
        }
        let mut n = n.round() as i64;
        if let Some(min) = min {
            n = n.max(min);
        }
        if let Some(max) = max {
            n = n.min(max);
        }
        Some(StateValue::Number(n as f64))
    }

    /// Renders the value as a command action understood by the controller.
    pub fn to_command_action(&self) -> String {
        match self {
            StateValue::Null => String::new(),
            StateValue::Bool(true) => "1".into(),
            StateValue::Bool(false) => "0".into(),
            StateValue::Number(n) => format_number(*n),
            StateValue::Text(s) => s.clone(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Null => f.write_str("null"),
            StateValue::Bool(b) => write!(f, "{b}"),
            StateValue::Number(n) => f.write_str(&format_number(*n)),
            StateValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        StateValue::Bool(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        StateValue::Number(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        StateValue::Number(value as f64)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        StateValue::Text(value)
    }
}
