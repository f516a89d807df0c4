//! Connection-local driver state touched by internal command handlers.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Value stored under a driver option name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OptionValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
}

impl OptionValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptionValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            OptionValue::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Boolean(true) => f.write_str("ON"),
            OptionValue::Boolean(false) => f.write_str("OFF"),
            OptionValue::Integer(value) => write!(f, "{value}"),
            OptionValue::Text(value) => f.write_str(value),
        }
    }
}

/// Local driver state as seen by internal command handlers.
///
/// Each connection owns its state exclusively, so handlers get `&mut` access
/// and no locking is involved.
pub trait DriverState: Send {
    fn get_option(&self, name: &str) -> Option<OptionValue>;
    fn set_option(&mut self, name: &str, value: OptionValue);
}

/// In-memory session options of a single connection.
///
/// Option names are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    options: BTreeMap<String, OptionValue>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_option(mut self, name: &str, value: OptionValue) -> Self {
        self.set_option(name, value);
        self
    }

    pub fn options(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.options.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }
}

impl DriverState for SessionState {
    fn get_option(&self, name: &str) -> Option<OptionValue> {
        self.options.get(&name.to_ascii_lowercase()).cloned()
    }

    fn set_option(&mut self, name: &str, value: OptionValue) {
        self.options.insert(name.to_ascii_lowercase(), value);
    }
}
