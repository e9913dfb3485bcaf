//! Action parameters
//!
//! Parameters arrive as a JSON object. Values may be native JSON or the
//! string forms the command DSL produces (`"true"`, `"5"`, `"[a, b]"`), so
//! every getter accepts both.

use crate::error::ParamError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Parameters(Map<String, Value>);

impl Parameters {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value. Returns `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Reject any key not in `allowed`.
    pub fn check_allowed(&self, allowed: &[&str]) -> Result<(), ParamError> {
        let unknown: Vec<String> = self
            .0
            .keys()
            .filter(|k| !allowed.contains(&k.as_str()))
            .cloned()
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ParamError::Unknown {
                keys: unknown,
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
            })
        }
    }

    /// String form of a scalar value. Arrays and objects are `None`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>, ParamError> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => {
                let normalized = match s.trim().to_ascii_lowercase().as_str() {
                    "t" | "yes" => "true".to_string(),
                    "f" | "no" => "false".to_string(),
                    other => other.to_string(),
                };
                normalized
                    .parse::<bool>()
                    .map(Some)
                    .map_err(|source| ParamError::Bool {
                        key: key.into(),
                        source,
                    })
            }
            Some(other) => Err(ParamError::WrongType {
                key: key.into(),
                found: type_name(other),
            }),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<Option<usize>, ParamError> {
        let raw = match self.0.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => {
                return Err(ParamError::WrongType {
                    key: key.into(),
                    found: type_name(other),
                })
            }
        };
        raw.parse::<usize>()
            .map(Some)
            .map_err(|source| ParamError::Int {
                key: key.into(),
                source,
            })
    }

    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, ParamError> {
        let raw = match self.0.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => {
                return Err(ParamError::WrongType {
                    key: key.into(),
                    found: type_name(other),
                })
            }
        };
        raw.parse::<f64>()
            .map(Some)
            .map_err(|source| ParamError::Float {
                key: key.into(),
                source,
            })
    }

    /// A list value: a JSON array, a bracketed string `"[a, b]"`, or a
    /// comma-separated string. Missing keys give an empty list.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.0.get(key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect(),
            Some(Value::String(s)) => s
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|p| p.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            Some(Value::Number(n)) => vec![n.to_string()],
            _ => Vec::new(),
        }
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
