//! Query requests and request-shape validation.
//!
//! A request is checked in full before any action runs; a shape error means
//! nothing executes.

use arax_core::{Message, Parameters, QueryOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Command names the executor handles itself rather than the registry.
pub const RETURN_COMMAND: &str = "return";

/// Actions run for a request that carries a message but no operations.
pub const DEFAULT_WORKFLOW: &[&str] = &["expand", "resultify"];

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("request must be a JSON object")]
    NotAnObject,

    #[error("request has neither a message nor operations")]
    NoQueryMessageOrOperations,

    #[error("operations must be an object with an 'actions' list")]
    InvalidOperations,

    #[error("action #{0} is not an object with a command")]
    UnknownAction(usize),

    #[error("action #{0} has no string 'command'")]
    MissingAction(usize),

    #[error("parameters of action #{index} ('{command}') are not a JSON object")]
    ParametersNotDict { index: usize, command: String },

    #[error("'{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("query_options.kp_timeout must be an integer, got {0}")]
    UserTimeoutNotInt(String),

    #[error("invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),
}

impl RequestError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAnObject | Self::InvalidOperations | Self::InvalidField { .. } => {
                "InvalidRequest"
            }
            Self::NoQueryMessageOrOperations => "NoQueryMessageOrOperations",
            Self::UnknownAction(_) => "UnknownAction",
            Self::MissingAction(_) => "MissingAction",
            Self::ParametersNotDict { .. } => "ParametersNotDict",
            Self::UserTimeoutNotInt(_) => "UserTimeoutNotInt",
            Self::InvalidMessage(_) => "InvalidMessage",
        }
    }
}

/// One `(command, parameters)` pair.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ActionCall {
    pub command: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl ActionCall {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            parameters: Parameters::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key, value);
        self
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Operations {
    #[serde(default)]
    pub actions: Vec<ActionCall>,
    /// Previously stored responses to start from.
    #[serde(default)]
    pub message_uris: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub operations: Option<Operations>,
    #[serde(default)]
    pub query_options: QueryOptions,
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub asynchronous: bool,
    #[serde(default)]
    pub submitter: Option<String>,
}

impl QueryRequest {
    pub fn from_actions(actions: Vec<ActionCall>) -> Self {
        Self {
            operations: Some(Operations {
                actions,
                message_uris: Vec::new(),
            }),
            ..Default::default()
        }
    }

    /// Actions to run: the given list, or the default workflow when only a
    /// message was supplied.
    pub fn actions(&self) -> Vec<ActionCall> {
        match &self.operations {
            Some(ops) => ops.actions.clone(),
            None => DEFAULT_WORKFLOW.iter().map(|c| ActionCall::new(*c)).collect(),
        }
    }

    /// Whether this request runs in the background.
    pub fn is_async(&self) -> bool {
        self.asynchronous || self.callback.is_some()
    }
}

/// Validate the shape of a raw request and decode it.
pub fn parse_request(value: Value) -> Result<QueryRequest, RequestError> {
    let Value::Object(mut map) = value else {
        return Err(RequestError::NotAnObject);
    };
    if !map.contains_key("message") && !map.contains_key("operations") {
        return Err(RequestError::NoQueryMessageOrOperations);
    }

    let message = match map.remove("message") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(serde_json::from_value::<Message>(raw)?),
    };

    let operations = match map.remove("operations") {
        None | Some(Value::Null) => None,
        Some(Value::Object(mut ops)) => {
            let actions = match ops.remove("actions") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => parse_actions(items)?,
                Some(_) => return Err(RequestError::InvalidOperations),
            };
            let message_uris = match ops.remove("message_uris") {
                None | Some(Value::Null) => Vec::new(),
                Some(raw) => {
                    serde_json::from_value(raw).map_err(|_| RequestError::InvalidOperations)?
                }
            };
            Some(Operations {
                actions,
                message_uris,
            })
        }
        Some(_) => return Err(RequestError::InvalidOperations),
    };

    let query_options = match map.remove("query_options") {
        None | Some(Value::Null) => QueryOptions::default(),
        Some(Value::Object(mut raw)) => {
            let kp_timeout = match raw.remove("kp_timeout") {
                None | Some(Value::Null) => None,
                Some(v) => Some(parse_timeout(&v)?),
            };
            QueryOptions {
                kp_timeout,
                extra: raw,
            }
        }
        Some(_) => {
            return Err(RequestError::InvalidField {
                field: "query_options",
                expected: "an object",
            })
        }
    };

    let asynchronous = match map.remove("asynchronous") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => b,
        Some(_) => {
            return Err(RequestError::InvalidField {
                field: "asynchronous",
                expected: "a boolean",
            })
        }
    };

    Ok(QueryRequest {
        message,
        operations,
        query_options,
        callback: optional_string(&mut map, "callback")?,
        asynchronous,
        submitter: optional_string(&mut map, "submitter")?,
    })
}

fn optional_string(
    map: &mut serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, RequestError> {
    match map.remove(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(RequestError::InvalidField {
            field,
            expected: "a string",
        }),
    }
}

fn parse_actions(items: Vec<Value>) -> Result<Vec<ActionCall>, RequestError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Object(mut entry) = item else {
                return Err(RequestError::UnknownAction(index));
            };
            let Some(Value::String(command)) = entry.remove("command") else {
                return Err(RequestError::MissingAction(index));
            };
            let parameters = match entry.remove("parameters") {
                None | Some(Value::Null) => Parameters::new(),
                Some(Value::Object(map)) => Parameters::from(map),
                Some(_) => return Err(RequestError::ParametersNotDict { index, command }),
            };
            Ok(ActionCall {
                command,
                parameters,
            })
        })
        .collect()
}

fn parse_timeout(value: &Value) -> Result<u64, RequestError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| RequestError::UserTimeoutNotInt(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|_| RequestError::UserTimeoutNotInt(s.clone())),
        other => Err(RequestError::UserTimeoutNotInt(other.to_string())),
    }
}
