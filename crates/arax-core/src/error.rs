//! Error types for ARAX core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("query node '{0}' already exists")]
    DuplicateQNode(String),

    #[error("query edge '{0}' already exists")]
    DuplicateQEdge(String),

    #[error("unknown query node key: {0}")]
    UnknownQNodeKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable error code reported as the response status.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateQNode(_) => "QNodeKeyExists",
            Self::DuplicateQEdge(_) => "QEdgeKeyExists",
            Self::UnknownQNodeKey(_) => "UnknownQNodeKey",
        }
    }
}

/// Failure to read an action parameter.
///
/// Numeric and boolean parse failures keep the underlying error so the
/// response can report its class name as the error code.
#[derive(Error, Debug)]
pub enum ParamError {
    #[error("parameter '{key}' is not an integer: {source}")]
    Int {
        key: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("parameter '{key}' is not a number: {source}")]
    Float {
        key: String,
        #[source]
        source: std::num::ParseFloatError,
    },

    #[error("parameter '{key}' is not a boolean: {source}")]
    Bool {
        key: String,
        #[source]
        source: std::str::ParseBoolError,
    },

    #[error("parameter '{key}' has unsupported type {found}")]
    WrongType { key: String, found: &'static str },

    #[error("unknown parameter(s) {}; allowed: {}", .keys.join(", "), .allowed.join(", "))]
    Unknown {
        keys: Vec<String>,
        allowed: Vec<String>,
    },
}

impl ParamError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Int { .. } => "ParseIntError",
            Self::Float { .. } => "ParseFloatError",
            Self::Bool { .. } => "ParseBoolError",
            Self::WrongType { .. } => "ParameterTypeError",
            Self::Unknown { .. } => "UnknownParameter",
        }
    }
}
