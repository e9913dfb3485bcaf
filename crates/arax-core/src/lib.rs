//! ARAX Core - query graph / knowledge graph model, response log, parameters

pub mod error;
pub mod params;
pub mod response;
pub mod types;

pub use error::{Error, ParamError, Result};
pub use params::Parameters;
pub use response::{Envelope, Level, LogEntry, Response, STATUS_OK};
pub use types::*;
