//! arax-executor: request validation, the pipeline executor, and the
//! stores it writes to.

pub mod callback;
pub mod executor;
pub mod request;
pub mod store;
pub mod tracker;

pub use callback::{CallbackClient, DeliveryError};
pub use executor::{rejected, Executor, ReturnParams, Submission, SubmissionHandle};
pub use request::{parse_request, ActionCall, Operations, QueryRequest, RequestError};
pub use store::{response_uri, FsStore, InMemoryStore, ResponseStore, StoreError};
pub use tracker::{
    FsTracker, InMemoryTracker, PipelineState, QueryTracker, TrackerEntry, TrackerError,
    TrackerStatus,
};
