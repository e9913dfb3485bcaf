//! Response store: persisted responses keyed by a generated id.
//!
//! Stored responses are what `message_uris` point back to. In-memory for
//! tests and one-shot CLI runs; one JSON file per response on disk.

use arax_core::Response;
use dashmap::DashMap;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("response {0} not found")]
    NotFound(u64),

    #[error("'{0}' is not a recognized response URI")]
    UnrecognizedUri(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ResponseNotFound",
            Self::UnrecognizedUri(_) => "UnrecognizedMessageUri",
            Self::Io(_) | Self::Json(_) => "ResponseStoreError",
        }
    }
}

#[async_trait::async_trait]
pub trait ResponseStore: Send + Sync {
    /// Persist a response and return its new id.
    async fn put(&self, response: &Response) -> Result<u64, StoreError>;

    async fn get(&self, id: u64) -> Result<Response, StoreError>;

    /// Where responses live (for human inspection).
    fn location(&self) -> String;
}

/// `"{base}/response/{id}"`.
pub fn response_uri(base: &str, id: u64) -> String {
    format!("{}/response/{}", base.trim_end_matches('/'), id)
}

/// The id in a `.../response/<id>` URI.
pub fn parse_response_uri(uri: &str) -> Result<u64, StoreError> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"/response/(\d+)/?$").expect("valid response URI pattern"));
    pattern
        .captures(uri)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| StoreError::UnrecognizedUri(uri.to_string()))
}

fn stamped(response: &Response, id: u64) -> Response {
    let mut stored = response.clone();
    stored.response_id = Some(id);
    stored
}

#[derive(Default)]
pub struct InMemoryStore {
    responses: DashMap<u64, Response>,
    last_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

#[async_trait::async_trait]
impl ResponseStore for InMemoryStore {
    async fn put(&self, response: &Response) -> Result<u64, StoreError> {
        let id = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.responses.insert(id, stamped(response, id));
        Ok(id)
    }

    async fn get(&self, id: u64) -> Result<Response, StoreError> {
        self.responses
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::NotFound(id))
    }

    fn location(&self) -> String {
        "memory".into()
    }
}

/// Writes `<dir>/<id>.json`. The next id is one past the largest on disk.
pub struct FsStore {
    dir: PathBuf,
    allocate: Mutex<()>,
}

impl FsStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            allocate: Mutex::new(()),
        }
    }

    fn path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    async fn max_id(&self) -> Result<u64, StoreError> {
        let mut max = 0;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let id = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok());
            if let Some(id) = id {
                max = max.max(id);
            }
        }
        Ok(max)
    }
}

#[async_trait::async_trait]
impl ResponseStore for FsStore {
    async fn put(&self, response: &Response) -> Result<u64, StoreError> {
        let _guard = self.allocate.lock().await;
        tokio::fs::create_dir_all(&self.dir).await?;
        let id = self.max_id().await? + 1;
        let body = serde_json::to_vec_pretty(&stamped(response, id))?;
        let path = self.path(id);
        tokio::fs::write(&path, &body).await?;
        tracing::debug!("stored response {} at {} ({} bytes)", id, path.display(), body.len());
        Ok(id)
    }

    async fn get(&self, id: u64) -> Result<Response, StoreError> {
        let raw = match tokio::fs::read(self.path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}
