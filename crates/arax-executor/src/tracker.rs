//! Query tracker: lifecycle record for every query execution.

use arax_core::Response;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("tracker entry {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: PipelineState,
        to: PipelineState,
    },

    #[error("unknown tracker entry {0}")]
    UnknownEntry(String),

    #[error("tracker io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tracker yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerStatus {
    Running,
    Completed,
    Error,
}

impl std::fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "Running"),
            Self::Completed => write!(f, "Completed"),
            Self::Error => write!(f, "Error"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Running,
    DoneOk,
    DoneError,
}

impl PipelineState {
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::DoneOk)
                | (Self::Running, Self::DoneError)
        )
    }

    pub fn is_done(self) -> bool {
        matches!(self, Self::DoneOk | Self::DoneError)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::DoneOk => write!(f, "done_ok"),
            Self::DoneError => write!(f, "done_error"),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrackerEntry {
    pub tracker_id: String,
    pub submitter: Option<String>,
    pub started: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
    pub status: TrackerStatus,
    pub pipeline_state: PipelineState,
    pub n_actions: usize,
    pub n_results: Option<usize>,
    pub response_id: Option<u64>,
    pub message_code: Option<String>,
    pub code_description: Option<String>,
    pub elapsed_ms: Option<u64>,
}

impl TrackerEntry {
    pub fn new(submitter: Option<String>, n_actions: usize) -> Self {
        Self {
            tracker_id: uuid::Uuid::new_v4().to_string(),
            submitter,
            started: Utc::now(),
            ended: None,
            status: TrackerStatus::Running,
            pipeline_state: PipelineState::Pending,
            n_actions,
            n_results: None,
            response_id: None,
            message_code: None,
            code_description: None,
            elapsed_ms: None,
        }
    }

    pub fn advance(&mut self, next: PipelineState) -> Result<(), TrackerError> {
        if !self.pipeline_state.can_advance_to(next) {
            return Err(TrackerError::InvalidTransition {
                id: self.tracker_id.clone(),
                from: self.pipeline_state,
                to: next,
            });
        }
        self.pipeline_state = next;
        Ok(())
    }

    /// Record the final response and close the entry.
    pub fn finish(&mut self, response: &Response) -> Result<(), TrackerError> {
        let ok = response.is_ok();
        self.advance(if ok {
            PipelineState::DoneOk
        } else {
            PipelineState::DoneError
        })?;
        let ended = Utc::now();
        self.status = if ok {
            TrackerStatus::Completed
        } else {
            TrackerStatus::Error
        };
        self.ended = Some(ended);
        self.elapsed_ms = Some((ended - self.started).num_milliseconds().max(0) as u64);
        self.n_results = response.n_results;
        self.response_id = response.response_id;
        self.message_code = Some(response.status().to_string());
        self.code_description = Some(response.description().to_string());
        Ok(())
    }

    pub fn to_yaml(&self) -> String {
        serde_yaml::to_string(self).unwrap_or_default()
    }
}

#[async_trait::async_trait]
pub trait QueryTracker: Send + Sync {
    async fn create(&self, entry: &TrackerEntry) -> Result<(), TrackerError>;

    /// Replace an existing entry.
    async fn update(&self, entry: &TrackerEntry) -> Result<(), TrackerError>;

    async fn get(&self, tracker_id: &str) -> Result<Option<TrackerEntry>, TrackerError>;

    /// All entries, oldest first.
    async fn list(&self) -> Result<Vec<TrackerEntry>, TrackerError>;
}

#[derive(Default)]
pub struct InMemoryTracker {
    entries: DashMap<String, TrackerEntry>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl QueryTracker for InMemoryTracker {
    async fn create(&self, entry: &TrackerEntry) -> Result<(), TrackerError> {
        self.entries.insert(entry.tracker_id.clone(), entry.clone());
        Ok(())
    }

    async fn update(&self, entry: &TrackerEntry) -> Result<(), TrackerError> {
        match self.entries.get_mut(&entry.tracker_id) {
            Some(mut existing) => {
                *existing = entry.clone();
                Ok(())
            }
            None => Err(TrackerError::UnknownEntry(entry.tracker_id.clone())),
        }
    }

    async fn get(&self, tracker_id: &str) -> Result<Option<TrackerEntry>, TrackerError> {
        Ok(self.entries.get(tracker_id).map(|e| e.value().clone()))
    }

    async fn list(&self) -> Result<Vec<TrackerEntry>, TrackerError> {
        let mut entries: Vec<TrackerEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by_key(|e| e.started);
        Ok(entries)
    }
}

/// One `<tracker_id>.yaml` per entry.
pub struct FsTracker {
    dir: PathBuf,
}

impl FsTracker {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self, tracker_id: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", tracker_id))
    }

    async fn write(&self, entry: &TrackerEntry) -> Result<(), TrackerError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let yaml = serde_yaml::to_string(entry)?;
        tokio::fs::write(self.path(&entry.tracker_id), yaml).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl QueryTracker for FsTracker {
    async fn create(&self, entry: &TrackerEntry) -> Result<(), TrackerError> {
        self.write(entry).await
    }

    async fn update(&self, entry: &TrackerEntry) -> Result<(), TrackerError> {
        if !tokio::fs::try_exists(self.path(&entry.tracker_id)).await? {
            return Err(TrackerError::UnknownEntry(entry.tracker_id.clone()));
        }
        self.write(entry).await
    }

    async fn get(&self, tracker_id: &str) -> Result<Option<TrackerEntry>, TrackerError> {
        match tokio::fs::read_to_string(self.path(tracker_id)).await {
            Ok(raw) => Ok(Some(serde_yaml::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> Result<Vec<TrackerEntry>, TrackerError> {
        let mut entries = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        while let Some(file) = dir.next_entry().await? {
            if file.path().extension().is_some_and(|ext| ext == "yaml") {
                let raw = tokio::fs::read_to_string(file.path()).await?;
                entries.push(serde_yaml::from_str::<TrackerEntry>(&raw)?);
            }
        }
        entries.sort_by_key(|e| e.started);
        Ok(entries)
    }
}
