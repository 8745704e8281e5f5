//! Saved move definitions ("job files")
//!
//! A job file is a small JSON envelope around a move specification:
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "job_type": "move_emails",
//!   "name": "Move emails from a@example.com[INBOX] to b@example.com[Archive]",
//!   "spec": { "src_email": "a@example.com", "dst_email": "b@example.com", ... }
//! }
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::error::{MoverError, Result};
use crate::request::{EmailAddress, LabelName, TransferRequest, DEFAULT_MAX_MESSAGES};

pub const JOB_FILE_VERSION: &str = "1.0";
pub const MOVE_EMAILS_JOB_TYPE: &str = "move_emails";

/// Settings of a saved move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveJobSpec {
    pub src_email: EmailAddress,
    pub dst_email: EmailAddress,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src_labels: Vec<LabelName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dst_labels: Vec<LabelName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_messages: Option<usize>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub delete_after_move: bool,
}

impl MoveJobSpec {
    pub fn from_request(request: &TransferRequest) -> Self {
        Self {
            src_email: request.src_account.clone(),
            dst_email: request.dst_account.clone(),
            src_labels: request.src_labels.clone(),
            dst_labels: request.dst_labels.clone(),
            search_query: request.search_query.clone(),
            before: request.before,
            after: request.after,
            max_messages: Some(request.max_messages),
            dry_run: request.dry_run,
            delete_after_move: request.delete_after_move,
        }
    }

    /// Human readable summary, e.g. `Move emails from a@x[INBOX] to b@y[Archive]`
    pub fn name(&self) -> String {
        fn bracketed(labels: &[LabelName]) -> String {
            if labels.is_empty() {
                return String::new();
            }
            let names: Vec<&str> = labels.iter().map(LabelName::as_str).collect();
            format!("[{}]", names.join(","))
        }

        format!(
            "Move emails from {}{} to {}{}",
            self.src_email,
            bracketed(&self.src_labels),
            self.dst_email,
            bracketed(&self.dst_labels)
        )
    }

    /// Build the request this job describes. Source labels default to INBOX.
    pub fn to_request(&self) -> TransferRequest {
        let mut request = TransferRequest::new(self.src_email.clone(), self.dst_email.clone());
        request.src_labels = if self.src_labels.is_empty() {
            vec![LabelName::inbox()]
        } else {
            self.src_labels.clone()
        };
        request.dst_labels = self.dst_labels.clone();
        request.search_query = self.search_query.clone();
        request.before = self.before;
        request.after = self.after;
        request.max_messages = match self.max_messages {
            Some(0) | None => DEFAULT_MAX_MESSAGES,
            Some(n) => n,
        };
        request.dry_run = self.dry_run;
        request.delete_after_move = self.delete_after_move;
        request.from_job_file = true;
        request
    }
}

/// On-disk envelope, with the spec left unparsed until the type is known
#[derive(Debug, Deserialize)]
struct JobEnvelope {
    #[serde(default)]
    version: String,
    #[serde(default)]
    job_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    spec: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub version: String,
    pub job_type: String,
    pub name: String,
    pub spec: MoveJobSpec,
}

impl Job {
    pub fn new(spec: MoveJobSpec) -> Self {
        Self {
            version: JOB_FILE_VERSION.to_string(),
            job_type: MOVE_EMAILS_JOB_TYPE.to_string(),
            name: spec.name(),
            spec,
        }
    }

    /// Load and validate a job file
    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            MoverError::JobError(format!("Failed to read job file {}: {}", path.display(), e))
        })?;

        let envelope: JobEnvelope = serde_json::from_str(&content)
            .map_err(|e| MoverError::JobError(format!("Failed to parse job file: {}", e)))?;

        if envelope.version.trim().is_empty() {
            return Err(MoverError::JobError("job version is required".to_string()));
        }
        if envelope.job_type.trim().is_empty() {
            return Err(MoverError::JobError("job_type is required".to_string()));
        }
        if envelope.job_type != MOVE_EMAILS_JOB_TYPE {
            return Err(MoverError::JobError(format!(
                "unknown job type: {}",
                envelope.job_type
            )));
        }

        let spec: MoveJobSpec = serde_json::from_value(envelope.spec)
            .map_err(|e| MoverError::JobError(format!("Invalid job spec: {}", e)))?;

        tracing::debug!("Loaded job '{}' from {}", envelope.name, path.display());
        Ok(Self {
            version: envelope.version,
            job_type: envelope.job_type,
            name: envelope.name,
            spec,
        })
    }

    /// Write the job to `path`, refusing to replace an existing file
    pub async fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    MoverError::JobError(format!("file already exists: {}", path.display()))
                }
                _ => MoverError::JobError(format!(
                    "Failed to create job file {}: {}",
                    path.display(),
                    e
                )),
            })?;

        file.write_all(content.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;

        tracing::info!("Saved job to {}", path.display());
        Ok(())
    }
}
