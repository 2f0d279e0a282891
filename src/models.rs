//! Core domain types shared by the pipeline, the stores and the CLI.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

/// Publisher of a report. Closed set; anything unrecognised is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Mysteel,
    FastMarkets,
    Platts,
    Baltic,
    Other,
}

impl Source {
    pub const ALL: [Source; 5] = [
        Source::Mysteel,
        Source::FastMarkets,
        Source::Platts,
        Source::Baltic,
        Source::Other,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Source::Mysteel => "Mysteel",
            Source::FastMarkets => "FastMarkets",
            Source::Platts => "Platts",
            Source::Baltic => "Baltic",
            Source::Other => "Other",
        }
    }

    /// Name of the semantic-index collection holding this source's chunks
    pub fn collection_name(&self) -> String {
        format!("source_{}", self.label().to_lowercase())
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Source {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Source::ALL
            .into_iter()
            .find(|source| source.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::UnknownSource(s.to_string()))
    }
}

/// Result of classifying a document's first page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub source: Source,
    pub date: NaiveDate,
}

/// Audit status for stage events and task logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Error,
    SuccessNoData,
    Skipped,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Error => "ERROR",
            Status::SuccessNoData => "SUCCESS_NO_DATA",
            Status::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage named in a processing event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classify,
    Register,
    Backup,
    Index,
    Dispatch,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Register => "register",
            Stage::Backup => "backup",
            Stage::Index => "index",
            Stage::Dispatch => "dispatch",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only audit record for one pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingEvent {
    /// `None` only for failures that happen before registration
    pub document_id: Option<i64>,
    pub fingerprint: String,
    pub stage: Stage,
    pub status: Status,
    pub duration_ms: i64,
    pub details: Option<Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ProcessingEvent {
    pub fn new(stage: Stage, status: Status, fingerprint: &str, started: Instant) -> Self {
        Self {
            document_id: None,
            fingerprint: fingerprint.to_string(),
            stage,
            status,
            duration_ms: started.elapsed().as_millis() as i64,
            details: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_document(mut self, document_id: i64) -> Self {
        self.document_id = Some(document_id);
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// Append-only audit record for one task run against one document
#[derive(Debug, Clone, Serialize)]
pub struct TaskLog {
    pub document_id: i64,
    pub task: String,
    pub status: Status,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items_found: i64,
    pub error_message: Option<String>,
}
