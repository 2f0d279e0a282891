//! Caller-facing result of processing one document

use super::registry::TaskId;
use crate::models::Source;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Aggregated outcome of `Pipeline::process_document`.
///
/// Serializes with a `status` tag, e.g. `{"status": "duplicate", ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    /// The fingerprint was already registered; nothing else ran
    Duplicate { document_id: i64 },

    ClassificationError { detail: String },

    RegistrationError { detail: String },

    IndexingError { detail: String },

    /// Indexed, but no tasks exist for `Other`
    IndexedOther { document_id: i64, date: NaiveDate },

    Completed {
        document_id: i64,
        source: Source,
        date: NaiveDate,
        /// Task id to normalized result, only for tasks that produced one
        results: BTreeMap<TaskId, Value>,
    },
}

impl ProcessingOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            ProcessingOutcome::Duplicate { .. } => "duplicate",
            ProcessingOutcome::ClassificationError { .. } => "classification_error",
            ProcessingOutcome::RegistrationError { .. } => "registration_error",
            ProcessingOutcome::IndexingError { .. } => "indexing_error",
            ProcessingOutcome::IndexedOther { .. } => "indexed_other",
            ProcessingOutcome::Completed { .. } => "completed",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ProcessingOutcome::ClassificationError { .. }
                | ProcessingOutcome::RegistrationError { .. }
                | ProcessingOutcome::IndexingError { .. }
        )
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            ProcessingOutcome::ClassificationError { detail }
            | ProcessingOutcome::RegistrationError { detail }
            | ProcessingOutcome::IndexingError { detail } => Some(detail),
            _ => None,
        }
    }
}
