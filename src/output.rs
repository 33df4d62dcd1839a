//! Per-file outcome returned to callers.

use crate::error::FileError;
use crate::model::AnalysisResult;
use serde::{Deserialize, Serialize};

/// Result for one uploaded file. Exactly one exists per file, in input order.
///
/// Serialised untagged, so consumers see either
/// `{file_name, content_type, size_kb, analysis}` or `{file_name, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileOutcome {
    Success {
        file_name: String,
        content_type: String,
        size_kb: f64,
        analysis: Vec<AnalysisResult>,
        /// Set when the analysis is empty because the AI stage failed,
        /// as opposed to the model finding nothing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        analysis_error: Option<String>,
    },
    Failure {
        file_name: String,
        error: String,
    },
}

impl FileOutcome {
    pub fn failure(file_name: impl Into<String>, error: &FileError) -> Self {
        FileOutcome::Failure {
            file_name: file_name.into(),
            error: error.outcome_message(),
        }
    }

    pub fn file_name(&self) -> &str {
        match self {
            FileOutcome::Success { file_name, .. } | FileOutcome::Failure { file_name, .. } => {
                file_name
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, FileOutcome::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            FileOutcome::Failure { error, .. } => Some(error),
            FileOutcome::Success { .. } => None,
        }
    }

    /// The analysis records; empty for failures.
    pub fn analysis(&self) -> &[AnalysisResult] {
        match self {
            FileOutcome::Success { analysis, .. } => analysis,
            FileOutcome::Failure { .. } => &[],
        }
    }
}
