//! Error types for the examlens library.
//!
//! Four error types reflect four distinct failure scopes:
//!
//! * [`ExamlensError`] — **Fatal** for a whole batch: the request itself is
//!   malformed (no files, no syllabus), the worker pool is saturated, or the
//!   configuration is invalid. Returned as `Err(ExamlensError)` from
//!   [`crate::process::FilePipeline::handle`].
//!
//! * [`FileError`] — **Non-fatal**: a single uploaded file failed validation,
//!   staging, or OCR. Rendered into a failure
//!   [`crate::output::FileOutcome`] so sibling files are unaffected.
//!
//! * [`AnalysisError`] — the AI stage failed (timeout, bad reply, unparseable
//!   JSON). Never leaves [`crate::pipeline::llm::AiClient::analyze`]; it is
//!   logged and turned into an empty analysis.
//!
//! * [`CompletionError`] — transport-level failure reported by a
//!   [`crate::pipeline::llm::CompletionBackend`]. The retry policy looks at
//!   the variant to decide whether another attempt can help.

use std::path::PathBuf;
use thiserror::Error;

/// Batch-level errors. Only these ever surface as an overall request failure.
#[derive(Debug, Error)]
pub enum ExamlensError {
    /// The request is missing its files or its syllabus.
    #[error("Required field is missing: {0}")]
    MissingInput(String),

    /// The worker pool is saturated and the backlog queue is full.
    #[error(
        "Server is at capacity: {running} batches running and {queued} queued (limit {limit}).\n\
Retry the request later."
    )]
    CapacityExceeded {
        running: usize,
        queued: usize,
        limit: usize,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single uploaded file.
///
/// The [`Display`](std::fmt::Display) text is what callers see in the
/// `error` field of the file's outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FileError {
    /// The upload is empty, not a PDF, or too large.
    #[error("{0}")]
    Validation(String),

    /// Writing the staged copy to disk failed.
    #[error("Failed to save temp PDF '{path}': {detail}")]
    Staging { path: PathBuf, detail: String },

    /// The OCR service was unreachable or answered without text.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// Anything else that went wrong while processing the file.
    #[error("{0}")]
    Unexpected(String),
}

impl FileError {
    /// Message stored in the failure outcome, prefixed by failure class.
    pub fn outcome_message(&self) -> String {
        match self {
            FileError::Unexpected(detail) => format!("Unexpected error: {detail}"),
            other => format!("Processing failed: {other}"),
        }
    }
}

/// Failure of the AI analysis stage.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Every attempt hit the per-request timeout.
    #[error("AI request timed out after {timeout_ms}ms on each of {attempts} attempts")]
    Timeout { timeout_ms: u64, attempts: u32 },

    /// The backend failed and retries were exhausted (or not allowed).
    #[error("AI request failed after {attempts} attempts: {source}")]
    Request {
        attempts: u32,
        #[source]
        source: CompletionError,
    },

    /// The completion envelope had no assistant message, or the message
    /// contained no JSON array.
    #[error("JSON extraction failed: {0}")]
    Extraction(String),

    /// The repaired JSON still did not match the expected schema.
    #[error("JSON parse error: {message}\nJSON was: {json}")]
    Parse { message: String, json: String },

    /// The syllabus could not be serialised into the prompt.
    #[error("Prompt creation failed: {0}")]
    Prompt(String),
}

/// Errors reported by a completion backend for a single attempt.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CompletionError {
    /// HTTP 400: the request itself is malformed. Never retried.
    #[error("AI API rejected the request as malformed (400): {body}")]
    BadRequest { body: String },

    /// Any other non-success status.
    #[error("AI API error ({status}): {body}")]
    Status { status: u16, body: String },

    /// Connection, DNS, TLS or mid-body I/O failure.
    #[error("AI transport error: {0}")]
    Transport(String),
}

impl CompletionError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CompletionError::BadRequest { .. })
    }
}
