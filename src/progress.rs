//! Progress-callback trait for per-file analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalyzerConfigBuilder::progress_callback`] to receive
//! events as the pipeline works through each uploaded file.
//!
//! The trait is `Send + Sync` because files may be processed concurrently
//! when `file_concurrency > 1`.
//!
//! # Example
//!
//! ```rust
//! use examlens::{AnalysisProgressCallback, AnalyzerConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, index: usize, total: usize, topics: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("File {}/{} done ({} topics)", index + 1, total, topics);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = AnalyzerConfig::builder()
//!     .ocr_url("http://localhost:8000/ocr")
//!     .ai_base_url("http://localhost:11434/v1")
//!     .model("llama3")
//!     .progress_callback(counter as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch orchestrator as it processes each file.
///
/// All methods default to no-ops so callers only override what they need.
/// `index` is 0-based and matches the file's position in the request.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once before the first file is validated.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called before a file enters validation.
    fn on_file_start(&self, index: usize, total_files: usize, file_name: &str) {
        let _ = (index, total_files, file_name);
    }

    /// Called when a file produced a success outcome.
    ///
    /// `topics` is the number of analysis records (may be 0).
    fn on_file_complete(&self, index: usize, total_files: usize, topics: usize) {
        let _ = (index, total_files, topics);
    }

    /// Called when a file produced a failure outcome.
    fn on_file_error(&self, index: usize, total_files: usize, error: &str) {
        let _ = (index, total_files, error);
    }

    /// Called once after every file has an outcome.
    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let _ = (total_files, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalyzerConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;
