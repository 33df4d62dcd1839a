//! # examlens
//!
//! Analyse exam-paper PDFs against a syllabus and report which topics the
//! paper examines, how many marks each topic carries, and which subtopics
//! were asked.
//!
//! ## Pipeline Overview
//!
//! ```text
//! BatchRequest (PDFs + syllabus)
//!  │
//!  ├─ 1. Validate  PDF content type, non-empty, ≤ 2000 KB
//!  ├─ 2. Stage     write to a unique temp file (removed on every path)
//!  ├─ 3. OCR       multipart upload → {"text": …}
//!  ├─ 4. AI        chat completion with timeout + bounded retry
//!  ├─ 5. Repair    strip fences, fix commas/braces, strict parse
//!  └─ 6. Outcome   one FileOutcome per upload, in upload order
//! ```
//!
//! A file that fails any step gets a failure outcome; its siblings are
//! unaffected. An AI failure is not a file failure: the outcome is still a
//! success with an empty analysis and an `analysis_error` explaining why.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use examlens::{AnalyzerConfig, BatchRequest, FilePipeline, TopicDetails, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AnalyzerConfig::builder()
//!         .ocr_url("http://localhost:8000/ocr")
//!         .ai_base_url("https://api.openai.com/v1")
//!         .api_key(std::env::var("OPENAI_API_KEY")?)
//!         .model("gpt-4.1-mini")
//!         .build()?;
//!     let pipeline = FilePipeline::from_config(config)?;
//!
//!     let request = BatchRequest::new(
//!         vec![UploadedFile::pdf("midterm.pdf", std::fs::read("midterm.pdf")?)],
//!         vec![TopicDetails::new("Algebra", vec!["Linear Equations".into()])],
//!     );
//!     for outcome in pipeline.handle(request).await? {
//!         println!("{}", serde_json::to_string_pretty(&outcome)?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `examlens` CLI binary |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! examlens = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod pool;
pub mod process;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{AnalyzerConfig, AnalyzerConfigBuilder, PoolConfig};
pub use error::{AnalysisError, CompletionError, ExamlensError, FileError};
pub use model::{AnalysisResult, BatchRequest, SyllabusEnvelope, TopicDetails, UploadedFile};
pub use output::FileOutcome;
pub use pipeline::llm::{AiClient, Analysis, CompletionBackend, HttpCompletionBackend, RetryPolicy};
pub use pipeline::ocr::{HttpOcrClient, OcrClient};
pub use pool::WorkerPool;
pub use process::FilePipeline;
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
