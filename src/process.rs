//! Per-file pipeline and batch orchestration.
//!
//! [`FilePipeline::process`] runs one upload through
//! validate → stage → OCR → analyse and always produces a [`FileOutcome`].
//! [`FilePipeline::handle`] checks the batch preconditions and then runs
//! `process` once per file, keeping the outcomes in input order.

use crate::config::AnalyzerConfig;
use crate::error::{ExamlensError, FileError};
use crate::model::{BatchRequest, TopicDetails, UploadedFile};
use crate::output::FileOutcome;
use crate::pipeline::llm::AiClient;
use crate::pipeline::ocr::{HttpOcrClient, OcrClient};
use crate::pipeline::stage::stage_document;
use crate::pipeline::validate::{validate_pdf, PDF_CONTENT_TYPE};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Analyses uploaded exam papers against a syllabus.
///
/// Holds no per-request state, so one instance can serve many batches
/// concurrently.
#[derive(Clone)]
pub struct FilePipeline {
    config: AnalyzerConfig,
    ocr: Arc<dyn OcrClient>,
    ai: AiClient,
}

impl std::fmt::Debug for FilePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FilePipeline {
    pub fn new(config: AnalyzerConfig, ocr: Arc<dyn OcrClient>, ai: AiClient) -> Self {
        Self { config, ocr, ai }
    }

    /// Build a pipeline with HTTP clients for both collaborators.
    pub fn from_config(config: AnalyzerConfig) -> Result<Self, ExamlensError> {
        let ocr = HttpOcrClient::from_config(&config)?;
        let ai = AiClient::from_config(&config)?;
        Ok(Self::new(config, Arc::new(ocr), ai))
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Run one file through the pipeline.
    ///
    /// Never fails: validation, staging and OCR errors become a failure
    /// outcome, and a panic anywhere inside is reported as an unexpected
    /// error for this file only. The staged copy is gone by the time this
    /// returns, or by the time the future is dropped if it is cancelled.
    pub async fn process(&self, file: &UploadedFile, syllabus: &[TopicDetails]) -> FileOutcome {
        let start = Instant::now();
        match AssertUnwindSafe(self.run(file, syllabus)).catch_unwind().await {
            Ok(Ok(outcome)) => {
                info!(
                    "Processed '{}' in {}ms ({} topics)",
                    file.file_name,
                    start.elapsed().as_millis(),
                    outcome.analysis().len()
                );
                outcome
            }
            Ok(Err(e)) => {
                warn!("Failed to process '{}': {}", file.file_name, e);
                FileOutcome::failure(&file.file_name, &e)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("Panic while processing '{}': {}", file.file_name, detail);
                FileOutcome::failure(&file.file_name, &FileError::Unexpected(detail))
            }
        }
    }

    async fn run(
        &self,
        file: &UploadedFile,
        syllabus: &[TopicDetails],
    ) -> Result<FileOutcome, FileError> {
        // ── Step 1: Validate ─────────────────────────────────────────────
        let size_kb = validate_pdf(file, self.config.max_file_kb)?;

        // ── Step 2: Stage ────────────────────────────────────────────────
        let staged = stage_document(&self.config.staging_dir, file)?;

        // ── Step 3: OCR ──────────────────────────────────────────────────
        let text = self.ocr.extract_text(&staged).await;
        staged.cleanup();
        let text = text?;
        debug!("OCR text for '{}': {} characters", file.file_name, text.len());

        // ── Step 4: Analyse ──────────────────────────────────────────────
        let analysis = self.ai.analyze(&text, syllabus).await;

        // ── Step 5: Assemble ─────────────────────────────────────────────
        Ok(FileOutcome::Success {
            file_name: file.file_name.clone(),
            content_type: file
                .content_type
                .clone()
                .unwrap_or_else(|| PDF_CONTENT_TYPE.to_string()),
            size_kb,
            analysis: analysis.results,
            analysis_error: analysis.unavailable,
        })
    }

    /// Analyse a batch of uploads.
    ///
    /// # Errors
    /// Returns [`ExamlensError::MissingInput`] before touching any file when
    /// the request has no files or no syllabus. Everything else is reported
    /// per file in the returned list, which has one outcome per upload in
    /// upload order.
    pub async fn handle(&self, request: BatchRequest) -> Result<Vec<FileOutcome>, ExamlensError> {
        let files = match request.files {
            Some(files) if !files.is_empty() => files,
            _ => return Err(ExamlensError::MissingInput("files".into())),
        };
        let syllabus = match request.syllabus {
            Some(syllabus) if !syllabus.is_empty() => syllabus,
            _ => return Err(ExamlensError::MissingInput("syllabus".into())),
        };

        let total = files.len();
        let batch_start = Instant::now();
        info!(
            "Analysing {} files against {} syllabus topics",
            total,
            syllabus.len()
        );

        let callback = self.config.progress_callback.as_deref();
        if let Some(cb) = callback {
            cb.on_batch_start(total);
        }

        let syllabus: &[TopicDetails] = &syllabus;
        let outcomes: Vec<FileOutcome> = stream::iter(files.iter().enumerate())
            .map(move |(index, file)| async move {
                if let Some(cb) = callback {
                    cb.on_file_start(index, total, &file.file_name);
                }
                let outcome = self.process(file, syllabus).await;
                if let Some(cb) = callback {
                    match &outcome {
                        FileOutcome::Success { analysis, .. } => {
                            cb.on_file_complete(index, total, analysis.len())
                        }
                        FileOutcome::Failure { error, .. } => cb.on_file_error(index, total, error),
                    }
                }
                outcome
            })
            .buffered(self.config.file_concurrency)
            .collect()
            .await;

        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        info!(
            "Batch complete: {}/{} files analysed in {}ms",
            success_count,
            total,
            batch_start.elapsed().as_millis()
        );
        if let Some(cb) = callback {
            cb.on_batch_complete(total, success_count);
        }

        Ok(outcomes)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
