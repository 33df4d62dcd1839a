//! OCR client: upload a staged PDF and get its text back.
//!
//! The OCR service is an opaque collaborator reached by one multipart POST.
//! There is no retry here: a failed upload fails the file immediately and
//! the pipeline moves on to the next one.

use crate::config::AnalyzerConfig;
use crate::error::{ExamlensError, FileError};
use crate::pipeline::stage::StagedDocument;
use crate::pipeline::validate::PDF_CONTENT_TYPE;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Extracts text from a staged document.
///
/// Implementations must treat a reply without text as a failure, never as
/// an empty-text success.
#[async_trait]
pub trait OcrClient: Send + Sync {
    async fn extract_text(&self, document: &StagedDocument) -> Result<String, FileError>;
}

/// [`OcrClient`] that posts the document as the `file` part of a multipart form.
#[derive(Debug, Clone)]
pub struct HttpOcrClient {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl HttpOcrClient {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Result<Self, ExamlensError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExamlensError::Internal(format!("Failed to build OCR client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            timeout_secs,
        })
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, ExamlensError> {
        Self::new(config.ocr_url.clone(), config.ocr_timeout_secs)
    }
}

#[async_trait]
impl OcrClient for HttpOcrClient {
    async fn extract_text(&self, document: &StagedDocument) -> Result<String, FileError> {
        let bytes = tokio::fs::read(document.path())
            .await
            .map_err(|e| FileError::Ocr(format!("could not read staged file: {e}")))?;

        info!(
            "Sending '{}' ({} bytes) to OCR at {}",
            document.file_name(),
            bytes.len(),
            self.url
        );

        let part = Part::bytes(bytes)
            .file_name(document.file_name().to_string())
            .mime_str(PDF_CONTENT_TYPE)
            .map_err(|e| FileError::Ocr(format!("could not build upload: {e}")))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FileError::Ocr(format!("OCR service timed out after {}s", self.timeout_secs))
                } else {
                    FileError::Ocr(format!("OCR service unreachable: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FileError::Ocr(format!("failed to read OCR response: {e}")))?;

        if !status.is_success() {
            return Err(FileError::Ocr(format!("OCR service returned HTTP {status}: {body}")));
        }

        let text = parse_ocr_body(&body)?;
        debug!("OCR returned {} characters for '{}'", text.len(), document.file_name());
        Ok(text)
    }
}

/// Pull the `text` field out of an OCR response body.
pub fn parse_ocr_body(body: &str) -> Result<String, FileError> {
    if body.trim().is_empty() {
        return Err(FileError::Ocr("OCR returned an empty response".into()));
    }

    let value: Value = serde_json::from_str(body)
        .map_err(|e| FileError::Ocr(format!("OCR response is not JSON: {e}")))?;

    match value.get("text") {
        None | Some(Value::Null) => Err(FileError::Ocr(
            "OCR failed or returned empty text".into(),
        )),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
        Some(_) => Err(FileError::Ocr(
            "OCR response field 'text' is not a string".into(),
        )),
    }
}
