//! Configuration types for exam-paper analysis.
//!
//! Every knob lives in [`AnalyzerConfig`], built via its
//! [`AnalyzerConfigBuilder`]. Collaborator endpoints (OCR service, AI
//! completion service) and the retry/timeout policy around them are all
//! configured here; nothing is read from the environment by the library
//! itself.

use crate::error::ExamlensError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;

/// Default per-file size ceiling in kilobytes.
pub const DEFAULT_MAX_FILE_KB: f64 = 2000.0;

/// Configuration for the analysis pipeline.
///
/// # Example
/// ```rust
/// use examlens::AnalyzerConfig;
///
/// let config = AnalyzerConfig::builder()
///     .ocr_url("http://localhost:8000/ocr")
///     .ai_base_url("https://api.openai.com/v1")
///     .api_key("sk-test")
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// assert_eq!(config.max_retries, 2);
/// ```
#[derive(Clone)]
pub struct AnalyzerConfig {
    /// Full URL of the OCR upload endpoint.
    pub ocr_url: String,

    /// Base URL of the chat-completion API; `/chat/completions` is appended.
    pub ai_base_url: String,

    /// Bearer credential for the completion API.
    pub api_key: String,

    /// Model identifier sent with every completion request.
    pub model: String,

    /// Sampling temperature. Default: 0.3.
    ///
    /// Kept low so repeated analyses of the same paper agree with each other.
    pub temperature: f32,

    /// Completion token ceiling. Default: 2000.
    pub max_tokens: u32,

    /// Hard timeout for one completion attempt, in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Additional completion attempts after the first. Default: 2.
    pub max_retries: u32,

    /// Fixed delay between completion attempts, in milliseconds. Default: 2000.
    pub retry_delay_ms: u64,

    /// Timeout for the single OCR upload, in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Per-file size limit in kilobytes. Default: 2000.
    pub max_file_kb: f64,

    /// Directory for staged uploads. Default: `<temp>/examlens_uploads`.
    pub staging_dir: PathBuf,

    /// Files processed concurrently within one batch. Default: 1 (sequential).
    pub file_concurrency: usize,

    /// Admission limits for concurrent batches.
    pub pool: PoolConfig,

    /// Custom system prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,

    /// Receives per-file progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            ocr_url: String::new(),
            ai_base_url: String::new(),
            api_key: String::new(),
            model: String::new(),
            temperature: 0.3,
            max_tokens: 2000,
            api_timeout_secs: 30,
            max_retries: 2,
            retry_delay_ms: 2000,
            ocr_timeout_secs: 120,
            max_file_kb: DEFAULT_MAX_FILE_KB,
            staging_dir: std::env::temp_dir().join("examlens_uploads"),
            file_concurrency: 1,
            pool: PoolConfig::default(),
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("ocr_url", &self.ocr_url)
            .field("ai_base_url", &self.ai_base_url)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "<redacted>" })
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("ocr_timeout_secs", &self.ocr_timeout_secs)
            .field("max_file_kb", &self.max_file_kb)
            .field("staging_dir", &self.staging_dir)
            .field("file_concurrency", &self.file_concurrency)
            .field("pool", &self.pool)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn AnalysisProgressCallback>"),
            )
            .finish()
    }
}

impl AnalyzerConfig {
    /// Create a new builder for `AnalyzerConfig`.
    pub fn builder() -> AnalyzerConfigBuilder {
        AnalyzerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Endpoint for chat completions derived from `ai_base_url`.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.ai_base_url.trim_end_matches('/'))
    }
}

/// Builder for [`AnalyzerConfig`].
#[derive(Debug)]
pub struct AnalyzerConfigBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerConfigBuilder {
    pub fn ocr_url(mut self, url: impl Into<String>) -> Self {
        self.config.ocr_url = url.into();
        self
    }

    pub fn ai_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.ai_base_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn max_file_kb(mut self, kb: f64) -> Self {
        self.config.max_file_kb = kb;
        self
    }

    pub fn staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.staging_dir = dir.into();
        self
    }

    pub fn file_concurrency(mut self, n: usize) -> Self {
        self.config.file_concurrency = n;
        self
    }

    pub fn pool(mut self, pool: PoolConfig) -> Self {
        self.config.pool = pool;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalyzerConfig, ExamlensError> {
        let c = &self.config;
        if c.ocr_url.trim().is_empty() {
            return Err(ExamlensError::InvalidConfig("OCR URL must be set".into()));
        }
        if c.ai_base_url.trim().is_empty() {
            return Err(ExamlensError::InvalidConfig(
                "AI base URL must be set".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(ExamlensError::InvalidConfig("Model must be set".into()));
        }
        if c.file_concurrency == 0 {
            return Err(ExamlensError::InvalidConfig(
                "File concurrency must be ≥ 1".into(),
            ));
        }
        if !(c.max_file_kb > 0.0) {
            return Err(ExamlensError::InvalidConfig(format!(
                "Size limit must be positive, got {} KB",
                c.max_file_kb
            )));
        }
        c.pool.validate()?;
        Ok(self.config)
    }
}

/// Admission limits for [`crate::pool::WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Baseline worker count. Default: 10.
    pub core_workers: usize,
    /// Batches allowed to run at the same time. Default: 20.
    pub max_workers: usize,
    /// Batches allowed to wait for a worker. Default: 500.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_workers: 10,
            max_workers: 20,
            queue_capacity: 500,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), ExamlensError> {
        if self.max_workers == 0 {
            return Err(ExamlensError::InvalidConfig(
                "Pool max_workers must be ≥ 1".into(),
            ));
        }
        if self.core_workers > self.max_workers {
            return Err(ExamlensError::InvalidConfig(format!(
                "Pool core_workers ({}) exceeds max_workers ({})",
                self.core_workers, self.max_workers
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AnalyzerConfigBuilder {
        AnalyzerConfig::builder()
            .ocr_url("http://ocr.local/extract")
            .ai_base_url("https://ai.local/v1/")
            .api_key("secret-key")
            .model("test-model")
    }

    #[test]
    fn defaults_match_service_policy() {
        let c = base().build().unwrap();
        assert_eq!(c.temperature, 0.3);
        assert_eq!(c.max_tokens, 2000);
        assert_eq!(c.api_timeout_secs, 30);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.retry_delay_ms, 2000);
        assert_eq!(c.max_file_kb, 2000.0);
        assert_eq!(c.file_concurrency, 1);
        assert_eq!(c.pool, PoolConfig::default());
    }

    #[test]
    fn completions_url_strips_trailing_slash() {
        let c = base().build().unwrap();
        assert_eq!(c.completions_url(), "https://ai.local/v1/chat/completions");
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = base().build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-key"), "got: {dbg}");
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn missing_endpoints_are_rejected() {
        assert!(AnalyzerConfig::builder().build().is_err());
        assert!(base().ocr_url("  ").build().is_err());
        assert!(base().model("").build().is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = base().file_concurrency(0).build().unwrap_err();
        assert!(err.to_string().contains("concurrency"));
    }

    #[test]
    fn pool_core_above_max_is_rejected() {
        let pool = PoolConfig {
            core_workers: 30,
            max_workers: 20,
            queue_capacity: 10,
        };
        assert!(base().pool(pool).build().is_err());
    }

    #[test]
    fn temperature_is_clamped() {
        let c = base().temperature(5.0).build().unwrap();
        assert_eq!(c.temperature, 2.0);
    }
}
