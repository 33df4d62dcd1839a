//! AI interaction: build the analysis request, call the completion API, and
//! turn the reply into [`AnalysisResult`]s.
//!
//! Prompt text lives in [`crate::prompts`] and JSON clean-up in
//! [`crate::pipeline::repair`], so this module only owns the request shape
//! and the retry policy.
//!
//! ## Retry Strategy
//!
//! Each attempt gets a hard timeout (30 s by default). A timed-out or failed
//! attempt is retried after a fixed delay (2 s), up to 2 more times. HTTP
//! 400 means the request itself is wrong, so it is never retried. Only the
//! network call is retried: once a body arrives, extraction or parse
//! failures end the analysis.
//!
//! ## Failure boundary
//!
//! [`AiClient::try_analyze`] reports every failure. [`AiClient::analyze`] is
//! the one place where failures are absorbed: it logs the cause and returns
//! an empty [`Analysis`] that records why it is empty.

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, CompletionError, ExamlensError};
use crate::model::{AnalysisResult, TopicDetails};
use crate::pipeline::repair;
use crate::prompts::{build_analysis_prompt, DEFAULT_SYSTEM_PROMPT};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

// ── Wire types ───────────────────────────────────────────────────────────────

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Body of a `POST /chat/completions` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<AssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

// ── Backend seam ─────────────────────────────────────────────────────────────

/// Sends one completion request and returns the raw response body.
///
/// Implementations perform a single attempt; timeouts and retries are
/// applied by [`AiClient`].
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, CompletionError>;
}

/// [`CompletionBackend`] for OpenAI-compatible HTTP endpoints.
#[derive(Clone)]
pub struct HttpCompletionBackend {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl std::fmt::Debug for HttpCompletionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCompletionBackend")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl HttpCompletionBackend {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ExamlensError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExamlensError::Internal(format!("Failed to build AI client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, ExamlensError> {
        info!("Initializing AI connection with URL: {}", config.ai_base_url);
        Self::new(config.completions_url(), config.api_key.clone())
    }
}

#[async_trait]
impl CompletionBackend for HttpCompletionBackend {
    async fn complete(&self, request: &ChatRequest) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        check_status(status, body)
    }
}

/// Map a response status to the body or a classified error.
fn check_status(status: StatusCode, body: String) -> Result<String, CompletionError> {
    if status == StatusCode::BAD_REQUEST {
        error!("AI API rejected request: {}", body);
        return Err(CompletionError::BadRequest { body });
    }
    if !status.is_success() {
        error!("AI API error {}: {}", status, body);
        return Err(CompletionError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

// ── Retry policy ─────────────────────────────────────────────────────────────

/// Timeout and retry settings around a single completion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Hard limit for one attempt.
    pub timeout: Duration,
    /// Attempts after the first.
    pub max_retries: u32,
    /// Fixed wait between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.api_timeout_secs),
            max_retries: config.max_retries,
            delay: Duration::from_millis(config.retry_delay_ms),
        }
    }
}

enum AttemptFailure {
    Timeout,
    Backend(CompletionError),
}

// ── Client ───────────────────────────────────────────────────────────────────

/// Result of [`AiClient::analyze`]: the records, plus the reason when the
/// list is empty because the AI stage failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub results: Vec<AnalysisResult>,
    pub unavailable: Option<String>,
}

impl Analysis {
    pub fn is_available(&self) -> bool {
        self.unavailable.is_none()
    }
}

/// Turns OCR text plus a syllabus into topic-importance records.
#[derive(Clone)]
pub struct AiClient {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    policy: RetryPolicy,
}

impl AiClient {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &AnalyzerConfig) -> Self {
        Self {
            backend,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            policy: RetryPolicy::from_config(config),
        }
    }

    /// Build a client talking HTTP to the configured endpoint.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self, ExamlensError> {
        let backend = HttpCompletionBackend::from_config(config)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    /// Replace the timeout/retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Build the completion request for one paper.
    pub fn build_request(
        &self,
        paper_text: &str,
        syllabus: &[TopicDetails],
    ) -> Result<ChatRequest, AnalysisError> {
        let prompt = build_analysis_prompt(paper_text, syllabus)
            .map_err(|e| AnalysisError::Prompt(e.to_string()))?;
        Ok(ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(prompt),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        })
    }

    /// Analyse a paper, reporting any failure.
    pub async fn try_analyze(
        &self,
        paper_text: &str,
        syllabus: &[TopicDetails],
    ) -> Result<Vec<AnalysisResult>, AnalysisError> {
        debug!("Processing paper with {} topics", syllabus.len());
        let request = self.build_request(paper_text, syllabus)?;
        info!(
            "AI request: model {}, prompt {} characters",
            request.model,
            request.messages.last().map(|m| m.content.len()).unwrap_or(0)
        );

        let raw = self.send_with_retry(&request).await?;
        debug!("Raw AI response: {}", raw);

        let content = extract_message_content(&raw)?;
        debug!("AI generated content: {}", content);

        let results = repair::extract(&content)?;
        info!("Successfully parsed {} analysis records", results.len());
        Ok(results)
    }

    /// Analyse a paper. Never fails: on any error the cause is logged and an
    /// empty, `unavailable` analysis is returned.
    pub async fn analyze(&self, paper_text: &str, syllabus: &[TopicDetails]) -> Analysis {
        match self.try_analyze(paper_text, syllabus).await {
            Ok(results) => Analysis {
                results,
                unavailable: None,
            },
            Err(e) => {
                error!("Returning empty analysis due to error: {}", e);
                Analysis {
                    results: Vec::new(),
                    unavailable: Some(e.to_string()),
                }
            }
        }
    }

    async fn send_with_retry(&self, request: &ChatRequest) -> Result<String, AnalysisError> {
        let start = Instant::now();
        let max_attempts = self.policy.max_retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let call = self.backend.complete(request);
            let failure = match tokio::time::timeout(self.policy.timeout, call).await {
                Ok(Ok(body)) => {
                    debug!("AI attempt {} succeeded after {:?}", attempt, start.elapsed());
                    return Ok(body);
                }
                Ok(Err(e)) if !e.is_retryable() => {
                    warn!("AI attempt {} failed, not retrying: {}", attempt, e);
                    return Err(AnalysisError::Request {
                        attempts: attempt,
                        source: e,
                    });
                }
                Ok(Err(e)) => {
                    warn!("AI attempt {}/{} failed: {}", attempt, max_attempts, e);
                    AttemptFailure::Backend(e)
                }
                Err(_) => {
                    warn!(
                        "AI attempt {}/{} timed out after {:?}",
                        attempt, max_attempts, self.policy.timeout
                    );
                    AttemptFailure::Timeout
                }
            };

            if attempt >= max_attempts {
                return Err(match failure {
                    AttemptFailure::Timeout => AnalysisError::Timeout {
                        timeout_ms: self.policy.timeout.as_millis() as u64,
                        attempts: attempt,
                    },
                    AttemptFailure::Backend(source) => AnalysisError::Request {
                        attempts: attempt,
                        source,
                    },
                });
            }

            sleep(self.policy.delay).await;
        }
    }
}

/// Read `choices[0].message.content` from a completion response body.
pub fn extract_message_content(raw: &str) -> Result<String, AnalysisError> {
    let envelope: CompletionEnvelope = serde_json::from_str(raw)
        .map_err(|e| AnalysisError::Extraction(format!("AI response is not valid JSON: {e}")))?;

    let choice = envelope
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::Extraction("No choices in AI response".into()))?;

    choice
        .message
        .and_then(|m| m.content)
        .map(|c| c.trim().to_string())
        .ok_or_else(|| AnalysisError::Extraction("No message content in AI response".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    enum Step {
        Reply(String),
        Fail(CompletionError),
        Hang,
    }

    struct ScriptedBackend {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, CompletionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Hang);
            match step {
                Step::Reply(body) => Ok(body),
                Step::Fail(e) => Err(e),
                Step::Hang => {
                    sleep(Duration::from_secs(3600)).await;
                    Err(CompletionError::Transport("unreachable".into()))
                }
            }
        }
    }

    fn envelope(content: &str) -> String {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    fn config() -> AnalyzerConfig {
        AnalyzerConfig::builder()
            .ocr_url("http://ocr.local")
            .ai_base_url("http://ai.local/v1")
            .api_key("k")
            .model("test-model")
            .build()
            .unwrap()
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_millis(50),
            max_retries: 2,
            delay: Duration::from_millis(5),
        }
    }

    fn client(backend: Arc<ScriptedBackend>) -> AiClient {
        AiClient::new(backend, &config()).with_retry_policy(fast_policy())
    }

    fn syllabus() -> Vec<TopicDetails> {
        vec![TopicDetails::new("Algebra", vec!["Linear Equations".into()])]
    }

    const ALGEBRA: &str =
        r#"[{"Topic":"Algebra","Total_Marks":10,"Important_Subtopics":["Linear Equations"]}]"#;

    #[test]
    fn build_request_uses_config() {
        let backend = ScriptedBackend::new(vec![]);
        let req = client(backend).build_request("Q1 (5M)", &syllabus()).unwrap();
        assert_eq!(req.model, "test-model");
        assert_eq!(req.temperature, 0.3);
        assert_eq!(req.max_tokens, 2000);
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(req.messages[1].role, "user");
        assert!(req.messages[1].content.contains("Linear Equations"));
        assert!(req.messages[1].content.contains("Q1 (5M)"));
    }

    #[test]
    fn request_serialises_to_chat_shape() {
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.5,
            max_tokens: 10,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({
                "model": "m",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.5,
                "max_tokens": 10
            })
        );
    }

    #[test]
    fn default_policy_matches_service() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::from_config(&config()));
    }

    #[test]
    fn extract_content_variants() {
        assert_eq!(extract_message_content(&envelope("  [] \n")).unwrap(), "[]");
        assert!(matches!(
            extract_message_content(r#"{"choices":[]}"#),
            Err(AnalysisError::Extraction(_))
        ));
        assert!(matches!(
            extract_message_content(r#"{"choices":[{"message":{"role":"assistant"}}]}"#),
            Err(AnalysisError::Extraction(_))
        ));
        assert!(matches!(
            extract_message_content("not json"),
            Err(AnalysisError::Extraction(_))
        ));
    }

    #[test]
    fn check_status_classifies() {
        assert_eq!(check_status(StatusCode::OK, "b".into()).unwrap(), "b");
        assert_eq!(
            check_status(StatusCode::BAD_REQUEST, "bad".into()).unwrap_err(),
            CompletionError::BadRequest { body: "bad".into() }
        );
        assert_eq!(
            check_status(StatusCode::SERVICE_UNAVAILABLE, "busy".into()).unwrap_err(),
            CompletionError::Status {
                status: 503,
                body: "busy".into()
            }
        );
    }

    #[tokio::test]
    async fn analyze_parses_example_reply() {
        let backend = ScriptedBackend::new(vec![Step::Reply(envelope(ALGEBRA))]);
        let analysis = client(backend.clone()).analyze("paper", &syllabus()).await;
        assert!(analysis.is_available());
        assert_eq!(
            analysis.results,
            vec![AnalysisResult {
                topic: "Algebra".into(),
                total_marks: 10,
                important_subtopics: vec!["Linear Equations".into()],
            }]
        );
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn fenced_reply_matches_plain_reply() {
        let plain = ScriptedBackend::new(vec![Step::Reply(envelope(ALGEBRA))]);
        let fenced = ScriptedBackend::new(vec![Step::Reply(envelope(&format!(
            "```json\n{ALGEBRA}\n```"
        )))]);
        let a = client(plain).analyze("paper", &syllabus()).await;
        let b = client(fenced).analyze("paper", &syllabus()).await;
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn three_timeouts_degrade_to_empty() {
        let backend = ScriptedBackend::new(vec![Step::Hang, Step::Hang, Step::Hang]);
        let analysis = client(backend.clone()).analyze("paper", &syllabus()).await;
        assert!(analysis.results.is_empty());
        let reason = analysis.unavailable.expect("reason recorded");
        assert!(reason.contains("timed out"), "got: {reason}");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn bad_request_is_not_retried() {
        let backend = ScriptedBackend::new(vec![
            Step::Fail(CompletionError::BadRequest {
                body: "invalid model".into(),
            }),
            Step::Reply(envelope(ALGEBRA)),
        ]);
        let err = client(backend.clone())
            .try_analyze("paper", &syllabus())
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Request { attempts: 1, .. }), "got: {err:?}");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn transient_error_then_success() {
        let backend = ScriptedBackend::new(vec![
            Step::Fail(CompletionError::Status {
                status: 503,
                body: "overloaded".into(),
            }),
            Step::Reply(envelope(ALGEBRA)),
        ]);
        let results = client(backend.clone())
            .try_analyze("paper", &syllabus())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn timeout_then_success() {
        let backend = ScriptedBackend::new(vec![Step::Hang, Step::Reply(envelope(ALGEBRA))]);
        let analysis = client(backend.clone()).analyze("paper", &syllabus()).await;
        assert_eq!(analysis.results.len(), 1);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn exhausted_transport_errors_report_last_cause() {
        let backend = ScriptedBackend::new(vec![
            Step::Fail(CompletionError::Transport("reset".into())),
            Step::Fail(CompletionError::Transport("reset".into())),
            Step::Fail(CompletionError::Transport("refused".into())),
        ]);
        let err = client(backend.clone())
            .try_analyze("paper", &syllabus())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refused"), "got: {err}");
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn malformed_reply_is_not_retried() {
        let backend = ScriptedBackend::new(vec![
            Step::Reply(envelope("Sorry, I cannot help with that.")),
            Step::Reply(envelope(ALGEBRA)),
        ]);
        let analysis = client(backend.clone()).analyze("paper", &syllabus()).await;
        assert!(analysis.results.is_empty());
        assert!(analysis
            .unavailable
            .as_deref()
            .unwrap_or("")
            .contains("No JSON array"));
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn analyze_from_blocking_context() {
        let backend = ScriptedBackend::new(vec![Step::Reply(envelope(ALGEBRA))]);
        let ai = client(backend);
        let analysis = tokio_test::block_on(ai.analyze("paper", &syllabus()));
        assert_eq!(analysis.results.len(), 1);
    }

    #[tokio::test]
    async fn custom_system_prompt_is_sent() {
        let cfg = AnalyzerConfig::builder()
            .ocr_url("http://ocr.local")
            .ai_base_url("http://ai.local/v1")
            .model("m")
            .system_prompt("Reply in JSON.")
            .build()
            .unwrap();
        let ai = AiClient::new(ScriptedBackend::new(vec![]), &cfg);
        let req = ai.build_request("p", &[]).unwrap();
        assert_eq!(req.messages[0].content, "Reply in JSON.");
    }
}
