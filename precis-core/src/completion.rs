//! Remote text completion.
//!
//! The summarizer only needs one primitive, `complete(prompt, system_prompt,
//! params) -> text`, expressed here as the [`CompletionClient`] trait. The
//! bundled implementation talks to a Replicate-style predictions API: it asks
//! the server to wait for the prediction synchronously and falls back to
//! polling when the prediction outlives that wait.

use crate::config::{CompletionConfig, Credential};
use crate::tokens::estimate_tokens;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors that can occur when calling the completion service
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion service is not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),

    #[error("API error {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Prediction {status}: {message}")]
    PredictionFailed { status: String, message: String },

    #[error("Invalid response from completion service: {0}")]
    InvalidResponse(String),

    #[error("Invalid JSON from completion service: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),
}

/// Sampling parameters sent with every completion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl SamplingParams {
    /// Focused, low-temperature sampling for per-chunk summaries
    pub fn map_stage(max_output_tokens: u32) -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            max_output_tokens,
            presence_penalty: 0.0,
            frequency_penalty: 0.1,
        }
    }

    /// Slightly broader sampling for the final synthesis
    pub fn reduce_stage(max_output_tokens: u32) -> Self {
        Self {
            temperature: 0.4,
            top_p: 0.95,
            max_output_tokens,
            presence_penalty: 0.0,
            frequency_penalty: 0.1,
        }
    }
}

/// Request to send to the completion service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub params: SamplingParams,
}

impl CompletionRequest {
    pub fn new(
        prompt: impl Into<String>,
        system_prompt: impl Into<String>,
        params: SamplingParams,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: system_prompt.into(),
            params,
        }
    }

    /// Estimate input tokens of prompt and system prompt together
    pub fn estimate_input_tokens(&self) -> u32 {
        estimate_tokens(&self.prompt) + estimate_tokens(&self.system_prompt)
    }
}

/// A stateless, reentrant text completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

/// Client for a Replicate-style predictions API
pub struct ReplicateClient {
    http: reqwest::Client,
    api_base: String,
    model: String,
    token: String,
    timeout_secs: u64,
    poll_interval: Duration,
}

impl ReplicateClient {
    /// Create a client; the credential must be configured
    pub fn new(
        api_base: impl Into<String>,
        model: impl Into<String>,
        credential: &Credential,
    ) -> Result<Self, CompletionError> {
        let token = credential.token().ok_or_else(|| {
            CompletionError::NotConfigured(
                "API token is missing or still set to a placeholder".to_string(),
            )
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            api_base: api_base.into(),
            model: model.into(),
            token: token.to_string(),
            timeout_secs: 300,
            poll_interval: Duration::from_secs(1),
        })
    }

    pub fn from_config(
        config: &CompletionConfig,
        credential: &Credential,
    ) -> Result<Self, CompletionError> {
        Ok(Self::new(&config.api_base, &config.model, credential)?
            .with_timeout(config.timeout_secs)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms)))
    }

    /// Set the timeout in seconds (0 = no timeout)
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn predictions_url(&self) -> String {
        format!(
            "{}/models/{}/predictions",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }

    async fn run_prediction(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let response = self
            .http
            .post(self.predictions_url())
            .bearer_auth(&self.token)
            .header("Prefer", "wait")
            .json(&build_input(request))
            .send()
            .await?;
        let mut prediction = read_prediction(response).await?;

        loop {
            match next_step(&prediction)? {
                PredictionStep::Done(text) => return Ok(text),
                PredictionStep::Poll(poll_url) => {
                    debug!(
                        "Prediction {} is {}, polling",
                        prediction.id.as_deref().unwrap_or("?"),
                        prediction.status
                    );
                    tokio::time::sleep(self.poll_interval).await;

                    let response = self.http.get(&poll_url).bearer_auth(&self.token).send().await?;
                    prediction = read_prediction(response).await?;
                }
            }
        }
    }
}

/// What to do with a prediction in its current status
#[derive(Debug, PartialEq)]
enum PredictionStep {
    Done(String),
    Poll(String),
}

fn next_step(prediction: &Prediction) -> Result<PredictionStep, CompletionError> {
    match prediction.status.as_str() {
        "succeeded" => output_text(prediction.output.as_ref()).map(PredictionStep::Done),
        "failed" | "canceled" | "aborted" => {
            let message = prediction
                .error
                .as_ref()
                .map(error_message)
                .unwrap_or_else(|| "no error detail".to_string());
            Err(CompletionError::PredictionFailed {
                status: prediction.status.clone(),
                message,
            })
        }
        status => prediction
            .urls
            .as_ref()
            .and_then(|u| u.get.clone())
            .map(PredictionStep::Poll)
            .ok_or_else(|| {
                CompletionError::InvalidResponse(format!(
                    "prediction is '{}' but has no poll URL",
                    status
                ))
            }),
    }
}

#[async_trait]
impl CompletionClient for ReplicateClient {
    #[instrument(skip(self, request), fields(model = %self.model, prompt_len = request.prompt.len()))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        debug!(
            "Requesting completion: ~{} input tokens, max {} output tokens",
            request.estimate_input_tokens(),
            request.params.max_output_tokens
        );

        if self.timeout_secs == 0 {
            return self.run_prediction(request).await;
        }

        tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.run_prediction(request),
        )
        .await
        .map_err(|_| CompletionError::Timeout(self.timeout_secs))?
    }
}

/// Request body for a prediction
fn build_input(request: &CompletionRequest) -> serde_json::Value {
    let params = &request.params;
    json!({
        "input": {
            "prompt": request.prompt,
            "system_prompt": request.system_prompt,
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_completion_tokens": params.max_output_tokens,
            "presence_penalty": params.presence_penalty,
            "frequency_penalty": params.frequency_penalty,
        }
    })
}

async fn read_prediction(response: reqwest::Response) -> Result<Prediction, CompletionError> {
    let status = response.status().as_u16();
    let body = response.text().await?;

    check_status(status, &body)?;

    let prediction: Prediction = serde_json::from_str(&body)?;
    Ok(prediction)
}

/// Categorize non-success HTTP statuses
fn check_status(status: u16, body: &str) -> Result<(), CompletionError> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(CompletionError::AuthenticationError(body.to_string())),
        429 => Err(CompletionError::RateLimitError(body.to_string())),
        _ => {
            warn!("Completion service returned HTTP {}", status);
            Err(CompletionError::ApiError {
                status,
                body: body.to_string(),
            })
        }
    }
}

/// Language models stream their output as an array of string fragments
fn output_text(output: Option<&serde_json::Value>) -> Result<String, CompletionError> {
    match output {
        Some(serde_json::Value::String(text)) => Ok(text.clone()),
        Some(serde_json::Value::Array(parts)) => Ok(parts
            .iter()
            .filter_map(|p| p.as_str())
            .collect::<Vec<_>>()
            .concat()),
        Some(serde_json::Value::Null) | None => Err(CompletionError::InvalidResponse(
            "prediction succeeded without output".to_string(),
        )),
        Some(other) => Err(CompletionError::InvalidResponse(format!(
            "unexpected output shape: {}",
            other
        ))),
    }
}

fn error_message(error: &serde_json::Value) -> String {
    match error.as_str() {
        Some(message) => message.to_string(),
        None => error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_params() {
        let map = SamplingParams::map_stage(1500);
        assert_eq!(map.temperature, 0.3);
        assert_eq!(map.top_p, 0.9);
        assert_eq!(map.max_output_tokens, 1500);
        assert_eq!(map.presence_penalty, 0.0);
        assert_eq!(map.frequency_penalty, 0.1);

        let reduce = SamplingParams::reduce_stage(3250);
        assert_eq!(reduce.temperature, 0.4);
        assert_eq!(reduce.top_p, 0.95);
        assert_eq!(reduce.max_output_tokens, 3250);
    }

    #[test]
    fn test_build_input() {
        let request = CompletionRequest::new(
            "Summarize this",
            "You are helpful",
            SamplingParams::map_stage(100),
        );
        let body = build_input(&request);

        assert_eq!(body["input"]["prompt"], "Summarize this");
        assert_eq!(body["input"]["system_prompt"], "You are helpful");
        assert_eq!(body["input"]["max_completion_tokens"], 100);
        assert!(body["input"]["top_p"].is_number());
    }

    #[test]
    fn test_estimate_input_tokens() {
        let request = CompletionRequest::new(
            "one two three four five six seven eight nine ten",
            "",
            SamplingParams::map_stage(10),
        );
        assert_eq!(request.estimate_input_tokens(), 13);
    }

    #[test]
    fn test_output_text_joins_fragments() {
        let output = json!(["The ", "quick", " fox"]);
        assert_eq!(output_text(Some(&output)).unwrap(), "The quick fox");

        let output = json!("Plain string");
        assert_eq!(output_text(Some(&output)).unwrap(), "Plain string");

        assert!(matches!(
            output_text(None),
            Err(CompletionError::InvalidResponse(_))
        ));
        assert!(output_text(Some(&json!({"text": "nope"}))).is_err());
    }

    #[test]
    fn test_parse_prediction() {
        let body = r#"{
            "id": "abc123",
            "status": "processing",
            "output": null,
            "urls": {"get": "https://api.replicate.com/v1/predictions/abc123"}
        }"#;
        let prediction: Prediction = serde_json::from_str(body).unwrap();

        assert_eq!(prediction.status, "processing");
        assert_eq!(
            prediction.urls.unwrap().get.as_deref(),
            Some("https://api.replicate.com/v1/predictions/abc123")
        );
    }

    fn prediction(body: serde_json::Value) -> Prediction {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_next_step_for_each_status() {
        let done = prediction(json!({"status": "succeeded", "output": ["Hi", " there"]}));
        assert_eq!(
            next_step(&done).unwrap(),
            PredictionStep::Done("Hi there".to_string())
        );

        let running = prediction(json!({
            "status": "processing",
            "urls": {"get": "https://api.replicate.com/v1/predictions/p1"}
        }));
        assert_eq!(
            next_step(&running).unwrap(),
            PredictionStep::Poll("https://api.replicate.com/v1/predictions/p1".to_string())
        );

        for status in ["failed", "canceled", "aborted"] {
            let ended = prediction(json!({"status": status, "error": "CUDA out of memory"}));
            match next_step(&ended) {
                Err(CompletionError::PredictionFailed { status: s, message }) => {
                    assert_eq!(s, status);
                    assert_eq!(message, "CUDA out of memory");
                }
                other => panic!("unexpected step for {}: {:?}", status, other),
            }
        }
    }

    #[test]
    fn test_next_step_edge_cases() {
        let no_detail = prediction(json!({"status": "failed"}));
        assert!(matches!(
            next_step(&no_detail),
            Err(CompletionError::PredictionFailed { message, .. }) if message == "no error detail"
        ));

        let structured = prediction(json!({"status": "failed", "error": {"code": 7}}));
        assert!(matches!(
            next_step(&structured),
            Err(CompletionError::PredictionFailed { message, .. }) if message == r#"{"code":7}"#
        ));

        let stranded = prediction(json!({"status": "starting", "urls": {}}));
        assert!(matches!(
            next_step(&stranded),
            Err(CompletionError::InvalidResponse(_))
        ));

        let empty = prediction(json!({"status": "succeeded", "output": null}));
        assert!(matches!(
            next_step(&empty),
            Err(CompletionError::InvalidResponse(_))
        ));
    }

    /// Serve canned JSON responses, one per connection, recording request heads
    async fn serve_predictions(
        listener: tokio::net::TcpListener,
        bodies: Vec<String>,
    ) -> Vec<String> {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let mut heads = Vec::new();
        for body in bodies {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut buf = Vec::new();
            let mut read = [0u8; 4096];
            let head = loop {
                let n = stream.read(&mut read).await.unwrap();
                assert!(n > 0, "connection closed before a full request");
                buf.extend_from_slice(&read[..n]);
                let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let length = head
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break head;
                }
            };
            heads.push(head);

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        }
        heads
    }

    fn local_client(base: &str) -> ReplicateClient {
        ReplicateClient {
            http: reqwest::Client::builder().no_proxy().build().unwrap(),
            api_base: base.to_string(),
            model: "openai/gpt-4.1-nano".to_string(),
            token: "r8_test".to_string(),
            timeout_secs: 5,
            poll_interval: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_prediction_is_polled_until_it_succeeds() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let poll_url = format!("{}/predictions/p1", base);

        let bodies = vec![
            json!({"id": "p1", "status": "starting", "urls": {"get": poll_url}}).to_string(),
            json!({"id": "p1", "status": "processing", "urls": {"get": poll_url}}).to_string(),
            json!({"id": "p1", "status": "succeeded", "output": ["Short ", "summary."]})
                .to_string(),
        ];
        let server = tokio::spawn(serve_predictions(listener, bodies));

        let request = CompletionRequest::new("text", "system", SamplingParams::map_stage(50));
        let text = local_client(&base).complete(&request).await.unwrap();
        assert_eq!(text, "Short summary.");

        let heads = server.await.unwrap();
        assert_eq!(heads.len(), 3);
        assert!(heads[0].starts_with("POST /models/openai/gpt-4.1-nano/predictions "));
        assert!(heads[0].to_lowercase().contains("prefer: wait"));
        assert!(heads[0].to_lowercase().contains("authorization: bearer r8_test"));
        assert!(heads[1].starts_with("GET /predictions/p1 "));
        assert!(heads[2].starts_with("GET /predictions/p1 "));
    }

    #[tokio::test]
    async fn test_failed_prediction_after_poll_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let poll_url = format!("{}/predictions/p2", base);

        let bodies = vec![
            json!({"id": "p2", "status": "processing", "urls": {"get": poll_url}}).to_string(),
            json!({"id": "p2", "status": "canceled", "error": "stopped by user"}).to_string(),
        ];
        let server = tokio::spawn(serve_predictions(listener, bodies));

        let request = CompletionRequest::new("text", "system", SamplingParams::map_stage(50));
        let err = local_client(&base).complete(&request).await.unwrap_err();
        assert!(matches!(
            err,
            CompletionError::PredictionFailed { ref status, .. } if status == "canceled"
        ));
        assert_eq!(server.await.unwrap().len(), 2);
    }

    #[test]
    fn test_check_status() {
        assert!(check_status(201, "").is_ok());
        assert!(matches!(
            check_status(401, "bad token"),
            Err(CompletionError::AuthenticationError(_))
        ));
        assert!(matches!(
            check_status(429, "slow down"),
            Err(CompletionError::RateLimitError(_))
        ));
        assert!(matches!(
            check_status(500, "oops"),
            Err(CompletionError::ApiError { status: 500, .. })
        ));
    }

    #[test]
    fn test_client_requires_configured_credential() {
        let placeholder = Credential::from("YOUR_HARDCODED_REPLICATE_API_TOKEN_HERE");
        let result = ReplicateClient::new(
            "https://api.replicate.com/v1",
            "openai/gpt-4.1-nano",
            &placeholder,
        );
        assert!(matches!(result, Err(CompletionError::NotConfigured(_))));

        let client = ReplicateClient::new(
            "https://api.replicate.com/v1/",
            "openai/gpt-4.1-nano",
            &Credential::from("r8_test"),
        )
        .unwrap();
        assert_eq!(
            client.predictions_url(),
            "https://api.replicate.com/v1/models/openai/gpt-4.1-nano/predictions"
        );
    }
}
