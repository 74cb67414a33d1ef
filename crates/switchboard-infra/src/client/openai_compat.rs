//! OpenAI-compatible HTTP client.
//!
//! One [`OpenAiCompatClient`] serves any vendor exposing the OpenAI
//! `/chat/completions` and `/embeddings` endpoints (OpenAI, Groq, Gemini's
//! compatibility endpoint, Mistral, local servers). The vendor is selected by
//! `base_url`; the model comes from the provider's task-type mapping.
//!
//! Payload conventions for the opaque task payload:
//! - chat: `messages` (passed through) or `prompt` (wrapped as one user
//!   message), plus optional `max_tokens` and `temperature`
//! - embedding: `input` or `prompt`

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use switchboard_core::client::provider::{InvokeRequest, ProviderClient};
use switchboard_types::dispatch::ProviderReply;
use switchboard_types::error::{ProviderError, ProviderErrorKind};
use switchboard_types::provider::ProviderSpec;
use switchboard_types::task::TaskType;

/// Base URL used when a provider entry does not set one.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for one OpenAI-compatible provider.
///
/// # API Key Security
///
/// The key is held as a [`SecretString`] and only exposed when building the
/// `Authorization` header. The type does not derive `Debug`.
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    provider_name: String,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OpenAiCompatClient {
    pub fn new(
        provider_name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            provider_name: provider_name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Build a client from a provider entry, reading the API key from the
    /// environment variable named by `api_key_env`.
    pub fn from_spec(spec: &ProviderSpec) -> Result<Self, reqwest::Error> {
        let api_key = spec.api_key_env.as_deref().and_then(|var| {
            match std::env::var(var) {
                Ok(value) if !value.is_empty() => Some(SecretString::from(value)),
                _ => {
                    tracing::warn!(
                        provider = %spec.name,
                        env = var,
                        "API key environment variable is not set"
                    );
                    None
                }
            }
        });
        let base_url = spec.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self::new(&spec.name, base_url, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, task_type: &TaskType) -> String {
        let path = match task_type {
            TaskType::Embedding => "/embeddings",
            _ => "/chat/completions",
        };
        format!("{}{}", self.base_url, path)
    }
}

impl ProviderClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn invoke(&self, request: &InvokeRequest) -> Result<ProviderReply, ProviderError> {
        let body = request_body(request)?;

        let mut builder = self
            .client
            .post(self.url(&request.task_type))
            .timeout(request.timeout)
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let error_body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), retry_after, &error_body));
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                transport_error(e)
            } else {
                ProviderError::new(
                    ProviderErrorKind::InvalidResponse,
                    format!("failed to parse response: {e}"),
                )
            }
        })?;

        parse_reply(&request.task_type, body)
    }
}

/// Translate the opaque task payload into an OpenAI request body.
fn request_body(request: &InvokeRequest) -> Result<Value, ProviderError> {
    let payload = &request.payload;

    if request.task_type == TaskType::Embedding {
        let input = payload
            .get("input")
            .or_else(|| payload.get("prompt"))
            .ok_or_else(|| missing_field("input"))?;
        return Ok(json!({ "model": request.model, "input": input }));
    }

    let messages = match (payload.get("messages"), payload.get("prompt")) {
        (Some(messages), _) => messages.clone(),
        (None, Some(Value::String(prompt))) => json!([{ "role": "user", "content": prompt }]),
        _ => return Err(missing_field("messages")),
    };

    let mut body = json!({ "model": request.model, "messages": messages });
    for key in ["max_tokens", "temperature"] {
        if let Some(value) = payload.get(key) {
            body[key] = value.clone();
        }
    }
    Ok(body)
}

fn missing_field(field: &str) -> ProviderError {
    ProviderError::new(
        ProviderErrorKind::MalformedRequest,
        format!("payload has no `{field}`"),
    )
}

/// Normalize a successful response body.
///
/// Chat replies become `{text, finish_reason, model}`; embedding replies
/// become `{embeddings, model}`. Token usage is `usage.total_tokens`, or 0 if
/// the vendor omits it.
fn parse_reply(task_type: &TaskType, body: Value) -> Result<ProviderReply, ProviderError> {
    let tokens_consumed = body
        .pointer("/usage/total_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let model = body.get("model").cloned().unwrap_or(Value::Null);

    let content = if *task_type == TaskType::Embedding {
        let data = body
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid_response("missing `data` array"))?;
        let embeddings: Vec<Value> = data
            .iter()
            .filter_map(|item| item.get("embedding").cloned())
            .collect();
        json!({ "embeddings": embeddings, "model": model })
    } else {
        let choice = body
            .pointer("/choices/0")
            .ok_or_else(|| invalid_response("response has no choices"))?;
        let text = choice
            .pointer("/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        json!({
            "text": text,
            "finish_reason": choice.get("finish_reason").cloned().unwrap_or(Value::Null),
            "model": model,
        })
    };

    Ok(ProviderReply {
        tokens_consumed,
        content,
    })
}

fn invalid_response(message: &str) -> ProviderError {
    ProviderError::new(ProviderErrorKind::InvalidResponse, message)
}

/// Map a non-success HTTP status to a provider error.
fn status_error(status: u16, retry_after_ms: Option<u64>, body: &str) -> ProviderError {
    let kind = match status {
        429 => ProviderErrorKind::RateLimited,
        400 | 422 => ProviderErrorKind::MalformedRequest,
        401 => ProviderErrorKind::Unauthorized,
        403 => ProviderErrorKind::Forbidden,
        404 => ProviderErrorKind::NotFound,
        408 => ProviderErrorKind::Timeout,
        s if s >= 500 => ProviderErrorKind::Server,
        _ => ProviderErrorKind::InvalidResponse,
    };
    let error = ProviderError::new(kind, format!("HTTP {status}: {}", truncate(body, 512)));
    if kind == ProviderErrorKind::RateLimited {
        error.with_retry_after(retry_after_ms)
    } else {
        error
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    let kind = if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else {
        ProviderErrorKind::Connection
    };
    ProviderError::new(kind, format!("HTTP request failed: {e}"))
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().map(|secs| secs * 1000)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoke(task_type: TaskType, payload: Value) -> InvokeRequest {
        InvokeRequest {
            model: "llama-3.3-70b-versatile".to_string(),
            task_type,
            payload,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (429, ProviderErrorKind::RateLimited),
            (500, ProviderErrorKind::Server),
            (503, ProviderErrorKind::Server),
            (400, ProviderErrorKind::MalformedRequest),
            (422, ProviderErrorKind::MalformedRequest),
            (401, ProviderErrorKind::Unauthorized),
            (403, ProviderErrorKind::Forbidden),
            (404, ProviderErrorKind::NotFound),
            (408, ProviderErrorKind::Timeout),
        ];
        for (status, kind) in cases {
            assert_eq!(status_error(status, None, "").kind, kind, "status {status}");
        }
    }

    #[test]
    fn rate_limit_keeps_retry_after() {
        let err = status_error(429, parse_retry_after("7"), "slow down");
        assert_eq!(err.retry_after_ms, Some(7000));
        assert!(err.message.contains("slow down"));

        // Only rate limits carry a hint.
        assert_eq!(status_error(503, Some(1000), "").retry_after_ms, None);
    }

    #[test]
    fn retry_after_ignores_http_dates() {
        assert_eq!(parse_retry_after(" 2 "), Some(2000));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2026 07:28:00 GMT"), None);
    }

    #[test]
    fn prompt_is_wrapped_as_user_message() {
        let body = request_body(&invoke(
            TaskType::Synthesis,
            json!({ "prompt": "Summarize.", "max_tokens": 256 }),
        ))
        .unwrap();
        assert_eq!(body["model"], "llama-3.3-70b-versatile");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Summarize.");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn messages_pass_through() {
        let messages = json!([
            { "role": "system", "content": "Be brief." },
            { "role": "user", "content": "Hi" }
        ]);
        let body = request_body(&invoke(
            TaskType::Default,
            json!({ "messages": messages.clone() }),
        ))
        .unwrap();
        assert_eq!(body["messages"], messages);
    }

    #[test]
    fn embedding_uses_input() {
        let body = request_body(&invoke(TaskType::Embedding, json!({ "prompt": ["a", "b"] })))
            .unwrap();
        assert_eq!(body["input"], json!(["a", "b"]));
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn empty_payload_is_malformed() {
        let err = request_body(&invoke(TaskType::Default, json!({}))).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::MalformedRequest);
    }

    #[test]
    fn chat_reply_reads_usage_and_text() {
        let reply = parse_reply(
            &TaskType::Default,
            json!({
                "model": "llama-3.3-70b-versatile",
                "choices": [{ "message": { "role": "assistant", "content": "Hello" }, "finish_reason": "stop" }],
                "usage": { "prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12 }
            }),
        )
        .unwrap();
        assert_eq!(reply.tokens_consumed, 12);
        assert_eq!(reply.content["text"], "Hello");
        assert_eq!(reply.content["finish_reason"], "stop");
    }

    #[test]
    fn embedding_reply_collects_vectors() {
        let reply = parse_reply(
            &TaskType::Embedding,
            json!({
                "data": [{ "embedding": [0.1, 0.2] }, { "embedding": [0.3, 0.4] }],
                "usage": { "total_tokens": 4 }
            }),
        )
        .unwrap();
        assert_eq!(reply.tokens_consumed, 4);
        assert_eq!(reply.content["embeddings"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn reply_without_choices_is_invalid() {
        let err = parse_reply(&TaskType::Default, json!({ "error": "?" })).unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::InvalidResponse);
    }

    #[tokio::test]
    async fn unreachable_host_is_a_connection_error() {
        let client = OpenAiCompatClient::new("local", "http://127.0.0.1:9", None).unwrap();
        let err = client
            .invoke(&invoke(TaskType::Default, json!({ "prompt": "hi" })))
            .await
            .unwrap_err();
        assert!(matches!(
            err.kind,
            ProviderErrorKind::Connection | ProviderErrorKind::Timeout
        ));
    }

    #[test]
    fn from_spec_defaults_base_url() {
        let spec: ProviderSpec = toml::from_str(
            r#"
name = "openai"
priority = 1
[budget]
daily_token_limit = 1000
monthly_token_limit = 10000
requests_per_minute_limit = 10
[models]
default = "gpt-4o-mini"
"#,
        )
        .unwrap();
        let client = OpenAiCompatClient::from_spec(&spec).unwrap();
        assert_eq!(client.name(), "openai");
        assert_eq!(client.base_url(), DEFAULT_BASE_URL);
    }
}
