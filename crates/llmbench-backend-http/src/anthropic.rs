use llmbench_backend::{ChatBackend, ChatStream, StreamEvent};
use llmbench_common::model::{GenerationParams, TokenUsage};
use llmbench_common::{BenchError, Result};
use serde_json::{json, Value};

use crate::stream::{single_shot, spawn_line_reader, sse_data};
use crate::{check_status, http_error, join_url};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_VERSION: &str = "2023-06-01";
// The Messages API requires max_tokens.
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Clone)]
pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    version: String,
}

impl AnthropicBackend {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            version: DEFAULT_VERSION.to_string(),
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    fn headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("x-api-key", &self.api_key).header("anthropic-version", &self.version)
    }
}

pub(crate) fn request_body(model: &str, prompt: &str, params: &GenerationParams) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        "messages": [{"role": "user", "content": prompt}],
        "stream": params.stream,
    });
    if let Some(system) = &params.system { body["system"] = json!(system); }
    if let Some(t) = params.temperature { body["temperature"] = json!(t); }
    if let Some(p) = params.top_p { body["top_p"] = json!(p); }
    body
}

fn usage_of(u: &Value) -> TokenUsage {
    TokenUsage {
        prompt_tokens: u.get("input_tokens").and_then(Value::as_u64),
        output_tokens: u.get("output_tokens").and_then(Value::as_u64),
    }
}

fn error_of(v: &Value) -> BenchError {
    let msg = v.pointer("/error/message").and_then(Value::as_str).unwrap_or("unknown error");
    BenchError::Message(format!("anthropic error: {msg}"))
}

pub(crate) fn parse_sse_line(line: &str) -> Result<Vec<StreamEvent>> {
    let Some(data) = sse_data(line) else { return Ok(Vec::new()) };
    let v: Value = serde_json::from_str(data).map_err(|e| BenchError::Decode(format!("{e}: {data}")))?;
    let events = match v.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => v
            .pointer("/delta/text")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(|t| vec![StreamEvent::Chunk(t.to_string())])
            .unwrap_or_default(),
        Some("message_start") => v
            .pointer("/message/usage")
            .map(|u| vec![StreamEvent::Usage(usage_of(u))])
            .unwrap_or_default(),
        Some("message_delta") => v.get("usage").map(|u| vec![StreamEvent::Usage(usage_of(u))]).unwrap_or_default(),
        Some("error") => return Err(error_of(&v)),
        _ => Vec::new(),
    };
    Ok(events)
}

pub(crate) fn parse_message(v: &Value) -> Result<Vec<StreamEvent>> {
    if v.get("type").and_then(Value::as_str) == Some("error") { return Err(error_of(v)); }
    let blocks = v
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| BenchError::Decode("missing 'content' in message".into()))?;
    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    let mut events = Vec::new();
    if !text.is_empty() { events.push(StreamEvent::Chunk(text)); }
    if let Some(u) = v.get("usage") { events.push(StreamEvent::Usage(usage_of(u))); }
    Ok(events)
}

#[async_trait::async_trait]
impl ChatBackend for AnthropicBackend {
    fn provider(&self) -> &str { "anthropic" }

    async fn chat(&self, model: &str, prompt: &str, params: &GenerationParams) -> Result<ChatStream> {
        let url = join_url(&self.base_url, "messages");
        tracing::debug!(target: "backend", provider = "anthropic", %model, %url, "chat request");
        let req = self.client.post(&url).json(&request_body(model, prompt, params));
        let resp = self.headers(req).send().await.map_err(http_error)?;
        let resp = check_status(resp).await?;
        if params.stream {
            return Ok(spawn_line_reader(resp, parse_sse_line));
        }
        let v: Value = resp.json().await.map_err(|e| BenchError::Decode(e.to_string()))?;
        Ok(single_shot(parse_message(&v)?))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = join_url(&self.base_url, "models");
        let resp = self.headers(self.client.get(&url)).send().await.map_err(http_error)?;
        let v: Value = check_status(resp).await?.json().await.map_err(|e| BenchError::Decode(e.to_string()))?;
        let data = v
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| BenchError::Decode("missing 'data' in /models".into()))?;
        Ok(data.iter().filter_map(|m| m.get("id").and_then(Value::as_str)).map(String::from).collect())
    }
}
