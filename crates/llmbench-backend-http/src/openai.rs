use llmbench_backend::{ChatBackend, ChatStream, StreamEvent};
use llmbench_common::model::{GenerationParams, TokenUsage};
use llmbench_common::{BenchError, Result};
use serde_json::{json, Value};

use crate::stream::{single_shot, spawn_line_reader, sse_data};
use crate::{check_status, http_error, join_url};

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// `/chat/completions` as served by OpenAI and the many servers that copy it.
/// The key is optional so local OpenAI-compatible servers work unauthenticated.
#[derive(Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string(), api_key }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

pub(crate) fn request_body(model: &str, prompt: &str, params: &GenerationParams) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &params.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": prompt}));
    let mut body = json!({"model": model, "messages": messages, "stream": params.stream});
    if params.stream { body["stream_options"] = json!({"include_usage": true}); }
    if let Some(t) = params.temperature { body["temperature"] = json!(t); }
    if let Some(p) = params.top_p { body["top_p"] = json!(p); }
    if let Some(n) = params.max_tokens { body["max_tokens"] = json!(n); }
    body
}

fn usage_of(v: &Value) -> Option<TokenUsage> {
    let u = v.get("usage").filter(|u| u.is_object())?;
    Some(TokenUsage {
        prompt_tokens: u.get("prompt_tokens").and_then(Value::as_u64),
        output_tokens: u.get("completion_tokens").and_then(Value::as_u64),
    })
}

fn error_of(v: &Value) -> Option<BenchError> {
    let err = v.get("error")?;
    let msg = err.get("message").and_then(Value::as_str).map(String::from).unwrap_or_else(|| err.to_string());
    Some(BenchError::Message(format!("openai error: {msg}")))
}

pub(crate) fn parse_sse_line(line: &str) -> Result<Vec<StreamEvent>> {
    let Some(data) = sse_data(line) else { return Ok(Vec::new()) };
    if data == "[DONE]" { return Ok(Vec::new()); }
    let v: Value = serde_json::from_str(data).map_err(|e| BenchError::Decode(format!("{e}: {data}")))?;
    if let Some(err) = error_of(&v) { return Err(err); }
    let mut events = Vec::new();
    if let Some(content) = v.pointer("/choices/0/delta/content").and_then(Value::as_str) {
        if !content.is_empty() { events.push(StreamEvent::Chunk(content.to_string())); }
    }
    if let Some(usage) = usage_of(&v) { events.push(StreamEvent::Usage(usage)); }
    Ok(events)
}

pub(crate) fn parse_completion(v: &Value) -> Result<Vec<StreamEvent>> {
    if let Some(err) = error_of(v) { return Err(err); }
    let content = v
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| BenchError::Decode("missing choices[0].message.content".into()))?;
    let mut events = Vec::new();
    if !content.is_empty() { events.push(StreamEvent::Chunk(content.to_string())); }
    if let Some(usage) = usage_of(v) { events.push(StreamEvent::Usage(usage)); }
    Ok(events)
}

#[async_trait::async_trait]
impl ChatBackend for OpenAiBackend {
    fn provider(&self) -> &str { "openai" }

    async fn chat(&self, model: &str, prompt: &str, params: &GenerationParams) -> Result<ChatStream> {
        let url = join_url(&self.base_url, "chat/completions");
        tracing::debug!(target: "backend", provider = "openai", %model, %url, "chat request");
        let req = self.client.post(&url).json(&request_body(model, prompt, params));
        let resp = self.authorized(req).send().await.map_err(http_error)?;
        let resp = check_status(resp).await?;
        if params.stream {
            return Ok(spawn_line_reader(resp, parse_sse_line));
        }
        let v: Value = resp.json().await.map_err(|e| BenchError::Decode(e.to_string()))?;
        Ok(single_shot(parse_completion(&v)?))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = join_url(&self.base_url, "models");
        let resp = self.authorized(self.client.get(&url)).send().await.map_err(http_error)?;
        let v: Value = check_status(resp).await?.json().await.map_err(|e| BenchError::Decode(e.to_string()))?;
        let data = v
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| BenchError::Decode("missing 'data' in /models".into()))?;
        Ok(data.iter().filter_map(|m| m.get("id").and_then(Value::as_str)).map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_content_and_trailing_usage() {
        let line = r#"data: {"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), vec![StreamEvent::Chunk("Hel".into())]);

        let line = r#"data: {"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":9}}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            vec![StreamEvent::Usage(TokenUsage { prompt_tokens: Some(3), output_tokens: Some(9) })]
        );

        assert!(parse_sse_line(r#"data: {"choices":[{"delta":{"content":null}}],"usage":null}"#).unwrap().is_empty());
        assert!(parse_sse_line("data: [DONE]").unwrap().is_empty());
        assert!(parse_sse_line(": ping").unwrap().is_empty());
    }

    #[test]
    fn in_band_error() {
        let line = r#"data: {"error":{"message":"rate limited","type":"requests"}}"#;
        let err = parse_sse_line(line).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn non_streaming_completion() {
        let v = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "4"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 1}
        });
        let events = parse_completion(&v).unwrap();
        assert_eq!(events[0], StreamEvent::Chunk("4".into()));
        assert_eq!(events.len(), 2);

        let body = request_body("m", "p", &GenerationParams { stream: false, ..Default::default() });
        assert!(body.get("stream_options").is_none());
    }
}
