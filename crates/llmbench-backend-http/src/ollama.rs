use llmbench_backend::{ChatBackend, ChatStream, StreamEvent};
use llmbench_common::model::{GenerationParams, TokenUsage};
use llmbench_common::{BenchError, Result};
use serde_json::{json, Map, Value};

use crate::stream::{single_shot, spawn_line_reader};
use crate::{check_status, http_error, join_url};

/// Ollama's native `/api/chat`, which streams newline-delimited JSON.
#[derive(Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

pub(crate) fn request_body(model: &str, prompt: &str, params: &GenerationParams) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &params.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": prompt}));

    let mut options = Map::new();
    if let Some(t) = params.temperature { options.insert("temperature".into(), json!(t)); }
    if let Some(p) = params.top_p { options.insert("top_p".into(), json!(p)); }
    if let Some(n) = params.max_tokens { options.insert("num_predict".into(), json!(n)); }

    let mut body = json!({"model": model, "messages": messages, "stream": params.stream});
    if !options.is_empty() { body["options"] = Value::Object(options); }
    body
}

pub(crate) fn parse_value(v: &Value) -> Result<Vec<StreamEvent>> {
    if let Some(err) = v.get("error").and_then(Value::as_str) {
        return Err(BenchError::Message(format!("ollama error: {err}")));
    }
    let mut events = Vec::new();
    if let Some(content) = v.pointer("/message/content").and_then(Value::as_str) {
        if !content.is_empty() { events.push(StreamEvent::Chunk(content.to_string())); }
    }
    if v.get("done").and_then(Value::as_bool) == Some(true) {
        let usage = TokenUsage {
            prompt_tokens: v.get("prompt_eval_count").and_then(Value::as_u64),
            output_tokens: v.get("eval_count").and_then(Value::as_u64),
        };
        if usage != TokenUsage::default() { events.push(StreamEvent::Usage(usage)); }
    }
    Ok(events)
}

pub(crate) fn parse_line(line: &str) -> Result<Vec<StreamEvent>> {
    let v: Value = serde_json::from_str(line).map_err(|e| BenchError::Decode(format!("{e}: {line}")))?;
    parse_value(&v)
}

#[async_trait::async_trait]
impl ChatBackend for OllamaBackend {
    fn provider(&self) -> &str { "ollama" }

    async fn chat(&self, model: &str, prompt: &str, params: &GenerationParams) -> Result<ChatStream> {
        let url = join_url(&self.base_url, "api/chat");
        tracing::debug!(target: "backend", provider = "ollama", %model, %url, "chat request");
        let resp = self
            .client
            .post(&url)
            .json(&request_body(model, prompt, params))
            .send()
            .await
            .map_err(http_error)?;
        let resp = check_status(resp).await?;
        if params.stream {
            return Ok(spawn_line_reader(resp, parse_line));
        }
        let v: Value = resp.json().await.map_err(|e| BenchError::Decode(e.to_string()))?;
        Ok(single_shot(parse_value(&v)?))
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = join_url(&self.base_url, "api/tags");
        let resp = self.client.get(&url).send().await.map_err(http_error)?;
        let v: Value = check_status(resp).await?.json().await.map_err(|e| BenchError::Decode(e.to_string()))?;
        let models = v
            .get("models")
            .and_then(Value::as_array)
            .ok_or_else(|| BenchError::Decode("missing 'models' in /api/tags".into()))?;
        Ok(models.iter().filter_map(|m| m.get("name").and_then(Value::as_str)).map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_and_final_counts() {
        let events = parse_line(r#"{"model":"m","message":{"role":"assistant","content":"Hi"},"done":false}"#).unwrap();
        assert_eq!(events, vec![StreamEvent::Chunk("Hi".into())]);

        let events = parse_line(r#"{"message":{"content":""},"done":true,"prompt_eval_count":7,"eval_count":12}"#).unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Usage(TokenUsage { prompt_tokens: Some(7), output_tokens: Some(12) })]
        );
    }

    #[test]
    fn error_lines_and_garbage_fail() {
        assert!(matches!(parse_line(r#"{"error":"model not found"}"#), Err(BenchError::Message(_))));
        assert!(matches!(parse_line("not json"), Err(BenchError::Decode(_))));
    }

    #[test]
    fn options_only_when_set() {
        let body = request_body("m", "p", &GenerationParams::default());
        assert!(body.get("options").is_none());
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);

        let params = GenerationParams { max_tokens: Some(32), system: Some("be brief".into()), ..Default::default() };
        let body = request_body("m", "p", &params);
        assert_eq!(body["options"]["num_predict"], 32);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["stream"], true);
    }
}
