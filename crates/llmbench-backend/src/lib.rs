use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use llmbench_common::model::{GenerationParams, TokenUsage};
use llmbench_common::{BenchError, Result};
use tokio_stream::Stream;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of generated text; may be empty on keep-alive style frames.
    Chunk(String),
    Usage(TokenUsage),
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A chat-completion service that can stream its output.
///
/// `chat` fails early for errors known before the body starts (connection,
/// non-2xx status); errors while reading the body arrive as stream items.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    fn provider(&self) -> &str;
    async fn chat(&self, model: &str, prompt: &str, params: &GenerationParams) -> Result<ChatStream>;
    async fn list_models(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTarget {
    pub provider: String,
    pub model: String,
}

/// Provider name to backend, with one provider used for unprefixed model names.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn ChatBackend>>,
    default_provider: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self { Self::default() }

    /// The first backend registered becomes the default.
    pub fn register(&mut self, backend: Arc<dyn ChatBackend>) {
        let name = backend.provider().to_string();
        if self.default_provider.is_none() { self.default_provider = Some(name.clone()); }
        self.backends.insert(name, backend);
    }

    pub fn with(mut self, backend: Arc<dyn ChatBackend>) -> Self {
        self.register(backend);
        self
    }

    pub fn set_default(&mut self, provider: &str) -> Result<()> {
        if !self.backends.contains_key(provider) {
            return Err(BenchError::UnknownProvider(provider.to_string()));
        }
        self.default_provider = Some(provider.to_string());
        Ok(())
    }

    pub fn default_provider(&self) -> Option<&str> { self.default_provider.as_deref() }

    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn get(&self, provider: &str) -> Option<Arc<dyn ChatBackend>> { self.backends.get(provider).cloned() }

    /// Splits `provider:model` when the prefix is a registered provider.
    /// Anything else, Ollama tags like `llama3.2:latest` included, goes to the default.
    pub fn target(&self, spec: &str) -> ModelTarget {
        if let Some((prefix, rest)) = spec.split_once(':') {
            if !rest.is_empty() && self.backends.contains_key(prefix) {
                return ModelTarget { provider: prefix.to_string(), model: rest.to_string() };
            }
        }
        ModelTarget {
            provider: self.default_provider.clone().unwrap_or_default(),
            model: spec.to_string(),
        }
    }

    pub fn resolve(&self, spec: &str) -> Result<(Arc<dyn ChatBackend>, ModelTarget)> {
        let target = self.target(spec);
        match self.backends.get(&target.provider) {
            Some(b) => Ok((b.clone(), target)),
            None if target.provider.is_empty() => Err(BenchError::UnknownProvider("<none registered>".into())),
            None => Err(BenchError::UnknownProvider(target.provider)),
        }
    }
}

#[cfg(feature = "mock")]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_stream::wrappers::ReceiverStream;

    /// What the mock answers for one model.
    #[derive(Debug, Clone, Default)]
    pub struct MockScript {
        pub chunks: Vec<String>,
        pub first_delay: Duration,
        pub chunk_delay: Duration,
        pub status: Option<(u16, String)>,
        pub fail_after: Option<String>,
        pub usage: Option<TokenUsage>,
    }

    impl MockScript {
        pub fn chunks<I, S>(chunks: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self { chunks: chunks.into_iter().map(Into::into).collect(), ..Self::default() }
        }

        /// Rejects the request before any body is streamed.
        pub fn status(code: u16, body: impl Into<String>) -> Self {
            Self { status: Some((code, body.into())), ..Self::default() }
        }

        pub fn first_delay(mut self, d: Duration) -> Self { self.first_delay = d; self }
        pub fn chunk_delay(mut self, d: Duration) -> Self { self.chunk_delay = d; self }
        pub fn usage(mut self, usage: TokenUsage) -> Self { self.usage = Some(usage); self }

        /// Breaks the stream after the scripted chunks.
        pub fn then_fail(mut self, msg: impl Into<String>) -> Self { self.fail_after = Some(msg.into()); self }
    }

    #[derive(Clone)]
    pub struct MockBackend {
        provider: String,
        scripts: HashMap<String, MockScript>,
        calls: Arc<AtomicUsize>,
    }

    impl Default for MockBackend {
        fn default() -> Self { Self::new() }
    }

    impl MockBackend {
        pub fn new() -> Self { Self::named("mock") }

        pub fn named(provider: impl Into<String>) -> Self {
            Self { provider: provider.into(), scripts: HashMap::new(), calls: Arc::new(AtomicUsize::new(0)) }
        }

        pub fn with_model(mut self, model: impl Into<String>, script: MockScript) -> Self {
            self.scripts.insert(model.into(), script);
            self
        }

        pub fn calls(&self) -> usize { self.calls.load(Ordering::Relaxed) }
    }

    #[async_trait::async_trait]
    impl ChatBackend for MockBackend {
        fn provider(&self) -> &str { &self.provider }

        async fn chat(&self, model: &str, _prompt: &str, _params: &GenerationParams) -> Result<ChatStream> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let Some(script) = self.scripts.get(model).cloned() else {
                return Err(BenchError::Status { status: 404, body: format!("model '{model}' not found") });
            };
            if let Some((status, body)) = script.status {
                return Err(BenchError::Status { status, body });
            }
            let (tx, rx) = tokio::sync::mpsc::channel(16);
            tokio::spawn(async move {
                tokio::time::sleep(script.first_delay).await;
                for (i, chunk) in script.chunks.into_iter().enumerate() {
                    if i > 0 && !script.chunk_delay.is_zero() { tokio::time::sleep(script.chunk_delay).await; }
                    if tx.send(Ok(StreamEvent::Chunk(chunk))).await.is_err() { return; }
                }
                if let Some(usage) = script.usage {
                    let _ = tx.send(Ok(StreamEvent::Usage(usage))).await;
                }
                if let Some(msg) = script.fail_after {
                    let _ = tx.send(Err(BenchError::Http(msg))).await;
                }
            });
            Ok(Box::pin(ReceiverStream::new(rx)))
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            let mut names: Vec<String> = self.scripts.keys().cloned().collect();
            names.sort();
            Ok(names)
        }
    }
}
