use std::sync::Arc;
use std::time::Duration;

use llmbench_backend::mock::{MockBackend, MockScript};
use llmbench_backend::{BackendRegistry, ChatBackend, StreamEvent};
use llmbench_common::model::GenerationParams;
use llmbench_common::BenchError;
use tokio_stream::StreamExt;

fn registry() -> BackendRegistry {
    BackendRegistry::new()
        .with(Arc::new(MockBackend::named("ollama").with_model("llama3.2:latest", MockScript::chunks(["a"]))))
        .with(Arc::new(MockBackend::named("openai")))
}

#[test]
fn prefix_selects_registered_provider_only() {
    let reg = registry();
    let t = reg.target("openai:gpt-4o-mini");
    assert_eq!((t.provider.as_str(), t.model.as_str()), ("openai", "gpt-4o-mini"));

    // ollama tags contain ':' and must not be split
    let t = reg.target("llama3.2:latest");
    assert_eq!((t.provider.as_str(), t.model.as_str()), ("ollama", "llama3.2:latest"));

    let t = reg.target("anthropic:claude");
    assert_eq!(t.provider, "ollama");
    assert_eq!(t.model, "anthropic:claude");
}

#[test]
fn empty_registry_cannot_resolve() {
    let reg = BackendRegistry::new();
    assert!(matches!(reg.resolve("x"), Err(BenchError::UnknownProvider(_))));
    let mut reg = registry();
    assert!(reg.set_default("anthropic").is_err());
    reg.set_default("openai").unwrap();
    assert_eq!(reg.target("m").provider, "openai");
    assert_eq!(reg.providers(), vec!["ollama", "openai"]);
}

#[tokio::test(start_paused = true)]
async fn mock_streams_script_in_order() {
    let backend = MockBackend::new().with_model(
        "m",
        MockScript::chunks(["he", "llo"]).first_delay(Duration::from_millis(50)).then_fail("reset"),
    );
    let mut stream = backend.chat("m", "hi", &GenerationParams::default()).await.unwrap();
    let mut seen = Vec::new();
    while let Some(item) = stream.next().await {
        seen.push(item);
    }
    assert_eq!(seen.len(), 3);
    assert!(matches!(&seen[0], Ok(StreamEvent::Chunk(c)) if c == "he"));
    assert!(matches!(&seen[1], Ok(StreamEvent::Chunk(c)) if c == "llo"));
    assert!(matches!(&seen[2], Err(BenchError::Http(_))));
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn mock_unknown_model_is_404() {
    let backend = MockBackend::new();
    let err = backend.chat("nope", "hi", &GenerationParams::default()).await.err().unwrap();
    assert!(matches!(err, BenchError::Status { status: 404, .. }));
}
