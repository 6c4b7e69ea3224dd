use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use llmbench_api::{router, AppState};
use llmbench_backend::mock::{MockBackend, MockScript};
use llmbench_backend::BackendRegistry;
use llmbench_core::BenchmarkRunner;
use llmbench_store::MemoryStore;
use serde_json::{json, Value};

fn test_app() -> Router {
    let backend = MockBackend::named("ollama")
        .with_model("alpha", MockScript::chunks(["Hi", " there"]).first_delay(Duration::from_millis(20)))
        .with_model("broken", MockScript::status(500, "boom"));
    let runner = BenchmarkRunner::new(BackendRegistry::new().with(Arc::new(backend)))
        .with_sampling(None)
        .with_system_info(false);
    router(AppState::new(runner, Arc::new(MemoryStore::new())))
}

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap(); });
    format!("http://{}:{}", addr.ip(), addr.port())
}

#[tokio::test]
async fn run_then_history() {
    let base = spawn(test_app()).await;
    let client = reqwest::Client::new();

    let r = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert_eq!(r.text().await.unwrap(), "ok");

    let body = json!({"prompt": "Say hi", "models": ["alpha", "broken"], "parallel_processing": false});
    let r = client.post(format!("{base}/run")).json(&body).send().await.unwrap();
    assert!(r.status().is_success());
    let run: Value = r.json().await.unwrap();
    assert_eq!(run["mode"], "sequential");
    assert_eq!(run["results"][0]["success"], true);
    assert_eq!(run["results"][0]["response"], "Hi there");
    assert_eq!(run["results"][1]["success"], false);
    let id = run["id"].as_str().unwrap().to_string();

    let list: Value = client.get(format!("{base}/history?limit=5")).send().await.unwrap().json().await.unwrap();
    assert_eq!(list[0]["id"], id.as_str());
    assert_eq!(list[0]["succeeded"], 1);
    assert_eq!(list[0]["failed"], 1);

    let full: Value = client.get(format!("{base}/history/{id}")).send().await.unwrap().json().await.unwrap();
    assert_eq!(full, run);

    let r = client.get(format!("{base}/history/missing")).send().await.unwrap();
    assert_eq!(r.status(), 404);
    let err: Value = r.json().await.unwrap();
    assert!(err["detail"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn invalid_requests_are_400_with_detail() {
    let base = spawn(test_app()).await;
    let client = reqwest::Client::new();

    let r = client.post(format!("{base}/run")).json(&json!({"prompt": "", "models": ["alpha"]})).send().await.unwrap();
    assert_eq!(r.status(), 400);
    let err: Value = r.json().await.unwrap();
    assert!(err["detail"].as_str().unwrap().contains("prompt"));

    let r = client
        .post(format!("{base}/run"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(r.status(), 400);
    assert!(r.json::<Value>().await.unwrap()["detail"].is_string());

    let r = client.get(format!("{base}/history?limit=abc")).send().await.unwrap();
    assert_eq!(r.status(), 400);
    assert!(r.json::<Value>().await.unwrap()["detail"].is_string());
}

#[tokio::test]
async fn stream_reports_progress_until_run_finished() {
    let base = spawn(test_app()).await;
    let client = reqwest::Client::new();

    // headers arrive once the subscription exists
    let stream = client.get(format!("{base}/stream")).send().await.unwrap();
    assert!(stream.status().is_success());

    let body = json!({"prompt": "Say hi", "models": ["alpha"]});
    let run: Value = client.post(format!("{base}/run")).json(&body).send().await.unwrap().json().await.unwrap();

    let text = tokio::time::timeout(Duration::from_secs(5), stream.text()).await.unwrap().unwrap();
    let updates: Vec<Value> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(|d| serde_json::from_str(d.trim()).unwrap())
        .collect();
    let statuses: Vec<&str> = updates.iter().map(|u| u["status"].as_str().unwrap()).collect();
    assert_eq!(statuses, ["starting", "first_token", "generating", "generating", "completed", "run_finished"]);
    assert!(updates.iter().all(|u| u["run_id"] == run["id"]));
    assert_eq!(updates[2]["chunk"], "Hi");
    assert_eq!(updates[2]["model"], "alpha");
}

#[tokio::test]
async fn models_system_and_metrics() {
    let base = spawn(test_app()).await;
    let client = reqwest::Client::new();

    let models: Value = client.get(format!("{base}/models")).send().await.unwrap().json().await.unwrap();
    assert_eq!(models[0]["provider"], "ollama");
    assert_eq!(models[0]["models"], json!(["alpha", "broken"]));

    let info: Value = client.get(format!("{base}/system")).send().await.unwrap().json().await.unwrap();
    assert!(info["logical_cores"].as_u64().unwrap() >= 1);

    let body = json!({"prompt": "Say hi", "models": ["alpha"]});
    client.post(format!("{base}/run")).json(&body).send().await.unwrap();
    let r = client.get(format!("{base}/metrics")).send().await.unwrap();
    assert!(r.status().is_success());
    let text = r.text().await.unwrap();
    assert!(text.contains("llmbench_runs_total"));
    assert!(text.contains("llmbench_model_attempts_total"));
}

#[tokio::test]
async fn app_from_config_serves() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = llmbench_common::config::BenchConfig::default();
    cfg.store_path = dir.path().join("runs/benchmarks.jsonl");
    let base = spawn(llmbench_api::app(&cfg).await.unwrap()).await;
    let client = reqwest::Client::new();
    let list: Value = client.get(format!("{base}/history")).send().await.unwrap().json().await.unwrap();
    assert_eq!(list, json!([]));
}
