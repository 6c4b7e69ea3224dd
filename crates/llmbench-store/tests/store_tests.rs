use chrono::{TimeZone, Utc};
use llmbench_common::model::{BenchmarkRun, GenerationParams, ModelResult, ProcessingMode, Throughput, Timing};
use llmbench_store::{JsonlStore, MemoryStore, RunStore};

fn run(id: &str, secs: i64, ok: &[bool]) -> BenchmarkRun {
    let timestamp = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
    BenchmarkRun {
        id: id.to_string(),
        timestamp,
        prompt: format!("prompt {id}"),
        models: ok.iter().enumerate().map(|(i, _)| format!("m{i}")).collect(),
        mode: ProcessingMode::Parallel,
        parameters: GenerationParams::default(),
        system_info: None,
        wall_time: 1.5,
        results: ok
            .iter()
            .enumerate()
            .map(|(i, &success)| ModelResult {
                model: format!("m{i}"),
                provider: "ollama".into(),
                success,
                throughput: Throughput::default(),
                timing: Timing { time_to_first_token: success.then_some(0.25), total_time: 1.0 },
                response: success.then(|| "hi".to_string()),
                error: (!success).then(|| "backend returned 503: busy".to_string()),
                resource_usage: None,
                timestamp,
            })
            .collect(),
    }
}

#[tokio::test]
async fn jsonl_save_get_list() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlStore::open(dir.path().join("nested/runs.jsonl")).await.unwrap();

    assert!(store.list(10).await.unwrap().is_empty());
    assert!(store.get("nope").await.unwrap().is_none());

    let a = run("a", 0, &[true, false]);
    let b = run("b", 10, &[true]);
    assert_eq!(store.save(&a).await.unwrap(), "a");
    store.save(&b).await.unwrap();

    assert_eq!(store.get("a").await.unwrap(), Some(a));
    let list = store.list(10).await.unwrap();
    let ids: Vec<&str> = list.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, ["b", "a"]);
    assert_eq!((list[1].succeeded, list[1].failed), (1, 1));
    assert_eq!(store.list(1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn jsonl_survives_reopen_and_skips_garbage() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.jsonl");
    {
        let store = JsonlStore::open(&path).await.unwrap();
        store.save(&run("first", 0, &[true])).await.unwrap();
    }
    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push_str("{\"truncated\": \n\n");
    std::fs::write(&path, text).unwrap();

    let store = JsonlStore::open(&path).await.unwrap();
    store.save(&run("second", 5, &[false])).await.unwrap();
    let ids: Vec<String> = store.list(50).await.unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, ["second", "first"]);
}

#[tokio::test]
async fn torn_tail_does_not_swallow_next_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.jsonl");
    let store = JsonlStore::open(&path).await.unwrap();
    store.save(&run("first", 0, &[true])).await.unwrap();

    // a write cut short before its newline
    let mut text = std::fs::read_to_string(&path).unwrap();
    text.push_str("{\"id\":\"torn\",\"timest");
    std::fs::write(&path, text).unwrap();

    store.save(&run("second", 5, &[true])).await.unwrap();
    assert_eq!(store.get("second").await.unwrap().map(|r| r.id), Some("second".to_string()));
    let ids: Vec<String> = store.list(50).await.unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, ["second", "first"]);
}

#[tokio::test]
async fn equal_timestamps_list_later_insertions_first() {
    let store = MemoryStore::new();
    for id in ["x", "y", "z"] {
        store.save(&run(id, 42, &[true])).await.unwrap();
    }
    store.save(&run("old", 1, &[true])).await.unwrap();
    let ids: Vec<String> = store.list(50).await.unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, ["z", "y", "x", "old"]);
    assert_eq!(store.len().await, 4);
}

#[tokio::test]
async fn concurrent_appends_are_not_interleaved() {
    let dir = tempfile::tempdir().unwrap();
    let store = std::sync::Arc::new(JsonlStore::open(dir.path().join("runs.jsonl")).await.unwrap());
    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.save(&run(&format!("r{i}"), i, &[true; 3])).await.unwrap() })
        })
        .collect();
    for t in tasks {
        t.await.unwrap();
    }
    assert_eq!(store.list(100).await.unwrap().len(), 16);
    assert_eq!(store.get("r7").await.unwrap().unwrap().results.len(), 3);
}
