use llmbench_common::model::BenchmarkRun;
use llmbench_common::Result;
use tokio::sync::RwLock;

use crate::{recent, RunStore};

/// Keeps runs in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    runs: RwLock<Vec<BenchmarkRun>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn len(&self) -> usize { self.runs.read().await.len() }
}

#[async_trait::async_trait]
impl RunStore for MemoryStore {
    async fn save(&self, run: &BenchmarkRun) -> Result<String> {
        self.runs.write().await.push(run.clone());
        Ok(run.id.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<BenchmarkRun>> {
        Ok(self.runs.read().await.iter().rev().find(|r| r.id == id).cloned())
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<BenchmarkRun>> {
        Ok(recent(self.runs.read().await.clone(), limit))
    }
}
