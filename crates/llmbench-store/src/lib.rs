//! Persistence for finished benchmark runs.

use llmbench_common::model::{BenchmarkRun, RunSummary};
use llmbench_common::Result;

pub mod jsonl;
pub mod memory;
pub mod stats;

pub use jsonl::JsonlStore;
pub use memory::MemoryStore;
pub use stats::{model_stats, ModelStats};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

#[async_trait::async_trait]
pub trait RunStore: Send + Sync {
    /// Persists a run and returns its id.
    async fn save(&self, run: &BenchmarkRun) -> Result<String>;
    async fn get(&self, id: &str) -> Result<Option<BenchmarkRun>>;
    /// Most recent runs first, at most `limit` of them.
    async fn list(&self, limit: usize) -> Result<Vec<RunSummary>> {
        Ok(self.recent_runs(limit).await?.iter().map(RunSummary::from).collect())
    }
    /// Full runs in the same order as `list`.
    async fn recent_runs(&self, limit: usize) -> Result<Vec<BenchmarkRun>>;
}

/// Orders runs given in insertion order: newest timestamp first, later
/// insertions first among equal timestamps.
pub(crate) fn recent(mut runs: Vec<BenchmarkRun>, limit: usize) -> Vec<BenchmarkRun> {
    runs.reverse();
    runs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    runs.truncate(limit);
    runs
}
