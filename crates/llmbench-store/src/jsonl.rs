use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use llmbench_common::model::BenchmarkRun;
use llmbench_common::Result;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::{recent, RunStore};

/// Append-only JSON Lines file, one run per line.
pub struct JsonlStore {
    path: PathBuf,
    // serialises appends against each other and against reads
    lock: Mutex<()>,
}

impl JsonlStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tracing::info!(target: "store", path = %path.display(), "using jsonl run store");
        Ok(Self { path, lock: Mutex::new(()) })
    }

    pub fn path(&self) -> &Path { &self.path }

    async fn load(&self) -> Result<Vec<BenchmarkRun>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut runs = Vec::new();
        for (n, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() { continue; }
            match serde_json::from_str::<BenchmarkRun>(line) {
                Ok(run) => runs.push(run),
                Err(e) => tracing::warn!(target: "store", line = n + 1, error = %e, "skipping malformed run record"),
            }
        }
        Ok(runs)
    }
}

#[async_trait::async_trait]
impl RunStore for JsonlStore {
    async fn save(&self, run: &BenchmarkRun) -> Result<String> {
        let mut line = serde_json::to_string(run)?;
        line.push('\n');
        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new().create(true).read(true).append(true).open(&self.path).await?;
        // a previous append cut short leaves no newline; start a fresh line
        if file.metadata().await?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1)).await?;
            file.read_exact(&mut last).await?;
            if last[0] != b'\n' {
                tracing::warn!(target: "store", path = %self.path.display(), "run file ends mid-record");
                line.insert(0, '\n');
            }
        }
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        tracing::debug!(target: "store", run_id = %run.id, "run saved");
        Ok(run.id.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<BenchmarkRun>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.into_iter().rev().find(|r| r.id == id))
    }

    async fn recent_runs(&self, limit: usize) -> Result<Vec<BenchmarkRun>> {
        let _guard = self.lock.lock().await;
        Ok(recent(self.load().await?, limit))
    }
}
