//! Persistence boundary for run records and deliverables.
//!
//! The concrete storage technology is swappable: the engine and the API
//! surface only ever see the narrow `RunStore`/`DeliverableStore` traits,
//! so atomic-append semantics are enforced in one place instead of at
//! every call site. The in-memory implementation backs the default server
//! wiring and the test suite.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::models::{Deliverable, ProgressEntry, RunRecord, RunStatus};

/// Keyed store of run records.
///
/// Implementations must make `append_progress` safe against interleaved
/// concurrent appends for the same run: a read-modify-write that can lose
/// entries under two writers is not an acceptable implementation.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new record. Fails if the id already exists.
    async fn create(&self, record: RunRecord) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>>;

    /// Atomically append one entry to the run's progress log.
    async fn append_progress(&self, run_id: &str, entry: ProgressEntry) -> Result<()>;

    /// Transition `pending` → `running` and stamp `started_at`.
    async fn mark_running(&self, run_id: &str) -> Result<()>;

    /// Transition to a terminal status with result/error and stamp
    /// `completed_at`. Rejects transitions out of an already-terminal state.
    async fn finish(
        &self,
        run_id: &str,
        status: RunStatus,
        result: Option<Deliverable>,
        error: Option<String>,
    ) -> Result<()>;
}

/// Create-only deliverable storage, plus lookup for the read API.
#[async_trait]
pub trait DeliverableStore: Send + Sync {
    async fn save(&self, deliverable: &Deliverable) -> Result<()>;
    async fn get(&self, deliverable_id: &str) -> Result<Option<Deliverable>>;
}

// ── In-memory implementation ──────────────────────────────────────────

/// In-memory run store. The single map-wide mutex makes every operation,
/// including progress appends from steps of one parallel group, atomic.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, RunRecord>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, record: RunRecord) -> Result<()> {
        let mut runs = self.runs.lock().await;
        if runs.contains_key(&record.id) {
            bail!("Run {} already exists", record.id);
        }
        runs.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunRecord>> {
        Ok(self.runs.lock().await.get(run_id).cloned())
    }

    async fn append_progress(&self, run_id: &str, entry: ProgressEntry) -> Result<()> {
        let mut runs = self.runs.lock().await;
        let Some(run) = runs.get_mut(run_id) else {
            bail!("Run {} not found", run_id);
        };
        run.progress.push(entry);
        Ok(())
    }

    async fn mark_running(&self, run_id: &str) -> Result<()> {
        let mut runs = self.runs.lock().await;
        let Some(run) = runs.get_mut(run_id) else {
            bail!("Run {} not found", run_id);
        };
        if run.status != RunStatus::Pending {
            bail!(
                "Run {} cannot transition {} -> running",
                run_id,
                run.status.as_str()
            );
        }
        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        Ok(())
    }

    async fn finish(
        &self,
        run_id: &str,
        status: RunStatus,
        result: Option<Deliverable>,
        error: Option<String>,
    ) -> Result<()> {
        if !status.is_terminal() {
            bail!("finish called with non-terminal status {}", status.as_str());
        }
        let mut runs = self.runs.lock().await;
        let Some(run) = runs.get_mut(run_id) else {
            bail!("Run {} not found", run_id);
        };
        if run.status.is_terminal() {
            bail!(
                "Run {} is already terminal ({})",
                run_id,
                run.status.as_str()
            );
        }
        run.status = status;
        run.result = result;
        run.error = error;
        run.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// In-memory deliverable store.
#[derive(Default)]
pub struct MemoryDeliverableStore {
    deliverables: Mutex<HashMap<String, Deliverable>>,
}

impl MemoryDeliverableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored deliverables. Handy for asserting that a failed run
    /// persisted nothing.
    pub async fn count(&self) -> usize {
        self.deliverables.lock().await.len()
    }
}

#[async_trait]
impl DeliverableStore for MemoryDeliverableStore {
    async fn save(&self, deliverable: &Deliverable) -> Result<()> {
        let mut map = self.deliverables.lock().await;
        if map.contains_key(&deliverable.id) {
            bail!("Deliverable {} already exists", deliverable.id);
        }
        map.insert(deliverable.id.clone(), deliverable.clone());
        Ok(())
    }

    async fn get(&self, deliverable_id: &str) -> Result<Option<Deliverable>> {
        Ok(self.deliverables.lock().await.get(deliverable_id).cloned())
    }
}
