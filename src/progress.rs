//! Progress recording against the persisted run record.
//!
//! The recorder mirrors the engine's in-memory progress log into the run
//! store so polling and streaming clients can observe a run mid-flight.
//! Append failures are logged and swallowed: losing one progress mirror
//! write must never fail a step that otherwise succeeded. Status
//! transitions, by contrast, are load-bearing and propagate their errors.

use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::models::{Deliverable, ProgressEntry, RunStatus};
use crate::store::RunStore;

#[derive(Clone)]
pub struct ProgressRecorder {
    store: Arc<dyn RunStore>,
}

impl ProgressRecorder {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    /// Append an entry to the run's persisted progress log. Best-effort.
    pub async fn append(&self, run_id: &str, entry: ProgressEntry) {
        if let Err(e) = self.store.append_progress(run_id, entry).await {
            warn!(run_id, error = %e, "failed to append progress entry");
        }
    }

    /// Transition the run to `running` and stamp its start time.
    pub async fn mark_running(&self, run_id: &str) -> Result<()> {
        self.store.mark_running(run_id).await
    }

    /// Transition the run to a terminal status with its result or error.
    pub async fn finish(
        &self,
        run_id: &str,
        status: RunStatus,
        result: Option<Deliverable>,
        error: Option<String>,
    ) -> Result<()> {
        self.store.finish(run_id, status, result, error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgentRole, ProgressStatus, RunRecord};
    use crate::store::MemoryRunStore;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn append_against_missing_run_is_swallowed() {
        let recorder = ProgressRecorder::new(MemoryRunStore::shared());
        // Does not panic or error; the failure is only logged.
        recorder
            .append(
                "no-such-run",
                ProgressEntry::now("Planner", AgentRole::Planner, ProgressStatus::Running, "x"),
            )
            .await;
    }

    #[tokio::test]
    async fn append_mirrors_into_store() {
        let store = MemoryRunStore::shared();
        store
            .create(RunRecord::new(
                "r1",
                "ws-1",
                "t",
                BTreeMap::new(),
                Vec::new(),
            ))
            .await
            .unwrap();

        let recorder = ProgressRecorder::new(store.clone());
        recorder
            .append(
                "r1",
                ProgressEntry::now("Planner", AgentRole::Planner, ProgressStatus::Running, "x"),
            )
            .await;

        let run = store.get("r1").await.unwrap().unwrap();
        assert_eq!(run.progress.len(), 1);
        assert_eq!(run.progress[0].agent, "Planner");
    }
}
