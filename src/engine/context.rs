//! Shared per-run state handed to every step executor.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

use crate::models::{AgentOutput, ProgressEntry, RetrievedChunk, WorkflowTemplate};

/// Everything a step needs about the run it belongs to.
///
/// Outputs and the progress log use interior mutability so steps in the
/// same parallel group can record results through a shared reference;
/// both locks are held only for the push or the snapshot copy, never
/// across an await.
pub struct RunContext {
    pub run_id: String,
    pub workspace_id: String,
    pub template: WorkflowTemplate,
    pub user_input: BTreeMap<String, Value>,
    pub chunks: Vec<RetrievedChunk>,
    outputs: Mutex<Vec<(String, AgentOutput)>>,
    progress: Mutex<Vec<ProgressEntry>>,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<String>,
        workspace_id: impl Into<String>,
        template: WorkflowTemplate,
        user_input: BTreeMap<String, Value>,
        chunks: Vec<RetrievedChunk>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            workspace_id: workspace_id.into(),
            template,
            user_input,
            chunks,
            outputs: Mutex::new(Vec::new()),
            progress: Mutex::new(Vec::new()),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
        }
    }

    /// Record a step's output. Completion order, not declaration order:
    /// within a parallel group, whichever step finishes first lands first.
    pub fn record_output(&self, step_id: &str, output: AgentOutput) {
        self.outputs
            .lock()
            .expect("outputs lock poisoned")
            .push((step_id.to_string(), output));
    }

    /// Snapshot of all outputs recorded so far, in completion order.
    pub fn outputs(&self) -> Vec<(String, AgentOutput)> {
        self.outputs.lock().expect("outputs lock poisoned").clone()
    }

    pub fn record_progress(&self, entry: ProgressEntry) {
        self.progress
            .lock()
            .expect("progress lock poisoned")
            .push(entry);
    }

    pub fn progress(&self) -> Vec<ProgressEntry> {
        self.progress.lock().expect("progress lock poisoned").clone()
    }

    pub fn add_tokens(&self, input: u64, output: u64) {
        self.input_tokens.fetch_add(input, Ordering::Relaxed);
        self.output_tokens.fetch_add(output, Ordering::Relaxed);
    }

    pub fn token_totals(&self) -> (u64, u64) {
        (
            self.input_tokens.load(Ordering::Relaxed),
            self.output_tokens.load(Ordering::Relaxed),
        )
    }
}
