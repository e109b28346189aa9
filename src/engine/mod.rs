//! Workflow engine: runs a template end to end against a workspace.

pub mod assemble;
pub mod context;
pub mod planner;
pub mod step;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::adapters::{ModelInvoker, Retriever};
use crate::config::EngineConfig;
use crate::engine::context::RunContext;
use crate::errors::EngineError;
use crate::models::{Deliverable, RetrievedChunk, RunStatus};
use crate::progress::ProgressRecorder;
use crate::store::{DeliverableStore, RunStore};
use crate::templates::TemplateCatalog;

/// Everything identifying one run request. The corresponding `RunRecord`
/// is created by the caller before the engine starts.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: String,
    pub workspace_id: String,
    pub template_id: String,
    pub input: BTreeMap<String, Value>,
    pub file_ids: Vec<String>,
}

pub struct WorkflowEngine {
    catalog: Arc<TemplateCatalog>,
    runs: Arc<dyn RunStore>,
    deliverables: Arc<dyn DeliverableStore>,
    invoker: Arc<dyn ModelInvoker>,
    retriever: Arc<dyn Retriever>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(
        catalog: Arc<TemplateCatalog>,
        runs: Arc<dyn RunStore>,
        deliverables: Arc<dyn DeliverableStore>,
        invoker: Arc<dyn ModelInvoker>,
        retriever: Arc<dyn Retriever>,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            runs,
            deliverables,
            invoker,
            retriever,
            config,
        }
    }

    /// Execute a run to completion. Any failure marks the run `failed`
    /// with the error message before the error is returned, so the stored
    /// record and the return value never disagree about the outcome.
    pub async fn execute(&self, request: RunRequest) -> Result<Deliverable, EngineError> {
        let recorder = ProgressRecorder::new(Arc::clone(&self.runs));
        match self.execute_inner(&request, &recorder).await {
            Ok(deliverable) => Ok(deliverable),
            Err(err) => {
                if let Err(store_err) = recorder
                    .finish(&request.run_id, RunStatus::Failed, None, Some(err.to_string()))
                    .await
                {
                    warn!(run_id = %request.run_id, error = %store_err, "failed to record run failure");
                }
                Err(err)
            }
        }
    }

    async fn execute_inner(
        &self,
        request: &RunRequest,
        recorder: &ProgressRecorder,
    ) -> Result<Deliverable, EngineError> {
        let template = self.catalog.get(&request.template_id)?.clone();
        planner::validate(&template.config.steps)?;

        let chunks = self.retrieve_context(request).await;
        info!(
            run_id = %request.run_id,
            template = %template.id,
            chunks = chunks.len(),
            "starting workflow run"
        );

        recorder
            .mark_running(&request.run_id)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;

        let ctx = RunContext::new(
            request.run_id.clone(),
            request.workspace_id.clone(),
            template.clone(),
            request.input.clone(),
            chunks,
        );

        for group in planner::plan(&template.config.steps) {
            if let [single] = group.as_slice() {
                step::run_step(&ctx, recorder, self.invoker.as_ref(), single).await?;
            } else {
                try_join_all(
                    group
                        .iter()
                        .map(|s| step::run_step(&ctx, recorder, self.invoker.as_ref(), s)),
                )
                .await?;
            }
        }

        let deliverable = assemble::assemble(&ctx);
        self.deliverables
            .save(&deliverable)
            .await
            .map_err(|e| EngineError::Persistence(e.to_string()))?;
        recorder
            .finish(
                &request.run_id,
                RunStatus::Completed,
                Some(deliverable.clone()),
                None,
            )
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;

        let (input_tokens, output_tokens) = ctx.token_totals();
        info!(
            run_id = %request.run_id,
            input_tokens,
            output_tokens,
            "workflow run completed"
        );
        Ok(deliverable)
    }

    /// Best-effort context retrieval. A blank query (no string-valued
    /// form inputs) skips retrieval outright and the run proceeds with
    /// zero context. Otherwise ranked search is tried; on error it
    /// degrades to recent chunks, and a second failure degrades to no
    /// context at all. None of these paths fail the run.
    async fn retrieve_context(&self, request: &RunRequest) -> Vec<RetrievedChunk> {
        let top_k = self.config.retrieval_top_k;
        let query: String = request
            .input
            .values()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if query.trim().is_empty() {
            return Vec::new();
        }

        match self
            .retriever
            .search(&request.workspace_id, &query, &request.file_ids, top_k)
            .await
        {
            Ok(chunks) => chunks,
            Err(err) => {
                warn!(run_id = %request.run_id, error = %err, "ranked retrieval failed, falling back to recent chunks");
                match self
                    .retriever
                    .recent_chunks(&request.workspace_id, &request.file_ids, top_k)
                    .await
                {
                    Ok(chunks) => chunks,
                    Err(err) => {
                        warn!(run_id = %request.run_id, error = %err, "recent-chunk retrieval failed, proceeding without context");
                        Vec::new()
                    }
                }
            }
        }
    }
}

/// Fire-and-forget execution for the HTTP surface: the task owns the
/// engine handle and logs the terminal outcome, which `execute` has
/// already persisted either way.
pub fn spawn(engine: Arc<WorkflowEngine>, request: RunRequest) {
    tokio::spawn(async move {
        let run_id = request.run_id.clone();
        if let Err(err) = engine.execute(request).await {
            error!(run_id = %run_id, error = %err, "workflow run failed");
        }
    });
}
