//! Turns recorded step outputs into the final deliverable.
//!
//! The editor's consolidated output is preferred for every field, with a
//! per-field fallback ladder over the other steps' outputs so a run whose
//! editor returned partial or unparseable JSON still yields a usable
//! document instead of failing late.

use chrono::Utc;
use uuid::Uuid;

use crate::adapters::retrieval::distinct_files;
use crate::engine::context::RunContext;
use crate::models::{
    AgentRole, ChecklistItem, Deliverable, DeliverableContent, DeliverableSource, Finding,
    PlanPhase, Recommendation, SourceType, StepOutput,
};

const DERIVED_RELEVANCE: &str = "Referenced during analysis";
const GENERIC_SUMMARY: &str = "Analysis complete. Please review the detailed findings below.";

pub fn assemble(ctx: &RunContext) -> Deliverable {
    let outputs = ctx.outputs();
    let structured: Vec<(&str, &StepOutput)> = outputs
        .iter()
        .filter_map(|(id, out)| out.as_structured().map(|s| (id.as_str(), s)))
        .collect();

    let editor = editor_step_id(ctx)
        .and_then(|id| structured.iter().find(|(sid, _)| *sid == id))
        .map(|(_, out)| *out);

    let title = editor
        .and_then(|e| e.title.clone())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| format!("Consulting Deliverable - {}", Utc::now().format("%Y-%m-%d")));

    let findings = pick_list(editor.and_then(|e| e.findings.clone()), || {
        collect_findings(&structured)
    });
    let recommendations = pick_list(editor.and_then(|e| e.recommendations.clone()), || {
        collect_recommendations(&structured)
    });
    let plan_30_60_90 = pick_list(editor.and_then(|e| e.plan_30_60_90.clone()), || {
        first_plan(&structured)
    });
    let risks_assumptions = pick_list(editor.and_then(|e| e.risks_assumptions.clone()), || {
        structured
            .iter()
            .filter_map(|(_, out)| out.risks_assumptions.as_ref())
            .find(|risks| !risks.is_empty())
            .cloned()
            .unwrap_or_default()
    });

    let executive_summary = editor
        .and_then(|e| e.executive_summary.clone())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| fallback_summary(&structured, &findings, &recommendations));

    let checklist = editor
        .and_then(|e| e.checklist.as_ref())
        .map(|drafts| {
            drafts
                .iter()
                .map(|draft| ChecklistItem {
                    id: Uuid::new_v4().to_string(),
                    text: draft.text.clone(),
                    completed: false,
                })
                .collect()
        })
        .unwrap_or_default();

    let sources = build_sources(ctx, editor);

    Deliverable {
        id: Uuid::new_v4().to_string(),
        workspace_id: ctx.workspace_id.clone(),
        run_id: ctx.run_id.clone(),
        title,
        content: DeliverableContent {
            executive_summary,
            findings,
            recommendations,
            plan_30_60_90,
            risks_assumptions,
        },
        checklist,
        sources,
        created_at: Utc::now(),
    }
}

/// The step whose output consolidates the run: the last editor-role step,
/// or failing that the last step whose id starts with "edit".
fn editor_step_id(ctx: &RunContext) -> Option<&str> {
    let steps = &ctx.template.config.steps;
    steps
        .iter()
        .rev()
        .find(|s| s.agent_role == AgentRole::Editor)
        .or_else(|| {
            steps
                .iter()
                .rev()
                .find(|s| s.id.to_lowercase().starts_with("edit"))
        })
        .map(|s| s.id.as_str())
}

fn pick_list<T>(preferred: Option<Vec<T>>, fallback: impl FnOnce() -> Vec<T>) -> Vec<T> {
    match preferred {
        Some(list) if !list.is_empty() => list,
        _ => fallback(),
    }
}

fn collect_findings(structured: &[(&str, &StepOutput)]) -> Vec<Finding> {
    structured
        .iter()
        .filter_map(|(_, out)| out.findings.as_ref())
        .flatten()
        .cloned()
        .collect()
}

fn collect_recommendations(structured: &[(&str, &StepOutput)]) -> Vec<Recommendation> {
    structured
        .iter()
        .filter_map(|(_, out)| out.recommendations.as_ref())
        .flatten()
        .cloned()
        .collect()
}

fn first_plan(structured: &[(&str, &StepOutput)]) -> Vec<PlanPhase> {
    structured
        .iter()
        .filter_map(|(_, out)| out.plan_30_60_90.as_ref())
        .find(|plan| !plan.is_empty())
        .cloned()
        .unwrap_or_default()
}

/// Summary when the editor supplied none: the first summary any step
/// produced, a sentence built from counts, or a generic closer when the
/// run yielded nothing countable.
fn fallback_summary(
    structured: &[(&str, &StepOutput)],
    findings: &[Finding],
    recommendations: &[Recommendation],
) -> String {
    if let Some(summary) = structured
        .iter()
        .filter_map(|(_, out)| out.executive_summary.as_deref())
        .find(|s| !s.trim().is_empty())
    {
        return summary.to_string();
    }
    if !findings.is_empty() || !recommendations.is_empty() {
        return format!(
            "This analysis produced {} finding(s) and {} recommendation(s). {}",
            findings.len(),
            recommendations.len(),
            GENERIC_SUMMARY
        );
    }
    GENERIC_SUMMARY.to_string()
}

/// Sources come from the editor's citations when it provided any, matched
/// back to retrieved files to recover ids; otherwise they are derived from
/// the distinct files the run actually retrieved, in first-seen order.
fn build_sources(ctx: &RunContext, editor: Option<&StepOutput>) -> Vec<DeliverableSource> {
    if let Some(drafts) = editor.and_then(|e| e.sources_used.as_ref()) {
        if !drafts.is_empty() {
            return drafts
                .iter()
                .map(|draft| {
                    let file_id = ctx
                        .chunks
                        .iter()
                        .find(|c| c.file_name == draft.name)
                        .map(|c| c.file_id.clone());
                    let relevance = if draft.relevance.trim().is_empty() {
                        DERIVED_RELEVANCE.to_string()
                    } else {
                        draft.relevance.clone()
                    };
                    DeliverableSource {
                        source_type: SourceType::Bucket,
                        name: draft.name.clone(),
                        url: None,
                        file_id,
                        relevance,
                    }
                })
                .collect();
        }
    }

    distinct_files(&ctx.chunks)
        .into_iter()
        .map(|(file_id, chunk)| DeliverableSource {
            source_type: SourceType::Bucket,
            name: chunk.file_name.clone(),
            url: None,
            file_id: Some(file_id.to_string()),
            relevance: DERIVED_RELEVANCE.to_string(),
        })
        .collect()
}
