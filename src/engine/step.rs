//! Runs a single workflow step: builds the agent's message from run
//! state, invokes the model, parses the reply, and records progress.

use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info};

use crate::adapters::{InvocationMode, ModelInvoker};
use crate::engine::context::RunContext;
use crate::errors::StepError;
use crate::models::{AgentOutput, ProgressEntry, ProgressStatus, WorkflowStep};
use crate::progress::ProgressRecorder;
use crate::prompts::prompt_for_role;

/// Execute one step against the model and record the outcome.
///
/// Progress entries land both in the run context (read by later steps and
/// by assembly) and in the persistent recorder (read by the status and
/// stream endpoints). An invocation failure records an error entry before
/// propagating so the run's log always explains what stopped it.
pub async fn run_step(
    ctx: &RunContext,
    recorder: &ProgressRecorder,
    invoker: &dyn ModelInvoker,
    step: &WorkflowStep,
) -> Result<(), StepError> {
    let started = Instant::now();
    let running = ProgressEntry::now(
        &step.name,
        step.agent_role.clone(),
        ProgressStatus::Running,
        format!("{} is working...", step.name),
    );
    ctx.record_progress(running.clone());
    recorder.append(&ctx.run_id, running).await;

    let system = step
        .system_prompt
        .as_deref()
        .unwrap_or_else(|| prompt_for_role(&step.agent_role));
    let message = build_user_message(ctx, step);
    let mode = InvocationMode::for_role(&step.agent_role);
    debug!(run_id = %ctx.run_id, step = %step.id, ?mode, "invoking model");

    let result = match invoker.invoke(mode, system, &message).await {
        Ok(result) => result,
        Err(err) => {
            let entry = ProgressEntry::now(
                &step.name,
                step.agent_role.clone(),
                ProgressStatus::Error,
                format!("{} failed: {err}", step.name),
            )
            .with_duration(started.elapsed().as_millis() as u64);
            ctx.record_progress(entry.clone());
            recorder.append(&ctx.run_id, entry).await;
            return Err(StepError::Invocation {
                step: step.id.clone(),
                message: err.to_string(),
            });
        }
    };

    ctx.add_tokens(result.input_tokens, result.output_tokens);
    ctx.record_output(&step.id, parse_agent_output(&result.content));

    let duration_ms = started.elapsed().as_millis() as u64;
    let completed = ProgressEntry::now(
        &step.name,
        step.agent_role.clone(),
        ProgressStatus::Completed,
        format!("{} finished.", step.name),
    )
    .with_duration(duration_ms);
    ctx.record_progress(completed.clone());
    recorder.append(&ctx.run_id, completed).await;
    info!(run_id = %ctx.run_id, step = %step.id, duration_ms, "step completed");

    Ok(())
}

/// Assemble the user-facing message: form input, retrieved document
/// chunks, and the outputs of every step that has already finished.
pub fn build_user_message(ctx: &RunContext, step: &WorkflowStep) -> String {
    let mut sections: Vec<String> = Vec::new();

    let mut input = String::from("=== USER INPUT ===\n");
    for (key, value) in &ctx.user_input {
        input.push_str(&format!("{key}: {}\n", render_input_value(value)));
    }
    sections.push(input);

    if ctx.chunks.is_empty() {
        sections.push(
            "=== BUSINESS DOCUMENTS ===\nNo documents were retrieved for this run. Work from the user input alone and say so where it limits your confidence.\n".to_string(),
        );
    } else {
        let mut docs = String::from("=== BUSINESS DOCUMENTS ===\n");
        for (i, chunk) in ctx.chunks.iter().enumerate() {
            docs.push_str(&format!(
                "--- Document {}: {} (chunk {}, relevance: {:.3}) ---\n{}\n",
                i + 1,
                chunk.file_name,
                chunk.chunk_index,
                chunk.similarity,
                chunk.content
            ));
        }
        sections.push(docs);
    }

    let outputs = ctx.outputs();
    if !outputs.is_empty() {
        let mut prior = String::from("=== PREVIOUS AGENT OUTPUTS ===\n");
        for (step_id, output) in &outputs {
            let rendered = serde_json::to_string_pretty(output)
                .unwrap_or_else(|_| output.raw_text().unwrap_or_default().to_string());
            prior.push_str(&format!("--- {step_id} ---\n{rendered}\n"));
        }
        sections.push(prior);
    }

    sections.push(format!("Your task: {}", step.description));
    sections.join("\n")
}

fn render_input_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a model reply into an agent output. Replies wrapped in a code
/// fence are unwrapped first; anything that is not valid JSON, or is JSON
/// with a shape we do not recognize, is kept verbatim as raw text.
pub fn parse_agent_output(content: &str) -> AgentOutput {
    let stripped = strip_code_fence(content);
    match serde_json::from_str::<AgentOutput>(stripped) {
        Ok(output) => output,
        Err(_) => AgentOutput::raw(content.trim()),
    }
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::models::{
        AgentRole, RetrievedChunk, WorkflowConfig, WorkflowTemplate,
    };

    fn template() -> WorkflowTemplate {
        WorkflowTemplate {
            id: "t".into(),
            name: "T".into(),
            description: String::new(),
            icon: String::new(),
            category: String::new(),
            tagline: String::new(),
            what_you_get: Vec::new(),
            credit_cost: 1,
            is_active: true,
            config: WorkflowConfig {
                steps: Vec::new(),
                output_schema: String::new(),
                form_fields: Vec::new(),
            },
        }
    }

    fn chunk(file_name: &str, index: u32, similarity: f64) -> RetrievedChunk {
        RetrievedChunk {
            id: format!("c-{file_name}-{index}"),
            file_id: format!("f-{file_name}"),
            workspace_id: "ws".into(),
            chunk_index: index,
            content: "chunk body".into(),
            token_count: 3,
            file_name: file_name.into(),
            similarity,
        }
    }

    fn step(role: AgentRole) -> WorkflowStep {
        WorkflowStep {
            id: "s1".into(),
            agent_role: role,
            name: "Analyst".into(),
            description: "Analyze the market".into(),
            system_prompt: None,
            depends_on: Vec::new(),
            parallel_group: None,
        }
    }

    #[test]
    fn message_labels_each_chunk_with_file_and_relevance() {
        let mut input = BTreeMap::new();
        input.insert("goal".to_string(), Value::String("grow revenue".into()));
        let ctx = RunContext::new(
            "r",
            "ws",
            template(),
            input,
            vec![chunk("deck.pdf", 2, 0.8215)],
        );
        let msg = build_user_message(&ctx, &step(AgentRole::Researcher));
        assert!(msg.contains("=== USER INPUT ===\ngoal: grow revenue"));
        assert!(msg.contains("--- Document 1: deck.pdf (chunk 2, relevance: 0.822) ---"));
        assert!(msg.contains("Your task: Analyze the market"));
    }

    #[test]
    fn message_states_when_no_documents_were_retrieved() {
        let ctx = RunContext::new("r", "ws", template(), BTreeMap::new(), Vec::new());
        let msg = build_user_message(&ctx, &step(AgentRole::Planner));
        assert!(msg.contains("No documents were retrieved"));
        assert!(!msg.contains("--- Document"));
    }

    #[test]
    fn message_includes_prior_outputs_in_completion_order() {
        let ctx = RunContext::new("r", "ws", template(), BTreeMap::new(), Vec::new());
        ctx.record_output("research_b", AgentOutput::raw("late start, finished first"));
        ctx.record_output("research_a", AgentOutput::raw("finished second"));
        let msg = build_user_message(&ctx, &step(AgentRole::Strategist));
        let b = msg.find("--- research_b ---").unwrap();
        let a = msg.find("--- research_a ---").unwrap();
        assert!(b < a);
    }

    #[test]
    fn fenced_json_parses_as_structured_output() {
        let reply = "```json\n{\"executive_summary\": \"All good.\"}\n```";
        let output = parse_agent_output(reply);
        let structured = output.as_structured().expect("structured");
        assert_eq!(structured.executive_summary.as_deref(), Some("All good."));
    }

    #[test]
    fn prose_reply_falls_back_to_raw_text() {
        let output = parse_agent_output("I could not produce JSON, sorry.");
        assert_eq!(output.raw_text(), Some("I could not produce JSON, sorry."));
    }

    #[test]
    fn raw_text_object_round_trips_as_raw() {
        let output = parse_agent_output("{\"raw_text\": \"verbatim\"}");
        assert_eq!(output.raw_text(), Some("verbatim"));
    }
}
