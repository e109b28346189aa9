//! Domain data model for workflow runs and deliverables.
//!
//! Everything here crosses a serialization boundary: templates are loaded
//! from the catalog, run records are persisted to the run store, and
//! deliverables are returned to API clients.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Agent roles ───────────────────────────────────────────────────────

/// Functional category of a workflow step. Determines the invocation mode
/// and the default instructions applied when a step carries none of its own.
/// Open-ended: templates may declare roles beyond the four built-ins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AgentRole {
    Planner,
    Researcher,
    Strategist,
    Editor,
    Other(String),
}

impl AgentRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Planner => "planner",
            Self::Researcher => "researcher",
            Self::Strategist => "strategist",
            Self::Editor => "editor",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl FromStr for AgentRole {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "planner" => Self::Planner,
            "researcher" => Self::Researcher,
            "strategist" => Self::Strategist,
            "editor" => Self::Editor,
            other => Self::Other(other.to_string()),
        })
    }
}

impl Serialize for AgentRole {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AgentRole {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(Self::Other(s)))
    }
}

// ── Workflow templates ────────────────────────────────────────────────

/// Immutable workflow definition. Loaded once per run, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Icon identifier for the consuming UI's icon set.
    #[serde(default)]
    pub icon: String,
    pub category: String,
    pub tagline: String,
    #[serde(default)]
    pub what_you_get: Vec<String>,
    #[serde(default = "default_credit_cost")]
    pub credit_cost: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub config: WorkflowConfig,
}

fn default_credit_cost() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub steps: Vec<WorkflowStep>,
    pub output_schema: String,
    #[serde(default)]
    pub form_fields: Vec<FormField>,
}

/// One unit of work within a template, bound to an agent role and
/// dependency/grouping annotations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: String,
    pub agent_role: AgentRole,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Step-level instruction override. When absent, the role default from
    /// the prompt catalog applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Step ids that must complete before this step may start.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Steps sharing a group label run concurrently once their dependencies
    /// are satisfied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_group: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormField {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FormFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FormFieldOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FormFieldType {
    Text,
    Textarea,
    Select,
    Checkbox,
    FileSelect,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormFieldOption {
    pub label: String,
    pub value: String,
}

// ── Run records ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// Default/absence state. Never persisted to a run's progress log.
    #[default]
    Waiting,
    Running,
    Completed,
    Error,
}

/// One event in a run's append-only progress log. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub agent: String,
    pub role: AgentRole,
    pub status: ProgressStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ProgressEntry {
    pub fn now(
        agent: &str,
        role: AgentRole,
        status: ProgressStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.to_string(),
            role,
            status,
            message: message.into(),
            timestamp: Utc::now(),
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

/// Persisted record of one workflow run. Status transitions are monotonic:
/// `pending` → `running` exactly once, then exactly one terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub workspace_id: String,
    pub template_id: String,
    pub input: BTreeMap<String, Value>,
    pub file_ids: Vec<String>,
    pub status: RunStatus,
    pub progress: Vec<ProgressEntry>,
    pub result: Option<Deliverable>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn new(
        id: &str,
        workspace_id: &str,
        template_id: &str,
        input: BTreeMap<String, Value>,
        file_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.to_string(),
            workspace_id: workspace_id.to_string(),
            template_id: template_id.to_string(),
            input,
            file_ids,
            status: RunStatus::Pending,
            progress: Vec::new(),
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}

// ── Retrieved context ─────────────────────────────────────────────────

/// A ranked excerpt of source material supplied to agents as background.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub file_id: String,
    pub workspace_id: String,
    pub chunk_index: u32,
    pub content: String,
    #[serde(default)]
    pub token_count: u32,
    pub file_name: String,
    pub similarity: f64,
}

// ── Deliverables ──────────────────────────────────────────────────────

/// Final structured artifact produced by a completed run. Created once by
/// the engine; only checklist items are mutated afterwards, and only by the
/// consuming application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deliverable {
    pub id: String,
    pub workspace_id: String,
    pub run_id: String,
    pub title: String,
    pub content: DeliverableContent,
    pub checklist: Vec<ChecklistItem>,
    pub sources: Vec<DeliverableSource>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeliverableContent {
    pub executive_summary: String,
    pub findings: Vec<Finding>,
    pub recommendations: Vec<Recommendation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan_30_60_90: Vec<PlanPhase>,
    #[serde(default)]
    pub risks_assumptions: Vec<String>,
}

/// Lenient by design: agent JSON routinely omits citations or leaves
/// bodies empty, and a partial finding is still worth carrying forward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub effort: String,
    #[serde(default)]
    pub impact: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanPhase {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub text: String,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Bucket,
    Web,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverableSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    pub relevance: String,
}

// ── Agent step outputs ────────────────────────────────────────────────

/// Parsed output of one workflow step.
///
/// Agent steps legally return incomplete or off-schema JSON, so the
/// structured variant keeps every known field optional and preserves
/// unknown fields verbatim; assembly matches on field presence. Text that
/// fails to parse as a JSON object at all lands in the raw variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentOutput {
    Raw { raw_text: String },
    Structured(StepOutput),
}

impl AgentOutput {
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw {
            raw_text: text.into(),
        }
    }

    pub fn as_structured(&self) -> Option<&StepOutput> {
        match self {
            Self::Structured(out) => Some(out),
            Self::Raw { .. } => None,
        }
    }

    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Raw { raw_text } => Some(raw_text),
            Self::Structured(_) => None,
        }
    }
}

/// Known fields across all role output shapes: the planner's question set,
/// researcher findings, strategist recommendations and plan, and the
/// editor's consolidated document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Vec<Finding>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<Recommendation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_30_60_90: Option<Vec<PlanPhase>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risks_assumptions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checklist: Option<Vec<ChecklistDraft>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_used: Option<Vec<SourceDraft>>,
    /// Fields outside the known shapes (planner question lists, researcher
    /// working notes) ride along untouched and reach downstream steps.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Checklist item as emitted by the editor, before the engine assigns ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistDraft {
    pub text: String,
}

/// Source reference as emitted by the editor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDraft {
    pub name: String,
    #[serde(default)]
    pub relevance: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_role_round_trips_unknown_values() {
        let role: AgentRole = "fact_checker".parse().unwrap();
        assert_eq!(role, AgentRole::Other("fact_checker".to_string()));
        let json = serde_json::to_string(&role).unwrap();
        assert_eq!(json, "\"fact_checker\"");
        let back: AgentRole = serde_json::from_str(&json).unwrap();
        assert_eq!(back, role);
    }

    #[test]
    fn run_status_terminal_states() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn run_status_wire_form_is_snake_case() {
        let json = serde_json::to_string(&RunStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
        assert_eq!("failed".parse::<RunStatus>().unwrap(), RunStatus::Failed);
        assert!("bogus".parse::<RunStatus>().is_err());
    }

    #[test]
    fn step_output_accepts_partial_shapes() {
        let out: StepOutput = serde_json::from_str(
            r#"{"findings": [{"title": "Margin compression"}], "key_areas": ["pricing"]}"#,
        )
        .unwrap();
        let findings = out.findings.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "Margin compression");
        assert!(findings[0].citations.is_empty());
        assert!(out.extra.contains_key("key_areas"));
    }

    #[test]
    fn agent_output_raw_serializes_as_raw_text_object() {
        let out = AgentOutput::raw("not json");
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["raw_text"], "not json");
    }

    #[test]
    fn progress_entry_waiting_is_default() {
        assert_eq!(ProgressStatus::default(), ProgressStatus::Waiting);
    }
}
