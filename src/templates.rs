//! Workflow template catalog.
//!
//! Ships the built-in templates and optionally merges a YAML catalog from
//! disk. Lookup is by template id; the engine validates a template's step
//! graph separately before executing it.

use std::path::Path;

use crate::errors::TemplateError;
use crate::models::{
    AgentRole, FormField, FormFieldOption, FormFieldType, WorkflowConfig, WorkflowStep,
    WorkflowTemplate,
};

pub struct TemplateCatalog {
    templates: Vec<WorkflowTemplate>,
}

impl TemplateCatalog {
    /// Catalog with only the built-in templates.
    pub fn builtin() -> Self {
        Self {
            templates: vec![research_sprint(), growth_plan(), sop_builder()],
        }
    }

    /// Catalog over an explicit template set. Used when the caller owns
    /// the templates, for example embedded deployments and tests.
    pub fn from_templates(templates: Vec<WorkflowTemplate>) -> Self {
        Self { templates }
    }

    /// Built-ins plus templates parsed from a YAML file. A file template
    /// with an id matching a built-in replaces it.
    pub fn with_yaml_file(path: &Path) -> Result<Self, TemplateError> {
        let raw = std::fs::read_to_string(path).map_err(TemplateError::Io)?;
        let loaded: Vec<WorkflowTemplate> =
            serde_yaml::from_str(&raw).map_err(TemplateError::Parse)?;

        let mut catalog = Self::builtin();
        for template in loaded {
            catalog.templates.retain(|t| t.id != template.id);
            catalog.templates.push(template);
        }
        Ok(catalog)
    }

    pub fn list(&self) -> &[WorkflowTemplate] {
        &self.templates
    }

    pub fn get(&self, id: &str) -> Result<&WorkflowTemplate, TemplateError> {
        self.templates
            .iter()
            .find(|t| t.id == id && t.is_active)
            .ok_or_else(|| TemplateError::NotFound { id: id.to_string() })
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

// ── Built-in templates ────────────────────────────────────────────────

fn step(
    id: &str,
    role: AgentRole,
    name: &str,
    description: &str,
    depends_on: &[&str],
    parallel_group: Option<&str>,
) -> WorkflowStep {
    WorkflowStep {
        id: id.to_string(),
        agent_role: role,
        name: name.to_string(),
        description: description.to_string(),
        system_prompt: None,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        parallel_group: parallel_group.map(|s| s.to_string()),
    }
}

fn textarea(id: &str, label: &str, placeholder: &str, required: bool) -> FormField {
    FormField {
        id: id.to_string(),
        label: label.to_string(),
        field_type: FormFieldType::Textarea,
        placeholder: Some(placeholder.to_string()),
        required,
        options: Vec::new(),
    }
}

fn text(id: &str, label: &str, placeholder: &str, required: bool) -> FormField {
    FormField {
        id: id.to_string(),
        label: label.to_string(),
        field_type: FormFieldType::Text,
        placeholder: Some(placeholder.to_string()),
        required,
        options: Vec::new(),
    }
}

fn research_sprint() -> WorkflowTemplate {
    WorkflowTemplate {
        id: "research-sprint".to_string(),
        name: "Research Sprint".to_string(),
        description: "Deep-dive into your market landscape, competitors, and customer \
                      segments. Your research team scans your business files, analyzes \
                      the competitive landscape, and maps out your market position."
            .to_string(),
        icon: "Search".to_string(),
        category: "Research".to_string(),
        tagline: "Know your market in minutes, not months.".to_string(),
        what_you_get: vec![
            "Market landscape overview".to_string(),
            "Competitor profiles & positioning".to_string(),
            "Customer segment analysis".to_string(),
            "Opportunity gaps identified".to_string(),
            "Action items & next steps".to_string(),
        ],
        credit_cost: 1,
        is_active: true,
        config: WorkflowConfig {
            output_schema: "findings".to_string(),
            form_fields: vec![
                textarea(
                    "business_description",
                    "Describe your business",
                    "e.g., We're a residential plumbing company in Austin, TX serving homeowners...",
                    true,
                ),
                textarea(
                    "target_market",
                    "Who is your target market?",
                    "e.g., Homeowners in Austin metro area, ages 30-55, household income $75K+",
                    true,
                ),
                textarea(
                    "competitors",
                    "Key competitors (optional)",
                    "e.g., ABC Plumbing, QuickFix Plumbing, Roto-Rooter...",
                    false,
                ),
                FormField {
                    id: "focus_areas".to_string(),
                    label: "Focus areas".to_string(),
                    field_type: FormFieldType::Checkbox,
                    placeholder: None,
                    required: false,
                    options: vec![
                        FormFieldOption {
                            label: "Market size & trends".to_string(),
                            value: "market_size".to_string(),
                        },
                        FormFieldOption {
                            label: "Competitor analysis".to_string(),
                            value: "competitors".to_string(),
                        },
                        FormFieldOption {
                            label: "Customer segments".to_string(),
                            value: "customers".to_string(),
                        },
                        FormFieldOption {
                            label: "Pricing landscape".to_string(),
                            value: "pricing".to_string(),
                        },
                    ],
                },
            ],
            steps: vec![
                step(
                    "plan",
                    AgentRole::Planner,
                    "Planner",
                    "Analyzes your goal and creates a research plan",
                    &[],
                    None,
                ),
                step(
                    "research_market",
                    AgentRole::Researcher,
                    "Market Researcher",
                    "Researches market landscape and trends",
                    &["plan"],
                    Some("research"),
                ),
                step(
                    "research_competitors",
                    AgentRole::Researcher,
                    "Competitive Analyst",
                    "Analyzes competitors and positioning",
                    &["plan"],
                    Some("research"),
                ),
                step(
                    "strategize",
                    AgentRole::Strategist,
                    "Strategist",
                    "Synthesizes findings into recommendations",
                    &["research_market", "research_competitors"],
                    None,
                ),
                step(
                    "edit",
                    AgentRole::Editor,
                    "Editor",
                    "Polishes the final deliverable",
                    &["strategize"],
                    None,
                ),
            ],
        },
    }
}

fn growth_plan() -> WorkflowTemplate {
    WorkflowTemplate {
        id: "growth-plan".to_string(),
        name: "90-Day Growth Plan".to_string(),
        description: "Get a strategic, actionable growth plan with channels, offers, \
                      experiments, and KPIs. Your strategy team builds a prioritized \
                      roadmap calibrated to your business data."
            .to_string(),
        icon: "TrendingUp".to_string(),
        category: "Strategy".to_string(),
        tagline: "A strategic plan. Not a to-do list.".to_string(),
        what_you_get: vec![
            "Growth strategy overview".to_string(),
            "Channel-by-channel plan".to_string(),
            "30/60/90 day milestones".to_string(),
            "Experiment ideas with expected impact".to_string(),
        ],
        credit_cost: 1,
        is_active: true,
        config: WorkflowConfig {
            output_schema: "plan_30_60_90".to_string(),
            form_fields: vec![
                textarea(
                    "business_description",
                    "Describe your business",
                    "What do you sell, to whom, and how?",
                    true,
                ),
                textarea(
                    "growth_goal",
                    "What growth goal are you targeting?",
                    "e.g., Grow monthly revenue from $40K to $60K within 90 days",
                    true,
                ),
                textarea(
                    "constraints",
                    "Budget or capacity constraints (optional)",
                    "e.g., $2K/month marketing budget, owner works in the field 4 days/week",
                    false,
                ),
            ],
            steps: vec![
                step(
                    "plan",
                    AgentRole::Planner,
                    "Planner",
                    "Scopes the growth analysis",
                    &[],
                    None,
                ),
                step(
                    "research_business",
                    AgentRole::Researcher,
                    "Business Analyst",
                    "Analyzes current performance and unit economics",
                    &["plan"],
                    Some("analysis"),
                ),
                step(
                    "research_channels",
                    AgentRole::Researcher,
                    "Channel Researcher",
                    "Evaluates acquisition channels and offers",
                    &["plan"],
                    Some("analysis"),
                ),
                step(
                    "strategize",
                    AgentRole::Strategist,
                    "Growth Strategist",
                    "Builds the prioritized 30/60/90 roadmap",
                    &["research_business", "research_channels"],
                    None,
                ),
                step(
                    "edit",
                    AgentRole::Editor,
                    "Editor",
                    "Assembles the final growth plan",
                    &["strategize"],
                    None,
                ),
            ],
        },
    }
}

fn sop_builder() -> WorkflowTemplate {
    WorkflowTemplate {
        id: "sop-builder".to_string(),
        name: "SOP Builder".to_string(),
        description: "Turn your messy documents, notes, and tribal knowledge into clean, \
                      standardized operating procedures. Your ops team reads your docs and \
                      outputs processes your team can actually follow."
            .to_string(),
        icon: "ClipboardList".to_string(),
        category: "Operations".to_string(),
        tagline: "Turn tribal knowledge into real processes.".to_string(),
        what_you_get: vec![
            "Standardized procedure documents".to_string(),
            "Step-by-step workflows".to_string(),
            "Role assignments & responsibilities".to_string(),
            "Quality checkpoints".to_string(),
            "Training checklist".to_string(),
        ],
        credit_cost: 1,
        is_active: true,
        config: WorkflowConfig {
            output_schema: "findings".to_string(),
            form_fields: vec![
                text(
                    "process_name",
                    "What process do you want to document?",
                    "e.g., New customer onboarding, Invoice processing, Hiring workflow...",
                    true,
                ),
                textarea(
                    "process_description",
                    "Describe how this process works today",
                    "e.g., When a new customer signs up, Sarah sends them a welcome email, \
                     then John sets up their account...",
                    true,
                ),
                text(
                    "audience",
                    "Who will use this SOP?",
                    "e.g., New hires, operations team, all staff...",
                    false,
                ),
                textarea(
                    "pain_points",
                    "What goes wrong with this process today?",
                    "e.g., Steps get skipped, different people do it differently, training \
                     takes too long...",
                    false,
                ),
            ],
            // Fully sequential: every step depends on the previous one.
            steps: vec![
                step(
                    "plan",
                    AgentRole::Planner,
                    "Planner",
                    "Maps the process and identifies documentation needs",
                    &[],
                    None,
                ),
                step(
                    "research_docs",
                    AgentRole::Researcher,
                    "Document Analyst",
                    "Extracts process details from your uploaded files",
                    &["plan"],
                    None,
                ),
                step(
                    "strategize",
                    AgentRole::Strategist,
                    "Process Designer",
                    "Structures the optimal workflow and identifies gaps",
                    &["research_docs"],
                    None,
                ),
                step(
                    "edit",
                    AgentRole::Editor,
                    "Technical Writer",
                    "Produces the polished SOP document",
                    &["strategize"],
                    None,
                ),
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::planner;

    #[test]
    fn builtin_catalog_lookup() {
        let catalog = TemplateCatalog::builtin();
        assert!(catalog.get("research-sprint").is_ok());
        assert!(catalog.get("growth-plan").is_ok());
        assert!(catalog.get("sop-builder").is_ok());
        assert!(matches!(
            catalog.get("nope"),
            Err(TemplateError::NotFound { .. })
        ));
    }

    #[test]
    fn sop_builder_plans_fully_sequentially() {
        let catalog = TemplateCatalog::builtin();
        let template = catalog.get("sop-builder").unwrap();
        let groups = planner::plan(&template.config.steps);
        assert_eq!(groups.len(), 4);
        assert!(groups.iter().all(|g| g.len() == 1));
        let order: Vec<&str> = groups.iter().map(|g| g[0].id.as_str()).collect();
        assert_eq!(order, vec!["plan", "research_docs", "strategize", "edit"]);
    }

    #[test]
    fn builtin_step_graphs_validate() {
        for template in TemplateCatalog::builtin().list() {
            planner::validate(&template.config.steps)
                .unwrap_or_else(|e| panic!("template {} invalid: {e}", template.id));
        }
    }

    #[test]
    fn templates_round_trip_through_yaml() {
        let yaml = serde_yaml::to_string(TemplateCatalog::builtin().list()).unwrap();
        let back: Vec<WorkflowTemplate> = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back[0].config.steps.len(), 5);
    }
}
