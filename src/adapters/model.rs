//! Model invocation boundary.
//!
//! The engine is indifferent to which backend answers a prompt; it depends
//! only on this three-mode contract. Each mode returns final text, token
//! counts, and the model identifier used.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::AgentRole;

/// How a step's prompt is dispatched to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Single request/response. Fast structured extraction.
    Direct,
    /// Multi-turn with intermediate tool calls, bounded turn count.
    ToolAugmented,
    /// Extra internal deliberation before the final answer, at higher
    /// token cost.
    ExtendedReasoning,
}

impl InvocationMode {
    /// Mode appropriate to an agent role: planners need fast extraction,
    /// researchers work documents with tools, synthesis roles get extended
    /// reasoning. Unknown roles take the direct path.
    pub fn for_role(role: &AgentRole) -> Self {
        match role {
            AgentRole::Planner => Self::Direct,
            AgentRole::Researcher => Self::ToolAugmented,
            AgentRole::Strategist | AgentRole::Editor => Self::ExtendedReasoning,
            AgentRole::Other(_) => Self::Direct,
        }
    }
}

/// Outcome of one model invocation, across all modes.
#[derive(Debug, Clone)]
pub struct ModelCallResult {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
}

/// Capability interface for running a prompt against a language model.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(
        &self,
        mode: InvocationMode,
        system: &str,
        message: &str,
    ) -> Result<ModelCallResult>;
}
