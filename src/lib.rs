//! Multi-agent workflow engine that turns business documents into
//! structured consulting deliverables.
//!
//! A workflow template declares a set of agent-role steps with
//! dependencies and parallel groups. The engine plans them into execution
//! groups, runs each step against a language model with retrieved document
//! context and prior step outputs, records progress as it goes, and
//! assembles the editor's consolidated output (with fallbacks) into a
//! final deliverable. An HTTP surface starts runs and streams progress.

pub mod adapters;
pub mod config;
pub mod engine;
pub mod errors;
pub mod models;
pub mod progress;
pub mod prompts;
pub mod server;
pub mod store;
pub mod templates;
