//! External capability boundaries: model inference and context retrieval.

pub mod anthropic;
pub mod model;
pub mod retrieval;

pub use model::{InvocationMode, ModelCallResult, ModelInvoker};
pub use retrieval::{Retriever, StaticRetriever};
