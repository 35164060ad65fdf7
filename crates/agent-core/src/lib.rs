//! Core abstractions for the analysis orchestration engine
//!
//! This crate defines the agent capability, the context an agent runs in, and
//! the data model shared by every crate in the workspace.

pub mod agent;
pub mod context;
pub mod error;
pub mod types;

pub use agent::{Agent, AgentServices};
pub use context::AgentContext;
pub use error::{Error, Result};
pub use types::{
    AgentKind, AgentResult, AgentStatus, AnalysisRequest, AnalysisType, Bar, CompletionPrompt,
    PortfolioPosition,
};
