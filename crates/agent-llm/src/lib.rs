//! Completion-service abstraction for the analysis engine
//!
//! This crate provides provider-agnostic types for asking a Large Language
//! Model to complete an analysis prompt. It includes:
//!
//! - Message types for LLM communication
//! - Completion request/response types, with a per-call timeout budget
//! - Provider trait for LLM implementations
//! - An Anthropic Messages API provider (behind the `anthropic` feature)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{ContentBlock, Message, MessageContent, Role};
pub use provider::LLMProvider;

// Provider implementations (feature-gated)
#[cfg(feature = "anthropic")]
pub mod providers;
