//! Prompt templates for the analysis agents
//!
//! Templates are organized into:
//! - `system`: System prompts for each agent kind
//! - `user`: User message templates rendered with the agent's inputs
//!
//! All templates are rendered with minijinja.

mod system;
mod user;

pub use system::system_prompt;
pub use user::{FUNDAMENTAL_USER, RISK_USER, SENTIMENT_USER, TECHNICAL_USER};

use agent_core::{Error, Result};
use minijinja::Environment;
use minijinja::value::Value;
use serde::Serialize;

/// Render a template string with serializable variables
pub fn render<S: Serialize>(template: &str, vars: &S) -> Result<String> {
    let mut env = Environment::new();
    env.add_filter("pct", |v: f64| format!("{:.1}%", v * 100.0));
    env.add_filter("fixed", |v: f64| format!("{v:.2}"));

    env.render_str(template, Value::from_serialize(vars))
        .map_err(|e| Error::ProcessingFailed(format!("prompt rendering failed: {e}")))
}
