//! Shared utilities for the analysis workspace
//!
//! This crate provides the ambient pieces every binary needs: tracing setup
//! and application-level configuration.

pub mod config;
pub mod logging;

pub use config::{Config, ConfigError};
pub use logging::{LogFormat, init_tracing, init_tracing_with};
