//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Shared primitives and utilities for the core runtime."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
//! Core shared primitives for the micro-frontend runtime workspace.
//! This crate exposes configuration loading and logging initialisation
//! consumed by the orchestrator and the host binary.

pub mod config;
pub mod logging;

pub use config::{
    ActiveRuleConfig, AppConfig, LoadedAppConfig, LoggingConfig, MicroAppConfig,
    OrchestratorConfig,
};
pub use logging::{init_tracing, LogFormat};
