//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Shared primitives and utilities for the core runtime."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_load_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_hook_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_millis(15_000)
}

fn default_cache_lifecycles() -> bool {
    true
}

fn default_scheme() -> String {
    "http".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for a host page.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Entries seeded into the global state store before the first reroute.
    #[serde(default)]
    pub global_state: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub apps: Vec<MicroAppConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "MFE_CONFIG";

    /// Load configuration from disk, respecting the `MFE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(path.clone())?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Retrieve a micro-app declaration by name.
    pub fn app(&self, name: &str) -> Option<&MicroAppConfig> {
        self.apps.iter().find(|app| app.name == name)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for app in &self.apps {
            app.validate()?;
            if !seen.insert(app.name.as_str()) {
                return Err(anyhow!("micro-app '{}' declared more than once", app.name));
            }
        }
        if self.orchestrator.default_scheme.trim().is_empty() {
            return Err(anyhow!("orchestrator.default_scheme must not be empty"));
        }
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Timeouts and caching policy applied by the lifecycle orchestrator.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default = "default_load_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub load_timeout: Duration,
    #[serde(default = "default_hook_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub hook_timeout: Duration,
    #[serde(default = "default_fetch_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub fetch_timeout: Duration,
    #[serde(default = "default_cache_lifecycles")]
    pub cache_lifecycles: bool,
    /// Scheme prepended to protocol-relative or bare entries.
    #[serde(default = "default_scheme")]
    pub default_scheme: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            load_timeout: default_load_timeout(),
            hook_timeout: default_hook_timeout(),
            fetch_timeout: default_fetch_timeout(),
            cache_lifecycles: default_cache_lifecycles(),
            default_scheme: default_scheme(),
        }
    }
}

/// Declarative micro-app registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MicroAppConfig {
    pub name: String,
    pub entry: String,
    pub container: String,
    pub active_rule: ActiveRuleConfig,
}

impl MicroAppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(anyhow!("micro-app name must not be empty"));
        }
        if self.entry.trim().is_empty() {
            return Err(anyhow!("micro-app '{}' must declare an entry", self.name));
        }
        if self.container.trim().is_empty() {
            return Err(anyhow!("micro-app '{}' must declare a container", self.name));
        }
        if let ActiveRuleConfig::Pattern(pattern) = &self.active_rule {
            Regex::new(pattern).with_context(|| {
                format!("micro-app '{}' has an invalid active_rule pattern", self.name)
            })?;
        }
        Ok(())
    }
}

/// Activation rules expressible in configuration. Predicate rules are only
/// available programmatically.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActiveRuleConfig {
    Prefix(String),
    Pattern(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
