//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Error taxonomy for registration, loading, and lifecycle hooks."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::any::Any;
use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::HookKind;
use crate::status::AppStatus;

pub type Result<T> = std::result::Result<T, MfeError>;

/// Registration and bookkeeping failures raised by the app registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("micro-app '{0}' is already registered")]
    DuplicateName(String),
    #[error("micro-app '{0}' is not registered")]
    UnknownApp(String),
    #[error("micro-app '{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: AppStatus,
        to: AppStatus,
    },
    #[error("micro-app '{name}' has an invalid active rule pattern: {source}")]
    InvalidRule {
        name: String,
        #[source]
        source: regex::Error,
    },
}

/// Failure to retrieve a single document or script.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {message}")]
    Network { url: String, message: String },
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("http client could not be constructed: {0}")]
    Client(String),
}

/// Failure to turn an entry into a lifecycle handle.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("entry '{entry}' is not a loadable url: {reason}")]
    InvalidEntry { entry: String, reason: String },
    #[error("entry fetch failed: {0}")]
    EntryFetch(#[from] FetchError),
    #[error("loading '{entry}' exceeded {after:?}")]
    Timeout { entry: String, after: Duration },
}

/// A lifecycle hook rejected, panicked, or did not settle in time.
#[derive(Debug, Error)]
pub enum LifecycleHookError {
    #[error("{hook} hook of '{app}' failed: {source}")]
    Failed {
        app: String,
        hook: HookKind,
        #[source]
        source: anyhow::Error,
    },
    #[error("{hook} hook of '{app}' did not settle within {after:?}")]
    Timeout {
        app: String,
        hook: HookKind,
        after: Duration,
    },
    #[error("host {stage} hook for '{app}' failed: {source}")]
    Host {
        app: String,
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// A single script failed to evaluate; the load continues with the next one.
#[derive(Debug, Error)]
#[error("script evaluation failed: {0}")]
pub struct EvaluationError(pub String);

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Text carried by a caught panic.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container '{0}' does not exist")]
    NotFound(String),
}

/// Crate-level error wrapping every failure class.
#[derive(Debug, Error)]
pub enum MfeError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Hook(#[from] LifecycleHookError),
    #[error(transparent)]
    Container(#[from] ContainerError),
}
