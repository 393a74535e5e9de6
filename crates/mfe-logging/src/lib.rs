//! ---
//! mfe_section: "03-logging"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Structured logging adapters for micro-app lifecycle events."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Lifecycle-aware logging helpers shared by the orchestrator crates.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;

#[doc(hidden)]
pub use tracing as __tracing;

/// Initialize a baseline tracing subscriber suitable for tests and development.
pub fn init() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(subscriber_fmt::layer())
        .try_init();
}

/// Structured logging context propagated by the convenience macros.
#[derive(Debug, Default, Clone)]
pub struct LogContext<'a> {
    /// Micro-app name associated with the log event.
    pub app: Option<&'a str>,
    /// Lifecycle status label at the time of the event.
    pub status: Option<&'a str>,
    /// Location path that triggered the event.
    pub route: Option<&'a str>,
    /// Entry URL of the micro-app.
    pub entry: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty logging context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a micro-app name.
    pub fn with_app(mut self, app: &'a str) -> Self {
        self.app = Some(app);
        self
    }

    /// Attach a lifecycle status label.
    pub fn with_status(mut self, status: &'a str) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach the routed location path.
    pub fn with_route(mut self, route: &'a str) -> Self {
        self.route = Some(route);
        self
    }

    /// Attach the entry URL.
    pub fn with_entry(mut self, entry: &'a str) -> Self {
        self.entry = Some(entry);
        self
    }
}

/// High-level outcome used when emitting lifecycle log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed successfully.
    Success,
    /// The operation completed with a recoverable anomaly.
    Degraded,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Degraded => "degraded",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a standardized lifecycle event with an outcome.
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let default_ctx = LogContext::default();
    let ctx = context.unwrap_or(&default_ctx);
    // `tracing::event!` needs a constant level per call site.
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            app = ctx.app.unwrap_or(""),
            status = ctx.status.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            entry = ctx.entry.unwrap_or(""),
            message = %message
        ),
        SystemEventOutcome::Degraded => tracing::event!(
            Level::WARN,
            event,
            outcome = outcome.as_str(),
            app = ctx.app.unwrap_or(""),
            status = ctx.status.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            entry = ctx.entry.unwrap_or(""),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            app = ctx.app.unwrap_or(""),
            status = ctx.status.unwrap_or(""),
            route = ctx.route.unwrap_or(""),
            entry = ctx.entry.unwrap_or(""),
            message = %message
        ),
    }
}
