//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Registered micro-app descriptors and their lifecycle status."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use mfe_common::config::{ActiveRuleConfig, MicroAppConfig};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::lifecycle::LifecycleHandle;
use crate::matcher::ActiveRule;
use crate::status::AppStatus;

/// Registration input for a micro-app.
#[derive(Debug, Clone)]
pub struct MicroAppSpec {
    pub name: String,
    pub entry: String,
    pub container: String,
    pub active_rule: ActiveRule,
}

impl MicroAppSpec {
    pub fn new(
        name: impl Into<String>,
        entry: impl Into<String>,
        container: impl Into<String>,
        active_rule: ActiveRule,
    ) -> Self {
        Self {
            name: name.into(),
            entry: entry.into(),
            container: container.into(),
            active_rule,
        }
    }
}

impl TryFrom<&MicroAppConfig> for MicroAppSpec {
    type Error = RegistryError;

    fn try_from(config: &MicroAppConfig) -> Result<Self, Self::Error> {
        let active_rule = match &config.active_rule {
            ActiveRuleConfig::Prefix(prefix) => ActiveRule::prefix(prefix.clone()),
            ActiveRuleConfig::Pattern(pattern) => {
                ActiveRule::pattern(pattern).map_err(|source| RegistryError::InvalidRule {
                    name: config.name.clone(),
                    source,
                })?
            }
        };
        Ok(Self::new(
            config.name.clone(),
            config.entry.clone(),
            config.container.clone(),
            active_rule,
        ))
    }
}

/// A registered micro-app together with its orchestration state.
#[derive(Debug, Clone)]
pub struct MicroAppDescriptor {
    pub name: String,
    pub entry: String,
    /// Selector of the region the app renders into; resolved at mount time.
    pub container: String,
    pub active_rule: ActiveRule,
    status: AppStatus,
    lifecycle: Option<LifecycleHandle>,
    markup: Option<String>,
    bootstrapped: bool,
    last_error: Option<String>,
    last_transition_at: DateTime<Utc>,
}

impl MicroAppDescriptor {
    fn from_spec(spec: MicroAppSpec) -> Self {
        Self {
            name: spec.name,
            entry: spec.entry,
            container: spec.container,
            active_rule: spec.active_rule,
            status: AppStatus::NotLoaded,
            lifecycle: None,
            markup: None,
            bootstrapped: false,
            last_error: None,
            last_transition_at: Utc::now(),
        }
    }

    pub fn status(&self) -> AppStatus {
        self.status
    }

    pub fn lifecycle(&self) -> Option<&LifecycleHandle> {
        self.lifecycle.as_ref()
    }

    /// Markup of the last successful load, used to populate the container.
    pub fn markup(&self) -> Option<&str> {
        self.markup.as_deref()
    }

    /// Bootstrap already ran for the current load.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_transition_at(&self) -> DateTime<Utc> {
        self.last_transition_at
    }

    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            name: self.name.clone(),
            status: self.status,
            has_lifecycle: self.lifecycle.is_some(),
            last_error: self.last_error.clone(),
            last_transition_at: self.last_transition_at,
        }
    }
}

/// Serializable view of a descriptor for operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppSnapshot {
    pub name: String,
    pub status: AppStatus,
    pub has_lifecycle: bool,
    pub last_error: Option<String>,
    pub last_transition_at: DateTime<Utc>,
}

/// Ordered collection of registered micro-apps.
///
/// Queries are open to anyone; mutations are reserved for the orchestrator.
#[derive(Debug, Default)]
pub struct AppRegistry {
    apps: Mutex<Vec<MicroAppDescriptor>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a batch of apps. Any name collision rejects the whole batch.
    pub fn register<I>(&self, specs: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = MicroAppSpec>,
    {
        let specs: Vec<MicroAppSpec> = specs.into_iter().collect();
        let mut apps = self.apps.lock();
        let mut names: HashSet<&str> = apps.iter().map(|app| app.name.as_str()).collect();
        for spec in &specs {
            if !names.insert(spec.name.as_str()) {
                return Err(RegistryError::DuplicateName(spec.name.clone()));
            }
        }
        for spec in specs {
            info!(app = %spec.name, entry = %spec.entry, container = %spec.container, "micro-app registered");
            apps.push(MicroAppDescriptor::from_spec(spec));
        }
        Ok(())
    }

    /// First descriptor, in registration order, satisfying `predicate`.
    ///
    /// The predicate runs on a snapshot, so it may query the registry itself.
    pub fn find<P>(&self, predicate: P) -> Option<MicroAppDescriptor>
    where
        P: Fn(&MicroAppDescriptor) -> bool,
    {
        self.all().into_iter().find(|app| predicate(app))
    }

    pub fn get(&self, name: &str) -> Option<MicroAppDescriptor> {
        self.find(|app| app.name == name)
    }

    pub fn all(&self) -> Vec<MicroAppDescriptor> {
        self.apps.lock().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.apps.lock().iter().map(|app| app.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.apps.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<AppSnapshot> {
        self.apps
            .lock()
            .iter()
            .map(MicroAppDescriptor::snapshot)
            .collect()
    }

    /// Move `name` to `next`, returning the previous status.
    pub(crate) fn update_status(
        &self,
        name: &str,
        next: AppStatus,
    ) -> Result<AppStatus, RegistryError> {
        self.with_app(name, |app| {
            let previous = app.status;
            if !previous.can_transition_to(next) {
                return Err(RegistryError::InvalidTransition {
                    name: name.to_owned(),
                    from: previous,
                    to: next,
                });
            }
            app.status = next;
            app.last_transition_at = Utc::now();
            if next != AppStatus::LoadError {
                app.last_error = None;
            }
            debug!(app = %name, from = %previous, to = %next, "status transition");
            Ok(previous)
        })?
    }

    /// Replace the lifecycle of a fresh load; bootstrap must run again.
    pub(crate) fn set_loaded(
        &self,
        name: &str,
        lifecycle: LifecycleHandle,
        markup: String,
    ) -> Result<(), RegistryError> {
        self.with_app(name, |app| {
            app.lifecycle = Some(lifecycle);
            app.markup = Some(markup);
            app.bootstrapped = false;
        })
    }

    pub(crate) fn mark_bootstrapped(&self, name: &str) -> Result<(), RegistryError> {
        self.with_app(name, |app| app.bootstrapped = true)
    }

    /// Forget the cached lifecycle so the next match reloads.
    pub(crate) fn evict_lifecycle(&self, name: &str) -> Result<(), RegistryError> {
        self.with_app(name, |app| {
            app.lifecycle = None;
            app.markup = None;
            app.bootstrapped = false;
        })
    }

    pub(crate) fn record_error(&self, name: &str, error: String) -> Result<(), RegistryError> {
        self.with_app(name, |app| app.last_error = Some(error))
    }

    fn with_app<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut MicroAppDescriptor) -> R,
    ) -> Result<R, RegistryError> {
        let mut apps = self.apps.lock();
        let app = apps
            .iter_mut()
            .find(|app| app.name == name)
            .ok_or_else(|| RegistryError::UnknownApp(name.to_owned()))?;
        Ok(f(app))
    }
}
