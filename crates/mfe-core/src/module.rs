//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Module records, pluggable script evaluation, and export normalisation."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::panic::{self, AssertUnwindSafe};

use indexmap::IndexMap;
use serde_json::Value;
use url::Url;

use crate::error::{panic_message, EvaluationError};
use crate::lifecycle::{Hook, HookKind, LifecycleHandle};

/// Name of the conventional default-export wrapper.
pub const DEFAULT_EXPORT: &str = "default";

/// A value assigned onto a module's export surface.
#[derive(Debug, Clone)]
pub enum Export {
    Hook(Hook),
    Namespace(ExportTable),
    Value(Value),
}

/// Ordered export surface. Later assignments to a name replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct ExportTable {
    entries: IndexMap<String, Export>,
}

impl ExportTable {
    pub fn insert(&mut self, name: impl Into<String>, export: Export) -> Option<Export> {
        self.entries.insert(name.into(), export)
    }

    pub fn insert_hook(&mut self, name: impl Into<String>, hook: Hook) -> Option<Export> {
        self.insert(name, Export::Hook(hook))
    }

    pub fn get(&self, name: &str) -> Option<&Export> {
        self.entries.get(name)
    }

    pub fn hook(&self, name: &str) -> Option<&Hook> {
        match self.entries.get(name) {
            Some(Export::Hook(hook)) => Some(hook),
            _ => None,
        }
    }

    pub fn namespace(&self, name: &str) -> Option<&ExportTable> {
        match self.entries.get(name) {
            Some(Export::Namespace(table)) => Some(table),
            _ => None,
        }
    }

    /// Nested table under `name`, replacing any non-namespace export there.
    pub fn namespace_mut(&mut self, name: &str) -> &mut ExportTable {
        let slot = self
            .entries
            .entry(name.to_owned())
            .or_insert_with(|| Export::Namespace(ExportTable::default()));
        if !matches!(slot, Export::Namespace(_)) {
            *slot = Export::Namespace(ExportTable::default());
        }
        match slot {
            Export::Namespace(table) => table,
            _ => unreachable!("slot was just set to a namespace"),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared execution context for every script of a single load.
#[derive(Debug, Default)]
pub struct ModuleRecord {
    pub exports: ExportTable,
    executed: usize,
}

impl ModuleRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts that evaluated successfully into this record.
    pub fn executed(&self) -> usize {
        self.executed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptOrigin {
    Inline,
    External(Url),
}

/// Resolved script body ready for evaluation.
#[derive(Debug, Clone)]
pub struct ScriptResource {
    /// Position of the script tag in the entry document.
    pub index: usize,
    pub origin: ScriptOrigin,
    pub body: String,
}

impl ScriptResource {
    pub fn label(&self) -> String {
        match &self.origin {
            ScriptOrigin::Inline => format!("inline#{}", self.index),
            ScriptOrigin::External(url) => url.to_string(),
        }
    }
}

/// Platform capability that executes script text into a module record.
pub trait ModuleEvaluator: Send + Sync {
    fn evaluate(
        &self,
        module: &mut ModuleRecord,
        script: &ScriptResource,
    ) -> Result<(), EvaluationError>;
}

impl<F> ModuleEvaluator for F
where
    F: Fn(&mut ModuleRecord, &ScriptResource) -> Result<(), EvaluationError> + Send + Sync,
{
    fn evaluate(
        &self,
        module: &mut ModuleRecord,
        script: &ScriptResource,
    ) -> Result<(), EvaluationError> {
        self(module, script)
    }
}

/// Evaluator that accepts every script and exports nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertEvaluator;

impl ModuleEvaluator for InertEvaluator {
    fn evaluate(
        &self,
        _module: &mut ModuleRecord,
        _script: &ScriptResource,
    ) -> Result<(), EvaluationError> {
        Ok(())
    }
}

/// Run `script` through `evaluator`, counting successful evaluations.
///
/// A panicking evaluator is reported as an [`EvaluationError`].
pub(crate) fn evaluate_into(
    evaluator: &dyn ModuleEvaluator,
    module: &mut ModuleRecord,
    script: &ScriptResource,
) -> Result<(), EvaluationError> {
    match panic::catch_unwind(AssertUnwindSafe(|| evaluator.evaluate(module, script))) {
        Ok(result) => result?,
        Err(payload) => {
            return Err(EvaluationError::new(format!(
                "evaluator panicked: {}",
                panic_message(payload.as_ref())
            )))
        }
    }
    module.executed += 1;
    Ok(())
}

/// Normalise a module's exports into a lifecycle handle.
///
/// Each hook is looked up under the `default` wrapper first and the flat
/// surface second; hooks found in neither place become no-ops.
pub fn resolve_lifecycle(module: &ModuleRecord) -> LifecycleHandle {
    let wrapper = module.exports.namespace(DEFAULT_EXPORT);
    let lookup = |kind: HookKind| {
        wrapper
            .and_then(|table| table.hook(kind.export_name()))
            .or_else(|| module.exports.hook(kind.export_name()))
            .cloned()
            .unwrap_or_else(Hook::noop)
    };
    LifecycleHandle {
        bootstrap: lookup(HookKind::Bootstrap),
        mount: lookup(HookKind::Mount),
        unmount: lookup(HookKind::Unmount),
    }
}
