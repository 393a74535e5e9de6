//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Micro-app lifecycle contract and host-level hooks."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::container::Container;

/// The three hooks a micro-app may export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Bootstrap,
    Mount,
    Unmount,
}

impl HookKind {
    pub const ALL: [HookKind; 3] = [HookKind::Bootstrap, HookKind::Mount, HookKind::Unmount];

    /// Export name looked up in a loaded module.
    pub fn export_name(&self) -> &'static str {
        match self {
            HookKind::Bootstrap => "bootstrap",
            HookKind::Mount => "mount",
            HookKind::Unmount => "unmount",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.export_name())
    }
}

/// Context handed to every lifecycle hook.
#[derive(Debug, Clone)]
pub struct LifecycleProps {
    pub name: String,
    /// Absent during bootstrap; the container is only claimed at mount time.
    pub container: Option<Arc<dyn Container>>,
    /// Route prefix the app was matched under.
    pub basename: String,
    /// Lets an app distinguish embedded from standalone execution.
    pub powered_by_orchestrator: bool,
}

impl LifecycleProps {
    pub fn new(name: impl Into<String>, basename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            container: None,
            basename: basename.into(),
            powered_by_orchestrator: true,
        }
    }

    pub fn with_container(mut self, container: Arc<dyn Container>) -> Self {
        self.container = Some(container);
        self
    }
}

type HookFn = dyn Fn(LifecycleProps) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// Asynchronous lifecycle function exported by a micro-app.
#[derive(Clone)]
pub struct Hook {
    func: Arc<HookFn>,
    default: bool,
}

impl Hook {
    pub fn new<F, Fut>(func: F) -> Self
    where
        F: Fn(LifecycleProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            func: Arc::new(move |props: LifecycleProps| func(props).boxed()),
            default: false,
        }
    }

    /// Stand-in for a hook the app did not export.
    pub fn noop() -> Self {
        Self {
            func: Arc::new(
                |_props: LifecycleProps| -> BoxFuture<'static, anyhow::Result<()>> {
                    async { anyhow::Ok(()) }.boxed()
                },
            ),
            default: true,
        }
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    pub fn call(&self, props: LifecycleProps) -> BoxFuture<'static, anyhow::Result<()>> {
        (self.func)(props)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("default", &self.default)
            .finish()
    }
}

/// Canonical bootstrap/mount/unmount triple resolved from a loaded module.
#[derive(Debug, Clone)]
pub struct LifecycleHandle {
    pub bootstrap: Hook,
    pub mount: Hook,
    pub unmount: Hook,
}

impl LifecycleHandle {
    pub fn noop() -> Self {
        Self {
            bootstrap: Hook::noop(),
            mount: Hook::noop(),
            unmount: Hook::noop(),
        }
    }

    pub fn hook(&self, kind: HookKind) -> &Hook {
        match kind {
            HookKind::Bootstrap => &self.bootstrap,
            HookKind::Mount => &self.mount,
            HookKind::Unmount => &self.unmount,
        }
    }

    /// No hook was resolved from the module at all.
    pub fn is_fully_default(&self) -> bool {
        HookKind::ALL.iter().all(|kind| self.hook(*kind).is_default())
    }
}

impl Default for LifecycleHandle {
    fn default() -> Self {
        Self::noop()
    }
}

/// Host-page hooks run around every micro-app transition.
///
/// A failing `before_*` hook fails the step it guards; `after_*` failures are
/// only logged.
#[async_trait]
pub trait HostLifecycle: Send + Sync {
    async fn before_load(&self, _app: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_mount(&self, _app: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_mount(&self, _app: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_unmount(&self, _app: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn after_unmount(&self, _app: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHostLifecycle;

impl HostLifecycle for NoopHostLifecycle {}
