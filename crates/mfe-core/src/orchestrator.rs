//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Primary orchestration and lifecycle management."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use mfe_common::config::OrchestratorConfig;
use mfe_logging::{log_system_event, mfe_info, mfe_warn, LogContext, SystemEventOutcome};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::container::{Container, ContainerResolver};
use crate::error::{
    panic_message, ContainerError, LifecycleHookError, LoadError, RegistryError, Result,
};
use crate::lifecycle::{Hook, HookKind, HostLifecycle, LifecycleProps, NoopHostLifecycle};
use crate::loader::AssetLoader;
use crate::matcher::RouteMatcher;
use crate::navigation::{Location, NavigationSource};
use crate::registry::{AppRegistry, MicroAppDescriptor, MicroAppSpec};
use crate::status::AppStatus;

const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Runtime knobs applied when the orchestrator starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOptions {
    /// Upper bound for fetching and evaluating one entry.
    pub load_timeout: Duration,
    /// Upper bound for each bootstrap/mount/unmount call.
    pub hook_timeout: Duration,
    /// Keep lifecycle handles across unmounts; when false every re-match reloads.
    pub cache_lifecycles: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            load_timeout: DEFAULT_LOAD_TIMEOUT,
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            cache_lifecycles: true,
        }
    }
}

impl From<&OrchestratorConfig> for StartOptions {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            load_timeout: config.load_timeout,
            hook_timeout: config.hook_timeout,
            cache_lifecycles: config.cache_lifecycles,
        }
    }
}

/// What a single reroute did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RerouteOutcome {
    /// The matched app was already active, or nothing matched and nothing was mounted.
    NoChange,
    Mounted(String),
    /// The matched app ended in `LOAD_ERROR`.
    Failed { app: String, error: String },
    /// The previously active app was unmounted and nothing replaced it.
    Cleared,
}

#[derive(Debug, Clone)]
struct ActiveApp {
    name: String,
    basename: String,
}

/// Owns the registry and drives every micro-app through its lifecycle.
///
/// Reroutes are serialised: one navigation is processed to completion before
/// the next one begins, so at most one app occupies a container at a time.
pub struct Orchestrator {
    registry: AppRegistry,
    loader: AssetLoader,
    containers: Arc<dyn ContainerResolver>,
    host: RwLock<Arc<dyn HostLifecycle>>,
    options: RwLock<StartOptions>,
    active: Mutex<Option<ActiveApp>>,
    transition: tokio::sync::Mutex<()>,
    started: AtomicBool,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("loader", &self.loader)
            .field("options", &*self.options.read())
            .field("active", &*self.active.lock())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(loader: AssetLoader, containers: Arc<dyn ContainerResolver>) -> Self {
        Self {
            registry: AppRegistry::new(),
            loader,
            containers,
            host: RwLock::new(Arc::new(NoopHostLifecycle)),
            options: RwLock::new(StartOptions::default()),
            active: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
            started: AtomicBool::new(false),
        }
    }

    /// Options used by reroutes issued before `start`.
    pub fn with_options(self, options: StartOptions) -> Self {
        *self.options.write() = options;
        self
    }

    pub fn register_micro_apps<I>(&self, specs: I) -> std::result::Result<(), RegistryError>
    where
        I: IntoIterator<Item = MicroAppSpec>,
    {
        self.registry.register(specs)
    }

    /// Register apps and install host hooks run around every transition.
    pub fn register_micro_apps_with_hooks<I>(
        &self,
        specs: I,
        hooks: Arc<dyn HostLifecycle>,
    ) -> std::result::Result<(), RegistryError>
    where
        I: IntoIterator<Item = MicroAppSpec>,
    {
        self.registry.register(specs)?;
        *self.host.write() = hooks;
        Ok(())
    }

    pub fn registry(&self) -> &AppRegistry {
        &self.registry
    }

    /// Name of the currently mounted app.
    pub fn active_app(&self) -> Option<String> {
        self.active.lock().as_ref().map(|active| active.name.clone())
    }

    pub fn status(&self, name: &str) -> Option<AppStatus> {
        self.registry.get(name).map(|app| app.status())
    }

    pub fn options(&self) -> StartOptions {
        self.options.read().clone()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Begin following `source` and perform the initial reroute.
    ///
    /// Returns `None` (after a warning) when the orchestrator was already started.
    pub async fn start(
        self: &Arc<Self>,
        source: Arc<dyn NavigationSource>,
        options: StartOptions,
    ) -> Option<NavigationTask> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("orchestrator already started; ignoring repeated start");
            return None;
        }
        *self.options.write() = options.clone();

        let mut events = source.subscribe();
        let initial = source.current_location();
        info!(
            apps = self.registry.len(),
            location = %initial,
            load_timeout_ms = options.load_timeout.as_millis() as u64,
            hook_timeout_ms = options.hook_timeout.as_millis() as u64,
            cache_lifecycles = options.cache_lifecycles,
            "orchestrator started"
        );
        self.reroute(&initial).await;

        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        let (processed_tx, processed_rx) = watch::channel(0u64);
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("navigation listener shutdown");
                        break;
                    }
                    event = events.recv() => {
                        match event {
                            Ok(event) => {
                                debug!(kind = ?event.kind, location = %event.location, "navigation event");
                                orchestrator.reroute(&event.location).await;
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                warn!(skipped, "navigation events dropped; rerouting to current location");
                                orchestrator.reroute(&source.current_location()).await;
                            }
                            Err(RecvError::Closed) => {
                                debug!("navigation source closed");
                                break;
                            }
                        }
                    }
                }
                processed_tx.send_modify(|count| *count += 1);
            }
        });

        Some(NavigationTask {
            handle,
            shutdown: shutdown_tx,
            processed: processed_rx,
        })
    }

    /// Bring the mounted app in line with `location`.
    ///
    /// Never fails: load and hook errors are recorded on the descriptor and logged.
    pub async fn reroute(&self, location: &Location) -> RerouteOutcome {
        let _guard = self.transition.lock().await;
        let options = self.options.read().clone();
        let target = RouteMatcher::find_match(location, &self.registry);
        let current = self.active.lock().clone();

        match (&target, &current) {
            (Some(target), Some(active)) if target.name == active.name => {
                debug!(app = %active.name, route = %location.path(), "app already active");
                return RerouteOutcome::NoChange;
            }
            (None, None) => {
                debug!(route = %location.path(), "no micro-app matches");
                return RerouteOutcome::NoChange;
            }
            _ => {}
        }

        if let Some(active) = current {
            self.unmount_app(&active, &options).await;
        }

        let Some(target) = target else {
            return RerouteOutcome::Cleared;
        };
        let name = target.name.clone();
        match self.mount_app(&target, location, &options).await {
            Ok(()) => RerouteOutcome::Mounted(name),
            Err(err) => {
                let error = err.to_string();
                self.fail(&target, location, &error);
                RerouteOutcome::Failed { app: name, error }
            }
        }
    }

    async fn mount_app(
        &self,
        target: &MicroAppDescriptor,
        location: &Location,
        options: &StartOptions,
    ) -> Result<()> {
        let name = target.name.as_str();
        let basename = target.active_rule.basename(location);
        let host = self.host();

        if target.status().requires_load() || target.lifecycle().is_none() {
            self.registry.update_status(name, AppStatus::Loading)?;
            invoke_host_hook(name, "before_load", host.before_load(name)).await?;
            let loaded = tokio::time::timeout(options.load_timeout, self.loader.load(&target.entry))
                .await
                .map_err(|_| LoadError::Timeout {
                    entry: target.entry.clone(),
                    after: options.load_timeout,
                })??;
            self.registry
                .set_loaded(name, loaded.lifecycle, loaded.markup)?;
            self.registry.update_status(name, AppStatus::Loaded)?;
        }

        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| RegistryError::UnknownApp(name.to_owned()))?;
        let lifecycle = descriptor.lifecycle().cloned().unwrap_or_default();

        if !descriptor.is_bootstrapped() {
            let props = LifecycleProps::new(name, basename.as_str());
            invoke_hook(name, HookKind::Bootstrap, &lifecycle.bootstrap, props, options.hook_timeout)
                .await?;
            self.registry.mark_bootstrapped(name)?;
        }

        self.registry.update_status(name, AppStatus::Mounting)?;
        let container = self
            .containers
            .resolve(&descriptor.container)
            .ok_or_else(|| ContainerError::NotFound(descriptor.container.clone()))?;
        invoke_host_hook(name, "before_mount", host.before_mount(name)).await?;
        container.set_html(descriptor.markup().unwrap_or_default());
        let props = LifecycleProps::new(name, basename.as_str()).with_container(container);
        invoke_hook(name, HookKind::Mount, &lifecycle.mount, props, options.hook_timeout).await?;
        self.registry.update_status(name, AppStatus::Mounted)?;
        *self.active.lock() = Some(ActiveApp {
            name: name.to_owned(),
            basename: basename.clone(),
        });

        let context = LogContext::new()
            .with_app(name)
            .with_status(AppStatus::Mounted.as_str())
            .with_route(location.path())
            .with_entry(&descriptor.entry);
        log_system_event(
            Some(&context),
            "micro_app_mounted",
            &format!("mounted under {basename}"),
            SystemEventOutcome::Success,
        );

        if let Err(err) = invoke_host_hook(name, "after_mount", host.after_mount(name)).await {
            mfe_warn!(context = context, "{err:#}");
        }
        Ok(())
    }

    /// Unmount the active app. Failures are logged; the container is always
    /// cleared and the app always ends up `NOT_MOUNTED`.
    async fn unmount_app(&self, active: &ActiveApp, options: &StartOptions) {
        let name = active.name.as_str();
        let host = self.host();
        let context = LogContext::new().with_app(name);

        if let Err(err) = self.registry.update_status(name, AppStatus::Unmounting) {
            error!(app = %name, error = %err, "unmount started from an unexpected status");
        }
        if let Err(err) = invoke_host_hook(name, "before_unmount", host.before_unmount(name)).await {
            mfe_warn!(context = context, "{err:#}");
        }

        let descriptor = self.registry.get(name);
        let container: Option<Arc<dyn Container>> = descriptor
            .as_ref()
            .and_then(|app| self.containers.resolve(&app.container));
        if let Some(lifecycle) = descriptor.as_ref().and_then(|app| app.lifecycle()) {
            let mut props = LifecycleProps::new(name, active.basename.as_str());
            if let Some(container) = &container {
                props = props.with_container(Arc::clone(container));
            }
            if let Err(err) =
                invoke_hook(name, HookKind::Unmount, &lifecycle.unmount, props, options.hook_timeout)
                    .await
            {
                log_system_event(
                    Some(&context),
                    "micro_app_unmount_failed",
                    &err.to_string(),
                    SystemEventOutcome::Degraded,
                );
            }
        }
        if let Some(container) = &container {
            container.clear();
        }

        if let Err(err) = self.registry.update_status(name, AppStatus::NotMounted) {
            error!(app = %name, error = %err, "unmount finished from an unexpected status");
        }
        *self.active.lock() = None;
        if !options.cache_lifecycles {
            if let Err(err) = self.registry.evict_lifecycle(name) {
                error!(app = %name, error = %err, "failed to evict lifecycle");
            }
        }
        mfe_info!(context = context.with_status(AppStatus::NotMounted.as_str()), "micro-app unmounted");

        if let Err(err) = invoke_host_hook(name, "after_unmount", host.after_unmount(name)).await {
            warn!(app = %name, error = %err, "host hook failed");
        }
    }

    fn fail(&self, target: &MicroAppDescriptor, location: &Location, error: &str) {
        let name = target.name.as_str();
        if let Err(err) = self.registry.record_error(name, error.to_owned()) {
            error!(app = %name, error = %err, "failed to record load error");
        }
        let current = self.status(name);
        if current != Some(AppStatus::LoadError) {
            if let Err(err) = self.registry.update_status(name, AppStatus::LoadError) {
                error!(app = %name, error = %err, "failed to mark app as LOAD_ERROR");
            }
        }
        if let Some(container) = self.containers.resolve(&target.container) {
            container.clear();
        }
        let context = LogContext::new()
            .with_app(name)
            .with_status(AppStatus::LoadError.as_str())
            .with_route(location.path())
            .with_entry(&target.entry);
        log_system_event(
            Some(&context),
            "micro_app_failed",
            error,
            SystemEventOutcome::Fault,
        );
    }

    fn host(&self) -> Arc<dyn HostLifecycle> {
        Arc::clone(&self.host.read())
    }
}

/// Run one lifecycle hook, converting rejections, panics and overruns into errors.
async fn invoke_hook(
    app: &str,
    kind: HookKind,
    hook: &Hook,
    props: LifecycleProps,
    after: Duration,
) -> std::result::Result<(), LifecycleHookError> {
    let hook = hook.clone();
    let call = AssertUnwindSafe(async move { hook.call(props).await }).catch_unwind();
    match tokio::time::timeout(after, call).await {
        Ok(Ok(Ok(()))) => {
            debug!(app = %app, hook = %kind, "hook settled");
            Ok(())
        }
        Ok(Ok(Err(source))) => Err(LifecycleHookError::Failed {
            app: app.to_owned(),
            hook: kind,
            source,
        }),
        Ok(Err(panic)) => Err(LifecycleHookError::Failed {
            app: app.to_owned(),
            hook: kind,
            source: anyhow::anyhow!("hook panicked: {}", panic_message(panic.as_ref())),
        }),
        Err(_) => Err(LifecycleHookError::Timeout {
            app: app.to_owned(),
            hook: kind,
            after,
        }),
    }
}

/// Await a host hook, turning a rejection or panic into [`LifecycleHookError::Host`].
async fn invoke_host_hook<F>(
    app: &str,
    stage: &'static str,
    hook: F,
) -> std::result::Result<(), LifecycleHookError>
where
    F: Future<Output = anyhow::Result<()>>,
{
    let source = match AssertUnwindSafe(hook).catch_unwind().await {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(source)) => source,
        Err(panic) => anyhow::anyhow!("hook panicked: {}", panic_message(panic.as_ref())),
    };
    Err(LifecycleHookError::Host {
        app: app.to_owned(),
        stage,
        source,
    })
}

/// Background navigation listener returned from [`Orchestrator::start`].
#[derive(Debug)]
pub struct NavigationTask {
    handle: JoinHandle<()>,
    shutdown: broadcast::Sender<()>,
    processed: watch::Receiver<u64>,
}

impl NavigationTask {
    /// Navigation events fully processed so far (the initial reroute excluded).
    pub fn processed(&self) -> u64 {
        *self.processed.borrow()
    }

    /// Wait until at least `count` navigation events have been processed.
    ///
    /// Returns `false` if the listener stopped first.
    pub async fn wait_for_navigations(&self, count: u64) -> bool {
        let mut processed = self.processed.clone();
        let done = processed.wait_for(|seen| *seen >= count).await.is_ok();
        done
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(err) = self.handle.await {
            error!(error = %err, "navigation listener task failed");
        }
    }
}
