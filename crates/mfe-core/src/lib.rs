//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Primary orchestration and lifecycle management."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
//! Micro-app registry, route matching, asset loading, and the lifecycle
//! orchestrator that mounts one micro-app at a time into the host document.

pub mod container;
pub mod error;
pub mod fetch;
pub mod lifecycle;
pub mod loader;
pub mod matcher;
pub mod module;
pub mod navigation;
pub mod orchestrator;
pub mod registry;
pub mod status;

pub use mfe_state as state;

pub use container::{Container, ContainerResolver, MemoryContainer, MemoryDocument};
pub use error::{
    ContainerError, EvaluationError, FetchError, LifecycleHookError, LoadError, MfeError,
    RegistryError, Result,
};
pub use fetch::{HttpFetcher, ResourceFetcher, StaticFetcher};
pub use lifecycle::{
    Hook, HookKind, HostLifecycle, LifecycleHandle, LifecycleProps, NoopHostLifecycle,
};
pub use loader::{AssetLoader, LoadedApp, LoadedAssets, ScriptRef};
pub use matcher::{ActiveRule, RouteMatcher};
pub use module::{
    resolve_lifecycle, Export, ExportTable, InertEvaluator, ModuleEvaluator, ModuleRecord,
    ScriptOrigin, ScriptResource,
};
pub use navigation::{Location, MemoryHistory, NavigationEvent, NavigationKind, NavigationSource};
pub use orchestrator::{NavigationTask, Orchestrator, RerouteOutcome, StartOptions};
pub use registry::{AppRegistry, AppSnapshot, MicroAppDescriptor, MicroAppSpec};
pub use status::AppStatus;
