//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Primary orchestration and lifecycle management."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mfe_core::{
    ActiveRule, AppStatus, AssetLoader, Container, EvaluationError, FetchError, Hook,
    HostLifecycle, LifecycleProps, Location, MemoryDocument, MemoryHistory, MicroAppSpec,
    ModuleRecord, NavigationSource, Orchestrator, ResourceFetcher, RerouteOutcome, ScriptResource,
    StartOptions, StaticFetcher,
};
use url::Url;
use parking_lot::Mutex;

const CONTAINER: &str = "#subapp-container";

type Log = Arc<Mutex<Vec<String>>>;

/// Script bodies read `<app> <export..>`; exports are `bootstrap`, `mount`,
/// `unmount`, `fail:<hook>`, `hang:<hook>` and `wrapped` (export under `default`).
/// A `panic` word makes evaluation itself panic.
fn scripted_evaluator(
    log: Log,
) -> impl Fn(&mut ModuleRecord, &ScriptResource) -> Result<(), EvaluationError> + Send + Sync {
    move |module: &mut ModuleRecord, script: &ScriptResource| {
        let mut words = script.body.split_whitespace();
        let app = words
            .next()
            .ok_or_else(|| EvaluationError::new("empty script"))?
            .to_owned();
        let words: Vec<&str> = words.collect();
        if words.contains(&"panic") {
            panic!("{app} evaluator crashed");
        }
        let wrapped = words.contains(&"wrapped");
        for word in words {
            let (mode, hook) = match word.split_once(':') {
                Some((mode, hook)) => (mode, hook),
                None => ("ok", word),
            };
            if !matches!(hook, "bootstrap" | "mount" | "unmount") {
                continue;
            }
            let log = log.clone();
            let label = format!("{app}:{hook}");
            let mode = mode.to_owned();
            let exported = Hook::new(move |_props: LifecycleProps| {
                let log = log.clone();
                let label = label.clone();
                let mode = mode.clone();
                async move {
                    log.lock().push(label.clone());
                    match mode.as_str() {
                        "fail" => anyhow::bail!("{label} rejected"),
                        "hang" => {
                            tokio::time::sleep(Duration::from_secs(3600)).await;
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
            });
            if wrapped {
                module.exports.namespace_mut("default").insert_hook(hook, exported);
            } else {
                module.exports.insert_hook(hook, exported);
            }
        }
        Ok(())
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    fetcher: Arc<StaticFetcher>,
    document: Arc<MemoryDocument>,
    log: Log,
}

impl Harness {
    fn new(options: StartOptions) -> Self {
        let fetcher = Arc::new(StaticFetcher::new());
        let document = Arc::new(MemoryDocument::new());
        document.add_region(CONTAINER);
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let loader = AssetLoader::new(fetcher.clone(), Arc::new(scripted_evaluator(log.clone())));
        let orchestrator =
            Arc::new(Orchestrator::new(loader, document.clone()).with_options(options));
        Self {
            orchestrator,
            fetcher,
            document,
            log,
        }
    }

    /// Serve an entry for `name` on `port` whose single script exports `exports`.
    fn serve(&self, name: &str, port: u16, exports: &str) {
        self.fetcher.insert(
            &format!("http://localhost:{port}/"),
            format!(
                "<div id=\"{name}-root\"></div><script src=\"/{name}.js\"></script>"
            ),
        );
        self.fetcher.insert(
            &format!("http://localhost:{port}/{name}.js"),
            format!("{name} {exports}"),
        );
    }

    fn register(&self, apps: &[(&str, u16)]) {
        let specs = apps.iter().map(|(name, port)| {
            MicroAppSpec::new(
                *name,
                format!("//localhost:{port}"),
                CONTAINER,
                ActiveRule::prefix(format!("/{name}")),
            )
        });
        self.orchestrator.register_micro_apps(specs).unwrap();
    }

    async fn navigate(&self, path: &str) -> RerouteOutcome {
        let outcome = self.orchestrator.reroute(&Location::parse(path)).await;
        self.assert_single_mounted();
        outcome
    }

    fn assert_single_mounted(&self) {
        let mounted = self
            .orchestrator
            .registry()
            .snapshot()
            .into_iter()
            .filter(|app| app.status == AppStatus::Mounted)
            .count();
        assert!(mounted <= 1, "{mounted} apps mounted at once");
    }

    fn take_log(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }

    fn container_html(&self) -> String {
        self.document
            .region(CONTAINER)
            .map(|region| region.html())
            .unwrap_or_default()
    }
}

fn fast_options() -> StartOptions {
    StartOptions {
        load_timeout: Duration::from_secs(2),
        hook_timeout: Duration::from_millis(100),
        cache_lifecycles: true,
    }
}

#[tokio::test]
async fn switching_apps_unmounts_before_mounting_and_reuses_cached_lifecycle() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "bootstrap mount unmount");
    harness.serve("b", 8002, "bootstrap mount unmount");
    harness.register(&[("a", 8001), ("b", 8002)]);

    assert_eq!(harness.navigate("/a").await, RerouteOutcome::Mounted("a".into()));
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::Mounted));
    assert_eq!(harness.take_log(), vec!["a:bootstrap", "a:mount"]);
    assert!(harness.container_html().contains("a-root"));

    assert_eq!(harness.navigate("/b").await, RerouteOutcome::Mounted("b".into()));
    assert_eq!(
        harness.take_log(),
        vec!["a:unmount", "b:bootstrap", "b:mount"]
    );
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::NotMounted));
    assert!(harness.container_html().contains("b-root"));
    assert!(!harness.container_html().contains("a-root"));

    assert_eq!(harness.navigate("/a").await, RerouteOutcome::Mounted("a".into()));
    assert_eq!(harness.take_log(), vec!["b:unmount", "a:mount"]);
    assert_eq!(harness.fetcher.request_count("http://localhost:8001/"), 1);
    assert_eq!(harness.orchestrator.active_app().as_deref(), Some("a"));
}

#[tokio::test]
async fn repeated_navigation_within_active_app_is_a_no_op() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "mount");
    harness.register(&[("a", 8001)]);

    harness.navigate("/a").await;
    assert_eq!(harness.navigate("/a").await, RerouteOutcome::NoChange);
    assert_eq!(harness.navigate("/a/settings").await, RerouteOutcome::NoChange);
    assert_eq!(harness.take_log(), vec!["a:mount"]);
}

#[tokio::test]
async fn entry_fetch_failure_leaves_container_empty() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "mount unmount");
    harness.register(&[("a", 8001), ("c", 8003)]);

    harness.navigate("/a").await;
    let outcome = harness.navigate("/c").await;
    assert!(matches!(outcome, RerouteOutcome::Failed { ref app, .. } if app == "c"));
    assert_eq!(harness.orchestrator.status("c"), Some(AppStatus::LoadError));
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::NotMounted));
    assert!(harness.orchestrator.active_app().is_none());
    assert!(harness.container_html().is_empty());

    let snapshot = harness.orchestrator.registry().get("c").unwrap().snapshot();
    assert!(snapshot.last_error.is_some());
    assert!(!snapshot.has_lifecycle);

    assert_eq!(harness.navigate("/a").await, RerouteOutcome::Mounted("a".into()));
}

#[tokio::test]
async fn mount_only_app_loads_with_default_hooks() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "mount");
    harness.serve("b", 8002, "mount");
    harness.register(&[("a", 8001), ("b", 8002)]);

    assert_eq!(harness.navigate("/a").await, RerouteOutcome::Mounted("a".into()));
    assert_eq!(harness.navigate("/b").await, RerouteOutcome::Mounted("b".into()));
    assert_eq!(harness.take_log(), vec!["a:mount", "b:mount"]);
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::NotMounted));
}

#[tokio::test]
async fn wrapped_exports_are_honoured() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "wrapped bootstrap mount");
    harness.register(&[("a", 8001)]);

    harness.navigate("/a").await;
    assert_eq!(harness.take_log(), vec!["a:bootstrap", "a:mount"]);
}

#[tokio::test]
async fn failing_mount_marks_load_error_and_next_match_reloads() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "bootstrap fail:mount");
    harness.serve("b", 8002, "mount");
    harness.register(&[("a", 8001), ("b", 8002)]);

    let outcome = harness.navigate("/a").await;
    assert!(matches!(outcome, RerouteOutcome::Failed { ref error, .. } if error.contains("rejected")));
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::LoadError));
    assert!(harness.container_html().is_empty());

    assert_eq!(harness.navigate("/b").await, RerouteOutcome::Mounted("b".into()));
    harness.navigate("/a").await;
    assert_eq!(harness.fetcher.request_count("http://localhost:8001/"), 2);
    assert_eq!(
        harness.take_log(),
        vec!["a:bootstrap", "a:mount", "b:mount", "a:bootstrap", "a:mount"]
    );
}

#[tokio::test]
async fn hanging_mount_times_out() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "hang:mount");
    harness.serve("b", 8002, "mount");
    harness.register(&[("a", 8001), ("b", 8002)]);

    let outcome = harness.navigate("/a").await;
    assert!(matches!(outcome, RerouteOutcome::Failed { ref error, .. } if error.contains("settle")));
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::LoadError));
    assert_eq!(harness.navigate("/b").await, RerouteOutcome::Mounted("b".into()));
}

#[tokio::test]
async fn failing_unmount_still_releases_the_container() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "mount fail:unmount");
    harness.serve("b", 8002, "mount");
    harness.register(&[("a", 8001), ("b", 8002)]);

    harness.navigate("/a").await;
    assert_eq!(harness.navigate("/b").await, RerouteOutcome::Mounted("b".into()));
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::NotMounted));
    assert_eq!(harness.take_log(), vec!["a:mount", "a:unmount", "b:mount"]);
}

#[tokio::test]
async fn disabled_lifecycle_cache_reloads_and_bootstraps_again() {
    let harness = Harness::new(StartOptions {
        cache_lifecycles: false,
        ..fast_options()
    });
    harness.serve("a", 8001, "bootstrap mount unmount");
    harness.serve("b", 8002, "mount");
    harness.register(&[("a", 8001), ("b", 8002)]);

    harness.navigate("/a").await;
    harness.navigate("/b").await;
    assert!(harness
        .orchestrator
        .registry()
        .get("a")
        .unwrap()
        .lifecycle()
        .is_none());
    harness.navigate("/a").await;

    assert_eq!(harness.fetcher.request_count("http://localhost:8001/"), 2);
    assert_eq!(
        harness.take_log(),
        vec![
            "a:bootstrap",
            "a:mount",
            "a:unmount",
            "b:mount",
            "a:bootstrap",
            "a:mount"
        ]
    );
}

#[tokio::test]
async fn unmatched_location_clears_the_active_app() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "mount unmount");
    harness.register(&[("a", 8001)]);

    harness.navigate("/a").await;
    assert_eq!(harness.navigate("/elsewhere").await, RerouteOutcome::Cleared);
    assert!(harness.orchestrator.active_app().is_none());
    assert!(harness.container_html().is_empty());
    assert_eq!(harness.take_log(), vec!["a:mount", "a:unmount"]);
}

#[tokio::test]
async fn mount_receives_container_and_basename() {
    let fetcher = Arc::new(StaticFetcher::new());
    fetcher.insert("http://localhost:8001/", "<main></main><script>inline</script>");
    let document = Arc::new(MemoryDocument::new());
    document.add_region(CONTAINER);

    let seen: Arc<Mutex<Option<(String, String, bool)>>> = Arc::new(Mutex::new(None));
    let recorder = seen.clone();
    let evaluator = move |module: &mut ModuleRecord,
                          _script: &ScriptResource|
          -> Result<(), EvaluationError> {
        let recorder = recorder.clone();
        module.exports.insert_hook(
            "mount",
            Hook::new(move |props: LifecycleProps| {
                let recorder = recorder.clone();
                async move {
                    let html = props
                        .container
                        .as_ref()
                        .map(|container| container.html())
                        .unwrap_or_default();
                    *recorder.lock() = Some((props.basename, html, props.powered_by_orchestrator));
                    anyhow::Ok(())
                }
            }),
        );
        Ok(())
    };
    let loader = AssetLoader::new(fetcher, Arc::new(evaluator));
    let orchestrator = Orchestrator::new(loader, document);
    orchestrator
        .register_micro_apps(vec![MicroAppSpec::new(
            "portal",
            "//localhost:8001",
            CONTAINER,
            ActiveRule::pattern("^/portal/[a-z]+").unwrap(),
        )])
        .unwrap();

    orchestrator.reroute(&Location::parse("/portal/home/deep")).await;
    let (basename, html, powered) = seen.lock().clone().unwrap();
    assert_eq!(basename, "/portal/home");
    assert!(html.starts_with("<main></main>"));
    assert!(html.contains("replaced by mfe"));
    assert!(powered);
}

#[derive(Default)]
struct RecordingHost {
    log: Mutex<Vec<String>>,
    reject_mount: bool,
    panic_on_load: Option<&'static str>,
}

#[async_trait]
impl HostLifecycle for RecordingHost {
    async fn before_load(&self, app: &str) -> anyhow::Result<()> {
        self.log.lock().push(format!("before_load:{app}"));
        if self.panic_on_load == Some(app) {
            panic!("host crashed loading {app}");
        }
        Ok(())
    }

    async fn before_mount(&self, app: &str) -> anyhow::Result<()> {
        self.log.lock().push(format!("before_mount:{app}"));
        if self.reject_mount {
            anyhow::bail!("host refused {app}");
        }
        Ok(())
    }

    async fn after_mount(&self, app: &str) -> anyhow::Result<()> {
        self.log.lock().push(format!("after_mount:{app}"));
        Ok(())
    }

    async fn before_unmount(&self, app: &str) -> anyhow::Result<()> {
        self.log.lock().push(format!("before_unmount:{app}"));
        Ok(())
    }

    async fn after_unmount(&self, app: &str) -> anyhow::Result<()> {
        self.log.lock().push(format!("after_unmount:{app}"));
        Ok(())
    }
}

#[tokio::test]
async fn host_hooks_wrap_each_transition() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "mount");
    harness.serve("b", 8002, "mount");
    let host = Arc::new(RecordingHost::default());
    harness
        .orchestrator
        .register_micro_apps_with_hooks(
            vec![
                MicroAppSpec::new("a", "//localhost:8001", CONTAINER, ActiveRule::prefix("/a")),
                MicroAppSpec::new("b", "//localhost:8002", CONTAINER, ActiveRule::prefix("/b")),
            ],
            host.clone(),
        )
        .unwrap();

    harness.navigate("/a").await;
    harness.navigate("/b").await;
    assert_eq!(
        *host.log.lock(),
        vec![
            "before_load:a",
            "before_mount:a",
            "after_mount:a",
            "before_unmount:a",
            "after_unmount:a",
            "before_load:b",
            "before_mount:b",
            "after_mount:b",
        ]
    );
}

#[tokio::test]
async fn rejecting_host_hook_fails_the_mount() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "mount");
    let host = Arc::new(RecordingHost {
        reject_mount: true,
        ..RecordingHost::default()
    });
    harness
        .orchestrator
        .register_micro_apps_with_hooks(
            vec![MicroAppSpec::new("a", "//localhost:8001", CONTAINER, ActiveRule::prefix("/a"))],
            host,
        )
        .unwrap();

    let outcome = harness.navigate("/a").await;
    assert!(matches!(outcome, RerouteOutcome::Failed { ref error, .. } if error.contains("host refused")));
    assert!(harness.take_log().is_empty());
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::LoadError));
}

#[tokio::test]
async fn start_follows_history_and_ignores_second_start() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "bootstrap mount unmount");
    harness.serve("b", 8002, "mount unmount");
    harness.register(&[("a", 8001), ("b", 8002)]);

    let history = Arc::new(MemoryHistory::new("/a"));
    let source: Arc<dyn NavigationSource> = history.clone();
    let task = harness
        .orchestrator
        .start(source.clone(), fast_options())
        .await
        .expect("first start returns a task");
    assert!(harness.orchestrator.is_started());
    assert_eq!(harness.orchestrator.active_app().as_deref(), Some("a"));
    assert!(harness
        .orchestrator
        .start(source, fast_options())
        .await
        .is_none());

    history.push_state("/b");
    assert!(task.wait_for_navigations(1).await);
    assert_eq!(harness.orchestrator.active_app().as_deref(), Some("b"));
    harness.assert_single_mounted();

    assert!(history.back());
    assert!(task.wait_for_navigations(2).await);
    assert_eq!(harness.orchestrator.active_app().as_deref(), Some("a"));

    history.replace_state("/nowhere");
    assert!(task.wait_for_navigations(3).await);
    assert!(harness.orchestrator.active_app().is_none());
    assert!(harness.container_html().is_empty());
    assert_eq!(task.processed(), 3);

    task.shutdown().await;
    assert_eq!(
        harness.take_log(),
        vec![
            "a:bootstrap",
            "a:mount",
            "a:unmount",
            "b:mount",
            "b:unmount",
            "a:mount",
            "a:unmount"
        ]
    );
}

#[tokio::test]
async fn panicking_host_hook_fails_only_that_app() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "mount");
    harness.serve("b", 8002, "mount");
    let host = Arc::new(RecordingHost {
        panic_on_load: Some("a"),
        ..RecordingHost::default()
    });
    harness
        .orchestrator
        .register_micro_apps_with_hooks(
            vec![
                MicroAppSpec::new("a", "//localhost:8001", CONTAINER, ActiveRule::prefix("/a")),
                MicroAppSpec::new("b", "//localhost:8002", CONTAINER, ActiveRule::prefix("/b")),
            ],
            host,
        )
        .unwrap();

    let outcome = harness.navigate("/a").await;
    assert!(matches!(outcome, RerouteOutcome::Failed { ref error, .. } if error.contains("panicked")));
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::LoadError));
    assert_eq!(harness.navigate("/b").await, RerouteOutcome::Mounted("b".into()));
}

#[tokio::test]
async fn panicking_evaluator_does_not_stop_navigation() {
    let harness = Harness::new(fast_options());
    harness.serve("a", 8001, "panic");
    harness.serve("b", 8002, "mount");
    harness.register(&[("a", 8001), ("b", 8002)]);

    let history = Arc::new(MemoryHistory::new("/"));
    let task = harness
        .orchestrator
        .start(history.clone(), fast_options())
        .await
        .expect("first start returns a task");

    history.push_state("/a");
    assert!(task.wait_for_navigations(1).await);
    // The crashing script is skipped and the app runs with no-op hooks.
    assert_eq!(harness.orchestrator.status("a"), Some(AppStatus::Mounted));

    history.push_state("/b");
    assert!(task.wait_for_navigations(2).await);
    assert_eq!(harness.orchestrator.active_app().as_deref(), Some("b"));
    assert_eq!(harness.take_log(), vec!["b:mount"]);
    task.shutdown().await;
}

/// Serves from an inner fetcher but never answers requests for one host.
struct StalledHostFetcher {
    inner: Arc<StaticFetcher>,
    stalled_port: u16,
}

#[async_trait]
impl ResourceFetcher for StalledHostFetcher {
    async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        if url.port() == Some(self.stalled_port) {
            std::future::pending::<()>().await;
        }
        self.inner.fetch_text(url).await
    }
}

#[tokio::test]
async fn load_timeout_marks_load_error_and_later_navigation_works() {
    let static_fetcher = Arc::new(StaticFetcher::new());
    let fetcher = Arc::new(StalledHostFetcher {
        inner: static_fetcher.clone(),
        stalled_port: 8009,
    });
    let document = Arc::new(MemoryDocument::new());
    document.add_region(CONTAINER);
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let loader = AssetLoader::new(fetcher, Arc::new(scripted_evaluator(log.clone())));
    let orchestrator = Orchestrator::new(loader, document.clone()).with_options(StartOptions {
        load_timeout: Duration::from_millis(100),
        ..fast_options()
    });
    let harness = Harness {
        orchestrator: Arc::new(orchestrator),
        fetcher: static_fetcher,
        document,
        log,
    };
    harness.serve("a", 8001, "mount unmount");
    harness.register(&[("a", 8001), ("slow", 8009)]);

    harness.navigate("/a").await;
    assert!(harness.container_html().contains("a-root"));

    let outcome = harness.navigate("/slow").await;
    assert!(matches!(outcome, RerouteOutcome::Failed { ref app, ref error } if app == "slow" && error.contains("exceeded")));
    assert_eq!(harness.orchestrator.status("slow"), Some(AppStatus::LoadError));
    assert!(harness.orchestrator.active_app().is_none());
    assert!(harness.container_html().is_empty());

    assert_eq!(harness.navigate("/a").await, RerouteOutcome::Mounted("a".into()));
    assert_eq!(harness.take_log(), vec!["a:mount", "a:unmount", "a:mount"]);
}
