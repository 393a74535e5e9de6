//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Entry document loading, script extraction, and module evaluation."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{FetchError, LoadError};
use crate::fetch::ResourceFetcher;
use crate::lifecycle::LifecycleHandle;
use crate::module::{
    evaluate_into, resolve_lifecycle, ModuleEvaluator, ModuleRecord, ScriptOrigin, ScriptResource,
};

static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment pattern"));
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b([^>]*)>(.*?)</script\s*>").expect("valid script pattern")
});
static BASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<base\b([^>]*)>").expect("valid base pattern"));
static SRC_ATTR_RE: Lazy<Regex> = Lazy::new(|| attribute_pattern("src"));
static TYPE_ATTR_RE: Lazy<Regex> = Lazy::new(|| attribute_pattern("type"));
static HREF_ATTR_RE: Lazy<Regex> = Lazy::new(|| attribute_pattern("href"));

const EXECUTABLE_TYPES: &[&str] = &[
    "",
    "module",
    "text/javascript",
    "application/javascript",
    "application/ecmascript",
    "text/ecmascript",
];

/// Script reference found in an entry document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptRef {
    Inline(String),
    External(Url),
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// Markup with script tags replaced by marker comments.
    pub markup: String,
    /// Executable scripts in document order.
    pub scripts: Vec<ScriptRef>,
}

/// A script that could not be fetched and was skipped.
#[derive(Debug)]
pub struct SkippedScript {
    pub index: usize,
    pub url: String,
    pub error: FetchError,
}

/// Transient result of fetching an entry and its scripts.
#[derive(Debug)]
pub struct LoadedAssets {
    pub entry: Url,
    pub markup: String,
    pub scripts: Vec<ScriptResource>,
    pub skipped: Vec<SkippedScript>,
}

/// Outcome of a full load.
#[derive(Debug, Clone)]
pub struct LoadedApp {
    pub lifecycle: LifecycleHandle,
    pub markup: String,
}

/// Turns an entry location into an executable module with lifecycle hooks.
#[derive(Clone)]
pub struct AssetLoader {
    fetcher: Arc<dyn ResourceFetcher>,
    evaluator: Arc<dyn ModuleEvaluator>,
    default_scheme: String,
}

impl std::fmt::Debug for AssetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetLoader")
            .field("default_scheme", &self.default_scheme)
            .finish_non_exhaustive()
    }
}

impl AssetLoader {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>, evaluator: Arc<dyn ModuleEvaluator>) -> Self {
        Self {
            fetcher,
            evaluator,
            default_scheme: "http".to_owned(),
        }
    }

    /// Scheme used for protocol-relative (`//host`) and bare (`host:port`) entries.
    pub fn with_default_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.default_scheme = scheme.into();
        self
    }

    /// Turn an entry into an absolute, scheme-qualified URL.
    pub fn normalize_entry(&self, entry: &str) -> Result<Url, LoadError> {
        let trimmed = entry.trim();
        let invalid = |reason: &str| LoadError::InvalidEntry {
            entry: entry.to_owned(),
            reason: reason.to_owned(),
        };
        if trimmed.is_empty() {
            return Err(invalid("entry is empty"));
        }
        let candidate = if trimmed.starts_with("//") {
            format!("{}:{}", self.default_scheme, trimmed)
        } else if trimmed.starts_with('/') {
            return Err(invalid("entry has no host"));
        } else {
            match Url::parse(trimmed) {
                Ok(url) if !url.cannot_be_a_base() && url.has_host() => return Ok(url),
                _ => format!("{}://{}", self.default_scheme, trimmed),
            }
        };
        match Url::parse(&candidate) {
            Ok(url) if url.has_host() => Ok(url),
            Ok(_) => Err(invalid("entry has no host")),
            Err(err) => Err(invalid(&err.to_string())),
        }
    }

    /// Fetch the entry document and every script it references.
    ///
    /// Script bodies are fetched concurrently; failures are logged and skipped.
    pub async fn fetch_assets(&self, entry: &str) -> Result<LoadedAssets, LoadError> {
        let entry_url = self.normalize_entry(entry)?;
        let html = self.fetcher.fetch_text(&entry_url).await?;
        let parsed = parse_entry_document(&html, &entry_url);
        debug!(entry = %entry_url, scripts = parsed.scripts.len(), "entry document parsed");

        let fetches = parsed.scripts.iter().map(|script| async move {
            match script {
                ScriptRef::Inline(text) => Ok(text.clone()),
                ScriptRef::External(url) => self.fetcher.fetch_text(url).await,
            }
        });
        let bodies = join_all(fetches).await;

        let mut scripts = Vec::with_capacity(bodies.len());
        let mut skipped = Vec::new();
        for (index, (script, body)) in parsed.scripts.into_iter().zip(bodies).enumerate() {
            let origin = match script {
                ScriptRef::Inline(_) => ScriptOrigin::Inline,
                ScriptRef::External(url) => ScriptOrigin::External(url),
            };
            match body {
                Ok(body) => scripts.push(ScriptResource {
                    index,
                    origin,
                    body,
                }),
                Err(error) => {
                    let url = match &origin {
                        ScriptOrigin::External(url) => url.to_string(),
                        ScriptOrigin::Inline => format!("inline#{index}"),
                    };
                    warn!(entry = %entry_url, script = %url, error = %error, "script fetch failed; skipping");
                    skipped.push(SkippedScript { index, url, error });
                }
            }
        }

        Ok(LoadedAssets {
            entry: entry_url,
            markup: parsed.markup,
            scripts,
            skipped,
        })
    }

    /// Evaluate scripts in document order into one fresh module record.
    pub fn execute(&self, assets: &LoadedAssets) -> ModuleRecord {
        let mut module = ModuleRecord::new();
        for script in &assets.scripts {
            if let Err(err) = evaluate_into(self.evaluator.as_ref(), &mut module, script) {
                warn!(entry = %assets.entry, script = %script.label(), error = %err, "script evaluation failed; skipping");
            }
        }
        module
    }

    /// Fetch, execute, and normalise an entry into a lifecycle handle.
    pub async fn load(&self, entry: &str) -> Result<LoadedApp, LoadError> {
        let assets = self.fetch_assets(entry).await?;
        let module = self.execute(&assets);
        let lifecycle = resolve_lifecycle(&module);
        if lifecycle.is_fully_default() {
            warn!(entry = %assets.entry, executed = module.executed(), "no lifecycle hooks exported; using no-op lifecycle");
        }
        info!(
            entry = %assets.entry,
            scripts = assets.scripts.len(),
            skipped = assets.skipped.len(),
            executed = module.executed(),
            "entry loaded"
        );
        Ok(LoadedApp {
            lifecycle,
            markup: assets.markup,
        })
    }
}

/// Locate executable scripts and strip them from the markup.
///
/// HTML comments are discarded first; a `<base href>` overrides `entry` when
/// resolving relative script URLs.
pub fn parse_entry_document(html: &str, entry: &Url) -> ParsedDocument {
    let without_comments = COMMENT_RE.replace_all(html, "");
    let base = document_base(&without_comments, entry);

    let mut scripts = Vec::new();
    let markup = SCRIPT_RE.replace_all(&without_comments, |caps: &Captures<'_>| {
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str());
        let kind = attribute(attrs, &TYPE_ATTR_RE).unwrap_or_default();
        if !EXECUTABLE_TYPES.contains(&kind.trim().to_ascii_lowercase().as_str()) {
            debug!(script_type = %kind, "ignoring non-executable script");
            return caps[0].to_owned();
        }
        match attribute(attrs, &SRC_ATTR_RE) {
            Some(src) => match base.join(src.trim()) {
                Ok(url) => {
                    let marker = format!("<!-- script {} replaced by mfe -->", url);
                    scripts.push(ScriptRef::External(url));
                    marker
                }
                Err(err) => {
                    warn!(src = %src, error = %err, "unresolvable script src; skipping");
                    "<!-- script (unresolvable) replaced by mfe -->".to_owned()
                }
            },
            None => {
                scripts.push(ScriptRef::Inline(body.to_owned()));
                "<!-- script inline replaced by mfe -->".to_owned()
            }
        }
    });

    ParsedDocument {
        markup: markup.into_owned(),
        scripts,
    }
}

fn document_base(html: &str, entry: &Url) -> Url {
    BASE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .and_then(|attrs| attribute(attrs.as_str(), &HREF_ATTR_RE))
        .and_then(|href| entry.join(href.trim()).ok())
        .unwrap_or_else(|| entry.clone())
}

fn attribute_pattern(name: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)(?:^|\s){name}\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#
    ))
    .expect("valid attribute pattern")
}

/// Value captured by an attribute `pattern` within a tag's attribute text.
fn attribute(attrs: &str, pattern: &Regex) -> Option<String> {
    let caps = pattern.captures(attrs)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().to_owned())
}
