//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Navigation locations, events, and the in-memory history adapter."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::debug;
use url::Url;

static LOCATION_BASE: Lazy<Url> =
    Lazy::new(|| Url::parse("http://mfe.local/").expect("valid location base url"));

const NAVIGATION_CHANNEL_CAPACITY: usize = 64;

/// Host-relative navigation location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pathname: String,
    search: String,
    hash: String,
}

impl Location {
    /// Parse a path such as `/about/team?tab=1#top`.
    pub fn parse(input: &str) -> Self {
        match LOCATION_BASE.join(input.trim()) {
            Ok(url) => Self {
                pathname: url.path().to_owned(),
                search: url.query().map(|q| format!("?{q}")).unwrap_or_default(),
                hash: url.fragment().map(|f| format!("#{f}")).unwrap_or_default(),
            },
            Err(_) => Self {
                pathname: input.to_owned(),
                search: String::new(),
                hash: String::new(),
            },
        }
    }

    pub fn path(&self) -> &str {
        &self.pathname
    }

    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn href(&self) -> String {
        format!("{}{}{}", self.pathname, self.search, self.hash)
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::parse("/")
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.href())
    }
}

/// What caused a location change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationKind {
    Initial,
    Push,
    Replace,
    /// Back/forward traversal.
    Pop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEvent {
    pub kind: NavigationKind,
    pub location: Location,
}

/// Platform adapter feeding navigation into the orchestrator.
pub trait NavigationSource: Send + Sync {
    fn current_location(&self) -> Location;

    /// Stream of location changes made after this call.
    fn subscribe(&self) -> broadcast::Receiver<NavigationEvent>;
}

#[derive(Debug)]
struct HistoryInner {
    entries: Vec<Location>,
    index: usize,
}

/// Session history kept in memory, emitting an event for every change.
#[derive(Debug)]
pub struct MemoryHistory {
    inner: Mutex<HistoryInner>,
    events: broadcast::Sender<NavigationEvent>,
}

impl MemoryHistory {
    pub fn new(initial: &str) -> Self {
        let (events, _) = broadcast::channel(NAVIGATION_CHANNEL_CAPACITY);
        Self {
            inner: Mutex::new(HistoryInner {
                entries: vec![Location::parse(initial)],
                index: 0,
            }),
            events,
        }
    }

    /// Append a new entry, discarding any forward entries.
    pub fn push_state(&self, path: &str) {
        let location = Location::parse(path);
        {
            let mut inner = self.inner.lock();
            let keep = inner.index + 1;
            inner.entries.truncate(keep);
            inner.entries.push(location.clone());
            inner.index = keep;
        }
        self.emit(NavigationKind::Push, location);
    }

    /// Overwrite the current entry.
    pub fn replace_state(&self, path: &str) {
        let location = Location::parse(path);
        {
            let mut inner = self.inner.lock();
            let index = inner.index;
            inner.entries[index] = location.clone();
        }
        self.emit(NavigationKind::Replace, location);
    }

    pub fn back(&self) -> bool {
        self.go(-1)
    }

    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// Traverse `delta` entries. Out-of-range traversal is ignored and returns `false`.
    pub fn go(&self, delta: isize) -> bool {
        let location = {
            let mut inner = self.inner.lock();
            let Some(target) = inner.index.checked_add_signed(delta) else {
                return false;
            };
            if delta == 0 || target >= inner.entries.len() {
                return false;
            }
            inner.index = target;
            inner.entries[target].clone()
        };
        self.emit(NavigationKind::Pop, location);
        true
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn emit(&self, kind: NavigationKind, location: Location) {
        debug!(kind = ?kind, location = %location, "navigation");
        // No receivers simply means nobody is listening yet.
        let _ = self.events.send(NavigationEvent { kind, location });
    }
}

impl NavigationSource for MemoryHistory {
    fn current_location(&self) -> Location {
        let inner = self.inner.lock();
        inner.entries[inner.index].clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.events.subscribe()
    }
}
