//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Mount target abstraction and in-memory document regions."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Region of the host document a micro-app renders into.
pub trait Container: Send + Sync + fmt::Debug {
    fn selector(&self) -> &str;
    fn set_html(&self, html: &str);
    fn clear(&self);
    fn html(&self) -> String;
}

/// Looks up containers by selector at mount time.
pub trait ContainerResolver: Send + Sync {
    fn resolve(&self, selector: &str) -> Option<Arc<dyn Container>>;
}

#[derive(Debug)]
pub struct MemoryContainer {
    selector: String,
    html: Mutex<String>,
    writes: AtomicUsize,
}

impl MemoryContainer {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            html: Mutex::new(String::new()),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `set_html`/`clear` calls observed.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.html.lock().is_empty()
    }
}

impl Container for MemoryContainer {
    fn selector(&self) -> &str {
        &self.selector
    }

    fn set_html(&self, html: &str) {
        *self.html.lock() = html.to_owned();
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn clear(&self) {
        self.html.lock().clear();
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn html(&self) -> String {
        self.html.lock().clone()
    }
}

/// Host document made of named in-memory regions.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    regions: Mutex<HashMap<String, Arc<MemoryContainer>>>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return the existing) region for `selector`.
    pub fn add_region(&self, selector: &str) -> Arc<MemoryContainer> {
        self.regions
            .lock()
            .entry(selector.to_owned())
            .or_insert_with(|| Arc::new(MemoryContainer::new(selector)))
            .clone()
    }

    pub fn region(&self, selector: &str) -> Option<Arc<MemoryContainer>> {
        self.regions.lock().get(selector).cloned()
    }
}

impl ContainerResolver for MemoryDocument {
    fn resolve(&self, selector: &str) -> Option<Arc<dyn Container>> {
        self.region(selector)
            .map(|region| region as Arc<dyn Container>)
    }
}
