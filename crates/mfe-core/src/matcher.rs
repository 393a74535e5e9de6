//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Activation rules and route-to-app matching."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::navigation::Location;
use crate::registry::{AppRegistry, MicroAppDescriptor};

type RulePredicate = dyn Fn(&Location) -> bool + Send + Sync;

/// Decides whether a micro-app is the navigation target for a location.
#[derive(Clone)]
pub enum ActiveRule {
    /// Literal prefix of the location path.
    Prefix(String),
    /// Regular expression searched anywhere in the location path.
    Pattern(Regex),
    Predicate(Arc<RulePredicate>),
}

impl ActiveRule {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        ActiveRule::Prefix(prefix.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(ActiveRule::Pattern)
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Location) -> bool + Send + Sync + 'static,
    {
        ActiveRule::Predicate(Arc::new(predicate))
    }

    pub fn matches(&self, location: &Location) -> bool {
        match self {
            ActiveRule::Prefix(prefix) => location.path().starts_with(prefix.as_str()),
            ActiveRule::Pattern(regex) => regex.is_match(location.path()),
            ActiveRule::Predicate(predicate) => predicate(location),
        }
    }

    /// Route prefix handed to the app as its basename.
    ///
    /// Prefix rules yield the prefix, pattern rules the path up to the end of
    /// the first match, predicate rules the root.
    pub fn basename(&self, location: &Location) -> String {
        match self {
            ActiveRule::Prefix(prefix) => prefix.clone(),
            ActiveRule::Pattern(regex) => regex
                .find(location.path())
                .map(|found| location.path()[..found.end()].to_owned())
                .unwrap_or_else(|| "/".to_owned()),
            ActiveRule::Predicate(_) => "/".to_owned(),
        }
    }
}

impl fmt::Debug for ActiveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActiveRule::Prefix(prefix) => f.debug_tuple("Prefix").field(prefix).finish(),
            ActiveRule::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            ActiveRule::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// Stateless matcher over the registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteMatcher;

impl RouteMatcher {
    /// First registered app whose rule matches `location`, if any.
    pub fn find_match(location: &Location, registry: &AppRegistry) -> Option<MicroAppDescriptor> {
        registry.find(|descriptor| descriptor.active_rule.matches(location))
    }
}
