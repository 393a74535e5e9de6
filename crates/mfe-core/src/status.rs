//! ---
//! mfe_section: "01-core-functionality"
//! mfe_subsection: "module"
//! mfe_type: "source"
//! mfe_scope: "code"
//! mfe_description: "Lifecycle status state machine for registered micro-apps."
//! mfe_version: "v0.0.0-prealpha"
//! mfe_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a registered micro-app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
    Mounting,
    Mounted,
    Unmounting,
    NotMounted,
    LoadError,
}

impl AppStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStatus::NotLoaded => "NOT_LOADED",
            AppStatus::Loading => "LOADING",
            AppStatus::Loaded => "LOADED",
            AppStatus::Mounting => "MOUNTING",
            AppStatus::Mounted => "MOUNTED",
            AppStatus::Unmounting => "UNMOUNTING",
            AppStatus::NotMounted => "NOT_MOUNTED",
            AppStatus::LoadError => "LOAD_ERROR",
        }
    }

    /// Whether the orchestrator may move an app from `self` to `next`.
    pub fn can_transition_to(&self, next: AppStatus) -> bool {
        use AppStatus::{
            LoadError, Loaded, Loading, Mounted, Mounting, NotLoaded, NotMounted, Unmounting,
        };
        matches!(
            (self, next),
            (NotLoaded, Loading)
                | (Loading, Loaded)
                | (Loading, LoadError)
                | (Loaded, Mounting)
                | (Loaded, LoadError)
                | (Mounting, Mounted)
                | (Mounting, LoadError)
                | (Mounted, Unmounting)
                | (Unmounting, NotMounted)
                | (NotMounted, Loading)
                | (NotMounted, Mounting)
                | (LoadError, Loading)
        )
    }

    /// Mounted or somewhere between load start and unmount completion.
    pub fn is_occupying(&self) -> bool {
        matches!(
            self,
            AppStatus::Loading
                | AppStatus::Loaded
                | AppStatus::Mounting
                | AppStatus::Mounted
                | AppStatus::Unmounting
        )
    }

    /// A fresh load is required before the app can mount again.
    pub fn requires_load(&self) -> bool {
        matches!(self, AppStatus::NotLoaded | AppStatus::LoadError)
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_is_allowed() {
        let path = [
            AppStatus::NotLoaded,
            AppStatus::Loading,
            AppStatus::Loaded,
            AppStatus::Mounting,
            AppStatus::Mounted,
            AppStatus::Unmounting,
            AppStatus::NotMounted,
            AppStatus::Mounting,
        ];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be allowed",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn skipping_states_is_rejected() {
        assert!(!AppStatus::NotLoaded.can_transition_to(AppStatus::Mounted));
        assert!(!AppStatus::Mounted.can_transition_to(AppStatus::NotMounted));
        assert!(!AppStatus::NotMounted.can_transition_to(AppStatus::LoadError));
        assert!(!AppStatus::LoadError.can_transition_to(AppStatus::Mounting));
        assert!(AppStatus::LoadError.can_transition_to(AppStatus::Loading));
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&AppStatus::NotMounted).unwrap();
        assert_eq!(json, "\"NOT_MOUNTED\"");
        assert_eq!(AppStatus::LoadError.to_string(), "LOAD_ERROR");
    }
}
