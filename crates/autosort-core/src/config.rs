//! Preferences and scheduler configuration
//!
//! Preferences mirror what a settings page stores: sort keys are kept as
//! indices into [`SortKey::TABLE`], and a type priority of `0` means
//! "use the default for that kind".

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::comparator::{SortCriteria, SortKey};
use crate::error::ConfigError;

/// Relative order of item kinds inside one group (lower sorts first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypePriorities {
    pub folder: i32,
    pub feed_folder: i32,
    pub query_bookmark: i32,
    pub bookmark: i32,
}

impl Default for TypePriorities {
    fn default() -> Self {
        Self {
            folder: 1,
            feed_folder: 2,
            query_bookmark: 3,
            bookmark: 4,
        }
    }
}

impl TypePriorities {
    /// Replace unset (zero) priorities with their defaults.
    pub fn effective(&self) -> Self {
        let defaults = Self::default();
        let pick = |value: i32, default: i32| if value == 0 { default } else { value };
        Self {
            folder: pick(self.folder, defaults.folder),
            feed_folder: pick(self.feed_folder, defaults.feed_folder),
            query_bookmark: pick(self.query_bookmark, defaults.query_bookmark),
            bookmark: pick(self.bookmark, defaults.bookmark),
        }
    }

    /// Folders get their own ordering only when no other kind shares their priority.
    pub fn distinct_folder_order(&self) -> bool {
        let p = self.effective();
        p.folder != p.feed_folder && p.folder != p.query_bookmark && p.folder != p.bookmark
    }
}

/// User preferences driving the sorter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Sort automatically whenever the tree changes
    pub auto_sort: bool,
    /// Primary key index
    pub sort_by: usize,
    pub inverse: bool,
    /// Secondary key index; out of range means "none"
    pub then_sort_by: Option<usize>,
    pub then_inverse: bool,
    /// Folder key index, used when folders have their own priority
    pub folder_sort_by: Option<usize>,
    pub folder_inverse: bool,
    pub case_insensitive: bool,
    pub priorities: TypePriorities,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            auto_sort: true,
            sort_by: SortKey::Title.index(),
            inverse: false,
            then_sort_by: None,
            then_inverse: false,
            folder_sort_by: Some(SortKey::Title.index()),
            folder_inverse: false,
            case_insensitive: false,
            priorities: TypePriorities::default(),
        }
    }
}

impl Preferences {
    /// Load preferences from a JSON string; missing fields take defaults.
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if SortKey::from_index(self.sort_by).is_none() {
            return Err(ConfigError::UnknownSortKey(self.sort_by));
        }
        let p = &self.priorities;
        if [p.folder, p.feed_folder, p.query_bookmark, p.bookmark]
            .iter()
            .any(|v| *v < 0)
        {
            return Err(ConfigError::Invalid(
                "type priorities must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Build comparator criteria from these preferences.
    pub fn criteria(&self) -> Result<SortCriteria, ConfigError> {
        self.validate()?;
        let primary_key =
            SortKey::from_index(self.sort_by).ok_or(ConfigError::UnknownSortKey(self.sort_by))?;

        Ok(SortCriteria {
            primary_key,
            primary_reverse: self.inverse,
            secondary_key: self.then_sort_by.and_then(SortKey::from_index),
            secondary_reverse: self.then_inverse,
            distinct_folder_order: self.priorities.distinct_folder_order(),
            folder_key: self.folder_sort_by.and_then(SortKey::from_index),
            folder_reverse: self.folder_inverse,
            case_insensitive: self.case_insensitive,
        })
    }
}

/// Timing knobs of the change scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Interval between dirty checks, in milliseconds
    pub debounce_ms: u64,
    /// Poll interval while waiting to attach the change listener
    pub listener_retry_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 3000,
            listener_retry_ms: 500,
        }
    }
}

impl SchedulerConfig {
    pub fn debounce_interval(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn listener_retry_interval(&self) -> Duration {
        Duration::from_millis(self.listener_retry_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::ZeroInterval("debounce_ms"));
        }
        if self.listener_retry_ms == 0 {
            return Err(ConfigError::ZeroInterval("listener_retry_ms"));
        }
        Ok(())
    }
}

/// How stored preferences relate to the running version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    /// Nothing stored yet; preferences start from defaults.
    FirstInstall,
    /// Stored by an older (or different) version.
    Upgrade { from: String },
    Current,
}

impl InstallState {
    pub fn detect(stored_version: Option<&str>, current_version: &str) -> Self {
        match stored_version {
            None => InstallState::FirstInstall,
            Some(v) if v == current_version => InstallState::Current,
            Some(v) => InstallState::Upgrade {
                from: v.to_string(),
            },
        }
    }
}

/// Preferences as persisted, tagged with the version that wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceFile {
    pub version: Option<String>,
    pub preferences: Preferences,
}

impl PreferenceFile {
    /// Resolve the preferences to run with and stamp the current version.
    ///
    /// A first install discards whatever was stored and starts from defaults.
    pub fn install_or_upgrade(mut self, current_version: &str) -> (Self, InstallState) {
        let state = InstallState::detect(self.version.as_deref(), current_version);
        match &state {
            InstallState::FirstInstall => {
                info!("First install, using default preferences");
                self.preferences = Preferences::default();
            }
            InstallState::Upgrade { from } => {
                info!("Upgrade from {} to {}", from, current_version);
            }
            InstallState::Current => {}
        }
        self.version = Some(current_version.to_string());
        (self, state)
    }
}
