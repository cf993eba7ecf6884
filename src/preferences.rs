//! # Explorer Preferences
//!
//! View mode and sort order survive between sessions as one flat JSON record
//! per project, stored under the key `storage-<projectRef>`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::store::{SortBy, SortColumn, SortOrder};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StorageView {
    #[default]
    Columns,
    List,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketSort {
    Alphabetical,
    #[default]
    CreatedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerPreferences {
    pub view: StorageView,
    #[serde(rename = "sortBy")]
    pub sort_by: SortColumn,
    #[serde(rename = "sortByOrder")]
    pub sort_by_order: SortOrder,
    #[serde(rename = "sortBucket")]
    pub sort_bucket: BucketSort,
}

/// Key/value storage for preference records.
pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String) -> Result<()>;
}

pub fn preference_key(project_ref: &str) -> String {
    format!("storage-{}", project_ref)
}

impl ExplorerPreferences {
    /// Loads the project's record; anything missing or unparseable yields defaults.
    pub fn load(store: &dyn PreferenceStore, project_ref: &str) -> Self {
        let key = preference_key(project_ref);
        match store.get(&key).map(|raw| serde_json::from_str(&raw)) {
            Some(Ok(prefs)) => prefs,
            Some(Err(e)) => {
                debug!(key, error = %e, "ignoring unreadable preferences");
                Self::default()
            }
            None => Self::default(),
        }
    }

    pub fn save(&self, store: &dyn PreferenceStore, project_ref: &str) -> Result<()> {
        let value = serde_json::to_string(self)?;
        store.set(&preference_key(project_ref), value)
    }

    pub fn sort(&self) -> SortBy {
        SortBy {
            column: self.sort_by,
            order: self.sort_by_order,
        }
    }
}

#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, String>>,
}

impl PreferenceStore for MemoryPreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// Keeps every record in a single JSON object file (`{"storage-abc": "{...}"}`).
pub struct JsonFilePreferenceStore {
    path: PathBuf,
}

impl JsonFilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFilePreferenceStore { path: path.into() }
    }

    fn read_all(&self) -> HashMap<String, String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default()
    }
}

impl PreferenceStore for JsonFilePreferenceStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        let mut all = self.read_all();
        all.insert(key.to_string(), value);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&all)?;
        std::fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}
