//! # Explorer Configuration
//!
//! Batch sizes, deadlines and limits used by the explorer. Every field has a
//! default; a JSON file can override any subset, and `STORAGE_EXPLORER_*`
//! environment variables override both.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// One year, in seconds.
pub const DEFAULT_EXPIRY_SECS: u64 = 365 * 24 * 60 * 60;

/// 10 MB.
pub const PREVIEW_SIZE_LIMIT: u64 = 10 * 1000 * 1000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Identifies the project; used to key persisted preferences.
    pub project_ref: String,
    /// Page size of a column listing.
    pub list_limit: usize,
    /// Page size used when walking every descendant of a folder.
    pub traversal_page_size: usize,
    /// Deepest folder nesting a traversal will descend into.
    pub max_traversal_depth: usize,
    pub upload_batch_size: usize,
    pub upload_timeout_secs: u64,
    /// Paths per remove call, and moves per concurrent batch.
    pub mutation_chunk_size: usize,
    pub download_batch_size: usize,
    pub selected_download_batch_size: usize,
    pub preview_size_limit: u64,
    pub signed_url_expiry_secs: u64,
    /// Global upload limit in bytes; a bucket's own limit takes precedence.
    pub file_size_limit: Option<u64>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        ExplorerConfig {
            project_ref: "default".to_string(),
            list_limit: 200,
            traversal_page_size: 10_000,
            max_traversal_depth: 64,
            upload_batch_size: 10,
            upload_timeout_secs: 30,
            mutation_chunk_size: 100,
            download_batch_size: 10,
            selected_download_batch_size: 50,
            preview_size_limit: PREVIEW_SIZE_LIMIT,
            signed_url_expiry_secs: DEFAULT_EXPIRY_SECS,
            file_size_limit: None,
        }
    }
}

impl ExplorerConfig {
    /// Reads a JSON config file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Applies `STORAGE_EXPLORER_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        fn parse<T: std::str::FromStr>(key: &str, value: String) -> Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .trim()
                .parse()
                .with_context(|| format!("Invalid value for {}: {}", key, value))
        }

        if let Some(v) = lookup("STORAGE_EXPLORER_PROJECT_REF") {
            self.project_ref = v;
        }
        if let Some(v) = lookup("STORAGE_EXPLORER_UPLOAD_TIMEOUT_SECS") {
            self.upload_timeout_secs = parse("STORAGE_EXPLORER_UPLOAD_TIMEOUT_SECS", v)?;
        }
        if let Some(v) = lookup("STORAGE_EXPLORER_UPLOAD_BATCH_SIZE") {
            self.upload_batch_size = parse("STORAGE_EXPLORER_UPLOAD_BATCH_SIZE", v)?;
        }
        if let Some(v) = lookup("STORAGE_EXPLORER_PREVIEW_SIZE_LIMIT") {
            self.preview_size_limit = parse("STORAGE_EXPLORER_PREVIEW_SIZE_LIMIT", v)?;
        }
        if let Some(v) = lookup("STORAGE_EXPLORER_FILE_SIZE_LIMIT") {
            self.file_size_limit = Some(parse("STORAGE_EXPLORER_FILE_SIZE_LIMIT", v)?);
        }
        Ok(self)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("explorer.json");
        std::fs::write(&path, r#"{"project_ref": "abc", "upload_batch_size": 4}"#)?;
        let config = ExplorerConfig::from_file(&path)?;
        assert_eq!(config.project_ref, "abc");
        assert_eq!(config.upload_batch_size, 4);
        assert_eq!(config.mutation_chunk_size, 100);
        assert_eq!(config.upload_timeout(), Duration::from_secs(30));
        Ok(())
    }

    #[test]
    fn env_overrides() -> Result<()> {
        let env: HashMap<&str, &str> = [
            ("STORAGE_EXPLORER_UPLOAD_TIMEOUT_SECS", "5"),
            ("STORAGE_EXPLORER_FILE_SIZE_LIMIT", "1024"),
        ]
        .into_iter()
        .collect();
        let config = ExplorerConfig::default()
            .with_overrides(|k| env.get(k).map(|v| v.to_string()))?;
        assert_eq!(config.upload_timeout_secs, 5);
        assert_eq!(config.file_size_limit, Some(1024));

        let bad = ExplorerConfig::default().with_overrides(|k| {
            (k == "STORAGE_EXPLORER_UPLOAD_BATCH_SIZE").then(|| "ten".to_string())
        });
        assert!(bad.is_err());
        Ok(())
    }
}
