use anyhow::Context;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::{debug, warn};
use url::Url;

use super::model::{ColumnItem, FilePreview, PreviewUrl};
use super::{StorageExplorer, navigation};
use crate::error::Result;
use crate::store::ObjectStore;

/// A URL handed out for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub id: String,
    pub url: String,
    /// Milliseconds since the epoch.
    pub fetched_at: i64,
    /// Seconds.
    pub expires_in: u64,
}

impl CachedFile {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        let expires_in_ms = i64::try_from(self.expires_in.saturating_mul(1000)).unwrap_or(i64::MAX);
        self.fetched_at.saturating_add(expires_in_ms) < now_ms
    }
}

/// File id to preview URL, with per-entry expiry.
#[derive(Debug, Default)]
pub struct PreviewCache {
    entries: HashMap<String, CachedFile>,
}

impl PreviewCache {
    /// The cached URL, unless the entry is missing or expired.
    pub fn get(&self, id: &str, now_ms: i64) -> Option<&str> {
        self.entries
            .get(id)
            .filter(|e| !e.is_expired(now_ms))
            .map(|e| e.url.as_str())
    }

    /// Adds or replaces the entry for `entry.id`.
    pub fn put(&mut self, entry: CachedFile) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn invalidate(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn invalidate_many<I, T>(&mut self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        for id in ids {
            self.entries.remove(id.as_ref());
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sets (or replaces) the `t` query parameter so browsers do not serve a stale
/// copy of a public object.
pub fn with_cache_buster(url: &str, now: DateTime<Utc>) -> anyhow::Result<String> {
    let mut parsed = Url::parse(url).with_context(|| format!("Invalid file URL: {}", url))?;
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != "t")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("t", &now.to_rfc3339());
    Ok(parsed.to_string())
}

impl<S: ObjectStore> StorageExplorer<S> {
    /// Public URL for public buckets, a signed URL otherwise. Returns the URL
    /// with the lifetime, in seconds, it was issued for.
    async fn fetch_file_url(
        &self,
        file: &ColumnItem,
        expires_in: u64,
    ) -> anyhow::Result<(String, u64)> {
        let bucket = self.selected_bucket()?;
        let path = navigation::join_path(&self.path_to_index(file.column_index), &file.item.name);
        let expires_in = if expires_in == 0 {
            self.config.signed_url_expiry_secs
        } else {
            expires_in
        };
        if bucket.public {
            Ok((self.store.get_public_url(&bucket.id, &path), expires_in))
        } else {
            let url = self
                .store
                .create_signed_url(&bucket.id, &path, expires_in)
                .await?;
            Ok((url, expires_in))
        }
    }

    /// Selects `file` for preview and resolves its URL, from the cache when a
    /// valid entry exists. Files above the preview size limit are never fetched.
    pub async fn set_file_preview(&self, file: ColumnItem) -> Result<PreviewUrl> {
        let bucket = self.selected_bucket()?;
        let publish = |url: PreviewUrl| {
            self.update(|s| {
                s.selected_file_preview = Some(FilePreview {
                    file: file.clone(),
                    url,
                })
            })
        };

        let size = file.item.size().unwrap_or(0);
        let has_mimetype = file
            .item
            .metadata
            .as_ref()
            .is_some_and(|m| m.mimetype.is_some());
        if !has_mimetype || size == 0 {
            publish(PreviewUrl::Unavailable);
            return Ok(PreviewUrl::Unavailable);
        }
        if size > self.config.preview_size_limit {
            debug!(file = %file.item.name, size, "preview skipped");
            publish(PreviewUrl::Skipped);
            return Ok(PreviewUrl::Skipped);
        }

        publish(PreviewUrl::Loading);
        let id = file.item.id.clone().unwrap_or_default();
        let now = Utc::now();
        let cached = self
            .previews()
            .get(&id, now.timestamp_millis())
            .map(str::to_string);
        let url = match cached {
            Some(url) => PreviewUrl::Url(url),
            None => match self.fetch_file_url(&file, 0).await {
                Ok((url, expires_in)) => {
                    self.previews().put(CachedFile {
                        id,
                        url: url.clone(),
                        fetched_at: now.timestamp_millis(),
                        expires_in,
                    });
                    if bucket.public {
                        PreviewUrl::Url(with_cache_buster(&url, now).unwrap_or(url))
                    } else {
                        PreviewUrl::Url(url)
                    }
                }
                Err(e) => {
                    warn!(file = %file.item.name, error = %e, "failed to fetch file preview");
                    PreviewUrl::Unavailable
                }
            },
        };
        publish(url.clone());
        Ok(url)
    }

    pub fn close_file_preview(&self) {
        self.update(|s| s.selected_file_preview = None);
    }

    /// URL for sharing or copying. `expires_in == 0` reuses a cached URL when
    /// one exists; otherwise a new URL is fetched with that expiry (or the
    /// default), stamped with `t=` and cached.
    pub async fn get_file_url(&self, file: &ColumnItem, expires_in: u64) -> Result<String> {
        let now = Utc::now();
        let id = file.item.id.clone().unwrap_or_default();
        if expires_in == 0 {
            if let Some(url) = self.previews().get(&id, now.timestamp_millis()) {
                return Ok(url.to_string());
            }
        }
        let (url, expires_in) = self.fetch_file_url(file, expires_in).await?;
        let url = with_cache_buster(&url, now)?;
        self.previews().put(CachedFile {
            id,
            url: url.clone(),
            fetched_at: now.timestamp_millis(),
            expires_in,
        });
        Ok(url)
    }

    /// Drops the cached URLs of objects that were renamed, moved or deleted.
    pub(crate) fn invalidate_previews<I, T>(&self, ids: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.previews().invalidate_many(ids);
    }

    pub fn cached_preview_count(&self) -> usize {
        self.previews().len()
    }
}
