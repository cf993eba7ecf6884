//! # In-Process Object Store
//!
//! Keeps buckets and objects in a `BTreeMap` keyed by full object path and
//! derives folders from the `/` separated keys, exactly like a prefix listing
//! against the real service. Failures and latency can be injected per path,
//! and every remote-style call is recorded so callers can assert on traffic.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

use super::ObjectStore;
use super::types::{
    Bucket, BucketOptions, ListOptions, ObjectMetadata, SortBy, SortColumn, SortOrder,
    StorageObject, UploadOptions,
};

const BASE_URL: &str = "http://memory.local/storage/v1";

/// A call that should fail instead of touching the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailPoint {
    Upload(String),
    Download(String),
    /// Matches on the source path.
    Move(String),
    /// Fails the whole request if any requested path matches.
    Remove(String),
    /// Matches on the listed prefix.
    List(String),
    Sign(String),
}

#[derive(Debug, Clone)]
struct StoredObject {
    id: String,
    data: Vec<u8>,
    content_type: Option<String>,
    cache_control: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct StoredBucket {
    bucket: Bucket,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Default)]
struct Inner {
    buckets: BTreeMap<String, StoredBucket>,
    fail_points: Vec<FailPoint>,
    upload_delays: HashMap<String, Duration>,
    list_delays: HashMap<String, Duration>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a bucket whose id equals its name. Existing buckets are kept.
    pub fn add_bucket(&self, name: &str, public: bool) -> Bucket {
        let mut inner = self.lock();
        let entry = inner
            .buckets
            .entry(name.to_string())
            .or_insert_with(|| StoredBucket {
                bucket: Bucket {
                    id: name.to_string(),
                    name: name.to_string(),
                    public,
                    file_size_limit: None,
                    allowed_mime_types: None,
                    created_at: Some(Utc::now()),
                },
                objects: BTreeMap::new(),
            });
        entry.bucket.clone()
    }

    /// Seeds an object without recording a call. Creates the bucket if needed.
    pub fn put_object(&self, bucket_id: &str, path: &str, data: &[u8]) {
        self.add_bucket(bucket_id, false);
        let mut inner = self.lock();
        if let Some(bucket) = inner.buckets.get_mut(bucket_id) {
            let now = Utc::now();
            bucket.objects.insert(
                path.to_string(),
                StoredObject {
                    id: Uuid::new_v4().to_string(),
                    data: data.to_vec(),
                    content_type: mime_guess::from_path(path).first_raw().map(str::to_string),
                    cache_control: "3600".to_string(),
                    created_at: now,
                    updated_at: now,
                },
            );
        }
    }

    /// Every object path in the bucket, sorted.
    pub fn object_paths(&self, bucket_id: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket_id)
            .map(|b| b.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, bucket_id: &str, path: &str) -> bool {
        self.lock()
            .buckets
            .get(bucket_id)
            .is_some_and(|b| b.objects.contains_key(path))
    }

    pub fn fail(&self, point: FailPoint) {
        self.lock().fail_points.push(point);
    }

    #[cfg(test)]
    fn clear_failures(&self) {
        self.lock().fail_points.clear();
    }

    pub fn delay_upload(&self, path: &str, delay: Duration) {
        self.lock().upload_delays.insert(path.to_string(), delay);
    }

    pub fn delay_list(&self, prefix: &str, delay: Duration) {
        self.lock().list_delays.insert(prefix.to_string(), delay);
    }

    /// Recorded calls, e.g. `list photos/2024` or `sign photos/a.png`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn record(&self, call: String) {
        self.lock().calls.push(call);
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        if self.lock().fail_points.contains(&point) {
            bail!("injected failure: {:?}", point);
        }
        Ok(())
    }
}

fn list_children(objects: &BTreeMap<String, StoredObject>, prefix: &str) -> Vec<StorageObject> {
    let dir = prefix.trim_matches('/');
    let scope = if dir.is_empty() {
        String::new()
    } else {
        format!("{dir}/")
    };

    let mut folders = BTreeSet::new();
    let mut entries = Vec::new();
    for (key, object) in objects.range(scope.clone()..) {
        let Some(rest) = key.strip_prefix(&scope) else {
            break;
        };
        match rest.split_once('/') {
            Some((folder, _)) => {
                folders.insert(folder.to_string());
            }
            None => entries.push(StorageObject {
                name: rest.to_string(),
                id: Some(object.id.clone()),
                created_at: Some(object.created_at),
                updated_at: Some(object.updated_at),
                last_accessed_at: Some(object.updated_at),
                metadata: Some(ObjectMetadata {
                    size: object.data.len() as u64,
                    mimetype: object.content_type.clone(),
                    cache_control: Some(format!("max-age={}", object.cache_control)),
                    last_modified: Some(object.updated_at),
                }),
            }),
        }
    }
    entries.extend(folders.into_iter().map(StorageObject::folder));
    entries
}

fn sort_entries(entries: &mut [StorageObject], sort_by: SortBy) {
    entries.sort_by(|a, b| {
        let ord = match sort_by.column {
            SortColumn::Name => a.name.cmp(&b.name),
            SortColumn::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortColumn::CreatedAt => a.created_at.cmp(&b.created_at),
            SortColumn::LastAccessedAt => a.last_accessed_at.cmp(&b.last_accessed_at),
        }
        .then_with(|| a.name.cmp(&b.name));
        match sort_by.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

impl ObjectStore for MemoryStore {
    async fn list_objects(
        &self,
        bucket_id: &str,
        prefix: &str,
        options: &ListOptions,
    ) -> Result<Vec<StorageObject>> {
        self.record(format!("list {}/{}", bucket_id, prefix));
        let delay = self.lock().list_delays.get(prefix).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(FailPoint::List(prefix.to_string()))?;

        let inner = self.lock();
        let Some(bucket) = inner.buckets.get(bucket_id) else {
            bail!("Bucket not found: {}", bucket_id);
        };
        let mut entries = list_children(&bucket.objects, prefix);
        if let Some(search) = options.search.as_deref().filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            entries.retain(|e| e.name.to_lowercase().starts_with(&needle));
        }
        sort_entries(&mut entries, options.sort_by);
        Ok(entries
            .into_iter()
            .skip(options.offset)
            .take(options.limit)
            .collect())
    }

    async fn upload(
        &self,
        bucket_id: &str,
        path: &str,
        data: &[u8],
        options: &UploadOptions,
    ) -> Result<()> {
        self.record(format!("upload {}/{}", bucket_id, path));
        let delay = self.lock().upload_delays.get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(FailPoint::Upload(path.to_string()))?;

        let mut inner = self.lock();
        let Some(bucket) = inner.buckets.get_mut(bucket_id) else {
            bail!("Bucket not found: {}", bucket_id);
        };
        if bucket.objects.contains_key(path) && !options.upsert {
            bail!("The resource already exists: {}", path);
        }
        let now = Utc::now();
        bucket.objects.insert(
            path.to_string(),
            StoredObject {
                id: Uuid::new_v4().to_string(),
                data: data.to_vec(),
                content_type: options.content_type.clone(),
                cache_control: options.cache_control.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn download(&self, bucket_id: &str, path: &str) -> Result<Vec<u8>> {
        self.record(format!("download {}/{}", bucket_id, path));
        self.check(FailPoint::Download(path.to_string()))?;
        let inner = self.lock();
        match inner.buckets.get(bucket_id).and_then(|b| b.objects.get(path)) {
            Some(object) => Ok(object.data.clone()),
            None => bail!("Object not found: {}/{}", bucket_id, path),
        }
    }

    async fn move_object(&self, bucket_id: &str, from: &str, to: &str) -> Result<()> {
        self.record(format!("move {}/{} -> {}", bucket_id, from, to));
        self.check(FailPoint::Move(from.to_string()))?;
        let mut inner = self.lock();
        let Some(bucket) = inner.buckets.get_mut(bucket_id) else {
            bail!("Bucket not found: {}", bucket_id);
        };
        if bucket.objects.contains_key(to) {
            bail!("The resource already exists: {}", to);
        }
        let Some(mut object) = bucket.objects.remove(from) else {
            bail!("Object not found: {}/{}", bucket_id, from);
        };
        object.updated_at = Utc::now();
        bucket.objects.insert(to.to_string(), object);
        Ok(())
    }

    async fn remove(&self, bucket_id: &str, paths: &[String]) -> Result<()> {
        self.record(format!("remove {} [{}]", bucket_id, paths.len()));
        for path in paths {
            self.check(FailPoint::Remove(path.clone()))?;
        }
        let mut inner = self.lock();
        let Some(bucket) = inner.buckets.get_mut(bucket_id) else {
            bail!("Bucket not found: {}", bucket_id);
        };
        for path in paths {
            bucket.objects.remove(path);
        }
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket_id: &str,
        path: &str,
        expires_in: u64,
    ) -> Result<String> {
        self.record(format!("sign {}/{}", bucket_id, path));
        self.check(FailPoint::Sign(path.to_string()))?;
        if !self.contains(bucket_id, path) {
            bail!("Object not found: {}/{}", bucket_id, path);
        }
        Ok(format!(
            "{}/object/sign/{}/{}?token={}&expires_in={}",
            BASE_URL,
            bucket_id,
            path,
            Uuid::new_v4(),
            expires_in
        ))
    }

    fn get_public_url(&self, bucket_id: &str, path: &str) -> String {
        format!("{}/object/public/{}/{}", BASE_URL, bucket_id, path)
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        self.record("list_buckets".to_string());
        Ok(self
            .lock()
            .buckets
            .values()
            .map(|b| b.bucket.clone())
            .collect())
    }

    async fn create_bucket(&self, name: &str, options: &BucketOptions) -> Result<()> {
        self.record(format!("create_bucket {}", name));
        if self.lock().buckets.contains_key(name) {
            bail!("The resource already exists: {}", name);
        }
        self.add_bucket(name, options.public);
        self.update_bucket_options(name, options)
    }

    async fn update_bucket(&self, id: &str, options: &BucketOptions) -> Result<()> {
        self.record(format!("update_bucket {}", id));
        self.update_bucket_options(id, options)
    }

    async fn delete_bucket(&self, id: &str) -> Result<()> {
        self.record(format!("delete_bucket {}", id));
        let mut inner = self.lock();
        let is_empty = match inner.buckets.get(id) {
            Some(b) => b.objects.is_empty(),
            None => bail!("Bucket not found: {}", id),
        };
        if !is_empty {
            bail!("Bucket must be empty before it can be deleted: {}", id);
        }
        inner.buckets.remove(id);
        Ok(())
    }

    async fn empty_bucket(&self, id: &str) -> Result<()> {
        self.record(format!("empty_bucket {}", id));
        let mut inner = self.lock();
        let Some(bucket) = inner.buckets.get_mut(id) else {
            bail!("Bucket not found: {}", id);
        };
        bucket.objects.clear();
        Ok(())
    }
}

impl MemoryStore {
    fn update_bucket_options(&self, id: &str, options: &BucketOptions) -> Result<()> {
        let mut inner = self.lock();
        let Some(bucket) = inner.buckets.get_mut(id) else {
            bail!("Bucket not found: {}", id);
        };
        bucket.bucket.public = options.public;
        bucket.bucket.file_size_limit = options.file_size_limit;
        bucket.bucket.allowed_mime_types = options.allowed_mime_types.clone();
        Ok(())
    }
}
