use tracing::info;

use super::StorageExplorer;
use super::model::ExplorerState;
use crate::error::{ExplorerError, Result};
use crate::preferences::BucketSort;
use crate::store::{Bucket, BucketOptions, ObjectStore};

fn validate_bucket_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ExplorerError::InvalidName(
            "Bucket name cannot be empty".to_string(),
        ));
    }
    if name.contains('/') {
        return Err(ExplorerError::InvalidName(
            "Bucket name cannot contain forward slashes".to_string(),
        ));
    }
    Ok(())
}

impl<S: ObjectStore> StorageExplorer<S> {
    fn is_selected(&self, bucket_id: &str) -> bool {
        self.state
            .borrow()
            .selected_bucket
            .as_ref()
            .is_some_and(|b| b.id == bucket_id)
    }

    /// All buckets, ordered by the bucket sort preference.
    pub async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let mut buckets = self.store.list_buckets().await?;
        let sort = self.state.borrow().preferences.sort_bucket;
        match sort {
            BucketSort::Alphabetical => buckets.sort_by(|a, b| a.name.cmp(&b.name)),
            BucketSort::CreatedAt => buckets.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then_with(|| a.name.cmp(&b.name))
            }),
        }
        Ok(buckets)
    }

    pub async fn create_bucket(&self, name: &str, options: &BucketOptions) -> Result<()> {
        validate_bucket_name(name)?;
        self.store.create_bucket(name, options).await?;
        info!(bucket = name, public = options.public, "created bucket");
        Ok(())
    }

    /// Applies new options and refreshes the selected bucket if it is this one.
    pub async fn update_bucket(&self, bucket_id: &str, options: &BucketOptions) -> Result<()> {
        self.store.update_bucket(bucket_id, options).await?;
        if self.is_selected(bucket_id) {
            self.update(|s| {
                if let Some(bucket) = s.selected_bucket.as_mut() {
                    bucket.public = options.public;
                    bucket.file_size_limit = options.file_size_limit;
                    bucket.allowed_mime_types = options.allowed_mime_types.clone();
                }
            });
        }
        info!(bucket = bucket_id, "updated bucket");
        Ok(())
    }

    /// Removes every object of the bucket.
    pub async fn empty_bucket(&self, bucket: &Bucket) -> Result<()> {
        let claim = self.claim(bucket, [""])?;
        self.store.empty_bucket(&bucket.id).await?;
        info!(bucket = %bucket.id, "emptied bucket");
        drop(claim);
        if self.is_selected(&bucket.id) {
            self.reconcile().await;
        }
        Ok(())
    }

    /// Empties and deletes the bucket. Deleting the selected bucket closes it.
    pub async fn delete_bucket(&self, bucket: &Bucket) -> Result<()> {
        let claim = self.claim(bucket, [""])?;
        self.store.empty_bucket(&bucket.id).await?;
        self.store.delete_bucket(&bucket.id).await?;
        info!(bucket = %bucket.id, "deleted bucket");
        drop(claim);
        if self.is_selected(&bucket.id) {
            self.aborts.abort();
            self.update(|s| {
                *s = ExplorerState {
                    preferences: s.preferences,
                    ..Default::default()
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::testing::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn buckets_follow_the_sort_preference() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.add_bucket("zeta", false);
        store.add_bucket("alpha", true);
        let explorer = explorer(store);

        let names = |buckets: Vec<Bucket>| buckets.into_iter().map(|b| b.name).collect::<Vec<_>>();
        explorer.set_sort_bucket(BucketSort::Alphabetical)?;
        assert_eq!(names(explorer.list_buckets().await?), vec!["alpha", "zeta"]);
        Ok(())
    }

    #[tokio::test]
    async fn create_validates_names() -> anyhow::Result<()> {
        let explorer = explorer(MemoryStore::new());
        assert!(matches!(
            explorer.create_bucket("a/b", &BucketOptions::default()).await,
            Err(ExplorerError::InvalidName(_))
        ));
        assert!(matches!(
            explorer.create_bucket(" ", &BucketOptions::default()).await,
            Err(ExplorerError::InvalidName(_))
        ));
        explorer
            .create_bucket("media", &BucketOptions { public: true, ..Default::default() })
            .await?;
        let buckets = explorer.list_buckets().await?;
        assert_eq!(buckets.len(), 1);
        assert!(buckets[0].public);
        Ok(())
    }

    #[tokio::test]
    async fn updating_the_selected_bucket_updates_state() -> anyhow::Result<()> {
        let explorer = opened(MemoryStore::new()).await;
        let options = BucketOptions {
            public: true,
            file_size_limit: Some(1024),
            allowed_mime_types: None,
        };
        explorer.update_bucket("b", &options).await?;
        let bucket = explorer.selected_bucket()?;
        assert!(bucket.public);
        assert_eq!(bucket.file_size_limit, Some(1024));
        Ok(())
    }

    #[tokio::test]
    async fn deleting_the_selected_bucket_closes_it() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "a/b.txt", b"1");
        let explorer = opened(store).await;
        let bucket = explorer.selected_bucket()?;

        explorer.empty_bucket(&bucket).await?;
        assert!(explorer.snapshot().columns[0].items.is_empty());
        explorer.delete_bucket(&bucket).await?;
        assert!(matches!(
            explorer.selected_bucket(),
            Err(ExplorerError::NoBucketSelected)
        ));
        assert!(explorer.snapshot().columns.is_empty());
        assert!(explorer.list_buckets().await?.is_empty());
        Ok(())
    }
}
