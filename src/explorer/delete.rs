use itertools::Itertools;
use tracing::{info, warn};

use super::batch::BatchReport;
use super::model::{ColumnItem, ItemStatus};
use super::traversal::collect_descendants;
use super::{StorageExplorer, navigation};
use crate::error::Result;
use crate::store::{Bucket, ObjectStore};

impl<S: ObjectStore> StorageExplorer<S> {
    /// Removes `paths` with one call per chunk of `mutation_chunk_size`, chunk
    /// after chunk. A failed call fails every path of its chunk.
    async fn remove_in_chunks(&self, bucket: &Bucket, paths: &[String]) -> BatchReport {
        let mut report = BatchReport::default();
        for chunk in paths.chunks(self.config.mutation_chunk_size.max(1)) {
            match self.store.remove(&bucket.id, chunk).await {
                Ok(()) => report.succeeded(chunk.len()),
                Err(e) => {
                    warn!(bucket = %bucket.id, paths = chunk.len(), error = %e, "remove failed");
                    let message = format!("{:#}", e);
                    for path in chunk {
                        report.failed(path, &message);
                    }
                }
            }
        }
        report
    }

    fn forget_deleted(&self, ids: &[String]) {
        self.invalidate_previews(ids);
        self.update(|s| {
            s.selected_items.clear();
            if s.selected_file_preview
                .as_ref()
                .and_then(|p| p.file.item.id.as_ref())
                .is_some_and(|id| ids.contains(id))
            {
                s.selected_file_preview = None;
            }
        });
    }

    /// Deletes files, then re-creates the placeholder of every parent folder
    /// the deletion emptied.
    pub async fn delete_files(&self, files: &[ColumnItem]) -> Result<BatchReport> {
        let bucket = self.selected_bucket()?;
        let paths: Vec<String> = files
            .iter()
            .map(|f| navigation::join_path(&self.path_to_index(f.column_index), &f.item.name))
            .collect();
        if paths.is_empty() {
            return Ok(BatchReport::default());
        }
        let claim = self.claim(&bucket, &paths)?;
        for file in files {
            self.set_row_status(file.column_index, &file.item.name, ItemStatus::Loading, None);
        }

        info!(bucket = %bucket.id, files = paths.len(), "deleting files");
        let report = self.remove_in_chunks(&bucket, &paths).await;
        let failed: Vec<&str> = report.errors.iter().map(|e| e.path.as_str()).collect();
        let (reverted, deleted): (Vec<_>, Vec<_>) = files
            .iter()
            .zip(&paths)
            .partition(|(_, path)| failed.contains(&path.as_str()));
        for (file, _) in reverted {
            self.set_row_status(file.column_index, &file.item.name, ItemStatus::Ready, None);
        }
        let deleted_ids: Vec<String> = deleted
            .iter()
            .filter_map(|(file, _)| file.item.id.clone())
            .collect();
        self.forget_deleted(&deleted_ids);

        let parents: Vec<&str> = deleted
            .iter()
            .map(|(_, path)| navigation::parent_prefix(path))
            .unique()
            .collect();
        for parent in parents {
            self.validate_parent_folder_empty(&bucket, parent).await;
        }
        drop(claim);
        self.reconcile().await;
        Ok(report)
    }

    /// Deletes every object below `folder`, placeholders included, and closes
    /// the columns that showed it.
    pub async fn delete_folder(&self, folder: &ColumnItem) -> Result<BatchReport> {
        let bucket = self.selected_bucket()?;
        let column_index = folder.column_index;
        let parent = self.path_to_index(column_index);
        let folder_path = navigation::join_path(&parent, &folder.item.name);
        let claim = self.claim(&bucket, [&folder_path])?;
        self.set_row_status(column_index, &folder.item.name, ItemStatus::Loading, None);

        let sort_by = self.state.borrow().preferences.sort();
        let descendants =
            match collect_descendants(&self.store, &bucket.id, &folder_path, sort_by, &self.config)
                .await
            {
                Ok(descendants) => descendants,
                Err(e) => {
                    warn!(folder = %folder_path, error = %e, "failed to delete folder");
                    self.set_row_status(column_index, &folder.item.name, ItemStatus::Ready, None);
                    return Err(e);
                }
            };

        info!(bucket = %bucket.id, folder = %folder_path, objects = descendants.len(), "deleting folder");
        let paths: Vec<String> = descendants.iter().map(|d| d.path()).collect();
        let report = self.remove_in_chunks(&bucket, &paths).await;
        let failed: Vec<&str> = report.errors.iter().map(|e| e.path.as_str()).collect();
        let deleted_ids: Vec<String> = descendants
            .iter()
            .filter(|d| !failed.contains(&d.path().as_str()))
            .filter_map(|d| d.id.clone())
            .collect();
        self.forget_deleted(&deleted_ids);

        self.aborts.abort();
        self.update(|s| {
            s.columns = navigation::pop_column_at(&s.columns, column_index);
            s.opened_folders = navigation::pop_opened_folders_at(&s.opened_folders, column_index);
        });
        self.validate_parent_folder_empty(&bucket, &parent).await;
        drop(claim);
        self.reconcile().await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ExplorerConfig;
    use crate::explorer::Outcome;
    use crate::explorer::testing::*;
    use crate::store::{FailPoint, MemoryStore};

    #[tokio::test]
    async fn deleting_an_open_folder_removes_everything_below_it() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "docs/readme.md", b"r");
        store.put_object("b", "docs/img/.emptyFolderPlaceholder", b"");
        store.put_object("b", "other.txt", b"o");
        let explorer = opened(store).await;
        let docs = item(&explorer, 0, "docs");
        explorer.open_folder(0, &docs.item).await?;
        let img = item(&explorer, 1, "img").item;
        explorer.open_folder(1, &img).await?;

        let report = explorer.delete_folder(&docs).await?;
        assert_eq!((report.success_count, report.fail_count), (2, 0));
        assert_eq!(explorer.store().object_paths("b"), vec!["other.txt"]);
        let state = explorer.snapshot();
        assert_eq!(state.columns.len(), 1);
        assert!(state.opened_folders.is_empty());
        assert_eq!(names(&explorer, 0), vec!["other.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn emptied_folders_keep_exactly_one_placeholder() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "a/b/one.txt", b"1");
        store.put_object("b", "a/b/two.txt", b"2");
        let explorer = opened(store).await;
        explorer
            .fetch_folders_by_path(&["a".to_string(), "b".to_string()], "", false)
            .await?;

        explorer.delete_files(&[item(&explorer, 2, "one.txt")]).await?;
        assert_eq!(explorer.store().object_paths("b"), vec!["a/b/two.txt"]);
        explorer.delete_files(&[item(&explorer, 2, "two.txt")]).await?;
        assert_eq!(
            explorer.store().object_paths("b"),
            vec!["a/b/.emptyFolderPlaceholder"]
        );
        // The placeholder itself keeps the folder listed.
        assert!(names(&explorer, 2).is_empty());
        assert_eq!(names(&explorer, 1), vec!["b"]);

        let b = item(&explorer, 1, "b");
        explorer.delete_folder(&b).await?;
        assert_eq!(
            explorer.store().object_paths("b"),
            vec!["a/.emptyFolderPlaceholder"]
        );
        assert_eq!(explorer.snapshot().columns.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn root_never_gets_a_placeholder() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "only.txt", b"1");
        let explorer = opened(store).await;
        explorer.delete_files(&[item(&explorer, 0, "only.txt")]).await?;
        assert!(explorer.store().object_paths("b").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn failed_chunk_reverts_rows() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "keep.txt", b"1");
        store.put_object("b", "x.txt", b"2");
        store.fail(FailPoint::Remove("x.txt".to_string()));
        let explorer = opened(store).await;

        let files = [item(&explorer, 0, "keep.txt"), item(&explorer, 0, "x.txt")];
        let report = explorer.delete_files(&files).await?;
        assert_eq!(report.outcome(), Outcome::Failure);
        assert_eq!(report.fail_count, 2);
        assert_eq!(names(&explorer, 0), vec!["keep.txt", "x.txt"]);
        assert!(
            explorer.snapshot().columns[0]
                .items
                .iter()
                .all(|i| i.status == crate::explorer::ItemStatus::Ready)
        );
        Ok(())
    }

    fn chunked(store: MemoryStore) -> crate::explorer::StorageExplorer<MemoryStore> {
        explorer_with(
            store,
            ExplorerConfig {
                mutation_chunk_size: 2,
                ..Default::default()
            },
        )
    }

    fn removes(explorer: &crate::explorer::StorageExplorer<MemoryStore>) -> Vec<String> {
        explorer
            .store()
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("remove "))
            .collect()
    }

    #[tokio::test]
    async fn files_are_removed_in_chunks() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let bucket = store.add_bucket("b", false);
        for i in 0..5 {
            store.put_object("b", &format!("f{i}.txt"), b"x");
        }
        let explorer = chunked(store);
        explorer.open_bucket(&bucket).await?;
        explorer.store().clear_calls();

        let files: Vec<_> = (0..5).map(|i| item(&explorer, 0, &format!("f{i}.txt"))).collect();
        let report = explorer.delete_files(&files).await?;
        assert_eq!(report.success_count, 5);
        assert_eq!(removes(&explorer), vec!["remove b [2]", "remove b [2]", "remove b [1]"]);
        assert!(explorer.store().object_paths("b").is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn a_failed_chunk_only_fails_its_own_paths() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let bucket = store.add_bucket("b", false);
        for i in 0..5 {
            store.put_object("b", &format!("d/f{i}.txt"), b"x");
        }
        store.fail(FailPoint::Remove("d/f2.txt".to_string()));
        let explorer = chunked(store);
        explorer.open_bucket(&bucket).await?;
        explorer.store().clear_calls();

        let report = explorer.delete_folder(&item(&explorer, 0, "d")).await?;
        assert_eq!(removes(&explorer).len(), 3);
        assert_eq!((report.success_count, report.fail_count), (3, 2));
        assert_eq!(report.outcome(), Outcome::Partial);
        let mut failed: Vec<_> = report.errors.iter().map(|e| e.path.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["d/f2.txt", "d/f3.txt"]);
        assert_eq!(
            explorer.store().object_paths("b"),
            vec!["d/f2.txt", "d/f3.txt"]
        );
        Ok(())
    }
}
