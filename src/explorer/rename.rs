use itertools::Itertools;
use tracing::{info, warn};

use super::batch::{BatchItem, BatchReport, run_in_batches};
use super::model::{ColumnItem, Item, ItemStatus};
use super::traversal::collect_descendants;
use super::{StorageExplorer, names, navigation};
use crate::error::{ExplorerError, Result};
use crate::store::{Bucket, ObjectStore};

/// One object move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTask {
    pub from: String,
    pub to: String,
    pub id: Option<String>,
}

impl BatchItem for MoveTask {
    fn label(&self) -> String {
        self.from.clone()
    }
}

/// `path` with its segment at `index` replaced by `name`.
fn replace_segment(path: &str, index: usize, name: &str) -> String {
    path.split('/')
        .enumerate()
        .map(|(i, segment)| if i == index { name } else { segment })
        .join("/")
}

impl<S: ObjectStore> StorageExplorer<S> {
    /// Moves every task, `mutation_chunk_size` at a time. Successfully moved
    /// objects lose their cached preview URL.
    async fn move_in_chunks(&self, bucket: &Bucket, tasks: Vec<MoveTask>) -> BatchReport {
        let (report, moved) = run_in_batches(tasks, self.config.mutation_chunk_size, None, |task| {
            let bucket_id = &bucket.id;
            async move {
                self.store.move_object(bucket_id, &task.from, &task.to).await?;
                Ok(task.id)
            }
        })
        .await;
        self.invalidate_previews(moved.into_iter().flatten());
        report
    }

    /// Renames a file with a single move.
    pub async fn rename_file(&self, file: &Item, new_name: &str, column_index: usize) -> Result<()> {
        let bucket = self.selected_bucket()?;
        let new_name = new_name.trim();
        if new_name.is_empty() || new_name == file.name {
            self.set_row_status(column_index, &file.name, ItemStatus::Ready, None);
            return Ok(());
        }
        if let Err(e) = self.sanitize_name_for_column(new_name, column_index, false) {
            self.set_row_status(column_index, &file.name, ItemStatus::Ready, None);
            return Err(e);
        }

        let prefix = self.path_to_index(column_index);
        let from = navigation::join_path(&prefix, &file.name);
        let to = navigation::join_path(&prefix, new_name);
        let claim = self.claim(&bucket, [&from, &to])?;
        self.set_row_status(column_index, &file.name, ItemStatus::Loading, Some(new_name));

        if let Err(e) = self.store.move_object(&bucket.id, &from, &to).await {
            warn!(%from, %to, error = %e, "failed to rename file");
            self.set_row_status(column_index, new_name, ItemStatus::Ready, Some(&file.name));
            return Err(e.into());
        }
        info!(bucket = %bucket.id, %from, %to, "renamed file");
        if let Some(id) = &file.id {
            self.invalidate_previews([id]);
        }
        self.update(|s| {
            if let Some(preview) = s
                .selected_file_preview
                .as_mut()
                .filter(|p| p.file.item.id == file.id)
            {
                preview.file.item.name = new_name.to_string();
            }
        });
        drop(claim);
        self.reconcile().await;
        Ok(())
    }

    /// Renames a folder by moving every object below it. Moves that fail are
    /// reported and not rolled back.
    pub async fn rename_folder(
        &self,
        folder: &Item,
        new_name: &str,
        column_index: usize,
    ) -> Result<BatchReport> {
        let bucket = self.selected_bucket()?;
        let new_name = new_name.trim();
        if new_name.is_empty() || new_name == folder.name {
            self.set_row_status(column_index, &folder.name, ItemStatus::Ready, None);
            return Ok(BatchReport::default());
        }
        let checked = names::validate_folder_name(new_name)
            .and_then(|()| self.sanitize_name_for_column(new_name, column_index, false));
        if let Err(e) = checked {
            self.set_row_status(column_index, &folder.name, ItemStatus::Ready, None);
            return Err(e);
        }

        let prefix = self.path_to_index(column_index);
        let from = navigation::join_path(&prefix, &folder.name);
        let to = navigation::join_path(&prefix, new_name);
        let claim = self.claim(&bucket, [&from, &to])?;
        self.set_row_status(column_index, &folder.name, ItemStatus::Loading, Some(new_name));

        let sort_by = self.state.borrow().preferences.sort();
        let descendants =
            match collect_descendants(&self.store, &bucket.id, &from, sort_by, &self.config).await {
                Ok(descendants) => descendants,
                Err(e) => {
                    warn!(folder = %from, error = %e, "failed to rename folder");
                    self.set_row_status(column_index, new_name, ItemStatus::Ready, Some(&folder.name));
                    return Err(e);
                }
            };
        let tasks: Vec<MoveTask> = descendants
            .into_iter()
            .map(|d| {
                let path = d.path();
                MoveTask {
                    to: replace_segment(&path, column_index, new_name),
                    from: path,
                    id: d.id,
                }
            })
            .collect();

        info!(bucket = %bucket.id, %from, %to, objects = tasks.len(), "renaming folder");
        let report = self.move_in_chunks(&bucket, tasks).await;

        let was_open = self
            .state
            .borrow()
            .opened_folders
            .get(column_index)
            .is_some_and(|f| f.name == folder.name);
        if was_open {
            self.pop_column_at(column_index);
        }
        drop(claim);
        self.reconcile().await;
        Ok(report)
    }

    /// Fails with `NameConflict` when an incoming name is already taken in
    /// `destination`, or is shared by two of the moved items.
    async fn check_move_conflicts(
        &self,
        bucket: &Bucket,
        sources: &[(&ColumnItem, String, String)],
        destination: &str,
    ) -> Result<()> {
        let incoming: Vec<&str> = sources
            .iter()
            .filter(|(_, parent, _)| parent != destination)
            .map(|(item, _, _)| item.item.name.as_str())
            .collect();
        if incoming.is_empty() {
            return Ok(());
        }
        if let Some(name) = incoming.iter().duplicates().next() {
            return Err(ExplorerError::NameConflict(name.to_string()));
        }

        let page_size = self.config.traversal_page_size.max(1);
        let mut offset = 0;
        loop {
            let options = self.list_options(page_size, offset, "");
            let page = self
                .store
                .list_objects(&bucket.id, destination, &options)
                .await?;
            if let Some(taken) = page.iter().find(|o| incoming.contains(&o.name.as_str())) {
                return Err(ExplorerError::NameConflict(taken.name.clone()));
            }
            if page.len() < page_size {
                return Ok(());
            }
            offset += page.len();
        }
    }

    /// Moves files and folders into `new_path` (`""` or `"/"` is the bucket
    /// root). Folders move with everything below them.
    pub async fn move_items(&self, items: &[ColumnItem], new_path: &str) -> Result<BatchReport> {
        let bucket = self.selected_bucket()?;
        let destination = navigation::normalize_path(new_path);

        let mut sources = Vec::with_capacity(items.len());
        for item in items {
            let parent = self.path_to_index(item.column_index);
            let path = navigation::join_path(&parent, &item.item.name);
            let nested = destination
                .strip_prefix(&path)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'));
            if item.item.is_folder() && nested {
                return Err(ExplorerError::InvalidName(format!(
                    "Cannot move folder {} into itself",
                    path
                )));
            }
            sources.push((item, parent, path));
        }
        self.check_move_conflicts(&bucket, &sources, &destination)
            .await?;
        let claim = self.claim(
            &bucket,
            sources
                .iter()
                .map(|(_, _, path)| path.as_str())
                .chain([destination.as_str()]),
        )?;
        for (item, _, _) in &sources {
            self.set_row_status(item.column_index, &item.item.name, ItemStatus::Loading, None);
        }

        let sort_by = self.state.borrow().preferences.sort();
        let mut tasks = Vec::new();
        for (item, parent, path) in &sources {
            let relocate = |from: String| {
                let relative = if parent.is_empty() {
                    from.as_str()
                } else {
                    &from[parent.len() + 1..]
                };
                let to = navigation::join_path(&destination, relative);
                (from, to)
            };
            if item.item.is_folder() {
                let descendants =
                    match collect_descendants(&self.store, &bucket.id, path, sort_by, &self.config)
                        .await
                    {
                        Ok(descendants) => descendants,
                        Err(e) => {
                            for (item, _, _) in &sources {
                                self.set_row_status(
                                    item.column_index,
                                    &item.item.name,
                                    ItemStatus::Ready,
                                    None,
                                );
                            }
                            return Err(e);
                        }
                    };
                for d in descendants {
                    let (from, to) = relocate(d.path());
                    tasks.push(MoveTask { from, to, id: d.id });
                }
            } else {
                let (from, to) = relocate(path.clone());
                tasks.push(MoveTask {
                    from,
                    to,
                    id: item.item.id.clone(),
                });
            }
        }
        tasks.retain(|t| t.from != t.to);

        info!(bucket = %bucket.id, %destination, objects = tasks.len(), "moving");
        let report = self.move_in_chunks(&bucket, tasks).await;
        if report.success_count > 0 {
            let parents: Vec<&str> = sources
                .iter()
                .map(|(_, parent, _)| parent.as_str())
                .unique()
                .collect();
            for parent in parents {
                self.validate_parent_folder_empty(&bucket, parent).await;
            }
            self.remove_folder_placeholder(&bucket, &destination).await;
        }
        self.update(|s| s.selected_items.clear());
        drop(claim);
        self.reconcile().await;
        Ok(report)
    }
}
