use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info, warn};

use super::cancel::ListingOutcome;
use super::model::{Column, ExplorerState, Item, ItemStatus, ItemType, format_folder_items};
use super::{StorageExplorer, names, navigation};
use crate::error::{ExplorerError, Result};
use crate::store::{Bucket, EMPTY_FOLDER_PLACEHOLDER_FILE_NAME, ObjectStore, UploadOptions};

const NEW_FOLDER_NAME: &str = "Untitled folder";

fn completed<T>(result: Result<T>) -> Result<ListingOutcome<T>> {
    match result {
        Ok(value) => Ok(ListingOutcome::Completed(value)),
        Err(ExplorerError::Aborted) => Ok(ListingOutcome::Discarded),
        Err(e) => Err(e),
    }
}

impl<S: ObjectStore> StorageExplorer<S> {
    /// Selects `bucket` and lists its root into column 0. Re-opening the
    /// selected bucket does nothing.
    pub async fn open_bucket(&self, bucket: &Bucket) -> Result<ListingOutcome<()>> {
        if self.state.borrow().selected_bucket.as_ref() == Some(bucket) {
            return Ok(ListingOutcome::Completed(()));
        }
        info!(bucket = %bucket.id, "opening bucket");
        self.aborts.abort();
        self.update(|s| {
            *s = ExplorerState {
                selected_bucket: Some(bucket.clone()),
                preferences: s.preferences,
                ..Default::default()
            }
        });
        self.fetch_folder_contents(None, "").await
    }

    /// Opens `folder`, listed in column `column_index`, into the next column.
    pub async fn open_folder(&self, column_index: usize, folder: &Item) -> Result<ListingOutcome<()>> {
        self.resolve_column(Some(column_index))?;
        self.update(|s| {
            s.opened_folders =
                navigation::push_opened_folder_at(&s.opened_folders, folder.clone(), column_index);
            s.selected_file_preview = None;
        });
        self.fetch_folder_contents(Some(column_index), "").await
    }

    /// Lists the folder opened from `column_index` (the bucket root for `None`)
    /// into the column after it, replacing that column and every deeper one.
    ///
    /// Cancels any listing still in flight. If this listing is itself
    /// superseded, nothing is applied and the folder row goes back to ready.
    pub async fn fetch_folder_contents(
        &self,
        column_index: Option<usize>,
        search: &str,
    ) -> Result<ListingOutcome<()>> {
        let bucket = self.selected_bucket()?;

        let (position, folder_name, prefix) = {
            let state = self.state.borrow();
            match column_index {
                None => (0, bucket.name.clone(), String::new()),
                Some(index) => {
                    let folder = state
                        .opened_folders
                        .get(index)
                        .ok_or(ExplorerError::ColumnOutOfRange(index))?;
                    (
                        index + 1,
                        folder.name.clone(),
                        navigation::path_to_index(&state.opened_folders, index + 1),
                    )
                }
            }
        };
        let target = format!("{}:{}", position, prefix);
        let ticket = self.aborts.issue_abort_for(target.as_str());

        self.update(|s| {
            if let Some(index) = column_index {
                s.columns = navigation::update_row_status(
                    &s.columns,
                    index,
                    &folder_name,
                    ItemStatus::Loading,
                    None,
                );
            }
            s.columns = navigation::push_column_at(
                &s.columns,
                Column::loading(&folder_name, &folder_name),
                position,
            );
        });

        let limit = self.config.list_limit;
        let options = self.list_options(limit, 0, search);
        let listing = self
            .aborts
            .run(&ticket, self.store.list_objects(&bucket.id, &prefix, &options))
            .await;

        let revert_row = |s: &mut ExplorerState| {
            if let Some(index) = column_index {
                s.columns = navigation::update_row_status(
                    &s.columns,
                    index,
                    &folder_name,
                    ItemStatus::Ready,
                    None,
                );
            }
        };
        match listing {
            Ok(objects) => {
                let items = format_folder_items(objects, Utc::now());
                debug!(bucket = %bucket.id, %prefix, count = items.len(), "listed folder");
                self.update(|s| {
                    revert_row(s);
                    s.columns = navigation::push_column_at(
                        &s.columns,
                        Column::ready(&folder_name, &folder_name, items, limit),
                        position,
                    );
                });
                Ok(ListingOutcome::Completed(()))
            }
            Err(e) => {
                if !matches!(e, ExplorerError::Aborted) {
                    warn!(folder = %folder_name, error = %e, "failed to retrieve folder contents");
                    self.update(|s| {
                        s.columns = navigation::push_column_at(
                            &s.columns,
                            Column::ready(&folder_name, &folder_name, Vec::new(), limit),
                            position,
                        );
                    });
                }
                // A newer listing of the same folder owns the row now.
                if !self.aborts.is_loading(&target) {
                    self.update(revert_row);
                }
                completed(Err(e))
            }
        }
    }

    /// Loads the next page of column `column_index`.
    pub async fn fetch_more_folder_contents(
        &self,
        column_index: usize,
        search: &str,
    ) -> Result<ListingOutcome<()>> {
        let bucket = self.selected_bucket()?;
        let offset = self.column_items(column_index)?.len();
        let prefix = self.path_to_index(column_index);
        let ticket = self.aborts.issue_abort();
        self.update(|s| {
            s.columns = navigation::set_column_loading_more(&s.columns, column_index, true)
        });

        let limit = self.config.list_limit;
        let options = self.list_options(limit, offset, search);
        let listing = self
            .aborts
            .run(&ticket, self.store.list_objects(&bucket.id, &prefix, &options))
            .await;
        match listing {
            Ok(objects) => {
                let has_more = objects.len() == limit;
                let items = format_folder_items(objects, Utc::now());
                self.update(|s| {
                    s.columns =
                        navigation::append_column_items(&s.columns, column_index, items, has_more)
                });
                Ok(ListingOutcome::Completed(()))
            }
            Err(e) => {
                self.update(|s| {
                    s.columns = navigation::set_column_loading_more(&s.columns, column_index, false)
                });
                if !matches!(e, ExplorerError::Aborted) {
                    warn!(error = %e, "failed to retrieve more folder contents");
                }
                completed(Err(e))
            }
        }
    }

    /// Re-lists every open column from the store.
    pub async fn refetch_all_opened_folders(&self) -> Result<ListingOutcome<()>> {
        let paths: Vec<String> = self
            .state
            .borrow()
            .opened_folders
            .iter()
            .map(|f| f.name.clone())
            .collect();
        self.fetch_folders_by_path(&paths, "", false).await
    }

    /// Lists the bucket root and every folder along `paths` concurrently, then
    /// rebuilds all columns and the opened folders from the results. A folder
    /// that no longer exists is kept open as a scaffolded row. A level that
    /// fails to list shows up empty.
    pub async fn fetch_folders_by_path(
        &self,
        paths: &[String],
        search: &str,
        show_loading: bool,
    ) -> Result<ListingOutcome<()>> {
        let bucket = self.selected_bucket()?;
        let ticket = self.aborts.issue_abort();

        if show_loading {
            self.update(|s| {
                s.columns = std::iter::once(&bucket.name)
                    .chain(paths)
                    .map(|name| Column::loading(name, name))
                    .collect();
            });
        }

        let limit = self.config.list_limit;
        let options = self.list_options(limit, 0, search);
        let listings = (0..=paths.len()).map(|depth| {
            let prefix = paths[..depth].join("/");
            let options = &options;
            let bucket_id = &bucket.id;
            async move {
                match self.store.list_objects(bucket_id, &prefix, options).await {
                    Ok(objects) => objects,
                    Err(e) => {
                        warn!(%prefix, error = %e, "failed to fetch folder");
                        Vec::new()
                    }
                }
            }
        });
        let listed = self
            .aborts
            .run(&ticket, async { Ok(join_all(listings).await) })
            .await;
        let listed = match completed(listed)? {
            ListingOutcome::Completed(listed) => listed,
            ListingOutcome::Discarded => return Ok(ListingOutcome::Discarded),
        };

        let now = Utc::now();
        let columns: Vec<Column> = listed
            .into_iter()
            .enumerate()
            .map(|(depth, objects)| {
                let name = if depth == 0 {
                    &bucket.name
                } else {
                    &paths[depth - 1]
                };
                Column::ready(name, name, format_folder_items(objects, now), limit)
            })
            .collect();
        let opened_folders: Vec<Item> = paths
            .iter()
            .enumerate()
            .map(|(depth, name)| {
                columns[depth]
                    .find(name)
                    .cloned()
                    .unwrap_or_else(|| Item::folder(name))
            })
            .collect();
        self.update(|s| {
            s.columns = columns;
            s.opened_folders = opened_folders;
        });
        Ok(ListingOutcome::Completed(()))
    }

    /// Closes the deepest column.
    pub fn pop_column(&self) {
        self.aborts.abort();
        self.update(|s| {
            s.columns.pop();
            s.opened_folders.pop();
        });
    }

    /// Closes every column after `column_index`.
    pub fn pop_column_at(&self, column_index: usize) {
        self.aborts.abort();
        self.update(|s| {
            s.columns = navigation::pop_column_at(&s.columns, column_index);
            s.opened_folders = navigation::pop_opened_folders_at(&s.opened_folders, column_index);
        });
    }

    /// Prepends an editable "Untitled folder" row to a column (the deepest one
    /// for `None`).
    pub fn add_new_folder_placeholder(&self, column_index: Option<usize>) -> Result<()> {
        let column_index = self.resolve_column(column_index)?;
        let row = Item::temp(ItemType::Folder, NEW_FOLDER_NAME, ItemStatus::Editing, None);
        self.update(|s| s.columns = navigation::add_temp_row(&s.columns, column_index, row, true));
        Ok(())
    }

    /// Creates folder `name` in column `column_index` by uploading its
    /// placeholder object, then opens it. An empty name cancels the edit.
    pub async fn add_new_folder(&self, name: &str, column_index: usize) -> Result<()> {
        let bucket = self.selected_bucket()?;
        if name.is_empty() {
            self.update(|s| s.columns = navigation::remove_temp_rows(&s.columns, column_index));
            return Ok(());
        }
        let name = self.sanitize_name_for_column(name, column_index, false)?;
        names::validate_folder_name(&name)?;

        let parent = self.path_to_index(column_index);
        let folder_path = navigation::join_path(&parent, &name);
        let _claim = self.claim(&bucket, [&folder_path])?;

        self.update(|s| {
            s.columns =
                navigation::update_folder_after_edit(&s.columns, column_index, &name, ItemStatus::Ready)
        });

        let placeholder = navigation::join_path(&folder_path, EMPTY_FOLDER_PLACEHOLDER_FILE_NAME);
        if let Err(e) = self
            .store
            .upload(&bucket.id, &placeholder, &[], &UploadOptions::default())
            .await
        {
            warn!(folder = %folder_path, error = %e, "failed to create folder");
            self.refetch_all_opened_folders().await?;
            return Err(e.into());
        }
        self.remove_folder_placeholder(&bucket, &parent).await;
        info!(bucket = %bucket.id, folder = %folder_path, "created folder");

        let folder = self
            .column_items(column_index)?
            .into_iter()
            .find(|i| i.name == name)
            .unwrap_or_else(|| Item::folder(&name));
        self.open_folder(column_index, &folder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::testing::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn opening_folders_pushes_and_truncates_columns() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "a/x/deep.txt", b"1");
        store.put_object("b", "a/file.txt", b"2");
        store.put_object("b", "z/other.txt", b"3");
        let explorer = opened(store).await;
        assert_eq!(names(&explorer, 0), vec!["a", "z"]);

        let a = item(&explorer, 0, "a").item;
        explorer.open_folder(0, &a).await?;
        let x = item(&explorer, 1, "x").item;
        explorer.open_folder(1, &x).await?;
        let state = explorer.snapshot();
        assert_eq!(state.columns.len(), 3);
        assert_eq!(state.opened_folders.len(), 2);
        assert_eq!(explorer.path_prefix(true), "b/a/x");
        assert_eq!(names(&explorer, 2), vec!["deep.txt"]);
        assert_eq!(state.columns[0].items[0].status, ItemStatus::Ready);

        // Opening a sibling from the root collapses the deeper columns.
        let z = item(&explorer, 0, "z").item;
        explorer.open_folder(0, &z).await?;
        let state = explorer.snapshot();
        assert_eq!(state.columns.len(), 2);
        assert_eq!(state.opened_folders.len(), 1);
        assert_eq!(names(&explorer, 1), vec!["other.txt"]);

        explorer.pop_column();
        let state = explorer.snapshot();
        assert_eq!((state.columns.len(), state.opened_folders.len()), (1, 0));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn late_listing_is_discarded() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "slow/a.txt", b"1");
        store.put_object("b", "fast/b.txt", b"2");
        store.delay_list("slow", Duration::from_secs(10));
        let explorer = opened(store).await;
        let slow = item(&explorer, 0, "slow").item;
        let fast = item(&explorer, 0, "fast").item;

        let (first, second) = tokio::join!(explorer.open_folder(0, &slow), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            explorer.open_folder(0, &fast).await
        });
        assert!(first?.is_discarded());
        assert_eq!(second?, ListingOutcome::Completed(()));

        let state = explorer.snapshot();
        assert_eq!(state.opened_folders[0].name, "fast");
        assert_eq!(names(&explorer, 1), vec!["b.txt"]);
        let slow_row = state.columns[0].find("slow").unwrap();
        assert_eq!(slow_row.status, ItemStatus::Ready);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn reopening_a_loading_folder_keeps_it_loading() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "slow/a.txt", b"1");
        store.delay_list("slow", Duration::from_secs(10));
        let explorer = opened(store).await;
        let slow = item(&explorer, 0, "slow").item;

        let (first, second, _) = tokio::join!(
            explorer.open_folder(0, &slow),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                explorer.open_folder(0, &slow).await
            },
            async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                let state = explorer.snapshot();
                assert_eq!(state.columns[0].find("slow").unwrap().status, ItemStatus::Loading);
                assert_eq!(state.columns[1].status, ItemStatus::Loading);
            }
        );
        assert!(first?.is_discarded());
        assert_eq!(second?, ListingOutcome::Completed(()));
        let state = explorer.snapshot();
        assert_eq!(state.columns[0].find("slow").unwrap().status, ItemStatus::Ready);
        assert_eq!(names(&explorer, 1), vec!["a.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn fetch_more_pages_the_column() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        for i in 0..5 {
            store.put_object("b", &format!("f{i}"), b"x");
        }
        let bucket = store.add_bucket("b", false);
        let config = crate::config::ExplorerConfig {
            list_limit: 2,
            ..Default::default()
        };
        let explorer = explorer_with(store, config);
        explorer.open_bucket(&bucket).await?;
        assert!(explorer.snapshot().columns[0].has_more_items);
        explorer.fetch_more_folder_contents(0, "").await?;
        explorer.fetch_more_folder_contents(0, "").await?;
        let column = &explorer.snapshot().columns[0];
        assert_eq!(column.items.len(), 5);
        assert!(!column.has_more_items);
        assert!(!column.is_loading_more_items);
        Ok(())
    }

    #[tokio::test]
    async fn refetch_scaffolds_vanished_folders() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "gone/a.txt", b"1");
        let explorer = opened(store).await;
        let gone = item(&explorer, 0, "gone").item;
        explorer.open_folder(0, &gone).await?;

        explorer.store().remove("b", &["gone/a.txt".to_string()]).await?;
        explorer.refetch_all_opened_folders().await?;
        let state = explorer.snapshot();
        assert_eq!(state.columns.len(), 2);
        assert!(state.columns[0].items.is_empty());
        assert!(state.columns[1].items.is_empty());
        assert_eq!(state.opened_folders[0], Item::folder("gone"));
        Ok(())
    }

    #[tokio::test]
    async fn fetch_by_path_with_search() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "docs/alpha.md", b"1");
        store.put_object("b", "docs/beta.md", b"2");
        let explorer = opened(store).await;
        explorer
            .fetch_folders_by_path(&["docs".to_string()], "al", true)
            .await?;
        assert_eq!(names(&explorer, 1), vec!["alpha.md"]);
        Ok(())
    }

    #[tokio::test]
    async fn new_folder_replaces_parent_placeholder() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "docs/.emptyFolderPlaceholder", b"");
        let explorer = opened(store).await;
        let docs = item(&explorer, 0, "docs").item;
        explorer.open_folder(0, &docs).await?;

        explorer.add_new_folder_placeholder(None)?;
        assert_eq!(explorer.snapshot().columns[1].items[0].status, ItemStatus::Editing);
        explorer.add_new_folder("img", 1).await?;

        assert_eq!(
            explorer.store().object_paths("b"),
            vec!["docs/img/.emptyFolderPlaceholder"]
        );
        let state = explorer.snapshot();
        assert_eq!(explorer.path_prefix(false), "docs/img");
        assert_eq!(state.columns.len(), 3);
        assert_eq!(names(&explorer, 1), vec!["img"]);
        Ok(())
    }

    #[tokio::test]
    async fn new_folder_validation() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "docs/a.txt", b"1");
        let explorer = opened(store).await;

        explorer.add_new_folder_placeholder(Some(0))?;
        assert!(matches!(
            explorer.add_new_folder("docs", 0).await,
            Err(ExplorerError::NameConflict(_))
        ));
        assert!(matches!(
            explorer.add_new_folder("a#b", 0).await,
            Err(ExplorerError::InvalidName(_))
        ));
        explorer.add_new_folder("", 0).await?;
        assert_eq!(names(&explorer, 0), vec!["docs"]);
        assert_eq!(explorer.store().object_paths("b"), vec!["docs/a.txt"]);
        Ok(())
    }
}
