//! # Storage Explorer
//!
//! Presents a flat, prefix-keyed object store as a column browser: column 0 is
//! the bucket root and every opened folder adds a column. Mutations (upload,
//! delete, rename, move, new folder) run as batches of independent remote calls
//! and reconcile the columns with a full refetch afterwards.
//!
//! State is owned by one [`StorageExplorer`] per session and published as a
//! whole on a `watch` channel after every transition.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::warn;

use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, Result};
use crate::preferences::{BucketSort, ExplorerPreferences, PreferenceStore, StorageView};
use crate::store::{
    Bucket, EMPTY_FOLDER_PLACEHOLDER_FILE_NAME, ListOptions, ObjectStore, SortColumn, SortOrder,
};

pub mod batch;
pub mod buckets;
pub mod cancel;
pub mod delete;
pub mod download;
pub mod folders;
pub mod guard;
pub mod model;
pub mod names;
pub mod navigation;
pub mod preview;
pub mod rename;
pub mod traversal;
pub mod upload;

pub use batch::{BatchReport, OperationError, Outcome};
pub use cancel::{AbortCoordinator, ListingOutcome, ListingTicket};
pub use download::{DownloadedFile, FolderDownload};
pub use guard::{PathClaim, PathGuard};
pub use model::{
    Column, ColumnItem, ExplorerState, FilePreview, Item, ItemStatus, ItemType, PreviewUrl,
};
pub use preview::{CachedFile, PreviewCache};
pub use traversal::DescendantObject;
pub use upload::{RejectReason, RejectedFile, UploadFile, UploadReport};

pub struct StorageExplorer<S> {
    store: S,
    config: ExplorerConfig,
    preference_store: Arc<dyn PreferenceStore + Send + Sync>,
    state: watch::Sender<ExplorerState>,
    aborts: AbortCoordinator,
    guard: PathGuard,
    previews: Mutex<PreviewCache>,
}

impl<S: ObjectStore> StorageExplorer<S> {
    pub fn new(
        store: S,
        config: ExplorerConfig,
        preference_store: Arc<dyn PreferenceStore + Send + Sync>,
    ) -> Self {
        let preferences = ExplorerPreferences::load(&*preference_store, &config.project_ref);
        let (state, _) = watch::channel(ExplorerState {
            preferences,
            ..Default::default()
        });
        StorageExplorer {
            store,
            config,
            preference_store,
            state,
            aborts: AbortCoordinator::default(),
            guard: PathGuard::default(),
            previews: Mutex::new(PreviewCache::default()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn snapshot(&self) -> ExplorerState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ExplorerState> {
        self.state.subscribe()
    }

    pub fn selected_bucket(&self) -> Result<Bucket> {
        self.state
            .borrow()
            .selected_bucket
            .clone()
            .ok_or(ExplorerError::NoBucketSelected)
    }

    /// Applies one transition and notifies subscribers.
    fn update(&self, f: impl FnOnce(&mut ExplorerState)) {
        self.state.send_modify(f);
    }

    fn previews(&self) -> MutexGuard<'_, PreviewCache> {
        self.previews.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn column_items(&self, column_index: usize) -> Result<Vec<Item>> {
        self.state
            .borrow()
            .columns
            .get(column_index)
            .map(|c| c.items.clone())
            .ok_or(ExplorerError::ColumnOutOfRange(column_index))
    }

    fn resolve_column(&self, column_index: Option<usize>) -> Result<usize> {
        let state = self.state.borrow();
        let index = match column_index {
            Some(index) => index,
            None => state
                .latest_column_index()
                .ok_or(ExplorerError::ColumnOutOfRange(0))?,
        };
        if index >= state.columns.len() {
            return Err(ExplorerError::ColumnOutOfRange(index));
        }
        Ok(index)
    }

    /// Checks `name` against the active items of a column. See
    /// [`names::resolve_name`].
    pub fn sanitize_name_for_column(
        &self,
        name: &str,
        column_index: usize,
        autofix: bool,
    ) -> Result<String> {
        names::resolve_name(name, &self.column_items(column_index)?, autofix)
    }

    /// Path of the folder shown in column `column_index`, without the bucket.
    pub fn path_to_index(&self, column_index: usize) -> String {
        navigation::path_to_index(&self.state.borrow().opened_folders, column_index)
    }

    /// Path of the deepest opened folder.
    pub fn path_prefix(&self, include_bucket: bool) -> String {
        let state = self.state.borrow();
        let bucket = state
            .selected_bucket
            .as_ref()
            .filter(|_| include_bucket)
            .map(|b| b.name.as_str());
        navigation::path_prefix(&state.opened_folders, bucket)
    }

    fn list_options(&self, limit: usize, offset: usize, search: &str) -> ListOptions {
        ListOptions {
            limit,
            offset,
            sort_by: self.state.borrow().preferences.sort(),
            search: (!search.is_empty()).then(|| search.to_string()),
        }
    }

    fn claim<I, P>(&self, bucket: &Bucket, paths: I) -> Result<PathClaim>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        self.guard.claim(&bucket.id, paths)
    }

    fn save_preferences(&self) -> Result<()> {
        let preferences = self.state.borrow().preferences;
        preferences.save(&*self.preference_store, &self.config.project_ref)?;
        Ok(())
    }

    pub fn set_view(&self, view: StorageView) -> Result<()> {
        self.update(|s| {
            s.preferences.view = view;
            s.selected_file_preview = None;
        });
        self.save_preferences()
    }

    pub async fn set_sort_by(&self, column: SortColumn) -> Result<()> {
        self.update(|s| {
            s.preferences.sort_by = column;
            s.selected_file_preview = None;
        });
        self.save_preferences()?;
        self.refetch_if_open().await
    }

    pub async fn set_sort_by_order(&self, order: SortOrder) -> Result<()> {
        self.update(|s| {
            s.preferences.sort_by_order = order;
            s.selected_file_preview = None;
        });
        self.save_preferences()?;
        self.refetch_if_open().await
    }

    pub fn set_sort_bucket(&self, sort: BucketSort) -> Result<()> {
        self.update(|s| s.preferences.sort_bucket = sort);
        self.save_preferences()
    }

    async fn refetch_if_open(&self) -> Result<()> {
        if self.state.borrow().selected_bucket.is_none() {
            return Ok(());
        }
        self.refetch_all_opened_folders().await.map(|_| ())
    }

    pub fn set_selected_items(&self, items: Vec<ColumnItem>) {
        self.update(|s| s.selected_items = items);
    }

    /// Clears the selection, or only the part of it in `column_index`.
    pub fn clear_selected_items(&self, column_index: Option<usize>) {
        self.update(|s| match column_index {
            Some(index) => s.selected_items.retain(|i| i.column_index != index),
            None => s.selected_items.clear(),
        });
    }

    /// Shift-click selection: selects every item between the last selected one
    /// and `to_item_index`, or deselects that range if the target was already
    /// selected (the target itself stays selected).
    pub fn select_range_items(&self, column_index: usize, to_item_index: usize) -> Result<()> {
        let items = self.column_items(column_index)?;
        let Some(target) = items.get(to_item_index) else {
            return Ok(());
        };
        let selected = self.state.borrow().selected_items.clone();
        let anchor = selected
            .last()
            .filter(|last| last.column_index == column_index)
            .and_then(|last| items.iter().position(|i| i.name == last.item.name))
            .unwrap_or(to_item_index);

        let (start, end) = (anchor.min(to_item_index), anchor.max(to_item_index));
        let mut range: Vec<ColumnItem> = items[start..=end]
            .iter()
            .map(|i| ColumnItem::new(i.clone(), column_index))
            .collect();
        if to_item_index < anchor {
            range.reverse();
        }

        let same = |a: &ColumnItem, b: &ColumnItem| {
            a.column_index == b.column_index && a.item.name == b.item.name
        };
        let target = ColumnItem::new(target.clone(), column_index);
        let updated = if selected.iter().any(|s| same(s, &target)) {
            selected
                .into_iter()
                .filter(|s| same(s, &target) || !range.iter().any(|r| same(r, s)))
                .collect()
        } else {
            let mut updated = selected;
            for item in range {
                if !updated.iter().any(|s| same(s, &item)) {
                    updated.push(item);
                }
            }
            updated
        };
        self.set_selected_items(updated);
        Ok(())
    }

    /// Marks a row as being renamed.
    pub fn set_selected_item_to_rename(&self, name: &str, column_index: usize) {
        self.set_row_status(column_index, name, ItemStatus::Editing, None);
    }

    fn set_row_status(
        &self,
        column_index: usize,
        name: &str,
        status: ItemStatus,
        new_name: Option<&str>,
    ) {
        self.update(|s| {
            s.columns =
                navigation::update_row_status(&s.columns, column_index, name, status, new_name);
        });
    }

    /// Refetch after a mutation. The report of the mutation stands even if the
    /// columns could not be refreshed.
    async fn reconcile(&self) {
        if let Err(e) = self.refetch_all_opened_folders().await {
            warn!(error = %e, "failed to refresh folders");
        }
    }

    /// Re-creates the placeholder of `prefix` if the folder has become empty.
    /// Best effort: failures are logged only.
    async fn validate_parent_folder_empty(&self, bucket: &Bucket, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        let options = self.list_options(self.config.list_limit, 0, "");
        let result = async {
            let listing = self.store.list_objects(&bucket.id, prefix, &options).await?;
            if listing.is_empty() {
                let placeholder = navigation::join_path(prefix, EMPTY_FOLDER_PLACEHOLDER_FILE_NAME);
                self.store
                    .upload(&bucket.id, &placeholder, &[], &Default::default())
                    .await?;
            }
            anyhow::Ok(())
        }
        .await;
        if let Err(e) = result {
            warn!(bucket = %bucket.id, prefix, error = %e, "failed to restore folder placeholder");
        }
    }

    /// Removes the placeholder of a folder that now has content. Best effort.
    async fn remove_folder_placeholder(&self, bucket: &Bucket, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        let placeholder = navigation::join_path(prefix, EMPTY_FOLDER_PLACEHOLDER_FILE_NAME);
        if let Err(e) = self.store.remove(&bucket.id, &[placeholder]).await {
            warn!(bucket = %bucket.id, prefix, error = %e, "failed to remove folder placeholder");
        }
    }
}
