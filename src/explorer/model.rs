use chrono::{DateTime, Duration, Utc};

use crate::preferences::ExplorerPreferences;
use crate::store::{Bucket, EMPTY_FOLDER_PLACEHOLDER_FILE_NAME, ObjectMetadata, StorageObject};

/// A file listed without metadata is still being finalised for this many
/// minutes after creation; after that it is considered corrupted.
pub const CORRUPTED_THRESHOLD_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemType {
    File,
    Folder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    Ready,
    Loading,
    Editing,
}

/// One row of a column.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    pub item_type: ItemType,
    pub status: ItemStatus,
    /// Present for files only.
    pub id: Option<String>,
    pub metadata: Option<ObjectMetadata>,
    pub is_corrupted: bool,
    /// Rows added locally (upload progress, new folder) until the next refetch.
    pub is_temp: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn from_object(object: StorageObject, now: DateTime<Utc>) -> Self {
        let item_type = if object.is_folder() {
            ItemType::Folder
        } else {
            ItemType::File
        };
        let pending = item_type == ItemType::File && object.metadata.is_none();
        let threshold = Duration::minutes(CORRUPTED_THRESHOLD_MINUTES);
        let age = object.created_at.map(|t| now - t);
        Item {
            name: object.name,
            item_type,
            status: if pending && age.is_some_and(|a| a <= threshold) {
                ItemStatus::Loading
            } else {
                ItemStatus::Ready
            },
            id: object.id,
            metadata: object.metadata,
            is_corrupted: pending && age.is_none_or(|a| a >= threshold),
            is_temp: false,
            created_at: object.created_at,
            updated_at: object.updated_at,
            last_accessed_at: object.last_accessed_at,
        }
    }

    /// A folder row that is not backed by a listing result.
    pub fn folder(name: impl Into<String>) -> Self {
        Item {
            name: name.into(),
            item_type: ItemType::Folder,
            status: ItemStatus::Ready,
            id: None,
            metadata: None,
            is_corrupted: false,
            is_temp: false,
            created_at: None,
            updated_at: None,
            last_accessed_at: None,
        }
    }

    pub fn temp(
        item_type: ItemType,
        name: impl Into<String>,
        status: ItemStatus,
        metadata: Option<ObjectMetadata>,
    ) -> Self {
        Item {
            item_type,
            status,
            metadata,
            is_temp: true,
            ..Item::folder(name)
        }
    }

    pub fn is_folder(&self) -> bool {
        self.item_type == ItemType::Folder
    }

    pub fn size(&self) -> Option<u64> {
        self.metadata.as_ref().map(|m| m.size)
    }
}

/// Turns a raw listing into rows, hiding the empty-folder placeholder.
pub fn format_folder_items(objects: Vec<StorageObject>, now: DateTime<Utc>) -> Vec<Item> {
    objects
        .into_iter()
        .filter(|o| o.name != EMPTY_FOLDER_PLACEHOLDER_FILE_NAME)
        .map(|o| Item::from_object(o, now))
        .collect()
}

/// One directory level. Column 0 is the bucket root.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub id: String,
    pub name: String,
    pub status: ItemStatus,
    pub items: Vec<Item>,
    pub has_more_items: bool,
    pub is_loading_more_items: bool,
}

impl Column {
    pub fn loading(id: impl Into<String>, name: impl Into<String>) -> Self {
        Column {
            id: id.into(),
            name: name.into(),
            status: ItemStatus::Loading,
            items: Vec::new(),
            has_more_items: false,
            is_loading_more_items: false,
        }
    }

    pub fn ready(
        id: impl Into<String>,
        name: impl Into<String>,
        items: Vec<Item>,
        page_size: usize,
    ) -> Self {
        Column {
            has_more_items: items.len() == page_size,
            items,
            status: ItemStatus::Ready,
            ..Column::loading(id, name)
        }
    }

    pub fn find(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.name == name)
    }
}

/// An item together with the column it was picked from.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnItem {
    pub item: Item,
    pub column_index: usize,
}

impl ColumnItem {
    pub fn new(item: Item, column_index: usize) -> Self {
        ColumnItem { item, column_index }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewUrl {
    Loading,
    /// The file is above the preview size limit and was not fetched.
    Skipped,
    Url(String),
    /// No metadata to preview, or the URL could not be obtained.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilePreview {
    pub file: ColumnItem,
    pub url: PreviewUrl,
}

/// Everything a view needs to render the explorer. Published as a whole on
/// every transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplorerState {
    pub selected_bucket: Option<Bucket>,
    pub columns: Vec<Column>,
    pub opened_folders: Vec<Item>,
    pub selected_items: Vec<ColumnItem>,
    pub selected_file_preview: Option<FilePreview>,
    pub preferences: ExplorerPreferences,
}

impl ExplorerState {
    pub fn latest_column_index(&self) -> Option<usize> {
        self.columns.len().checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str, created: DateTime<Utc>, metadata: bool) -> StorageObject {
        StorageObject {
            id: Some(format!("id-{name}")),
            created_at: Some(created),
            metadata: metadata.then(ObjectMetadata::default),
            ..StorageObject::folder(name)
        }
    }

    #[test]
    fn placeholder_is_hidden_and_types_follow_id() {
        let now = Utc::now();
        let items = format_folder_items(
            vec![
                file(EMPTY_FOLDER_PLACEHOLDER_FILE_NAME, now, true),
                file("a.txt", now, true),
                StorageObject::folder("docs"),
            ],
            now,
        );
        let rows: Vec<_> = items.iter().map(|i| (i.name.as_str(), i.item_type)).collect();
        assert_eq!(rows, vec![("a.txt", ItemType::File), ("docs", ItemType::Folder)]);
        assert!(items.iter().all(|i| i.status == ItemStatus::Ready));
    }

    #[test]
    fn files_without_metadata_age_into_corrupted() {
        let now = Utc::now();
        let fresh = Item::from_object(file("new.bin", now - Duration::minutes(1), false), now);
        assert_eq!(fresh.status, ItemStatus::Loading);
        assert!(!fresh.is_corrupted);

        let stale = Item::from_object(file("old.bin", now - Duration::hours(1), false), now);
        assert_eq!(stale.status, ItemStatus::Ready);
        assert!(stale.is_corrupted);
    }

    #[test]
    fn column_has_more_when_page_is_full() {
        let items = vec![Item::folder("a"), Item::folder("b")];
        assert!(Column::ready("c", "c", items.clone(), 2).has_more_items);
        assert!(!Column::ready("c", "c", items, 3).has_more_items);
    }
}
