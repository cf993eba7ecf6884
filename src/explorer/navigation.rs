//! Column and opened-folder transitions.
//!
//! Every function here takes the current vectors by reference and returns a
//! new vector; the explorer swaps the result into its state in one step.

use chrono::Utc;
use itertools::Itertools;

use super::model::{Column, Item, ItemStatus};

/// Keeps `columns[..position]` and appends `column`, so it lands at `position`.
pub fn push_column_at(columns: &[Column], column: Column, position: usize) -> Vec<Column> {
    let keep = position.min(columns.len());
    columns[..keep].iter().cloned().chain([column]).collect()
}

/// Keeps the columns up to and including `index`.
pub fn pop_column_at(columns: &[Column], index: usize) -> Vec<Column> {
    columns.iter().take(index + 1).cloned().collect()
}

/// Keeps the folders that lead up to column `column_index`.
pub fn pop_opened_folders_at(folders: &[Item], column_index: usize) -> Vec<Item> {
    folders.iter().take(column_index).cloned().collect()
}

/// Records `folder` as opened from column `column_index`, dropping anything
/// that was opened deeper.
pub fn push_opened_folder_at(folders: &[Item], folder: Item, column_index: usize) -> Vec<Item> {
    folders
        .iter()
        .take(column_index)
        .cloned()
        .chain([folder])
        .collect()
}

/// `folder/folder/...` for the folders leading up to column `column_index`.
pub fn path_to_index(folders: &[Item], column_index: usize) -> String {
    folders.iter().take(column_index).map(|f| &f.name).join("/")
}

/// Path of every opened folder, optionally prefixed with the bucket name.
pub fn path_prefix(folders: &[Item], bucket_name: Option<&str>) -> String {
    bucket_name
        .into_iter()
        .chain(folders.iter().map(|f| f.name.as_str()))
        .join("/")
}

pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// The folder containing `path`; empty for objects at the bucket root.
pub fn parent_prefix(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

/// Drops empty segments: `/a//b/` becomes `a/b`, `/` becomes the root.
pub fn normalize_path(path: &str) -> String {
    path.split('/').filter(|s| !s.is_empty()).join("/")
}

fn map_column(
    columns: &[Column],
    column_index: usize,
    f: impl FnOnce(&Column) -> Column,
) -> Vec<Column> {
    let mut f = Some(f);
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| match f.take_if(|_| idx == column_index) {
            Some(f) => f(column),
            None => column.clone(),
        })
        .collect()
}

pub fn update_row_status(
    columns: &[Column],
    column_index: usize,
    name: &str,
    status: ItemStatus,
    new_name: Option<&str>,
) -> Vec<Column> {
    map_column(columns, column_index, |column| Column {
        items: column
            .items
            .iter()
            .map(|item| {
                if item.name != name {
                    return item.clone();
                }
                Item {
                    status,
                    name: new_name.unwrap_or(&item.name).to_string(),
                    ..item.clone()
                }
            })
            .collect(),
        ..column.clone()
    })
}

pub fn add_temp_row(columns: &[Column], column_index: usize, row: Item, prepend: bool) -> Vec<Column> {
    map_column(columns, column_index, |column| {
        let items = if prepend {
            [row].into_iter().chain(column.items.iter().cloned()).collect()
        } else {
            column.items.iter().cloned().chain([row]).collect()
        };
        Column {
            items,
            ..column.clone()
        }
    })
}

pub fn remove_temp_rows(columns: &[Column], column_index: usize) -> Vec<Column> {
    map_column(columns, column_index, |column| Column {
        items: column.items.iter().filter(|i| !i.is_temp).cloned().collect(),
        ..column.clone()
    })
}

/// Turns the row being edited into a freshly created folder named `name`.
pub fn update_folder_after_edit(
    columns: &[Column],
    column_index: usize,
    name: &str,
    status: ItemStatus,
) -> Vec<Column> {
    let now = Utc::now();
    map_column(columns, column_index, |column| Column {
        items: column
            .items
            .iter()
            .map(|item| {
                if item.status != ItemStatus::Editing {
                    return item.clone();
                }
                Item {
                    status,
                    created_at: Some(now),
                    updated_at: Some(now),
                    last_accessed_at: Some(now),
                    ..Item::folder(name)
                }
            })
            .collect(),
        ..column.clone()
    })
}

pub fn set_column_loading_more(columns: &[Column], column_index: usize, loading: bool) -> Vec<Column> {
    map_column(columns, column_index, |column| Column {
        is_loading_more_items: loading,
        ..column.clone()
    })
}

pub fn append_column_items(
    columns: &[Column],
    column_index: usize,
    items: Vec<Item>,
    has_more_items: bool,
) -> Vec<Column> {
    map_column(columns, column_index, |column| Column {
        items: column.items.iter().cloned().chain(items).collect(),
        has_more_items,
        is_loading_more_items: false,
        ..column.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::model::ItemType;

    fn column(name: &str, items: &[&str]) -> Column {
        let items = items.iter().map(|n| Item::folder(*n)).collect();
        Column::ready(name, name, items, 200)
    }

    #[test]
    fn push_truncates_deeper_columns() {
        let columns = vec![column("root", &[]), column("a", &[]), column("b", &[])];
        let pushed = push_column_at(&columns, column("x", &[]), 1);
        let names: Vec<_> = pushed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["root", "x"]);
        // Pushing past the end appends.
        assert_eq!(push_column_at(&columns, column("y", &[]), 9).len(), 4);
        assert_eq!(pop_column_at(&columns, 0).len(), 1);
    }

    #[test]
    fn paths_follow_opened_folders() {
        let folders = vec![Item::folder("a"), Item::folder("b"), Item::folder("c")];
        assert_eq!(path_to_index(&folders, 0), "");
        assert_eq!(path_to_index(&folders, 2), "a/b");
        assert_eq!(path_prefix(&folders, Some("bucket")), "bucket/a/b/c");
        assert_eq!(path_prefix(&[], Some("bucket")), "bucket");
        assert_eq!(path_prefix(&folders, None), "a/b/c");

        let reopened = push_opened_folder_at(&folders, Item::folder("z"), 1);
        let names: Vec<_> = reopened.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "z"]);
        assert_eq!(pop_opened_folders_at(&folders, 1).len(), 1);
    }

    #[test]
    fn path_helpers() {
        assert_eq!(join_path("", "a.txt"), "a.txt");
        assert_eq!(join_path("docs", "a.txt"), "docs/a.txt");
        assert_eq!(parent_prefix("docs/img/a.png"), "docs/img");
        assert_eq!(parent_prefix("a.png"), "");
        assert_eq!(normalize_path("/a//b/"), "a/b");
        assert_eq!(normalize_path("/"), "");
    }

    #[test]
    fn row_updates_only_touch_their_column() {
        let columns = vec![column("root", &["a", "b"]), column("a", &["a"])];
        let updated = update_row_status(&columns, 0, "a", ItemStatus::Loading, Some("renamed"));
        assert_eq!(updated[0].items[0].name, "renamed");
        assert_eq!(updated[0].items[0].status, ItemStatus::Loading);
        assert_eq!(updated[1], columns[1]);

        let temp = Item::temp(ItemType::Folder, "Untitled folder", ItemStatus::Editing, None);
        let with_temp = add_temp_row(&columns, 1, temp, true);
        assert_eq!(with_temp[1].items[0].name, "Untitled folder");
        assert_eq!(remove_temp_rows(&with_temp, 1), columns);

        let created = update_folder_after_edit(&with_temp, 1, "photos", ItemStatus::Ready);
        let row = &created[1].items[0];
        assert_eq!((row.name.as_str(), row.status), ("photos", ItemStatus::Ready));
        assert!(row.created_at.is_some() && row.id.is_none() && !row.is_temp);
    }

    #[test]
    fn loading_more_appends_and_clears_flag() {
        let columns = vec![column("root", &["a"])];
        let loading = set_column_loading_more(&columns, 0, true);
        assert!(loading[0].is_loading_more_items);
        let appended = append_column_items(&loading, 0, vec![Item::folder("b")], false);
        assert_eq!(appended[0].items.len(), 2);
        assert!(!appended[0].is_loading_more_items);
        assert!(!appended[0].has_more_items);
    }
}
