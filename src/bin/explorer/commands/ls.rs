use anyhow::Result;
use storage_explorer::explorer::Item;
use storage_explorer::{ObjectStore, StorageExplorer};

use crate::common::{Align, human_size, open_folder, print_table};

pub async fn run<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    path: &str,
    long: bool,
) -> Result<()> {
    let column_index = open_folder(explorer, bucket, path).await?;
    let mut state = explorer.snapshot();
    let column = state.columns.swap_remove(column_index);
    if long {
        let rows: Vec<[String; 4]> = column.items.iter().map(long_row).collect();
        print_table(
            &[
                ("Size", Align::Right),
                ("Type", Align::Left),
                ("Updated", Align::Left),
                ("Name", Align::Left),
            ],
            &rows,
        );
    } else {
        for item in &column.items {
            println!("{}", display_name(item));
        }
    }
    Ok(())
}

fn display_name(item: &Item) -> String {
    if item.is_folder() {
        format!("{}/", item.name)
    } else if item.is_corrupted {
        format!("{} (corrupted)", item.name)
    } else {
        item.name.clone()
    }
}

fn long_row(item: &Item) -> [String; 4] {
    let mimetype = item
        .metadata
        .as_ref()
        .and_then(|m| m.mimetype.clone())
        .unwrap_or_else(|| "-".to_string());
    [
        item.size().map(human_size).unwrap_or_else(|| "-".to_string()),
        if item.is_folder() {
            "folder".to_string()
        } else {
            mimetype
        },
        item.updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string()),
        display_name(item),
    ]
}
