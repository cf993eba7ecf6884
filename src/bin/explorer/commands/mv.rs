use anyhow::Result;
use storage_explorer::explorer::BatchReport;
use storage_explorer::{ObjectStore, StorageExplorer};

use crate::common::{locate, print_report};

pub async fn run<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    paths: &[String],
    dest: &str,
) -> Result<()> {
    let mut total = BatchReport::default();
    for path in paths {
        let item = locate(explorer, bucket, path).await?;
        total.merge(explorer.move_items(&[item], dest).await?);
    }
    print_report(&format!("mv -> {}", dest), &total);
    Ok(())
}

pub async fn rename<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    path: &str,
    new_name: &str,
) -> Result<()> {
    let item = locate(explorer, bucket, path).await?;
    explorer.set_selected_item_to_rename(&item.item.name, item.column_index);
    if item.item.is_folder() {
        let report = explorer
            .rename_folder(&item.item, new_name, item.column_index)
            .await?;
        print_report(&format!("rename {}", path), &report);
    } else {
        explorer
            .rename_file(&item.item, new_name, item.column_index)
            .await?;
        println!("renamed {} to {}", path, new_name);
    }
    Ok(())
}
