use anyhow::{Context, Result};
use storage_explorer::{ObjectStore, StorageExplorer};

use crate::common::{open_folder, segments};

pub async fn run<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    path: &str,
) -> Result<()> {
    let mut folders = segments(path);
    let name = folders
        .pop()
        .with_context(|| format!("Not a folder path: {:?}", path))?;
    let column_index = open_folder(explorer, bucket, &folders.join("/")).await?;
    explorer.add_new_folder_placeholder(Some(column_index))?;
    explorer.add_new_folder(&name, column_index).await?;
    println!("created {}/", explorer.path_prefix(true));
    Ok(())
}
