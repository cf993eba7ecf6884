use anyhow::{Result, bail};
use storage_explorer::{ObjectStore, StorageExplorer};

use crate::common::{locate, print_report};

pub async fn run<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    paths: &[String],
) -> Result<()> {
    for path in paths {
        let item = locate(explorer, bucket, path).await?;
        let report = if item.item.is_folder() {
            explorer.delete_folder(&item).await?
        } else {
            explorer.delete_files(&[item]).await?
        };
        print_report(&format!("rm {}", path), &report);
    }
    Ok(())
}

pub async fn run_dir<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    path: &str,
) -> Result<()> {
    let item = locate(explorer, bucket, path).await?;
    if !item.item.is_folder() {
        bail!("Not a folder: {}", path);
    }
    let report = explorer.delete_folder(&item).await?;
    print_report(&format!("rmdir {}", path), &report);
    Ok(())
}
