use anyhow::{Context, Result};
use std::path::Path;
use storage_explorer::explorer::DownloadedFile;
use storage_explorer::{ObjectStore, StorageExplorer};

use crate::common::{locate, print_report};

async fn save(out: &Path, file: &DownloadedFile) -> Result<()> {
    let target = out.join(&file.path);
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&target, &file.data)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;
    println!("{}", target.display());
    Ok(())
}

pub async fn run<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    path: &str,
    out: &Path,
) -> Result<()> {
    let item = locate(explorer, bucket, path).await?;
    if item.item.is_folder() {
        let download = explorer.download_folder(&item).await?;
        for file in &download.files {
            save(out, file).await?;
        }
        print_report(&format!("get {}", path), &download.report);
    } else {
        let file = explorer.download_file(&item).await?;
        save(out, &file).await?;
    }
    Ok(())
}

pub async fn url<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    path: &str,
    expires_in: u64,
) -> Result<()> {
    let item = locate(explorer, bucket, path).await?;
    println!("{}", explorer.get_file_url(&item, expires_in).await?);
    Ok(())
}
