use anyhow::{Context, Result};
use std::path::PathBuf;
use storage_explorer::explorer::{RejectReason, UploadFile};
use storage_explorer::{ObjectStore, StorageExplorer};

use crate::common::{human_size, open_folder};

pub async fn run<S: ObjectStore>(
    explorer: &StorageExplorer<S>,
    bucket: &str,
    dest: &str,
    files: &[PathBuf],
) -> Result<()> {
    let mut uploads = Vec::with_capacity(files.len());
    for path in files {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Not a file name: {}", path.display()))?;
        uploads.push(UploadFile::new(name, data));
    }

    let column_index = open_folder(explorer, bucket, dest).await?;
    let report = explorer.upload_files(uploads, Some(column_index)).await?;
    for rejected in &report.rejected {
        match rejected.reason {
            RejectReason::Empty => println!("skipped {}: file is empty", rejected.name),
            RejectReason::TooLarge { limit } => println!(
                "skipped {}: larger than the {} limit",
                rejected.name,
                human_size(limit)
            ),
        }
    }
    println!(
        "uploaded {} of {} file(s)",
        report.success_count, report.total
    );
    for e in &report.errors {
        println!("  {}: {}", e.path, e.message);
    }
    Ok(())
}
