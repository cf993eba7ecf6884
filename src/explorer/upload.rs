use std::collections::HashMap;
use tracing::{debug, info};

use super::batch::{BatchItem, OperationError, Outcome, run_in_batches};
use super::model::{Item, ItemStatus, ItemType};
use super::{StorageExplorer, names, navigation};
use crate::error::Result;
use crate::store::{ObjectMetadata, ObjectStore, UploadOptions};

const IGNORED_FILE_NAMES: &[&str] = &[".DS_Store"];

/// A file handed to [`StorageExplorer::upload_files`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    /// Path inside a dropped folder tree, including the file name
    /// (`photos/2024/a.png`). `None` for a file dropped on its own.
    pub relative_path: Option<String>,
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        UploadFile {
            name: name.into(),
            relative_path: None,
            data: data.into(),
            mime_type: None,
        }
    }

    pub fn in_folder(relative_path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        let relative_path = relative_path.into();
        let name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&relative_path)
            .to_string();
        UploadFile {
            name,
            relative_path: Some(relative_path),
            data: data.into(),
            mime_type: None,
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn content_type(&self) -> Option<String> {
        self.mime_type
            .clone()
            .or_else(|| mime_guess::from_path(&self.name).first_raw().map(str::to_string))
    }

    /// Top-level folder of a dropped tree and the path below it.
    fn tree_path(&self) -> Option<(&str, &str)> {
        self.relative_path
            .as_deref()
            .map(|p| p.trim_start_matches('/'))
            .and_then(|p| p.split_once('/'))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Larger than the bucket's (or the global) upload limit, in bytes.
    TooLarge { limit: u64 },
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedFile {
    pub name: String,
    pub reason: RejectReason,
}

/// Result of one upload. `total` counts the accepted files only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub success_count: usize,
    pub fail_count: usize,
    pub total: usize,
    pub errors: Vec<OperationError>,
    pub rejected: Vec<RejectedFile>,
}

impl UploadReport {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_counts(self.success_count, self.fail_count)
    }
}

struct UploadTask {
    path: String,
    data: Vec<u8>,
    options: UploadOptions,
}

impl BatchItem for UploadTask {
    fn label(&self) -> String {
        self.path.clone()
    }
}

impl<S: ObjectStore> StorageExplorer<S> {
    /// Uploads `files` into the folder shown in column `column_index` (the
    /// deepest column for `None`).
    ///
    /// Names are made unique against the column: a dropped folder tree is
    /// renamed once at its top level, single files one by one. Uploads run
    /// `upload_batch_size` at a time, each bounded by the upload timeout.
    pub async fn upload_files(
        &self,
        files: Vec<UploadFile>,
        column_index: Option<usize>,
    ) -> Result<UploadReport> {
        let bucket = self.selected_bucket()?;
        let column_index = self.resolve_column(column_index)?;
        let prefix = self.path_to_index(column_index);
        let limit = bucket.file_size_limit.or(self.config.file_size_limit);

        let mut report = UploadReport::default();
        let mut accepted = Vec::new();
        for file in files {
            let path = file.relative_path.as_deref().unwrap_or(&file.name);
            if path.contains("#/") || IGNORED_FILE_NAMES.contains(&file.name.as_str()) {
                debug!(file = %path, "skipped");
                continue;
            }
            let reason = match limit {
                _ if file.size() == 0 => Some(RejectReason::Empty),
                Some(limit) if file.size() > limit => Some(RejectReason::TooLarge { limit }),
                _ => None,
            };
            match reason {
                Some(reason) => report.rejected.push(RejectedFile {
                    name: file.name,
                    reason,
                }),
                None => accepted.push(file),
            }
        }
        if accepted.is_empty() {
            return Ok(report);
        }

        let mut working = self.column_items(column_index)?;
        let mut temp_rows = Vec::new();
        let mut folders: HashMap<String, String> = HashMap::new();
        let mut tasks = Vec::with_capacity(accepted.len());
        for file in accepted {
            let options = UploadOptions {
                content_type: file.content_type(),
                ..Default::default()
            };
            let target = match file.tree_path() {
                Some((top, rest)) => {
                    let top = names::normalize_upload_name(top);
                    let folder = match folders.get(&top) {
                        Some(folder) => folder.clone(),
                        None => {
                            let folder = names::resolve_name(&top, &working, true)?;
                            let row = Item::temp(ItemType::Folder, &folder, ItemStatus::Loading, None);
                            working.push(row.clone());
                            temp_rows.push(row);
                            folders.insert(top, folder.clone());
                            folder
                        }
                    };
                    format!("{}/{}", folder, names::normalize_upload_name(rest))
                }
                None => {
                    let name = names::resolve_name(
                        &names::normalize_upload_name(&file.name),
                        &working,
                        true,
                    )?;
                    let metadata = ObjectMetadata {
                        size: file.size(),
                        mimetype: options.content_type.clone(),
                        ..Default::default()
                    };
                    let row = Item::temp(ItemType::File, &name, ItemStatus::Loading, Some(metadata));
                    working.push(row.clone());
                    temp_rows.push(row);
                    name
                }
            };
            tasks.push(UploadTask {
                path: navigation::join_path(&prefix, &target),
                data: file.data,
                options,
            });
        }

        let claimed: Vec<String> = temp_rows
            .iter()
            .map(|row| navigation::join_path(&prefix, &row.name))
            .collect();
        let claim = self.claim(&bucket, &claimed)?;
        self.update(|s| {
            for row in temp_rows {
                s.columns = navigation::add_temp_row(&s.columns, column_index, row, false);
            }
        });

        report.total = tasks.len();
        info!(bucket = %bucket.id, %prefix, files = report.total, "uploading");
        let (batch, _) = run_in_batches(
            tasks,
            self.config.upload_batch_size,
            Some(self.config.upload_timeout()),
            |task| {
                let bucket_id = &bucket.id;
                async move {
                    self.store
                        .upload(bucket_id, &task.path, &task.data, &task.options)
                        .await
                }
            },
        )
        .await;
        report.success_count = batch.success_count;
        report.fail_count = batch.fail_count;
        report.errors = batch.errors;

        if report.success_count > 0 {
            self.remove_folder_placeholder(&bucket, &prefix).await;
        }
        drop(claim);
        info!(
            bucket = %bucket.id,
            succeeded = report.success_count,
            failed = report.fail_count,
            "upload finished"
        );
        self.reconcile().await;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExplorerConfig;
    use crate::explorer::testing::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn colliding_names_get_numbered() -> anyhow::Result<()> {
        let explorer = opened(MemoryStore::new()).await;
        let files = vec![UploadFile::new("a.txt", "one"), UploadFile::new("a.txt", "two")];
        let report = explorer.upload_files(files, Some(0)).await?;

        assert_eq!((report.success_count, report.fail_count, report.total), (2, 0, 2));
        assert_eq!(report.outcome(), Outcome::Success);
        assert_eq!(explorer.store().object_paths("b"), vec!["a (2).txt", "a.txt"]);
        // The refetch replaced the temp rows.
        assert_eq!(names(&explorer, 0), vec!["a (2).txt", "a.txt"]);
        assert!(explorer.snapshot().columns[0].items.iter().all(|i| !i.is_temp));
        Ok(())
    }

    #[tokio::test]
    async fn folder_trees_are_renamed_once_at_the_top() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "photos/old.png", b"1");
        let explorer = opened(store).await;
        let files = vec![
            UploadFile::in_folder("photos/a.png", "a"),
            UploadFile::in_folder("photos/2024/b.png", "b"),
        ];
        let report = explorer.upload_files(files, None).await?;
        assert_eq!(report.success_count, 2);
        assert_eq!(
            explorer.store().object_paths("b"),
            vec!["photos (2)/2024/b.png", "photos (2)/a.png", "photos/old.png"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn rejected_files_are_not_counted() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let bucket = store.add_bucket("b", false);
        let config = ExplorerConfig {
            file_size_limit: Some(4),
            ..Default::default()
        };
        let explorer = explorer_with(store, config);
        explorer.open_bucket(&bucket).await?;

        let files = vec![
            UploadFile::new("ok.txt", "1234"),
            UploadFile::new("big.txt", "12345"),
            UploadFile::new("empty.txt", ""),
            UploadFile::new(".DS_Store", "x"),
            UploadFile::in_folder("weird#/x.txt", "x"),
        ];
        let report = explorer.upload_files(files, Some(0)).await?;
        assert_eq!(report.total, 1);
        assert_eq!(report.success_count, 1);
        assert_eq!(
            report.rejected,
            vec![
                RejectedFile {
                    name: "big.txt".to_string(),
                    reason: RejectReason::TooLarge { limit: 4 },
                },
                RejectedFile {
                    name: "empty.txt".to_string(),
                    reason: RejectReason::Empty,
                },
            ]
        );
        assert_eq!(explorer.store().object_paths("b"), vec!["ok.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn nothing_accepted_means_no_calls() -> anyhow::Result<()> {
        let explorer = opened(MemoryStore::new()).await;
        explorer.store().clear_calls();
        let report = explorer
            .upload_files(vec![UploadFile::new("empty", "")], Some(0))
            .await?;
        assert_eq!(report.outcome(), Outcome::Nothing);
        assert!(explorer.store().calls().is_empty());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn slow_upload_times_out_as_a_failure() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.delay_upload("slow.bin", Duration::from_secs(60));
        let explorer = opened(store).await;
        let files = vec![UploadFile::new("slow.bin", "s"), UploadFile::new("fast.bin", "f")];
        let report = explorer.upload_files(files, Some(0)).await?;

        assert_eq!((report.success_count, report.fail_count), (1, 1));
        assert_eq!(report.outcome(), Outcome::Partial);
        assert_eq!(report.errors[0].path, "slow.bin");
        assert_eq!(report.errors[0].message, "timed out after 30s");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn uploads_run_batch_after_batch() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let bucket = store.add_bucket("b", false);
        let file_names: Vec<String> = (0..5).map(|i| format!("f{i}.bin")).collect();
        for name in &file_names {
            store.delay_upload(name, Duration::from_secs(10));
        }
        let config = ExplorerConfig {
            upload_batch_size: 2,
            ..Default::default()
        };
        let explorer = explorer_with(store, config);
        explorer.open_bucket(&bucket).await?;

        let files = file_names.iter().map(|n| UploadFile::new(n.as_str(), "x")).collect();
        let started = tokio::time::Instant::now();
        let report = explorer.upload_files(files, Some(0)).await?;

        assert_eq!((report.success_count, report.total), (5, 5));
        // Three batches of 10 s each, none overlapping.
        assert_eq!(started.elapsed().as_secs(), 30);
        let uploads = explorer
            .store()
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("upload "))
            .count();
        assert_eq!(uploads, 5);
        Ok(())
    }

    #[tokio::test]
    async fn upload_into_folder_drops_its_placeholder() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "docs/.emptyFolderPlaceholder", b"");
        let explorer = opened(store).await;
        let docs = item(&explorer, 0, "docs").item;
        explorer.open_folder(0, &docs).await?;

        let file = UploadFile {
            mime_type: Some("text/markdown".to_string()),
            ..UploadFile::new("read\u{202F}me.md", "# hi")
        };
        explorer.upload_files(vec![file], Some(1)).await?;
        assert_eq!(explorer.store().object_paths("b"), vec!["docs/read me.md"]);
        let row = item(&explorer, 1, "read me.md").item;
        assert_eq!(row.metadata.unwrap().mimetype.as_deref(), Some("text/markdown"));
        Ok(())
    }
}
