use tracing::info;

use super::batch::{BatchItem, BatchReport, run_in_batches};
use super::model::ColumnItem;
use super::traversal::collect_descendants;
use super::{StorageExplorer, navigation};
use crate::error::Result;
use crate::store::{Bucket, EMPTY_FOLDER_PLACEHOLDER_FILE_NAME, ObjectStore};

/// Contents of one downloaded object.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedFile {
    /// Path relative to where the download started, e.g. `docs/img/a.png` for
    /// a download of folder `docs`.
    pub path: String,
    pub data: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Files of a multi-object download, plus the objects that failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolderDownload {
    pub files: Vec<DownloadedFile>,
    pub report: BatchReport,
}

struct DownloadTask {
    /// Object path in the bucket.
    source: String,
    path: String,
    mime_type: Option<String>,
}

impl BatchItem for DownloadTask {
    fn label(&self) -> String {
        self.source.clone()
    }
}

fn guess_mime(name: &str, listed: Option<&str>) -> Option<String> {
    listed
        .map(str::to_string)
        .or_else(|| mime_guess::from_path(name).first_raw().map(str::to_string))
}

impl<S: ObjectStore> StorageExplorer<S> {
    async fn download_all(
        &self,
        bucket: &Bucket,
        tasks: Vec<DownloadTask>,
        batch_size: usize,
    ) -> FolderDownload {
        let (report, files) = run_in_batches(tasks, batch_size, None, |task| {
            let bucket_id = &bucket.id;
            async move {
                let data = self.store.download(bucket_id, &task.source).await?;
                Ok(DownloadedFile {
                    path: task.path,
                    data,
                    mime_type: task.mime_type,
                })
            }
        })
        .await;
        FolderDownload { files, report }
    }

    pub async fn download_file(&self, file: &ColumnItem) -> Result<DownloadedFile> {
        let bucket = self.selected_bucket()?;
        let source = navigation::join_path(&self.path_to_index(file.column_index), &file.item.name);
        let data = self.store.download(&bucket.id, &source).await?;
        let listed = file.item.metadata.as_ref().and_then(|m| m.mimetype.as_deref());
        Ok(DownloadedFile {
            path: file.item.name.clone(),
            data,
            mime_type: guess_mime(&file.item.name, listed),
        })
    }

    /// Downloads every object below `folder`. Placeholders are left out and
    /// paths start with the folder name.
    pub async fn download_folder(&self, folder: &ColumnItem) -> Result<FolderDownload> {
        let bucket = self.selected_bucket()?;
        let parent = self.path_to_index(folder.column_index);
        let folder_path = navigation::join_path(&parent, &folder.item.name);
        let sort_by = self.state.borrow().preferences.sort();
        let descendants =
            collect_descendants(&self.store, &bucket.id, &folder_path, sort_by, &self.config).await?;

        let tasks: Vec<DownloadTask> = descendants
            .into_iter()
            .filter(|d| d.name != EMPTY_FOLDER_PLACEHOLDER_FILE_NAME)
            .map(|d| {
                let source = d.path();
                let listed = d.metadata.as_ref().and_then(|m| m.mimetype.as_deref());
                DownloadTask {
                    mime_type: guess_mime(&d.name, listed),
                    path: relative_to(&parent, &source).to_string(),
                    source,
                }
            })
            .collect();
        info!(bucket = %bucket.id, folder = %folder_path, files = tasks.len(), "downloading folder");
        Ok(self
            .download_all(&bucket, tasks, self.config.download_batch_size)
            .await)
    }

    /// Downloads the selected files. Paths are relative to the shallowest
    /// column in the selection, so files picked from deeper columns keep
    /// their folders.
    pub async fn download_selected_files(&self, files: &[ColumnItem]) -> Result<FolderDownload> {
        let bucket = self.selected_bucket()?;
        let Some(base) = files.iter().map(|f| f.column_index).min() else {
            return Ok(FolderDownload::default());
        };
        let base = self.path_to_index(base);
        let tasks: Vec<DownloadTask> = files
            .iter()
            .filter(|f| !f.item.is_folder())
            .map(|f| {
                let source =
                    navigation::join_path(&self.path_to_index(f.column_index), &f.item.name);
                let listed = f.item.metadata.as_ref().and_then(|m| m.mimetype.as_deref());
                DownloadTask {
                    mime_type: guess_mime(&f.item.name, listed),
                    path: relative_to(&base, &source).to_string(),
                    source,
                }
            })
            .collect();
        info!(bucket = %bucket.id, files = tasks.len(), "downloading selection");
        Ok(self
            .download_all(&bucket, tasks, self.config.selected_download_batch_size)
            .await)
    }
}

/// `path` with the folder `base` stripped off the front.
fn relative_to<'a>(base: &str, path: &'a str) -> &'a str {
    if base.is_empty() {
        return path;
    }
    path.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explorer::testing::*;
    use crate::store::{FailPoint, MemoryStore};

    #[test]
    fn relative_paths() {
        assert_eq!(relative_to("", "a/b.txt"), "a/b.txt");
        assert_eq!(relative_to("a", "a/b.txt"), "b.txt");
        assert_eq!(relative_to("x", "a/b.txt"), "a/b.txt");
    }

    #[tokio::test]
    async fn single_file() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "docs/a.md", b"# a");
        let explorer = opened(store).await;
        let docs = item(&explorer, 0, "docs").item;
        explorer.open_folder(0, &docs).await?;

        let file = explorer.download_file(&item(&explorer, 1, "a.md")).await?;
        assert_eq!(file.path, "a.md");
        assert_eq!(file.data, b"# a");
        assert_eq!(file.mime_type.as_deref(), Some("text/markdown"));
        Ok(())
    }

    #[tokio::test]
    async fn folder_download_skips_placeholders_and_reports_failures() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "docs/readme.md", b"r");
        store.put_object("b", "docs/img/.emptyFolderPlaceholder", b"");
        store.put_object("b", "docs/sub/x.txt", b"x");
        store.put_object("b", "docs/sub/bad.txt", b"y");
        store.fail(FailPoint::Download("docs/sub/bad.txt".to_string()));
        let explorer = opened(store).await;

        let download = explorer.download_folder(&item(&explorer, 0, "docs")).await?;
        let mut paths: Vec<_> = download.files.iter().map(|f| f.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["docs/readme.md", "docs/sub/x.txt"]);
        assert_eq!(download.report.fail_count, 1);
        assert_eq!(download.report.errors[0].path, "docs/sub/bad.txt");
        Ok(())
    }

    #[tokio::test]
    async fn selection_keeps_deeper_folders() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        store.put_object("b", "top.txt", b"1");
        store.put_object("b", "a/inner.txt", b"2");
        let explorer = opened(store).await;
        let a = item(&explorer, 0, "a");
        explorer.open_folder(0, &a.item).await?;

        let selection = [item(&explorer, 0, "top.txt"), a, item(&explorer, 1, "inner.txt")];
        let download = explorer.download_selected_files(&selection).await?;
        let paths: Vec<_> = download.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["top.txt", "a/inner.txt"]);
        assert_eq!(download.report.success_count, 2);
        Ok(())
    }
}
