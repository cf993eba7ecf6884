use tracing::debug;

use super::navigation::join_path;
use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, Result};
use crate::store::{ListOptions, ObjectMetadata, ObjectStore, SortBy};

/// An object somewhere below a traversed folder.
#[derive(Debug, Clone, PartialEq)]
pub struct DescendantObject {
    /// Path of the folder that directly contains the object.
    pub prefix: String,
    pub name: String,
    pub id: Option<String>,
    pub metadata: Option<ObjectMetadata>,
}

impl DescendantObject {
    pub fn path(&self) -> String {
        join_path(&self.prefix, &self.name)
    }
}

/// Lists every object below `folder_path`, placeholders included.
///
/// Folders are walked with an explicit stack; each one is listed in pages of
/// `traversal_page_size` until a short page comes back. Any listing failure
/// aborts the walk, and so does nesting deeper than `max_traversal_depth`.
pub async fn collect_descendants<S: ObjectStore>(
    store: &S,
    bucket_id: &str,
    folder_path: &str,
    sort_by: SortBy,
    config: &ExplorerConfig,
) -> Result<Vec<DescendantObject>> {
    let page_size = config.traversal_page_size.max(1);
    let mut objects = Vec::new();
    let mut stack = vec![(folder_path.to_string(), 0usize)];

    while let Some((path, depth)) = stack.pop() {
        if depth > config.max_traversal_depth {
            return Err(ExplorerError::TraversalTooDeep {
                path,
                limit: config.max_traversal_depth,
            });
        }

        let mut options = ListOptions {
            limit: page_size,
            offset: 0,
            sort_by,
            search: None,
        };
        loop {
            let page = store
                .list_objects(bucket_id, &path, &options)
                .await
                .map_err(|e| ExplorerError::Traversal {
                    path: path.clone(),
                    message: format!("{:#}", e),
                })?;
            let short = page.len() < page_size;
            for entry in page {
                if entry.is_folder() {
                    stack.push((join_path(&path, &entry.name), depth + 1));
                } else {
                    objects.push(DescendantObject {
                        prefix: path.clone(),
                        name: entry.name,
                        id: entry.id,
                        metadata: entry.metadata,
                    });
                }
            }
            if short {
                break;
            }
            options.offset += page_size;
        }
    }

    debug!(
        bucket = bucket_id,
        folder = folder_path,
        count = objects.len(),
        "collected descendants"
    );
    Ok(objects)
}
