use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Zero-byte object that keeps an otherwise empty folder visible in a
/// prefix-only key space.
pub const EMPTY_FOLDER_PLACEHOLDER_FILE_NAME: &str = ".emptyFolderPlaceholder";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub file_size_limit: Option<u64>,
    #[serde(default)]
    pub allowed_mime_types: Option<Vec<String>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketOptions {
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mime_types: Option<Vec<String>>,
}

/// One entry of a prefix listing. Sub-folders come back without an `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageObject {
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: Option<ObjectMetadata>,
}

impl StorageObject {
    pub fn folder(name: impl Into<String>) -> Self {
        StorageObject {
            name: name.into(),
            id: None,
            created_at: None,
            updated_at: None,
            last_accessed_at: None,
            metadata: None,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(rename = "cacheControl")]
    #[serde(default)]
    pub cache_control: Option<String>,
    #[serde(rename = "lastModified")]
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    Name,
    UpdatedAt,
    CreatedAt,
    LastAccessedAt,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortBy {
    pub column: SortColumn,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    #[serde(rename = "sortBy")]
    pub sort_by: SortBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    pub cache_control: String,
    pub content_type: Option<String>,
    pub upsert: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            cache_control: "3600".to_string(),
            content_type: None,
            upsert: false,
        }
    }
}
