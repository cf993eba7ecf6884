//! # Object Store Backends
//!
//! The explorer talks to a flat, prefix-keyed blob store through the
//! [`ObjectStore`] trait. Two backends are provided:
//!
//! - `memory`: an in-process store with the same listing semantics, used for
//!   local runs and as a test double (fault and latency injection).
//! - `http`: a client for the `/storage/v1` REST API. Enabled with `reqwest`.

/// In-process backend. Enabled with `tokio`.
#[cfg(feature = "tokio")]
pub mod memory;
/// REST backend for `/storage/v1`.
#[cfg(feature = "reqwest")]
pub mod http;
/// Wire and listing types shared by every backend.
pub mod types;

#[cfg(feature = "reqwest")]
pub use http::HttpStore;
#[cfg(feature = "tokio")]
pub use memory::{FailPoint, MemoryStore};
pub use types::*;

use anyhow::Result;

/// The remote operations the explorer depends on.
///
/// Listing returns the direct children of `prefix`: sub-folders as entries
/// without an `id`, objects with their id, metadata and timestamps. Paths never
/// carry a leading or trailing `/`.
#[allow(async_fn_in_trait)]
pub trait ObjectStore {
    async fn list_objects(
        &self,
        bucket_id: &str,
        prefix: &str,
        options: &ListOptions,
    ) -> Result<Vec<StorageObject>>;

    async fn upload(
        &self,
        bucket_id: &str,
        path: &str,
        data: &[u8],
        options: &UploadOptions,
    ) -> Result<()>;

    async fn download(&self, bucket_id: &str, path: &str) -> Result<Vec<u8>>;

    async fn move_object(&self, bucket_id: &str, from: &str, to: &str) -> Result<()>;

    async fn remove(&self, bucket_id: &str, paths: &[String]) -> Result<()>;

    async fn create_signed_url(&self, bucket_id: &str, path: &str, expires_in: u64)
    -> Result<String>;

    fn get_public_url(&self, bucket_id: &str, path: &str) -> String;

    async fn list_buckets(&self) -> Result<Vec<Bucket>>;

    async fn create_bucket(&self, name: &str, options: &BucketOptions) -> Result<()>;

    async fn update_bucket(&self, id: &str, options: &BucketOptions) -> Result<()>;

    async fn delete_bucket(&self, id: &str) -> Result<()>;

    async fn empty_bucket(&self, id: &str) -> Result<()>;
}
