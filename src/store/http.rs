//! # Storage REST Client
//!
//! Talks to a `/storage/v1` endpoint (object listing, upload, download, move,
//! remove, signing and bucket management). Every call authenticates with the
//! project API key, and a non-success status is turned into an error carrying
//! the status and the response body.

use anyhow::{Context, Result, bail};
use reqwest::{RequestBuilder, Response, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ObjectStore;
use super::types::{Bucket, BucketOptions, ListOptions, SortBy, StorageObject, UploadOptions};
use crate::client;

#[derive(Clone)]
pub struct HttpStore {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
}

#[derive(Serialize)]
struct MoveRequest<'a> {
    #[serde(rename = "bucketId")]
    bucket_id: &'a str,
    #[serde(rename = "sourceKey")]
    source_key: &'a str,
    #[serde(rename = "destinationKey")]
    destination_key: &'a str,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

#[derive(Serialize)]
struct SignRequest {
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

#[derive(Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[derive(Serialize)]
struct BucketRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_size_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_mime_types: Option<&'a [String]>,
}

/// Percent-encodes an object path, keeping `/` separators intact.
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() * 3);
    for b in path.as_bytes() {
        let c = *b as char;
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '/') {
            out.push(c);
        } else {
            out.push('%');
            out.push_str(&format!("{:02X}", b));
        }
    }
    out
}

/// Returns the response if it succeeded, otherwise an error naming the call.
async fn ensure_success(res: Response, what: &str) -> Result<Response> {
    if !res.status().is_success() {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        bail!("storage {} failed ({}): {}", what, status, body);
    }
    Ok(res)
}

impl HttpStore {
    /// `endpoint` is the project URL, e.g. `https://xyz.example.co`.
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self> {
        let parsed = Url::parse(endpoint).context("Invalid storage endpoint")?;
        if parsed.cannot_be_a_base() {
            bail!("Storage endpoint must be an absolute URL: {}", endpoint);
        }
        Ok(HttpStore {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: client::CLIENT.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/storage/v1/{}", self.endpoint, path)
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<Response> {
        let res = self
            .authorized(req)
            .send()
            .await
            .with_context(|| format!("Failed to call storage {} API", what))?;
        ensure_success(res, what).await
    }
}

impl ObjectStore for HttpStore {
    async fn list_objects(
        &self,
        bucket_id: &str,
        prefix: &str,
        options: &ListOptions,
    ) -> Result<Vec<StorageObject>> {
        debug!(bucket = bucket_id, prefix, offset = options.offset, "listing objects");
        let body = ListRequest {
            prefix,
            limit: options.limit,
            offset: options.offset,
            sort_by: options.sort_by,
            search: options.search.as_deref(),
        };
        let res = self
            .send(
                self.client
                    .post(self.url(&format!("object/list/{}", encode_path(bucket_id))))
                    .json(&body),
                "list",
            )
            .await?;
        res.json().await.context("Invalid storage list response")
    }

    async fn upload(
        &self,
        bucket_id: &str,
        path: &str,
        data: &[u8],
        options: &UploadOptions,
    ) -> Result<()> {
        let url = self.url(&format!(
            "object/{}/{}",
            encode_path(bucket_id),
            encode_path(path)
        ));
        let content_type = options
            .content_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        self.send(
            self.client
                .post(url)
                .header("Content-Type", content_type)
                .header("cache-control", format!("max-age={}", options.cache_control))
                .header("x-upsert", options.upsert.to_string())
                .body(data.to_vec()),
            "upload",
        )
        .await?;
        Ok(())
    }

    async fn download(&self, bucket_id: &str, path: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!(
            "object/{}/{}",
            encode_path(bucket_id),
            encode_path(path)
        ));
        let res = self.send(self.client.get(url), "download").await?;
        let bytes = res.bytes().await.context("Failed to read storage body")?;
        Ok(bytes.to_vec())
    }

    async fn move_object(&self, bucket_id: &str, from: &str, to: &str) -> Result<()> {
        let body = MoveRequest {
            bucket_id,
            source_key: from,
            destination_key: to,
        };
        self.send(self.client.post(self.url("object/move")).json(&body), "move")
            .await?;
        Ok(())
    }

    async fn remove(&self, bucket_id: &str, paths: &[String]) -> Result<()> {
        let body = RemoveRequest { prefixes: paths };
        self.send(
            self.client
                .delete(self.url(&format!("object/{}", encode_path(bucket_id))))
                .json(&body),
            "remove",
        )
        .await?;
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket_id: &str,
        path: &str,
        expires_in: u64,
    ) -> Result<String> {
        let url = self.url(&format!(
            "object/sign/{}/{}",
            encode_path(bucket_id),
            encode_path(path)
        ));
        let res = self
            .send(
                self.client.post(url).json(&SignRequest { expires_in }),
                "sign",
            )
            .await?;
        let body: SignResponse = res.json().await.context("Invalid storage sign response")?;
        // The service answers with a path relative to /storage/v1.
        Ok(format!("{}/storage/v1{}", self.endpoint, body.signed_url))
    }

    fn get_public_url(&self, bucket_id: &str, path: &str) -> String {
        self.url(&format!(
            "object/public/{}/{}",
            encode_path(bucket_id),
            encode_path(path)
        ))
    }

    async fn list_buckets(&self) -> Result<Vec<Bucket>> {
        let res = self
            .send(self.client.get(self.url("bucket")), "list buckets")
            .await?;
        res.json().await.context("Invalid storage bucket response")
    }

    async fn create_bucket(&self, name: &str, options: &BucketOptions) -> Result<()> {
        let body = BucketRequest {
            id: Some(name),
            name: Some(name),
            public: options.public,
            file_size_limit: options.file_size_limit,
            allowed_mime_types: options.allowed_mime_types.as_deref(),
        };
        self.send(
            self.client.post(self.url("bucket")).json(&body),
            "create bucket",
        )
        .await?;
        Ok(())
    }

    async fn update_bucket(&self, id: &str, options: &BucketOptions) -> Result<()> {
        let body = BucketRequest {
            id: Some(id),
            name: None,
            public: options.public,
            file_size_limit: options.file_size_limit,
            allowed_mime_types: options.allowed_mime_types.as_deref(),
        };
        self.send(
            self.client
                .put(self.url(&format!("bucket/{}", encode_path(id))))
                .json(&body),
            "update bucket",
        )
        .await?;
        Ok(())
    }

    async fn delete_bucket(&self, id: &str) -> Result<()> {
        self.send(
            self.client
                .delete(self.url(&format!("bucket/{}", encode_path(id)))),
            "delete bucket",
        )
        .await?;
        Ok(())
    }

    async fn empty_bucket(&self, id: &str) -> Result<()> {
        self.send(
            self.client
                .post(self.url(&format!("bucket/{}/empty", encode_path(id)))),
            "empty bucket",
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_path_keeps_separators() {
        assert_eq!(encode_path("docs/a b.txt"), "docs/a%20b.txt");
        assert_eq!(encode_path("x (2).png"), "x%20%282%29.png");
    }

    #[test]
    fn rejects_relative_endpoint() {
        assert!(HttpStore::new("not a url", "key").is_err());
        let store = HttpStore::new("https://example.co/", "key").unwrap();
        assert_eq!(
            store.get_public_url("avatars", "a/b.png"),
            "https://example.co/storage/v1/object/public/avatars/a/b.png"
        );
    }

    #[tokio::test]
    #[ignore]
    async fn list_buckets_smoke() -> Result<()> {
        // Needs STORAGE_URL and STORAGE_KEY pointing at a live project.
        let url = std::env::var("STORAGE_URL").context("STORAGE_URL not set")?;
        let key = std::env::var("STORAGE_KEY").context("STORAGE_KEY not set")?;
        let store = HttpStore::new(&url, &key)?;
        let _ = store.list_buckets().await?;
        Ok(())
    }
}
