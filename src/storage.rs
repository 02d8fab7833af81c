//! Supabase object storage for finished images

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, instrument};

/// Errors while storing an image.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Transport failure
    #[error("Upload failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The storage API refused the object
    #[error("Upload failed: {status}: {body}")]
    Status {
        /// HTTP status
        status: StatusCode,
        /// Response body
        body: String,
    },
}

/// Somewhere finished images can be published.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Stores `bytes` under a fresh random name and returns its public URL.
    async fn upload(&self, bytes: Vec<u8>, extension: &str) -> Result<String, UploadError>;
}

/// Random object name, 32 lowercase hex digits plus the extension.
pub fn object_name(extension: &str) -> String {
    format!("{:032x}.{}", rand::random::<u128>(), extension)
}

/// Supabase Storage REST client for one bucket.
#[derive(Clone, Debug)]
pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl SupabaseStorage {
    /// New client for `bucket` in the project at `base_url`.
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, bucket: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
        }
    }

    /// Public URL an object is served from.
    pub fn public_url(&self, object: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, object
        )
    }

    fn upload_url(&self, object: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, object)
    }
}

#[async_trait]
impl ImageStore for SupabaseStorage {
    #[instrument(skip_all, fields(bucket = %self.bucket, size = bytes.len()))]
    async fn upload(&self, bytes: Vec<u8>, extension: &str) -> Result<String, UploadError> {
        let object = object_name(extension);
        debug!("Uploading image to Supabase: {}", object);

        let response = self
            .client
            .post(self.upload_url(&object))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, format!("image/{extension}"))
            .body(bytes)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|err| format!("<unreadable body: {err}>"));
            return Err(UploadError::Status { status, body });
        }

        let public_url = self.public_url(&object);
        info!("Image uploaded: {}", public_url);
        Ok(public_url)
    }
}
