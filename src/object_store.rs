//! Product images from an S3 bucket with anonymous read access
//!
//! Requests are plain unsigned GETs against the path-style URL
//! `{endpoint}/{bucket}/{product_id}.jpg`. Failures are reported once; nothing
//! is retried.

use crate::backend::ImageStore;
use crate::config::ObjectStoreConfig;
use crate::error::{Result, StorefrontError};
use crate::types::image_key;
use async_trait::async_trait;
use reqwest::StatusCode;

/// Anonymous S3 reader
#[derive(Debug, Clone)]
pub struct S3ImageStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl S3ImageStore {
    pub fn new(config: &ObjectStoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorefrontError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
        })
    }

    /// URL of the object backing a product image
    pub fn object_url(&self, product_id: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, image_key(product_id))
    }
}

#[async_trait]
impl ImageStore for S3ImageStore {
    async fn fetch(&self, product_id: &str) -> Result<Vec<u8>> {
        let url = self.object_url(product_id);
        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                StorefrontError::Transient(format!("timed out fetching {url}"))
            } else {
                StorefrontError::Transient(format!("fetching {url}: {e}"))
            }
        })?;

        let status = response.status();
        if let Some(err) = classify_status(status, &image_key(product_id)) {
            tracing::debug!(%url, status = status.as_u16(), "Image fetch failed");
            return Err(err);
        }

        let bytes = response.bytes().await?;
        tracing::debug!(%url, size = bytes.len(), "Fetched image");
        Ok(bytes.to_vec())
    }
}

/// Map an object-storage status to the error taxonomy. S3 answers 403 for a
/// missing key when the bucket does not allow anonymous listing.
fn classify_status(status: StatusCode, key: &str) -> Option<StorefrontError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
            StorefrontError::NotFound(format!("image {key}"))
        }
        other => StorefrontError::Transient(format!(
            "object storage returned {} for {key}",
            other.as_u16()
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_path_style_urls() {
        let store = S3ImageStore::new(&ObjectStoreConfig {
            endpoint: "http://s3.eu-central-1.amazonaws.com/".into(),
            bucket: "public-ai-images".into(),
            ..ObjectStoreConfig::default()
        })
        .unwrap();

        assert_eq!(
            store.object_url("15970"),
            "http://s3.eu-central-1.amazonaws.com/public-ai-images/15970.jpg"
        );
    }

    #[test]
    fn missing_objects_are_not_found() {
        assert!(classify_status(StatusCode::OK, "1.jpg").is_none());
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, "1.jpg"),
            Some(StorefrontError::NotFound(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, "1.jpg"),
            Some(StorefrontError::NotFound(_))
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, "1.jpg"),
            Some(StorefrontError::Transient(_))
        ));
    }
}
