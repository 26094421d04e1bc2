//! Image storage on an external media host.
//!
//! Posts keep the url returned by the host together with its public id; the
//! id is what [`MediaStore::delete`] needs when a post goes away.

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use serde::Deserialize;
use sha1::{Digest, Sha1};

pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const MAX_IMAGES_PER_REQUEST: usize = 5;

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("media service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("media service rejected the request: {0}")]
    Rejected(String),
    #[error("Image uploads are not available: no media host is configured")]
    NotConfigured,
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, MediaError>;
    async fn delete(&self, public_id: &str) -> Result<(), MediaError>;
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

pub struct CloudinaryStore {
    client: reqwest::Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Self {
        CloudinaryStore {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/{}",
            self.config.cloud_name, action
        )
    }

    fn sign(&self, params: &[(&str, &str)]) -> String {
        let payload = signature_payload(params, &self.config.api_secret);
        hex::encode(Sha1::digest(payload.as_bytes()))
    }
}

/// Parameters sorted by name, joined as `k=v&k=v`, with the secret appended.
fn signature_payload(params: &[(&str, &str)], secret: &str) -> String {
    let mut params = params.to_vec();
    params.sort_by(|a, b| a.0.cmp(b.0));
    let joined = params
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("{}{}", joined, secret)
}

#[async_trait]
impl MediaStore for CloudinaryStore {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, MediaError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[
            ("folder", self.config.folder.as_str()),
            ("timestamp", timestamp.as_str()),
        ]);
        let file = reqwest::multipart::Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name)
            .mime_str(&image.content_type)?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", self.config.folder.clone())
            .text("signature", signature);

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Rejected(format!("{}: {}", status, body)));
        }
        let uploaded: UploadResponse = response.json().await?;
        tracing::info!(public_id = %uploaded.public_id, "image uploaded");
        Ok(StoredImage {
            url: uploaded.secure_url,
            public_id: uploaded.public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);
        let form = [
            ("public_id", public_id.to_owned()),
            ("api_key", self.config.api_key.clone()),
            ("timestamp", timestamp),
            ("signature", signature),
        ];

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&form)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MediaError::Rejected(format!("{}: {}", status, body)));
        }
        let destroyed: DestroyResponse = response.json().await?;
        // "not found" means the image is already gone
        match destroyed.result.as_str() {
            "ok" | "not found" => {
                tracing::info!(public_id, result = %destroyed.result, "image destroyed");
                Ok(())
            }
            other => Err(MediaError::Rejected(format!(
                "destroy of {} returned {}",
                public_id, other
            ))),
        }
    }
}

/// Stands in when no media host is configured. Posts without images keep
/// working; anything touching an image is refused.
pub struct DisabledMediaStore;

#[async_trait]
impl MediaStore for DisabledMediaStore {
    async fn upload(&self, _image: ImageUpload) -> Result<StoredImage, MediaError> {
        Err(MediaError::NotConfigured)
    }

    async fn delete(&self, _public_id: &str) -> Result<(), MediaError> {
        Err(MediaError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_payload_sorts_parameters() {
        let payload = signature_payload(
            &[("timestamp", "1315060510"), ("public_id", "sample_image")],
            "abcd",
        );
        assert_eq!(payload, "public_id=sample_image&timestamp=1315060510abcd");
    }

    #[test]
    fn signature_is_hex_sha1() {
        let store = CloudinaryStore::new(CloudinaryConfig {
            cloud_name: "demo".to_owned(),
            api_key: "key".to_owned(),
            api_secret: "secret".to_owned(),
            folder: "blog-website".to_owned(),
        });
        let signature = store.sign(&[("timestamp", "1")]);
        assert_eq!(signature.len(), 40);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            store.endpoint("destroy"),
            "https://api.cloudinary.com/v1_1/demo/image/destroy"
        );
    }

    #[tokio::test]
    async fn disabled_store_refuses_images() {
        let store = DisabledMediaStore;
        let image = ImageUpload {
            file_name: "a.png".to_owned(),
            content_type: "image/png".to_owned(),
            bytes: Bytes::from_static(b"\x89PNG"),
        };
        assert!(matches!(store.upload(image).await, Err(MediaError::NotConfigured)));
        assert!(matches!(
            store.delete("blog-website/1").await,
            Err(MediaError::NotConfigured)
        ));
    }
}
