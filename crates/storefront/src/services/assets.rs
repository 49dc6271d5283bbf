//! Asset upload client for payment-proof screenshots.
//!
//! The asset endpoint accepts the raw image bytes and answers with a stable
//! asset document: `{"document": {"_id": "...", "url": "..."}}`.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::AssetConfig;

/// Image types accepted as payment proof.
pub const ACCEPTED_PROOF_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp", "image/gif"];

/// A proof-of-payment image submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofImage {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Reasons a proof image is refused before upload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidProof {
    #[error("payment proof is empty")]
    Empty,

    #[error("payment proof must be a PNG, JPEG, WebP or GIF image (got {0})")]
    UnsupportedType(String),

    #[error("payment proof is {size} bytes; the limit is {max}")]
    TooLarge { size: usize, max: usize },
}

impl ProofImage {
    /// Check the image is non-empty, an accepted type, and within `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns the first rule the image breaks.
    pub fn validate(&self, max_bytes: usize) -> Result<(), InvalidProof> {
        if self.bytes.is_empty() {
            return Err(InvalidProof::Empty);
        }
        let content_type = self.content_type.to_ascii_lowercase();
        if !ACCEPTED_PROOF_TYPES.contains(&content_type.as_str()) {
            return Err(InvalidProof::UnsupportedType(self.content_type.clone()));
        }
        if self.bytes.len() > max_bytes {
            return Err(InvalidProof::TooLarge {
                size: self.bytes.len(),
                max: max_bytes,
            });
        }
        Ok(())
    }
}

/// A stored asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedAsset {
    #[serde(rename = "_id")]
    pub id: String,
    pub url: String,
}

/// Errors that can occur when uploading an asset.
#[derive(Debug, Error)]
pub enum UploadError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Image upload collaborator.
#[async_trait]
pub trait AssetUploader: Send + Sync {
    /// Store `image` and return its stable reference.
    async fn upload(&self, image: &ProofImage) -> Result<UploadedAsset, UploadError>;
}

#[derive(Deserialize)]
struct UploadResponse {
    document: UploadedAsset,
}

/// HTTP asset uploader.
#[derive(Clone)]
pub struct HttpAssetUploader {
    client: reqwest::Client,
    upload_url: Url,
}

impl HttpAssetUploader {
    /// Create a new uploader.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &AssetConfig) -> Result<Self, UploadError> {
        let mut headers = HeaderMap::new();
        let auth_value = format!("Bearer {}", config.token.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth_value)
                .map_err(|e| UploadError::Parse(format!("Invalid token format: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            upload_url: config.upload_url.clone(),
        })
    }
}

#[async_trait]
impl AssetUploader for HttpAssetUploader {
    #[tracing::instrument(skip(self, image), fields(size = image.bytes.len(), content_type = %image.content_type))]
    async fn upload(&self, image: &ProofImage) -> Result<UploadedAsset, UploadError> {
        let mut url = self.upload_url.clone();
        if let Some(name) = &image.file_name {
            url.query_pairs_mut().append_pair("filename", name);
        }

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, &image.content_type)
            .body(image.bytes.clone())
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UploadError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Parse(e.to_string()))?;

        tracing::info!(asset_id = %body.document.id, "Uploaded payment proof");
        Ok(body.document)
    }
}
