use async_trait::async_trait;
use std::time::Duration;

use super::payload::decode_payload;
use crate::error::FetchError;
use crate::models::{Category, ImagePolicy};

pub const DEFAULT_ENDPOINT: &str = "https://pastebin.com/raw/HpSAiSBf";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Somewhere the full category list can be fetched from.
#[async_trait]
pub trait CategorySource: Send + Sync {
    /// Fetches every category, in the order the source returns them.
    async fn fetch(&self) -> Result<Vec<Category>, FetchError>;
}

/// Settings for [`HttpCategorySource`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// Which image URL consumers should display.
    pub image_policy: ImagePolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            image_policy: ImagePolicy::default(),
        }
    }
}

/// Fetches categories with a plain HTTP GET.
pub struct HttpCategorySource {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpCategorySource {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn image_policy(&self) -> ImagePolicy {
        self.config.image_policy
    }
}

#[async_trait]
impl CategorySource for HttpCategorySource {
    async fn fetch(&self) -> Result<Vec<Category>, FetchError> {
        tracing::debug!(endpoint = %self.config.endpoint, "fetching categories");

        let response = self
            .client
            .get(&self.config.endpoint)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let categories = decode_payload(&body)?;
        tracing::debug!(count = categories.len(), "categories fetched");
        Ok(categories)
    }
}
