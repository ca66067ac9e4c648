//! Download and decode of a single image resource.

use async_trait::async_trait;
use image::RgbaImage;
use reqwest::Client;
use std::{fmt::Debug, sync::Arc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Image request failed with status {0}")]
    Status(u16),

    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Decode task failed: {0}")]
    Join(String),
}

/// Decoded image held in memory so rendering is instantaneous.
#[derive(Debug, Clone)]
pub struct PreloadedImage {
    url: Arc<str>,
    pixels: Arc<RgbaImage>,
}

impl PreloadedImage {
    pub fn from_rgba(url: impl Into<Arc<str>>, pixels: RgbaImage) -> Self {
        Self {
            url: url.into(),
            pixels: Arc::new(pixels),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Resident size of the decoded pixel buffer.
    pub fn byte_len(&self) -> u64 {
        self.pixels.as_raw().len() as u64
    }
}

#[async_trait]
pub trait ImageLoader: Send + Sync + Debug {
    /// Load and decode one image. Retries are the caller's concern.
    async fn load(&self, url: &str) -> Result<PreloadedImage, ImageLoadError>;
}

/// Loads images over HTTP and decodes them off the async executor.
#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: Client,
}

impl HttpImageLoader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<PreloadedImage, ImageLoadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageLoadError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;

        let pixels = tokio::task::spawn_blocking(move || {
            image::load_from_memory(&bytes).map(|decoded| decoded.to_rgba8())
        })
        .await
        .map_err(|err| ImageLoadError::Join(err.to_string()))??;

        Ok(PreloadedImage::from_rgba(url, pixels))
    }
}
