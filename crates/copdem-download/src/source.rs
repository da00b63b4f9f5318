//! Remote tile sources.
//!
//! [`TileSource`] is the seam between the orchestrator and the network.
//! [`HttpTileSource`] fetches from the public Copernicus bucket (or any
//! mirror with the same key layout) using a blocking reqwest client.

use crate::{DownloadConfig, TileId, TransferError};
use reqwest::StatusCode;
use std::fmt;
use std::io::Read;
use tracing::debug;

/// A streaming response body for one tile.
pub struct RemoteBody {
    /// Size announced by the server, if any.
    pub content_length: Option<u64>,
    /// The byte stream. Dropping it closes the connection.
    pub reader: Box<dyn Read + Send>,
}

impl RemoteBody {
    pub fn new(content_length: Option<u64>, reader: impl Read + Send + 'static) -> Self {
        Self {
            content_length,
            reader: Box::new(reader),
        }
    }
}

impl fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteBody")
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Where tile bytes come from.
pub trait TileSource: Send + Sync {
    /// Size of the tile's object, if the source can tell without
    /// transferring it. Errors here are informational only.
    fn probe(&self, tile: &TileId) -> Result<Option<u64>, TransferError>;

    /// Open a streaming read of the tile's object.
    fn open(&self, tile: &TileId) -> Result<RemoteBody, TransferError>;

    /// Human readable locator, used in logs and error messages.
    fn locator(&self, tile: &TileId) -> String;
}

/// Map a non-success HTTP status to the job error it represents.
pub fn classify_status(status: StatusCode, url: &str) -> TransferError {
    match status {
        StatusCode::NOT_FOUND => TransferError::RemoteNotFound { url: url.to_string() },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransferError::RemoteAccessDenied {
            url: url.to_string(),
            status: status.as_u16(),
        },
        other => TransferError::NetworkFailure(format!("HTTP {} for {}", other, url)),
    }
}

/// Tile source backed by HTTP(S).
pub struct HttpTileSource {
    /// Bucket root URL.
    base_url: String,
    /// HTTP client shared by every request of the session.
    client: reqwest::blocking::Client,
}

impl fmt::Debug for HttpTileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTileSource")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpTileSource {
    /// Create a source from configuration.
    pub fn new(config: &DownloadConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
        })
    }
}

impl TileSource for HttpTileSource {
    fn probe(&self, tile: &TileId) -> Result<Option<u64>, TransferError> {
        let url = self.locator(tile);
        let response = self.client.head(&url).send()?;

        if !response.status().is_success() {
            return Err(classify_status(response.status(), &url));
        }

        // reqwest reports a zero body length for HEAD, so read the header directly.
        let length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        debug!("HEAD {} -> {:?} bytes", url, length);
        Ok(length)
    }

    fn open(&self, tile: &TileId) -> Result<RemoteBody, TransferError> {
        let url = self.locator(tile);
        let response = self.client.get(&url).send()?;

        if !response.status().is_success() {
            return Err(classify_status(response.status(), &url));
        }

        let content_length = response.content_length();
        debug!("GET {} -> {:?} bytes", url, content_length);
        Ok(RemoteBody::new(content_length, response))
    }

    fn locator(&self, tile: &TileId) -> String {
        tile.resource_locator(&self.base_url)
    }
}
