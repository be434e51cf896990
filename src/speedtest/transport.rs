use super::{Direction, MeasureError};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use rand::{rngs::OsRng, RngCore};
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE, PRAGMA};
use reqwest::{Body, Client};
use std::time::Duration;
use tokio::sync::mpsc;

const PING_URL: &str = "https://speed.cloudflare.com/__down?bytes=0";
const DOWNLOAD_URL: &str = "https://speed.cloudflare.com/__down";
const UPLOAD_URL: &str = "https://speed.cloudflare.com/__up";

// Upload bodies are streamed in pieces of this size so send progress can be observed.
const UPLOAD_PIECE: usize = 64 * 1024;

/// Moves bytes to and from the measurement endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// One bodiless round trip. Returns the HTTP status code.
    async fn ping(&self) -> Result<u16, MeasureError>;

    /// Moves one chunk of `chunk_size` bytes in `direction`. The running byte
    /// count of this chunk is pushed to `moved` as it grows. Returns the bytes
    /// moved once the chunk completes.
    async fn transfer_chunk(
        &self,
        direction: Direction,
        chunk_size: usize,
        moved: mpsc::UnboundedSender<u64>,
    ) -> Result<u64, MeasureError>;
}

/// Transport against Cloudflare's public speed test endpoints.
pub struct HttpTransport {
    ping: Client,
    transfer: Client,
}

impl HttpTransport {
    pub fn new(ping_timeout: Duration) -> Result<Self, MeasureError> {
        let ping = Client::builder()
            .default_headers(no_cache_headers())
            .timeout(ping_timeout)
            .build()?;
        let transfer = Client::builder()
            .default_headers(no_cache_headers())
            .build()?;

        Ok(Self { ping, transfer })
    }

    async fn download_chunk(
        &self,
        chunk_size: usize,
        moved: mpsc::UnboundedSender<u64>,
    ) -> Result<u64, MeasureError> {
        let url = format!("{}?bytes={}", DOWNLOAD_URL, chunk_size);
        let response = self.transfer.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(MeasureError::Transport(format!(
                "download failed with status {}",
                response.status()
            )));
        }

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        while let Some(piece) = stream.next().await {
            received += piece?.len() as u64;
            let _ = moved.send(received);
        }

        Ok(received)
    }

    async fn upload_chunk(
        &self,
        chunk_size: usize,
        moved: mpsc::UnboundedSender<u64>,
    ) -> Result<u64, MeasureError> {
        let payload = random_payload(chunk_size);
        let pieces: Vec<Bytes> = (0..payload.len())
            .step_by(UPLOAD_PIECE)
            .map(|start| payload.slice(start..(start + UPLOAD_PIECE).min(payload.len())))
            .collect();

        let mut sent: u64 = 0;
        let body = futures::stream::iter(pieces).map(move |piece| {
            sent += piece.len() as u64;
            let _ = moved.send(sent);
            Ok::<_, std::io::Error>(piece)
        });

        let response = self
            .transfer
            .post(UPLOAD_URL)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, payload.len())
            .body(Body::wrap_stream(body))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MeasureError::Transport(format!(
                "upload failed with status {}",
                response.status()
            )));
        }

        Ok(payload.len() as u64)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn ping(&self) -> Result<u16, MeasureError> {
        let response = self.ping.head(PING_URL).send().await?;
        Ok(response.status().as_u16())
    }

    async fn transfer_chunk(
        &self,
        direction: Direction,
        chunk_size: usize,
        moved: mpsc::UnboundedSender<u64>,
    ) -> Result<u64, MeasureError> {
        match direction {
            Direction::Download => self.download_chunk(chunk_size, moved).await,
            Direction::Upload => self.upload_chunk(chunk_size, moved).await,
        }
    }
}

fn no_cache_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    headers
}

/// Fresh incompressible payload from the OS random source.
fn random_payload(len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    OsRng.fill_bytes(&mut data);
    Bytes::from(data)
}
