//! Chunk uploader
//!
//! Takes one bounded slice of recorded media, encodes it into a
//! transport-safe form, and sends it over the duplex channel, waiting for
//! a positive acknowledgement. Individual chunk loss is tolerated by the
//! pipelines: a failed upload is returned to the caller and logged, never
//! escalated into a session abort.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tracing::{debug, warn};

use crate::channel::DuplexChannel;

/// Timing knobs for a single chunk upload.
#[derive(Debug, Clone)]
pub struct UploadTiming {
    /// How long to wait for a matching acknowledgement.
    pub ack_timeout: Duration,
    /// How long to wait for the channel to reconnect before giving up
    /// on this chunk.
    pub reconnect_wait: Duration,
    /// Poll interval while waiting for reconnection.
    pub reconnect_poll: Duration,
}

impl Default for UploadTiming {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_secs(10),
            reconnect_wait: Duration::from_secs(5),
            reconnect_poll: Duration::from_millis(100),
        }
    }
}

/// Why a chunk upload did not complete.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("channel disconnected and did not reconnect within {0:?}")]
    Disconnected(Duration),
    #[error("no acknowledgement within {0:?}")]
    AckTimeout(Duration),
    #[error("server rejected chunk: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Serializes binary chunks for the duplex channel and awaits their
/// acknowledgement.
#[derive(Clone)]
pub struct ChunkUploader {
    channel: Arc<dyn DuplexChannel>,
    timing: UploadTiming,
}

impl ChunkUploader {
    pub fn new(channel: Arc<dyn DuplexChannel>) -> Self {
        Self {
            channel,
            timing: UploadTiming::default(),
        }
    }

    pub fn with_timing(channel: Arc<dyn DuplexChannel>, timing: UploadTiming) -> Self {
        Self { channel, timing }
    }

    /// Send one chunk and wait for its acknowledgement.
    ///
    /// The chunk only counts as durable on `Ok(())`. Any failure mode
    /// (disconnect, ack timeout, server rejection) comes back as an
    /// [`UploadError`]; the pipeline decides whether to retry or skip.
    pub async fn send_chunk(
        &self,
        data: &[u8],
        sequence: u64,
        response_id: &str,
        file_extension: &str,
    ) -> Result<(), UploadError> {
        let encoded = normalize_base64(&base64::engine::general_purpose::STANDARD.encode(data));

        self.wait_for_connection().await?;

        let save = self
            .channel
            .save_video_chunk(response_id, sequence, &encoded, file_extension);

        let ack = match tokio::time::timeout(self.timing.ack_timeout, save).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    "Chunk {} acknowledgement timed out after {:?}",
                    sequence, self.timing.ack_timeout
                );
                return Err(UploadError::AckTimeout(self.timing.ack_timeout));
            }
        };

        if !ack.ok {
            let reason = ack.error.unwrap_or_else(|| "unspecified error".to_string());
            warn!("Chunk {} rejected by server: {}", sequence, reason);
            return Err(UploadError::Rejected(reason));
        }

        debug!("Chunk {} acknowledged ({} bytes)", sequence, data.len());
        Ok(())
    }

    /// Poll until the channel reports connected, bounded by
    /// `reconnect_wait`. Yield-based; never blocks the runtime.
    async fn wait_for_connection(&self) -> Result<(), UploadError> {
        if self.channel.is_connected() {
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + self.timing.reconnect_wait;
        while tokio::time::Instant::now() < deadline {
            tokio::time::sleep(self.timing.reconnect_poll).await;
            if self.channel.is_connected() {
                return Ok(());
            }
        }

        warn!(
            "Channel still disconnected after {:?}, dropping chunk",
            self.timing.reconnect_wait
        );
        Err(UploadError::Disconnected(self.timing.reconnect_wait))
    }
}

/// Defensive normalization of a base64 payload before transmission.
///
/// Transports have been observed to corrupt whitespace and control
/// characters in large text frames: strip everything outside the base64
/// alphabet, then restore `=` padding to a multiple of 4.
pub fn normalize_base64(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/'))
        .collect();

    let pad = (4 - cleaned.len() % 4) % 4;
    for _ in 0..pad {
        cleaned.push('=');
    }
    cleaned
}
