//! Duplex channel between the candidate client and the interview backend
//!
//! This module provides the persistent two-way transport used during a
//! session:
//! - Audio frames are published fire-and-forget for live transcription
//! - Video chunks use request/reply and must be acknowledged before they
//!   count as durable
//! - Transcript updates (partial and final) arrive on a subscription
//!
//! The channel is a single shared resource: any pipeline may emit on it,
//! but only the session orchestrator owns its connect/disconnect lifecycle.

mod client;
mod messages;

pub use client::NatsChannel;
pub use messages::{ChunkAck, SessionSignal, TranscriptUpdate, VideoChunkMessage};

use anyhow::Result;
use tokio::sync::mpsc;

/// Transport seam for the duplex channel.
///
/// Production uses [`NatsChannel`]; tests substitute an in-memory
/// implementation to script acknowledgement timing and disconnects.
#[async_trait::async_trait]
pub trait DuplexChannel: Send + Sync {
    /// Whether the underlying connection is currently usable.
    fn is_connected(&self) -> bool;

    /// Announce a new session so the server can arm its transcription stream.
    async fn announce_session(&self, interview_id: &str, response_id: &str) -> Result<()>;

    /// Publish one raw audio frame. No acknowledgement is awaited; live
    /// transcription input is best-effort.
    async fn send_audio_frame(&self, response_id: &str, frame: &[u8]) -> Result<()>;

    /// Send one encoded video chunk and wait for the server's verdict.
    ///
    /// The acknowledgement is correlated to this call, not to arrival
    /// order; `sequence` tags the chunk for server-side ordering.
    /// Transport failures are `Err`; a reply with `ok: false` is a server
    /// rejection and comes back as a normal [`ChunkAck`].
    async fn save_video_chunk(
        &self,
        response_id: &str,
        sequence: u64,
        chunk_b64: &str,
        file_extension: &str,
    ) -> Result<ChunkAck>;

    /// Subscribe to transcript updates for this session.
    async fn subscribe_transcripts(
        &self,
        response_id: &str,
    ) -> Result<mpsc::Receiver<TranscriptUpdate>>;

    /// Signal the end of the session to the server.
    async fn end_session(&self, response_id: &str) -> Result<()>;
}
