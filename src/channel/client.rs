use anyhow::{Context, Result};
use async_nats::Client;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::messages::{ChunkAck, SessionSignal, TranscriptUpdate, VideoChunkMessage};
use super::DuplexChannel;

/// NATS-backed duplex channel.
///
/// Subject layout:
/// - `interview.session.start` / `interview.session.end` — lifecycle signals
/// - `interview.audio.{response_id}` — raw audio frames, fire-and-forget
/// - `interview.video.chunk.{response_id}` — request/reply chunk saves
/// - `interview.transcript.{response_id}` — server-published transcripts
pub struct NatsChannel {
    client: Client,
}

impl NatsChannel {
    /// Connect to the NATS server.
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    async fn publish_signal(&self, subject: &str, signal: &SessionSignal) -> Result<()> {
        let payload = serde_json::to_vec(signal)?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {subject}"))?;
        // Flush so lifecycle signals are not sitting in the write buffer
        // when the process tears down right after.
        self.client.flush().await.context("Failed to flush NATS")?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DuplexChannel for NatsChannel {
    fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    async fn announce_session(&self, interview_id: &str, response_id: &str) -> Result<()> {
        let signal = SessionSignal {
            interview_id: Some(interview_id.to_string()),
            response_id: response_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        self.publish_signal("interview.session.start", &signal).await?;
        info!(
            "Announced session start (interview={}, response={})",
            interview_id, response_id
        );
        Ok(())
    }

    async fn send_audio_frame(&self, response_id: &str, frame: &[u8]) -> Result<()> {
        let subject = format!("interview.audio.{response_id}");
        self.client
            .publish(subject, frame.to_vec().into())
            .await
            .context("Failed to publish audio frame")?;
        Ok(())
    }

    async fn save_video_chunk(
        &self,
        response_id: &str,
        sequence: u64,
        chunk_b64: &str,
        file_extension: &str,
    ) -> Result<ChunkAck> {
        let subject = format!("interview.video.chunk.{response_id}");
        let message = VideoChunkMessage {
            response_id: response_id.to_string(),
            chunk: chunk_b64.to_string(),
            file_extension: file_extension.to_string(),
            sequence,
        };
        let payload = serde_json::to_vec(&message)?;

        let reply = self
            .client
            .request(subject, payload.into())
            .await
            .context("Chunk save request failed")?;

        let ack: ChunkAck =
            serde_json::from_slice(&reply.payload).context("Malformed chunk acknowledgement")?;

        debug!(
            "Chunk ack received (ok={}, bytes={})",
            ack.ok,
            chunk_b64.len()
        );

        Ok(ack)
    }

    async fn subscribe_transcripts(
        &self,
        response_id: &str,
    ) -> Result<mpsc::Receiver<TranscriptUpdate>> {
        use futures::stream::StreamExt;

        let subject = format!("interview.transcript.{response_id}");
        info!("Subscribing to transcripts on {}", subject);

        let mut subscriber = self
            .client
            .subscribe(subject)
            .await
            .context("Failed to subscribe to transcripts")?;

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            while let Some(msg) = subscriber.next().await {
                match serde_json::from_slice::<TranscriptUpdate>(&msg.payload) {
                    Ok(update) => {
                        if tx.send(update).await.is_err() {
                            break; // receiver dropped, session is done with us
                        }
                    }
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                    }
                }
            }
            debug!("Transcript subscription closed");
        });

        Ok(rx)
    }

    async fn end_session(&self, response_id: &str) -> Result<()> {
        let signal = SessionSignal {
            interview_id: None,
            response_id: response_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        self.publish_signal("interview.session.end", &signal).await?;
        info!("Announced session end (response={})", response_id);
        Ok(())
    }
}
