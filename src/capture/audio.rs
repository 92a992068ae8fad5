//! Microphone pipeline
//!
//! Streams short PCM frames over the duplex channel as raw binary frames.
//! No acknowledgement is awaited: audio is best-effort live transcription
//! input, not an artifact that must be durably saved, so a lost frame is
//! logged and skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::CaptureBackend;
use super::PipelineState;
use crate::channel::DuplexChannel;

pub struct AudioPipeline {
    channel: Arc<dyn DuplexChannel>,
    state_tx: watch::Sender<PipelineState>,
    state_rx: watch::Receiver<PipelineState>,
    cancelled: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
    backend: Mutex<Option<Box<dyn CaptureBackend>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AudioPipeline {
    pub fn new(channel: Arc<dyn DuplexChannel>) -> Self {
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        Self {
            channel,
            state_tx,
            state_rx,
            cancelled: Arc::new(AtomicBool::new(false)),
            sequence: Arc::new(AtomicU64::new(0)),
            backend: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state_rx.clone()
    }

    /// Frames sent so far. Sequence numbers are assigned from 0 and only
    /// ever increase, across start/stop cycles within one session.
    pub fn frames_sent(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Start forwarding microphone frames for the given session.
    pub async fn start(
        &self,
        mut backend: Box<dyn CaptureBackend>,
        response_id: &str,
    ) -> Result<()> {
        match self.state() {
            PipelineState::Idle | PipelineState::Stopped => {}
            state => bail!("audio pipeline cannot start from {state:?}"),
        }

        let mut rx = backend.start().await?;
        info!("Audio pipeline started (backend={})", backend.name());

        self.cancelled.store(false, Ordering::SeqCst);
        let _ = self.state_tx.send(PipelineState::Recording);

        let channel = Arc::clone(&self.channel);
        let cancelled = Arc::clone(&self.cancelled);
        let sequence = Arc::clone(&self.sequence);
        let state_tx = self.state_tx.clone();
        let response_id = response_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if cancelled.load(Ordering::SeqCst) {
                    break;
                }

                let seq = sequence.fetch_add(1, Ordering::SeqCst);

                // Fire-and-forget: a dropped frame degrades the live
                // transcript, nothing else.
                if let Err(e) = channel.send_audio_frame(&response_id, &frame.data).await {
                    warn!("Audio frame {} dropped: {}", seq, e);
                }
            }

            if !cancelled.load(Ordering::SeqCst) {
                // Source dried up on its own (device unplugged, file ended).
                let _ = state_tx.send(PipelineState::Stopped);
                info!("Audio pipeline source ended");
            }
        });

        *self.backend.lock().await = Some(backend);
        *self.task.lock().await = Some(task);

        Ok(())
    }

    /// Stop forwarding and release the microphone.
    pub async fn stop(&self) -> Result<()> {
        if self.state() != PipelineState::Recording {
            return Ok(());
        }

        let _ = self.state_tx.send(PipelineState::Stopping);
        self.cancelled.store(true, Ordering::SeqCst);

        if let Some(mut backend) = self.backend.lock().await.take() {
            if let Err(e) = backend.stop().await {
                warn!("Audio backend stop failed: {}", e);
            }
        }

        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }

        let _ = self.state_tx.send(PipelineState::Stopped);
        info!(
            "Audio pipeline stopped ({} frames sent)",
            self.sequence.load(Ordering::SeqCst)
        );
        Ok(())
    }
}
