//! Screen pipeline
//!
//! Owns the display stream for the whole session: validates the acquired
//! surface, uploads fixed-interval chunks with acknowledgement, watches
//! track liveness, and turns an unexpected share revocation into a sticky
//! `Failed` state that blocks answer submission until an explicit restart.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{DisplayDescriptor, DisplaySurface, ScreenBackend, TrackInfo, TrackKind, TrackState};
use super::PipelineState;
use crate::integrity::IntegrityEvent;
use crate::uploader::ChunkUploader;

/// Chunks smaller than this are suspicious for a screen recording and get
/// a diagnostic, but are still uploaded and counted.
pub const MIN_CHUNK_BYTES: usize = 1000;

/// Timing knobs for the screen pipeline.
#[derive(Debug, Clone)]
pub struct ScreenTiming {
    /// Wait after requesting a flush of buffered recorder data.
    pub flush_wait: Duration,
    /// Grace period after stop for the final chunk's upload to land.
    pub stop_grace: Duration,
    /// Liveness check interval while the pipeline is active.
    pub watchdog_interval: Duration,
    /// Continuous inactivity that triggers a non-fatal alert.
    pub inactivity_threshold: Duration,
}

impl Default for ScreenTiming {
    fn default() -> Self {
        Self {
            flush_wait: Duration::from_millis(500),
            stop_grace: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(5),
            inactivity_threshold: Duration::from_secs(30),
        }
    }
}

/// Screen acquisition and validation failures, kept distinct from hard
/// pipeline failures so the orchestrator can apply the soft-start policy.
#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("shared surface is {0:?}, entire screen required")]
    WrongSurface(DisplaySurface),
    #[error("screen pipeline cannot start from {0:?}")]
    InvalidState(PipelineState),
    #[error("screen capture failed: {0}")]
    Capture(#[from] anyhow::Error),
}

impl ScreenError {
    /// Validation-type failures are logged, not shown as blocking errors,
    /// during session initialization.
    pub fn is_validation(&self) -> bool {
        matches!(self, ScreenError::WrongSurface(_))
    }
}

/// Check that the acquired display stream represents the entire screen.
///
/// `Unknown` is accepted deliberately: when the platform cannot report
/// the surface kind we do not reject the share.
pub fn validate_surface(descriptor: &DisplayDescriptor) -> Result<(), ScreenError> {
    match descriptor.surface {
        DisplaySurface::Monitor | DisplaySurface::Unknown => Ok(()),
        other => Err(ScreenError::WrongSurface(other)),
    }
}

/// Pick the audio tracks to record alongside the screen: a separately
/// acquired microphone track is preferred over any system audio the
/// display stream carries, de-duplicated by track identity so voice is
/// captured exactly once.
pub fn select_audio_tracks(descriptor: &DisplayDescriptor) -> Vec<TrackInfo> {
    let mut selected: Vec<TrackInfo> = Vec::new();

    for track in &descriptor.audio_tracks {
        if track.kind == TrackKind::Microphone && !selected.iter().any(|t| t.id == track.id) {
            selected.push(track.clone());
        }
    }
    if selected.is_empty() {
        for track in &descriptor.audio_tracks {
            if track.kind == TrackKind::SystemAudio && !selected.iter().any(|t| t.id == track.id) {
                selected.push(track.clone());
            }
        }
    }

    selected
}

pub struct ScreenPipeline {
    uploader: ChunkUploader,
    timing: ScreenTiming,
    file_extension: String,
    state_tx: watch::Sender<PipelineState>,
    state_rx: watch::Receiver<PipelineState>,
    /// Once true the pipeline may not silently resume; only an explicit
    /// restart that re-acquires a stream clears it.
    track_ended: Arc<AtomicBool>,
    stopping: Arc<AtomicBool>,
    sequence: Arc<AtomicU64>,
    chunks_acked: Arc<AtomicU64>,
    chunks_failed: Arc<AtomicU64>,
    pending_uploads: Arc<AtomicUsize>,
    last_activity: Arc<StdMutex<tokio::time::Instant>>,
    alerts_tx: mpsc::Sender<IntegrityEvent>,
    backend: Mutex<Option<Box<dyn ScreenBackend>>>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
    watchdog_task: Mutex<Option<JoinHandle<()>>>,
}

impl ScreenPipeline {
    pub fn new(
        uploader: ChunkUploader,
        file_extension: String,
        alerts_tx: mpsc::Sender<IntegrityEvent>,
    ) -> Self {
        Self::with_timing(uploader, file_extension, alerts_tx, ScreenTiming::default())
    }

    pub fn with_timing(
        uploader: ChunkUploader,
        file_extension: String,
        alerts_tx: mpsc::Sender<IntegrityEvent>,
        timing: ScreenTiming,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        Self {
            uploader,
            timing,
            file_extension,
            state_tx,
            state_rx,
            track_ended: Arc::new(AtomicBool::new(false)),
            stopping: Arc::new(AtomicBool::new(false)),
            sequence: Arc::new(AtomicU64::new(0)),
            chunks_acked: Arc::new(AtomicU64::new(0)),
            chunks_failed: Arc::new(AtomicU64::new(0)),
            pending_uploads: Arc::new(AtomicUsize::new(0)),
            last_activity: Arc::new(StdMutex::new(tokio::time::Instant::now())),
            alerts_tx,
            backend: Mutex::new(None),
            forward_task: Mutex::new(None),
            watchdog_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PipelineState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PipelineState> {
        self.state_rx.clone()
    }

    /// While true, answer submission and recording toggles are rejected.
    pub fn is_blocked(&self) -> bool {
        self.state() == PipelineState::Failed
    }

    pub fn chunks_sent(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn chunks_acked(&self) -> u64 {
        self.chunks_acked.load(Ordering::SeqCst)
    }

    pub fn chunks_failed(&self) -> u64 {
        self.chunks_failed.load(Ordering::SeqCst)
    }

    pub fn pending_uploads(&self) -> usize {
        self.pending_uploads.load(Ordering::SeqCst)
    }

    /// Start capturing from an acquired display stream.
    ///
    /// `prevalidated` skips surface validation for streams that were
    /// checked upstream at permission-grant time.
    pub async fn start(
        &self,
        mut backend: Box<dyn ScreenBackend>,
        response_id: &str,
        prevalidated: bool,
    ) -> Result<(), ScreenError> {
        match self.state() {
            PipelineState::Idle | PipelineState::Stopped => {}
            state => return Err(ScreenError::InvalidState(state)),
        }

        let descriptor = backend.descriptor().clone();
        if prevalidated {
            debug!("Skipping surface validation for pre-granted stream");
        } else {
            validate_surface(&descriptor)?;
        }

        let audio_tracks = select_audio_tracks(&descriptor);
        if audio_tracks.is_empty() {
            // Warn only: the platform may simply not expose the track even
            // though sharing carries audio.
            warn!("Screen share exposes no audio track; recording video only");
        } else {
            info!(
                "Screen audio tracks selected: {:?}",
                audio_tracks.iter().map(|t| &t.label).collect::<Vec<_>>()
            );
        }

        let chunk_rx = backend.start().await.map_err(ScreenError::Capture)?;
        let track_rx = backend.track_state();

        info!(
            "Screen pipeline started (backend={}, surface={:?})",
            backend.name(),
            descriptor.surface
        );

        self.stopping.store(false, Ordering::SeqCst);
        self.track_ended.store(false, Ordering::SeqCst);
        *self.last_activity.lock().expect("activity clock poisoned") = tokio::time::Instant::now();
        let _ = self.state_tx.send(PipelineState::Recording);

        *self.backend.lock().await = Some(backend);
        self.spawn_forwarder(chunk_rx, track_rx.clone(), response_id.to_string())
            .await;
        self.spawn_watchdog(track_rx).await;

        Ok(())
    }

    /// Explicit restart after a failure: re-acquires via the supplied
    /// backend and clears the ended flag. The only way out of `Failed`.
    pub async fn restart(
        &self,
        backend: Box<dyn ScreenBackend>,
        response_id: &str,
    ) -> Result<(), ScreenError> {
        if self.state() == PipelineState::Failed {
            self.teardown_tasks().await;
            let _ = self.state_tx.send(PipelineState::Idle);
        }
        self.start(backend, response_id, false).await
    }

    /// Stop capture: request a flush of buffered data, wait for it, drain
    /// remaining uploads, then allow a grace period for the final chunk's
    /// acknowledgement before reporting stopped.
    pub async fn stop(&self) -> Result<()> {
        match self.state() {
            PipelineState::Recording => {}
            PipelineState::Failed => {
                // Already dead; just release whatever is left.
                self.teardown_tasks().await;
                return Ok(());
            }
            _ => return Ok(()),
        }

        let _ = self.state_tx.send(PipelineState::Stopping);
        self.stopping.store(true, Ordering::SeqCst);

        // Stop the liveness check first so it cannot raise alerts about
        // the shutdown itself.
        if let Some(task) = self.watchdog_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }

        if let Some(backend) = self.backend.lock().await.as_mut() {
            if let Err(e) = backend.flush().await {
                warn!("Screen flush request failed: {}", e);
            }
        }
        tokio::time::sleep(self.timing.flush_wait).await;

        if let Some(mut backend) = self.backend.lock().await.take() {
            if let Err(e) = backend.stop().await {
                warn!("Screen backend stop failed: {}", e);
            }
        }

        // The chunk channel is closed now; let the forwarder drain and
        // upload what was already buffered.
        if let Some(task) = self.forward_task.lock().await.take() {
            if let Err(e) = task.await {
                warn!("Screen forward task ended abnormally: {}", e);
            }
        }

        tokio::time::sleep(self.timing.stop_grace).await;

        let _ = self.state_tx.send(PipelineState::Stopped);
        info!(
            "Screen pipeline stopped ({} chunks sent, {} acked, {} failed)",
            self.chunks_sent(),
            self.chunks_acked(),
            self.chunks_failed()
        );
        Ok(())
    }

    async fn spawn_forwarder(
        &self,
        mut chunk_rx: mpsc::Receiver<super::backend::MediaChunk>,
        mut track_rx: watch::Receiver<TrackState>,
        response_id: String,
    ) {
        let uploader = self.uploader.clone();
        let file_extension = self.file_extension.clone();
        let sequence = Arc::clone(&self.sequence);
        let chunks_acked = Arc::clone(&self.chunks_acked);
        let chunks_failed = Arc::clone(&self.chunks_failed);
        let pending = Arc::clone(&self.pending_uploads);
        let last_activity = Arc::clone(&self.last_activity);
        let stopping = Arc::clone(&self.stopping);
        let track_ended = Arc::clone(&self.track_ended);
        let state_tx = self.state_tx.clone();
        let alerts_tx = self.alerts_tx.clone();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    chunk = chunk_rx.recv() => {
                        let Some(chunk) = chunk else { break };

                        *last_activity.lock().expect("activity clock poisoned") =
                            tokio::time::Instant::now();

                        if chunk.data.len() < MIN_CHUNK_BYTES {
                            // Suspiciously small for a screen recording;
                            // record the diagnostic but upload anyway.
                            warn!(
                                "Screen chunk below sanity floor: {} bytes at {}ms",
                                chunk.data.len(),
                                chunk.timestamp_ms
                            );
                        }

                        let seq = sequence.fetch_add(1, Ordering::SeqCst);

                        // Sequential by construction: one upload in flight,
                        // so acks cannot reorder relative to sends.
                        pending.fetch_add(1, Ordering::SeqCst);
                        let outcome = uploader
                            .send_chunk(&chunk.data, seq, &response_id, &file_extension)
                            .await;
                        pending.fetch_sub(1, Ordering::SeqCst);

                        match outcome {
                            Ok(()) => {
                                chunks_acked.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(e) => {
                                // Chunk loss is tolerated; recording continues.
                                chunks_failed.fetch_add(1, Ordering::SeqCst);
                                warn!("Screen chunk {} lost: {}", seq, e);
                            }
                        }
                    }
                    changed = track_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *track_rx.borrow() == TrackState::Ended
                            && !stopping.load(Ordering::SeqCst)
                        {
                            warn!("Screen track ended unexpectedly");
                            track_ended.store(true, Ordering::SeqCst);
                            let _ = state_tx.send(PipelineState::Failed);
                            let _ = alerts_tx.send(IntegrityEvent::ScreenShareEnded).await;
                            break;
                        }
                    }
                }
            }
        });

        *self.forward_task.lock().await = Some(task);
    }

    async fn spawn_watchdog(&self, track_rx: watch::Receiver<TrackState>) {
        let interval = self.timing.watchdog_interval;
        let threshold = self.timing.inactivity_threshold;
        let last_activity = Arc::clone(&self.last_activity);
        let stopping = Arc::clone(&self.stopping);
        let alerts_tx = self.alerts_tx.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // first tick is immediate

            let mut inactivity_alerted = false;
            let mut dead_track_alerted = false;

            loop {
                ticker.tick().await;
                if stopping.load(Ordering::SeqCst) {
                    break;
                }

                let idle = last_activity
                    .lock()
                    .expect("activity clock poisoned")
                    .elapsed();

                if idle >= threshold {
                    if !inactivity_alerted {
                        inactivity_alerted = true;
                        let _ = alerts_tx
                            .send(IntegrityEvent::ScreenInactive {
                                idle_ms: idle.as_millis() as u64,
                            })
                            .await;
                    }
                } else {
                    inactivity_alerted = false;
                }

                if *track_rx.borrow() == TrackState::Ended && !dead_track_alerted {
                    dead_track_alerted = true;
                    let _ = alerts_tx.send(IntegrityEvent::ScreenTrackDead).await;
                }
            }
        });

        *self.watchdog_task.lock().await = Some(task);
    }

    async fn teardown_tasks(&self) {
        if let Some(task) = self.watchdog_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(task) = self.forward_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        if let Some(mut backend) = self.backend.lock().await.take() {
            if let Err(e) = backend.stop().await {
                warn!("Screen backend release failed: {}", e);
            }
        }
    }
}
