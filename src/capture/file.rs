//! File-backed capture backends
//!
//! Replay recorded media as if it were a live device: a WAV file becomes
//! a paced stream of PCM audio frames, an arbitrary media file becomes a
//! paced stream of fixed-interval chunks. Used by the CLI for local runs
//! and by tests that need deterministic input.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hound::WavReader;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use super::backend::{
    CaptureBackend, DisplayDescriptor, DisplaySurface, MediaChunk, ScreenBackend, TrackInfo,
    TrackKind, TrackState,
};

/// Streams a 16-bit WAV file as interleaved little-endian PCM frames of a
/// fixed duration, paced in real time.
pub struct FileAudioBackend {
    path: PathBuf,
    frame_duration: Duration,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileAudioBackend {
    pub fn new(path: impl AsRef<Path>, frame_duration: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            frame_duration,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileAudioBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<MediaChunk>> {
        let reader = WavReader::open(&self.path)
            .with_context(|| format!("Failed to open WAV file: {}", self.path.display()))?;
        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        info!(
            "Streaming {} ({}Hz, {}ch, {} samples) as {}ms frames",
            self.path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len(),
            self.frame_duration.as_millis()
        );

        let samples_per_frame =
            (spec.sample_rate as u128 * spec.channels as u128 * self.frame_duration.as_millis()
                / 1000) as usize;
        let samples_per_frame = samples_per_frame.max(1);

        let (tx, rx) = mpsc::channel(16);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);
        let frame_duration = self.frame_duration;

        self.task = Some(tokio::spawn(async move {
            let mut timestamp_ms = 0u64;
            for frame in samples.chunks(samples_per_frame) {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                tokio::time::sleep(frame_duration).await;

                let data: Vec<u8> = frame.iter().flat_map(|s| s.to_le_bytes()).collect();
                let chunk = MediaChunk { data, timestamp_ms };
                timestamp_ms += frame_duration.as_millis() as u64;

                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            capturing.store(false, Ordering::SeqCst);
        }));

        Ok(rx)
    }

    async fn flush(&mut self) -> Result<()> {
        // Frames are emitted as they are read; nothing is buffered.
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file-audio"
    }
}

/// Streams an arbitrary media file as fixed-interval chunks, standing in
/// for a live screen recorder. Reports a `Monitor` surface with a
/// microphone audio track so the full validation path is exercised.
pub struct FileScreenBackend {
    path: PathBuf,
    chunk_interval: Duration,
    chunk_bytes: usize,
    descriptor: DisplayDescriptor,
    track_state: watch::Sender<TrackState>,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl FileScreenBackend {
    pub fn new(path: impl AsRef<Path>, chunk_interval: Duration, chunk_bytes: usize) -> Self {
        let descriptor = DisplayDescriptor {
            surface: DisplaySurface::Monitor,
            video_track: TrackInfo {
                id: "file-video-0".to_string(),
                kind: TrackKind::Video,
                label: "file playback".to_string(),
            },
            audio_tracks: vec![TrackInfo {
                id: "file-mic-0".to_string(),
                kind: TrackKind::Microphone,
                label: "file microphone".to_string(),
            }],
        };
        let (track_state, _) = watch::channel(TrackState::Live);

        Self {
            path: path.as_ref().to_path_buf(),
            chunk_interval,
            chunk_bytes,
            descriptor,
            track_state,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileScreenBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<MediaChunk>> {
        let data = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read media file: {}", self.path.display()))?;

        info!(
            "Streaming {} ({} bytes) as {}-byte chunks every {:?}",
            self.path.display(),
            data.len(),
            self.chunk_bytes,
            self.chunk_interval
        );

        let (tx, rx) = mpsc::channel(4);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);
        let interval = self.chunk_interval;
        let chunk_bytes = self.chunk_bytes.max(1);
        let track_state = self.track_state.clone();

        self.task = Some(tokio::spawn(async move {
            let mut timestamp_ms = 0u64;
            for piece in data.chunks(chunk_bytes) {
                if !capturing.load(Ordering::SeqCst) {
                    break;
                }
                tokio::time::sleep(interval).await;

                let chunk = MediaChunk {
                    data: piece.to_vec(),
                    timestamp_ms,
                };
                timestamp_ms += interval.as_millis() as u64;

                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            capturing.store(false, Ordering::SeqCst);
            // The file ran out: the track is gone, same as a revoked share.
            let _ = track_state.send(TrackState::Ended);
        }));

        Ok(rx)
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file-screen"
    }
}

#[async_trait::async_trait]
impl ScreenBackend for FileScreenBackend {
    fn descriptor(&self) -> &DisplayDescriptor {
        &self.descriptor
    }

    fn track_state(&self) -> watch::Receiver<TrackState> {
        self.track_state.subscribe()
    }
}
