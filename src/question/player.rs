use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Playback lifecycle of the current question's audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    NotLoaded,
    Loading,
    Playing,
    /// Loaded and at rest (finished or not yet started).
    Idle,
    Errored,
}

/// Decoded synthesized audio, interleaved 16-bit PCM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Output seam for decoded audio. The CLI writes a WAV file per question;
/// tests capture samples; a desktop embedding would hand them to a device.
pub trait PlaybackSink: Send {
    fn play(&mut self, audio: &DecodedAudio) -> Result<()>;
}

/// Discards audio. Used when no audible output is wanted.
pub struct NullSink;

impl PlaybackSink for NullSink {
    fn play(&mut self, _audio: &DecodedAudio) -> Result<()> {
        Ok(())
    }
}

/// Writes each played clip to a numbered WAV file in a directory.
pub struct WavFileSink {
    dir: PathBuf,
    clip_index: usize,
}

impl WavFileSink {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref()).context("Failed to create playback directory")?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            clip_index: 0,
        })
    }
}

impl PlaybackSink for WavFileSink {
    fn play(&mut self, audio: &DecodedAudio) -> Result<()> {
        let path = self.dir.join(format!("question-{:03}.wav", self.clip_index));
        self.clip_index += 1;

        let spec = hound::WavSpec {
            channels: audio.channels.max(1),
            sample_rate: audio.sample_rate.max(1),
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for &sample in &audio.samples {
            writer.write_sample(sample).context("Failed to write sample")?;
        }
        writer.finalize().context("Failed to finalize WAV")?;

        info!("Question audio written to {}", path.display());
        Ok(())
    }
}

/// Decode a synthesized-audio payload (any container symphonia knows) to
/// interleaved i16 PCM.
pub fn decode_audio(data: Vec<u8>) -> Result<DecodedAudio> {
    let mss = MediaSourceStream::new(Box::new(std::io::Cursor::new(data)), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("Unrecognized audio container")?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .context("No default audio track")?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Unsupported audio codec")?;

    let mut samples = Vec::new();
    let mut sample_buf: Option<SampleBuffer<i16>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e).context("Error reading audio packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Skipping undecodable packet: {}", e);
                continue;
            }
            Err(e) => return Err(e).context("Audio decode failed"),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            sample_rate = spec.rate;
            channels = spec.channels.count() as u16;
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }
        if let Some(buf) = &mut sample_buf {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
        channels,
    })
}

/// Decodes and plays the server-supplied question audio.
pub struct QuestionPlayer {
    sink: Arc<Mutex<Box<dyn PlaybackSink>>>,
    state_tx: watch::Sender<PlaybackState>,
    state_rx: watch::Receiver<PlaybackState>,
    current: Arc<std::sync::Mutex<Option<Arc<DecodedAudio>>>>,
    play_task: Mutex<Option<JoinHandle<()>>>,
}

impl QuestionPlayer {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        let (state_tx, state_rx) = watch::channel(PlaybackState::NotLoaded);
        Self {
            sink: Arc::new(Mutex::new(sink)),
            state_tx,
            state_rx,
            current: Arc::new(std::sync::Mutex::new(None)),
            play_task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> PlaybackState {
        *self.state_rx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_rx.clone()
    }

    /// Load a base64 TTS payload and play it once automatically.
    ///
    /// Any previous clip is stopped and released first so playback never
    /// overlaps. A decode failure marks the player `Errored` and is
    /// returned; callers treat it as non-fatal.
    pub async fn load_and_play(&self, tts_audio_base64: &str) -> Result<()> {
        self.stop_current().await;
        let _ = self.state_tx.send(PlaybackState::Loading);

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(crate::uploader::normalize_base64(tts_audio_base64))
            .context("Invalid base64 TTS payload");

        let decoded = match bytes.and_then(|b| decode_audio(b)) {
            Ok(audio) => Arc::new(audio),
            Err(e) => {
                let _ = self.state_tx.send(PlaybackState::Errored);
                return Err(e);
            }
        };

        info!(
            "Question audio loaded: {:.1}s, {}Hz, {}ch",
            decoded.duration_seconds(),
            decoded.sample_rate,
            decoded.channels
        );

        *self.current.lock().expect("player state poisoned") = Some(Arc::clone(&decoded));
        self.spawn_playback(decoded).await;
        Ok(())
    }

    /// Manual replay: restart the current clip from the beginning. A no-op
    /// while already playing or when nothing is loaded.
    pub async fn replay(&self) {
        if self.state() == PlaybackState::Playing {
            return;
        }
        let audio = self.current.lock().expect("player state poisoned").clone();
        if let Some(audio) = audio {
            self.spawn_playback(audio).await;
        }
    }

    /// Stop and release the current clip.
    pub async fn stop_current(&self) {
        if let Some(task) = self.play_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        *self.current.lock().expect("player state poisoned") = None;
        let _ = self.state_tx.send(PlaybackState::NotLoaded);
    }

    async fn spawn_playback(&self, audio: Arc<DecodedAudio>) {
        // Only one playback task at a time.
        if let Some(task) = self.play_task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }

        let _ = self.state_tx.send(PlaybackState::Playing);
        let sink = Arc::clone(&self.sink);
        let state_tx = self.state_tx.clone();

        let task = tokio::spawn(async move {
            // Sink I/O is synchronous; keep it off the async workers.
            let result = tokio::task::spawn_blocking(move || {
                let mut guard = sink.blocking_lock();
                guard.play(&audio)
            })
            .await
            .unwrap_or_else(|e| Err(anyhow::anyhow!("playback task panicked: {e}")));
            match result {
                Ok(()) => {
                    let _ = state_tx.send(PlaybackState::Idle);
                }
                Err(e) => {
                    warn!("Playback failed: {}", e);
                    let _ = state_tx.send(PlaybackState::Errored);
                }
            }
        });

        *self.play_task.lock().await = Some(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn decode_reproduces_pcm_wav_exactly() {
        let samples: Vec<i16> = (0..1600).map(|i| (i % 321) as i16 - 160).collect();
        let bytes = wav_bytes(&samples, 16000, 1);

        let decoded = decode_audio(bytes).unwrap();
        assert_eq!(decoded.sample_rate, 16000);
        assert_eq!(decoded.channels, 1);
        assert_eq!(decoded.samples, samples);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_audio(vec![0u8; 64]).is_err());
    }

    #[test]
    fn duration_is_computed_from_interleaved_samples() {
        let audio = DecodedAudio {
            samples: vec![0; 32000],
            sample_rate: 16000,
            channels: 2,
        };
        assert!((audio.duration_seconds() - 1.0).abs() < f64::EPSILON);
    }
}
