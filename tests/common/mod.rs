// Shared test doubles: an in-memory duplex channel, a scripted interview
// backend, and a scriptable screen backend. Tests drive timing and
// failure injection through these instead of live NATS/HTTP.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use base64::Engine;
use interview_client::api::{
    CheatingAlert, EndInterviewSummary, InterviewBackend, QuestionFetch, ResponseSummary,
    StartInterviewRequest, StartInterviewResponse, SubmitAnswerRequest, SubmitAnswerResponse,
};
use interview_client::capture::{
    CaptureBackend, DisplayDescriptor, DisplaySurface, MediaChunk, ScreenBackend, TrackInfo,
    TrackKind, TrackState,
};
use interview_client::channel::{ChunkAck, DuplexChannel, TranscriptUpdate};
use tokio::sync::{mpsc, watch};

// ---------------------------------------------------------------------
// MockChannel
// ---------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SavedChunk {
    pub response_id: String,
    pub sequence: u64,
    pub data: Vec<u8>,
    pub file_extension: String,
}

/// In-memory duplex channel. Records everything sent; acknowledgement
/// behavior is scripted per call.
pub struct MockChannel {
    connected: AtomicBool,
    /// Delay applied before every chunk acknowledgement.
    pub ack_delay: Mutex<Option<Duration>>,
    /// Pre-scripted acks consumed in order; when empty, chunks are
    /// accepted.
    pub ack_script: Mutex<VecDeque<ChunkAck>>,
    pub saved_chunks: Mutex<Vec<SavedChunk>>,
    pub audio_frames: Mutex<Vec<Vec<u8>>>,
    pub announced: AtomicBool,
    pub ended: AtomicBool,
    transcript_tx: Mutex<Option<mpsc::Sender<TranscriptUpdate>>>,
}

impl MockChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            ack_delay: Mutex::new(None),
            ack_script: Mutex::new(VecDeque::new()),
            saved_chunks: Mutex::new(Vec::new()),
            audio_frames: Mutex::new(Vec::new()),
            announced: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            transcript_tx: Mutex::new(None),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn script_ack(&self, ack: ChunkAck) {
        self.ack_script.lock().unwrap().push_back(ack);
    }

    pub fn set_ack_delay(&self, delay: Duration) {
        *self.ack_delay.lock().unwrap() = Some(delay);
    }

    pub fn chunk_count(&self) -> usize {
        self.saved_chunks.lock().unwrap().len()
    }

    pub fn chunk_sequences(&self) -> Vec<u64> {
        self.saved_chunks
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.sequence)
            .collect()
    }

    /// Push a transcript update to an active subscriber.
    pub async fn push_transcript(&self, text: &str, is_final: bool) {
        let tx = self.transcript_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx
                .send(TranscriptUpdate {
                    text: text.to_string(),
                    is_final,
                })
                .await;
        }
    }
}

#[async_trait::async_trait]
impl DuplexChannel for MockChannel {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn announce_session(&self, _interview_id: &str, _response_id: &str) -> Result<()> {
        self.announced.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send_audio_frame(&self, _response_id: &str, frame: &[u8]) -> Result<()> {
        self.audio_frames.lock().unwrap().push(frame.to_vec());
        Ok(())
    }

    async fn save_video_chunk(
        &self,
        response_id: &str,
        sequence: u64,
        chunk_b64: &str,
        file_extension: &str,
    ) -> Result<ChunkAck> {
        let delay = *self.ack_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let data = base64::engine::general_purpose::STANDARD
            .decode(chunk_b64)
            .expect("chunk payload must be valid base64");

        self.saved_chunks.lock().unwrap().push(SavedChunk {
            response_id: response_id.to_string(),
            sequence,
            data,
            file_extension: file_extension.to_string(),
        });

        let scripted = self.ack_script.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(ChunkAck {
            ok: true,
            error: None,
        }))
    }

    async fn subscribe_transcripts(
        &self,
        _response_id: &str,
    ) -> Result<mpsc::Receiver<TranscriptUpdate>> {
        let (tx, rx) = mpsc::channel(64);
        *self.transcript_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn end_session(&self, _response_id: &str) -> Result<()> {
        self.ended.store(true, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// MockApi
// ---------------------------------------------------------------------

/// Scripted interview backend. Question fetches and submissions consume
/// pre-loaded scripts in order.
pub struct MockApi {
    pub duration_minutes: Mutex<Option<u64>>,
    pub question_script: Mutex<VecDeque<QuestionFetch>>,
    pub submit_script: Mutex<VecDeque<Result<SubmitAnswerResponse>>>,
    pub submissions: Mutex<Vec<SubmitAnswerRequest>>,
    pub alerts: Mutex<Vec<CheatingAlert>>,
    pub images: Mutex<Vec<Vec<u8>>>,
    pub end_calls: AtomicU64,
    pub finalize_calls: AtomicU64,
    pub fail_start: AtomicBool,
    pub fail_end: AtomicBool,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            duration_minutes: Mutex::new(None),
            question_script: Mutex::new(VecDeque::new()),
            submit_script: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
            end_calls: AtomicU64::new(0),
            finalize_calls: AtomicU64::new(0),
            fail_start: AtomicBool::new(false),
            fail_end: AtomicBool::new(false),
        })
    }

    pub fn set_duration_minutes(&self, minutes: u64) {
        *self.duration_minutes.lock().unwrap() = Some(minutes);
    }

    pub fn script_question(&self, text: &str, index: u32, total: u32) {
        self.question_script
            .lock()
            .unwrap()
            .push_back(QuestionFetch {
                question: Some(interview_client::api::Question {
                    text: text.to_string(),
                    index,
                    total,
                }),
                complete: false,
                tts_audio_base64: None,
            });
    }

    pub fn script_complete_fetch(&self) {
        self.question_script
            .lock()
            .unwrap()
            .push_back(QuestionFetch {
                question: None,
                complete: true,
                tts_audio_base64: None,
            });
    }

    pub fn script_submit(&self, complete: bool) {
        self.submit_script
            .lock()
            .unwrap()
            .push_back(Ok(SubmitAnswerResponse {
                complete,
                question_number: None,
                total_questions: None,
                questions_answered: None,
                analysis: None,
                final_analysis: None,
            }));
    }

    pub fn script_submit_error(&self, message: &str) {
        self.submit_script
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!("{message}")));
    }

    pub fn alert_types(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.alert_type.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl InterviewBackend for MockApi {
    async fn start_interview(
        &self,
        _req: &StartInterviewRequest,
    ) -> Result<StartInterviewResponse> {
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("interview not found");
        }
        Ok(StartInterviewResponse {
            response_id: "resp-1".to_string(),
            interview_id: Some("int-1".to_string()),
            session_id: None,
            session_token: Some("token-1".to_string()),
            mode: Some("standard".to_string()),
            duration_minutes: *self.duration_minutes.lock().unwrap(),
            start_time: None,
            current_question: None,
            tts_audio_base64: None,
        })
    }

    async fn current_question(&self, _response_id: &str) -> Result<QuestionFetch> {
        self.question_script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted question left"))
    }

    async fn submit_answer(&self, req: &SubmitAnswerRequest) -> Result<SubmitAnswerResponse> {
        self.submissions.lock().unwrap().push(req.clone());
        self.submit_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted submission left")))
    }

    async fn end_interview(&self, _response_id: &str) -> Result<EndInterviewSummary> {
        self.end_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_end.load(Ordering::SeqCst) {
            anyhow::bail!("backend unavailable");
        }
        Ok(EndInterviewSummary::default())
    }

    async fn response_summary(&self, _response_id: &str) -> Result<ResponseSummary> {
        Ok(ResponseSummary::default())
    }

    async fn record_alert(&self, alert: &CheatingAlert) -> Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }

    async fn upload_candidate_image(&self, _response_id: &str, image: Vec<u8>) -> Result<()> {
        self.images.lock().unwrap().push(image);
        Ok(())
    }

    async fn finalize_recording(&self, _response_id: &str) -> Result<()> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------
// ScriptedScreenBackend
// ---------------------------------------------------------------------

/// Screen backend whose chunk stream and track liveness are driven by the
/// test through [`ScreenHandle`].
pub struct ScriptedScreenBackend {
    descriptor: DisplayDescriptor,
    chunk_rx: Option<mpsc::Receiver<MediaChunk>>,
    /// Shared with the test handle; `stop` drops the sender so the chunk
    /// stream closes the way a real recorder's does.
    chunk_tx: Arc<Mutex<Option<mpsc::Sender<MediaChunk>>>>,
    track_rx: watch::Receiver<TrackState>,
    capturing: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
    flushed: Arc<AtomicBool>,
}

/// Test-side controls for a [`ScriptedScreenBackend`].
pub struct ScreenHandle {
    chunk_tx: Arc<Mutex<Option<mpsc::Sender<MediaChunk>>>>,
    pub track_tx: watch::Sender<TrackState>,
    pub stopped: Arc<AtomicBool>,
    pub flushed: Arc<AtomicBool>,
}

impl ScreenHandle {
    pub async fn send_chunk(&self, data: Vec<u8>, timestamp_ms: u64) {
        let tx = self
            .chunk_tx
            .lock()
            .unwrap()
            .clone()
            .expect("backend already stopped");
        tx.send(MediaChunk { data, timestamp_ms })
            .await
            .expect("pipeline dropped the chunk stream");
    }

    pub fn end_track(&self) {
        let _ = self.track_tx.send(TrackState::Ended);
    }
}

pub fn scripted_screen(surface: DisplaySurface) -> (ScriptedScreenBackend, ScreenHandle) {
    let (chunk_tx, chunk_rx) = mpsc::channel(64);
    let chunk_tx = Arc::new(Mutex::new(Some(chunk_tx)));
    let (track_tx, track_rx) = watch::channel(TrackState::Live);
    let stopped = Arc::new(AtomicBool::new(false));
    let flushed = Arc::new(AtomicBool::new(false));

    let descriptor = DisplayDescriptor {
        surface,
        video_track: TrackInfo {
            id: "scripted-video".to_string(),
            kind: TrackKind::Video,
            label: "scripted screen".to_string(),
        },
        audio_tracks: vec![TrackInfo {
            id: "scripted-mic".to_string(),
            kind: TrackKind::Microphone,
            label: "scripted microphone".to_string(),
        }],
    };

    let backend = ScriptedScreenBackend {
        descriptor,
        chunk_rx: Some(chunk_rx),
        chunk_tx: Arc::clone(&chunk_tx),
        track_rx,
        capturing: Arc::new(AtomicBool::new(false)),
        stopped: Arc::clone(&stopped),
        flushed: Arc::clone(&flushed),
    };
    let handle = ScreenHandle {
        chunk_tx,
        track_tx,
        stopped,
        flushed,
    };
    (backend, handle)
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedScreenBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<MediaChunk>> {
        self.capturing.store(true, Ordering::SeqCst);
        self.chunk_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("backend already started"))
    }

    async fn flush(&mut self) -> Result<()> {
        self.flushed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        // Close the chunk stream so the pipeline's drain completes.
        self.chunk_tx.lock().unwrap().take();
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "scripted-screen"
    }
}

#[async_trait::async_trait]
impl ScreenBackend for ScriptedScreenBackend {
    fn descriptor(&self) -> &DisplayDescriptor {
        &self.descriptor
    }

    fn track_state(&self) -> watch::Receiver<TrackState> {
        self.track_rx.clone()
    }
}

// ---------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------

/// Timing knobs shrunk so tests settle in milliseconds.
pub fn fast_upload_timing() -> interview_client::uploader::UploadTiming {
    interview_client::uploader::UploadTiming {
        ack_timeout: Duration::from_millis(100),
        reconnect_wait: Duration::from_millis(100),
        reconnect_poll: Duration::from_millis(10),
    }
}

pub fn fast_screen_timing() -> interview_client::capture::ScreenTiming {
    interview_client::capture::ScreenTiming {
        flush_wait: Duration::from_millis(10),
        stop_grace: Duration::from_millis(10),
        watchdog_interval: Duration::from_millis(50),
        inactivity_threshold: Duration::from_millis(200),
    }
}

/// Write a short mono 16 kHz WAV for the file capture backends.
pub fn write_test_wav(path: &std::path::Path, seconds: f32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let total = (16_000.0 * seconds) as usize;
    for i in 0..total {
        let sample = ((i as f32 * 0.05).sin() * 8000.0) as i16;
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}
