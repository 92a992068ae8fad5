use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

use super::config::SessionConfig;
use super::state::{EndReason, Phase, SessionSnapshot, SessionState};
use crate::api::{
    EndInterviewSummary, InterviewBackend, ResponseSummary, StartInterviewRequest,
    SubmitAnswerRequest, SubmitAnswerResponse,
};
use crate::capture::{
    AudioPipeline, CaptureBackend, PipelineState, ScreenBackend, ScreenPipeline, ScreenTiming,
};
use crate::channel::DuplexChannel;
use crate::integrity::{IntegrityEvent, IntegrityLog, IntegrityMonitor, MonitorHandle};
use crate::question::{PlaybackSink, PlaybackState, QuestionPlayer};
use crate::timer::SessionTimer;
use crate::transcript::TranscriptBuffer;
use crate::uploader::{ChunkUploader, UploadTiming};

/// What the orchestrator is handed at start time.
pub struct StartOptions {
    /// A display stream acquired up front, before the session starts.
    pub screen: Option<Box<dyn ScreenBackend>>,
    /// The pre-granted stream was already validated upstream at
    /// permission-grant time; skip re-validation and trust it.
    pub screen_prevalidated: bool,
    /// Webcam snapshot taken during intake, uploaded best-effort.
    pub snapshot: Option<Vec<u8>>,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            screen: None,
            screen_prevalidated: false,
            snapshot: None,
        }
    }
}

/// The top-level session state machine.
///
/// Commands flow out of it (start/stop capture, start timer, request
/// question); events flow into it from the pipelines, the integrity
/// monitor, and the timer. It alone calls the interview lifecycle
/// endpoints.
pub struct InterviewSession {
    config: SessionConfig,
    api: Arc<dyn InterviewBackend>,
    channel: Arc<dyn DuplexChannel>,
    state: Arc<StdMutex<SessionState>>,
    transcript: Arc<StdMutex<TranscriptBuffer>>,
    integrity_log: Arc<StdMutex<IntegrityLog>>,
    audio: AudioPipeline,
    screen: Arc<ScreenPipeline>,
    player: QuestionPlayer,
    timer: Mutex<Option<SessionTimer>>,
    integrity_tx: mpsc::Sender<IntegrityEvent>,
    integrity_rx: Mutex<Option<mpsc::Receiver<IntegrityEvent>>>,
    monitor: Mutex<Option<MonitorHandle>>,
    /// Idempotence gate for the end path.
    ended: AtomicBool,
    end_lock: Mutex<()>,
    /// Signals support tasks (transcript, supervisor) to wind down.
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl InterviewSession {
    pub fn new(
        config: SessionConfig,
        api: Arc<dyn InterviewBackend>,
        channel: Arc<dyn DuplexChannel>,
        sink: Box<dyn PlaybackSink>,
    ) -> Self {
        Self::with_timings(
            config,
            api,
            channel,
            sink,
            UploadTiming::default(),
            ScreenTiming::default(),
        )
    }

    /// Constructor with explicit timing knobs, used by tests to shrink
    /// the upload and shutdown waits.
    pub fn with_timings(
        config: SessionConfig,
        api: Arc<dyn InterviewBackend>,
        channel: Arc<dyn DuplexChannel>,
        sink: Box<dyn PlaybackSink>,
        upload_timing: UploadTiming,
        screen_timing: ScreenTiming,
    ) -> Self {
        let (integrity_tx, integrity_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let uploader = ChunkUploader::with_timing(Arc::clone(&channel), upload_timing);
        let screen = Arc::new(ScreenPipeline::with_timing(
            uploader,
            config.file_extension.clone(),
            integrity_tx.clone(),
            screen_timing,
        ));
        let audio = AudioPipeline::new(Arc::clone(&channel));

        Self {
            config,
            api,
            channel,
            state: Arc::new(StdMutex::new(SessionState::new())),
            transcript: Arc::new(StdMutex::new(TranscriptBuffer::new())),
            integrity_log: Arc::new(StdMutex::new(IntegrityLog::new())),
            audio,
            screen,
            player: QuestionPlayer::new(sink),
            timer: Mutex::new(None),
            integrity_tx,
            integrity_rx: Mutex::new(Some(integrity_rx)),
            monitor: Mutex::new(None),
            ended: AtomicBool::new(false),
            end_lock: Mutex::new(()),
            shutdown_tx,
            shutdown_rx,
        }
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.state.lock().expect("session state poisoned").phase()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state
            .lock()
            .expect("session state poisoned")
            .snapshot()
    }

    pub fn is_complete(&self) -> bool {
        self.phase() == Phase::Complete
    }

    /// Server-reported end-of-interview summary, kept after the end call.
    pub fn end_summary(&self) -> Option<EndInterviewSummary> {
        self.state
            .lock()
            .expect("session state poisoned")
            .end_summary()
            .cloned()
    }

    pub fn committed_transcript(&self) -> String {
        self.transcript
            .lock()
            .expect("transcript poisoned")
            .committed()
            .to_string()
    }

    pub fn transcript_display(&self) -> String {
        self.transcript.lock().expect("transcript poisoned").display()
    }

    pub fn tab_switch_count(&self) -> usize {
        self.integrity_log
            .lock()
            .expect("integrity log poisoned")
            .tab_switch_count()
    }

    pub fn integrity_entries(&self) -> Vec<crate::integrity::AlertEntry> {
        self.integrity_log
            .lock()
            .expect("integrity log poisoned")
            .entries()
            .to_vec()
    }

    pub async fn remaining_secs(&self) -> Option<u64> {
        self.timer.lock().await.as_ref().map(|t| t.remaining_secs())
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.player.state()
    }

    pub fn screen_state(&self) -> PipelineState {
        self.screen.state()
    }

    pub fn screen_stats(&self) -> (u64, u64, u64) {
        (
            self.screen.chunks_sent(),
            self.screen.chunks_acked(),
            self.screen.chunks_failed(),
        )
    }

    /// Sender for page-visibility and window-focus events observed by
    /// the embedding UI.
    pub fn integrity_sender(&self) -> mpsc::Sender<IntegrityEvent> {
        self.integrity_tx.clone()
    }

    fn response_id(&self) -> Result<String> {
        self.state
            .lock()
            .expect("session state poisoned")
            .response_id()
            .map(str::to_string)
            .context("session has no response id yet")
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the session: confirm with the server, arm the timer and
    /// integrity monitor, fetch the first question, and bring up capture.
    pub async fn start(self: &Arc<Self>, opts: StartOptions) -> Result<()> {
        if self.phase() != Phase::Initializing {
            anyhow::bail!("session already started");
        }

        let request = StartInterviewRequest {
            interview_id: self.config.interview_id.clone(),
            candidate_name: self.config.candidate_name.clone(),
            candidate_email: self.config.candidate_email.clone(),
        };

        let response = self
            .api
            .start_interview(&request)
            .await
            .context("Failed to start interview")?;

        let response_id = response.response_id.clone();
        {
            let mut state = self.state.lock().expect("session state poisoned");
            state
                .confirm_started(
                    response_id.clone(),
                    response.session_token.clone(),
                    response.mode.clone(),
                )
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        info!("Interview session started (response={})", response_id);

        // The channel carries the live transcription stream; losing it
        // degrades the session but does not abort it.
        if let Err(e) = self
            .channel
            .announce_session(&self.config.interview_id, &response_id)
            .await
        {
            warn!("Session announce failed: {}", e);
            self.state
                .lock()
                .expect("session state poisoned")
                .set_last_error(format!("live transcription unavailable: {e}"));
        }

        let (timer_tx, timer_rx) = mpsc::channel(1);
        if let Some(minutes) = response.duration_minutes {
            *self.timer.lock().await = Some(SessionTimer::start(minutes * 60, timer_tx));
        }

        self.spawn_transcript_task(&response_id).await;

        let (limit_tx, limit_rx) = mpsc::channel(1);
        if let Some(events_rx) = self.integrity_rx.lock().await.take() {
            *self.monitor.lock().await = Some(IntegrityMonitor::spawn(
                events_rx,
                Arc::clone(&self.integrity_log),
                Arc::clone(&self.api),
                response_id.clone(),
                limit_tx,
            ));
        }

        self.spawn_supervisor(timer_rx, limit_rx);

        // Webcam snapshot: best-effort, never blocks session start.
        if let Some(image) = opts.snapshot {
            let api = Arc::clone(&self.api);
            let id = response_id.clone();
            tokio::spawn(async move {
                if let Err(e) = api.upload_candidate_image(&id, image).await {
                    warn!("Candidate snapshot upload failed (ignored): {}", e);
                }
            });
        }

        // Pre-granted screen stream: start capture now. Failures during
        // initialization are soft; validation failures are logged only.
        if let Some(backend) = opts.screen {
            match self
                .screen
                .start(backend, &response_id, opts.screen_prevalidated)
                .await
            {
                Ok(()) => {}
                Err(e) if e.is_validation() => {
                    warn!("Screen validation failed during start: {}", e);
                }
                Err(e) => {
                    error!("Screen capture failed during start: {}", e);
                    self.state
                        .lock()
                        .expect("session state poisoned")
                        .set_last_error(e.to_string());
                }
            }
        }

        // First question: prefer the inline payload, fall back to a fetch.
        if response.current_question.is_some() {
            let text = response
                .current_question
                .as_ref()
                .and_then(crate::api::question_text);
            if let Some(text) = text {
                self.state
                    .lock()
                    .expect("session state poisoned")
                    .set_question(crate::api::Question {
                        text,
                        index: 1,
                        total: 0,
                    });
                if let Some(tts) = &response.tts_audio_base64 {
                    if let Err(e) = self.player.load_and_play(tts).await {
                        warn!("Question playback failed (non-fatal): {}", e);
                    }
                }
            }
        } else {
            let complete = self.fetch_and_load_question().await?;
            if complete {
                self.finish_natural(None).await;
            }
        }

        Ok(())
    }

    /// Begin answering: start the microphone pipeline. Rejected while the
    /// screen pipeline is failed.
    pub async fn start_recording(&self, backend: Box<dyn CaptureBackend>) -> Result<()> {
        let response_id = self.response_id()?;
        {
            let mut state = self.state.lock().expect("session state poisoned");
            state
                .begin_recording(self.screen.is_blocked())
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        if let Err(e) = self.audio.start(backend, &response_id).await {
            // Roll the phase back; the microphone never came up.
            let mut state = self.state.lock().expect("session state poisoned");
            let _ = state.finish_recording();
            state.set_last_error(format!("microphone unavailable: {e}"));
            return Err(e);
        }
        Ok(())
    }

    /// Stop answering; the transcript buffer is retained for display and
    /// submission.
    pub async fn stop_recording(&self) -> Result<()> {
        {
            let mut state = self.state.lock().expect("session state poisoned");
            state.finish_recording().map_err(|e| anyhow::anyhow!(e))?;
        }
        self.audio.stop().await
    }

    /// Submit the committed transcript for the current question.
    pub async fn submit_answer(&self) -> Result<SubmitAnswerResponse> {
        let response_id = self.response_id()?;

        // Stop a live recording first so the last frames are flushed.
        if self.phase() == Phase::Recording {
            self.audio.stop().await?;
            let mut state = self.state.lock().expect("session state poisoned");
            state.finish_recording().map_err(|e| anyhow::anyhow!(e))?;
        }

        let (question_text, transcript_text) = {
            let state = self.state.lock().expect("session state poisoned");
            let transcript = self.transcript.lock().expect("transcript poisoned");
            (
                state
                    .question()
                    .map(|q| q.text.clone())
                    .unwrap_or_default(),
                transcript.committed().to_string(),
            )
        };

        {
            let mut state = self.state.lock().expect("session state poisoned");
            state
                .begin_submit(
                    !transcript_text.trim().is_empty(),
                    self.screen.is_blocked(),
                )
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        let request = SubmitAnswerRequest {
            response_id: response_id.clone(),
            question: question_text,
            transcript: transcript_text,
        };

        let response = match self.api.submit_answer(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.state
                    .lock()
                    .expect("session state poisoned")
                    .submit_failed(e.to_string());
                return Err(e).context("Failed to submit answer");
            }
        };

        if response.complete {
            info!("Interview complete after submission");
            self.finish_natural(response.final_analysis.clone()).await;
        } else {
            {
                let mut state = self.state.lock().expect("session state poisoned");
                state.answer_accepted().map_err(|e| anyhow::anyhow!(e))?;
            }
            self.transcript
                .lock()
                .expect("transcript poisoned")
                .clear();

            // Next question, re-armed for live transcription.
            match self.fetch_and_load_question().await {
                Ok(true) => self.finish_natural(None).await,
                Ok(false) => {}
                Err(e) => {
                    warn!("Question fetch after submission failed: {}", e);
                    self.state
                        .lock()
                        .expect("session state poisoned")
                        .set_last_error(e.to_string());
                }
            }
        }

        Ok(response)
    }

    /// Replay the current question's audio from the beginning.
    pub async fn replay_question(&self) {
        self.player.replay().await;
    }

    /// Explicitly restart screen sharing after a failure.
    pub async fn restart_screen(&self, backend: Box<dyn ScreenBackend>) -> Result<()> {
        let response_id = self.response_id()?;
        self.screen
            .restart(backend, &response_id)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        info!("Screen sharing restarted");
        Ok(())
    }

    /// End the session. Reachable from any non-complete phase; idempotent
    /// once complete. Local completion never hangs on the server ack.
    pub async fn end(&self, reason: EndReason) -> Result<()> {
        let _guard = self.end_lock.lock().await;
        if self.ended.load(Ordering::SeqCst) {
            return Ok(());
        }

        {
            let mut state = self.state.lock().expect("session state poisoned");
            if state.is_complete() {
                return Ok(());
            }
            if state.begin_ending(reason).is_err() {
                return Ok(());
            }
        }
        self.ended.store(true, Ordering::SeqCst);
        info!("Ending session ({:?})", reason);

        self.shutdown_capture().await;

        let response_id = {
            let state = self.state.lock().expect("session state poisoned");
            state.response_id().map(str::to_string)
        };

        let summary = if let Some(response_id) = response_id {
            if let Err(e) = self.channel.end_session(&response_id).await {
                warn!("Channel end signal failed (ignored): {}", e);
            }

            match self.api.end_interview(&response_id).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    // Surfaced, but completion must not block on it.
                    error!("end-interview call failed: {}", e);
                    self.state
                        .lock()
                        .expect("session state poisoned")
                        .set_last_error(format!("end-interview failed: {e}"));
                    None
                }
            }
        } else {
            None
        };

        self.state
            .lock()
            .expect("session state poisoned")
            .complete(None, summary);
        info!("Session complete");
        Ok(())
    }

    /// Post-interview report for the candidate.
    pub async fn fetch_summary(&self) -> Result<ResponseSummary> {
        let response_id = self.response_id()?;
        self.api.response_summary(&response_id).await
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Completion reached through the question loop rather than an end
    /// command: all cleanup, plus the chunk-merge trigger, but no
    /// end-interview call (the server already marked the response done).
    async fn finish_natural(&self, final_analysis: Option<serde_json::Value>) {
        let _guard = self.end_lock.lock().await;
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut state = self.state.lock().expect("session state poisoned");
            let _ = state.begin_ending(EndReason::Natural);
        }

        self.shutdown_capture().await;

        if let Ok(response_id) = self.response_id() {
            if let Err(e) = self.channel.end_session(&response_id).await {
                warn!("Channel end signal failed (ignored): {}", e);
            }
            if let Err(e) = self.api.finalize_recording(&response_id).await {
                warn!("Recording finalize failed (ignored): {}", e);
            }
        }

        self.state
            .lock()
            .expect("session state poisoned")
            .complete(final_analysis, None);
        info!("Session complete (all questions answered)");
    }

    /// Stop everything that captures or ticks. Safe to call once; the
    /// end paths guard with `ended`.
    async fn shutdown_capture(&self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(mut timer) = self.timer.lock().await.take() {
            timer.cancel();
        }
        if let Some(mut monitor) = self.monitor.lock().await.take() {
            monitor.shutdown();
        }

        self.player.stop_current().await;

        if let Err(e) = self.audio.stop().await {
            warn!("Audio pipeline stop failed: {}", e);
        }
        if let Err(e) = self.screen.stop().await {
            warn!("Screen pipeline stop failed: {}", e);
        }
    }

    async fn fetch_and_load_question(&self) -> Result<bool> {
        let response_id = self.response_id()?;
        let fetch = self
            .api
            .current_question(&response_id)
            .await
            .context("Failed to fetch question")?;

        if fetch.complete {
            return Ok(true);
        }

        if let Some(question) = fetch.question {
            info!(
                "Question {}/{}: {}",
                question.index, question.total, question.text
            );
            self.state
                .lock()
                .expect("session state poisoned")
                .set_question(question);
        }

        if let Some(tts) = fetch.tts_audio_base64 {
            if let Err(e) = self.player.load_and_play(&tts).await {
                warn!("Question playback failed (non-fatal): {}", e);
            }
        }

        Ok(false)
    }

    async fn spawn_transcript_task(&self, response_id: &str) {
        let mut updates = match self.channel.subscribe_transcripts(response_id).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Transcript subscription failed: {}", e);
                return;
            }
        };

        let transcript = Arc::clone(&self.transcript);
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    update = updates.recv() => {
                        let Some(update) = update else { break };
                        transcript
                            .lock()
                            .expect("transcript poisoned")
                            .apply(&update);
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }

    fn spawn_supervisor(
        self: &Arc<Self>,
        mut timer_rx: mpsc::Receiver<()>,
        mut limit_rx: mpsc::Receiver<()>,
    ) {
        let session = Arc::clone(self);
        let mut screen_state = self.screen.watch_state();
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(()) = timer_rx.recv() => {
                        info!("Timer expired; ending session");
                        if let Err(e) = session.end(EndReason::TimerExpired).await {
                            error!("Timer-driven end failed: {}", e);
                        }
                        break;
                    }
                    Some(()) = limit_rx.recv() => {
                        warn!("Tab-switch limit reached; terminating session");
                        if let Err(e) = session.end(EndReason::IntegrityViolation).await {
                            error!("Violation-driven end failed: {}", e);
                        }
                        break;
                    }
                    changed = screen_state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *screen_state.borrow() == PipelineState::Failed {
                            session
                                .state
                                .lock()
                                .expect("session state poisoned")
                                .set_last_error(
                                    "screen sharing stopped; restart it to continue",
                                );
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    else => break,
                }
            }
        });
    }
}
