pub mod api;
pub mod capture;
pub mod channel;
pub mod config;
pub mod integrity;
pub mod question;
pub mod session;
pub mod timer;
pub mod transcript;
pub mod uploader;

pub use api::{HttpBackend, InterviewBackend};
pub use capture::{
    AudioPipeline, CaptureBackend, FileAudioBackend, FileScreenBackend, PipelineState,
    ScreenBackend, ScreenPipeline,
};
pub use channel::{DuplexChannel, NatsChannel};
pub use config::Config;
pub use integrity::{IntegrityEvent, IntegrityLog, IntegrityMonitor};
pub use question::{QuestionPlayer, WavFileSink};
pub use session::{InterviewSession, SessionConfig, StartOptions};
pub use timer::SessionTimer;
pub use transcript::TranscriptBuffer;
pub use uploader::{ChunkUploader, UploadError};
