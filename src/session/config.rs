use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for one interview session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Interview the candidate is taking.
    pub interview_id: String,
    pub candidate_name: String,
    pub candidate_email: String,

    /// Container hint sent with video chunks. The server currently forces
    /// mp4 regardless, but the hint stays part of the wire contract.
    pub file_extension: String,

    /// Audio frame length for the microphone pipeline.
    pub audio_frame_duration: Duration,
    /// Chunk interval for the screen pipeline.
    pub screen_chunk_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interview_id: String::new(),
            candidate_name: String::new(),
            candidate_email: String::new(),
            file_extension: "mp4".to_string(),
            audio_frame_duration: Duration::from_millis(250),
            screen_chunk_interval: Duration::from_secs(10),
        }
    }
}
