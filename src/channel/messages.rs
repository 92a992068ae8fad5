use serde::{Deserialize, Serialize};

/// Session lifecycle signal (`start_interview` / `end_interview`).
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionSignal {
    pub interview_id: Option<String>,
    pub response_id: String,
    pub timestamp: String, // RFC3339
}

/// One encoded screen-recording chunk sent for durable storage.
#[derive(Debug, Serialize, Deserialize)]
pub struct VideoChunkMessage {
    pub response_id: String,
    /// Base64-encoded chunk payload, normalized before transmission.
    pub chunk: String,
    pub file_extension: String,
    pub sequence: u64,
}

/// Server verdict for a video chunk (`video_chunk_saved` or an error).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkAck {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Transcript update from the server-side STT stream.
///
/// Both `partial_transcript` and `transcript_result` carry this shape;
/// `is_final` distinguishes interim text from committed segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptUpdate {
    pub text: String,
    #[serde(default)]
    pub is_final: bool,
}
