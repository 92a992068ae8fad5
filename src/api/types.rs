//! Wire types for the interview backend
//!
//! The backend is tolerant but inconsistent about field naming and
//! question shape; everything heterogeneous is normalized here at the
//! boundary so the core never sniffs payload shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct StartInterviewRequest {
    pub interview_id: String,
    pub candidate_name: String,
    pub candidate_email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartInterviewResponse {
    #[serde(alias = "responseId")]
    pub response_id: String,
    #[serde(default, alias = "interviewId")]
    pub interview_id: Option<String>,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default, alias = "sessionToken")]
    pub session_token: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default, alias = "durationMinutes")]
    pub duration_minutes: Option<u64>,
    #[serde(default, alias = "startTime")]
    pub start_time: Option<String>,
    /// Some deployments return the first question inline; otherwise the
    /// client issues a question fetch right after start.
    #[serde(default, alias = "currentQuestion")]
    pub current_question: Option<Value>,
    #[serde(default, alias = "ttsAudioBase64")]
    pub tts_audio_base64: Option<String>,
}

/// Raw question fetch payload. `current_question` may be a bare string or
/// a nested `{question|text}` object.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionWire {
    #[serde(default, alias = "currentQuestion")]
    pub current_question: Option<Value>,
    #[serde(default, alias = "questionNumber")]
    pub question_number: Option<u32>,
    #[serde(default, alias = "totalQuestions")]
    pub total_questions: Option<u32>,
    #[serde(
        default,
        alias = "interviewComplete",
        alias = "interview_complete"
    )]
    pub complete: bool,
    #[serde(default, alias = "ttsAudioBase64")]
    pub tts_audio_base64: Option<String>,
}

/// Normalized question, the only shape the core sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub text: String,
    /// 1-based question number.
    pub index: u32,
    pub total: u32,
}

/// Normalized result of a question fetch.
#[derive(Debug, Clone)]
pub struct QuestionFetch {
    /// Absent when the interview is complete.
    pub question: Option<Question>,
    pub complete: bool,
    /// Base64-encoded synthesized question audio, decoded lazily by the
    /// playback controller.
    pub tts_audio_base64: Option<String>,
}

/// Extract question text from the heterogeneous wire shape: either a bare
/// string or an object carrying `question` or `text`.
pub fn question_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(map) => map
            .get("question")
            .or_else(|| map.get("text"))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        _ => None,
    }
}

impl QuestionWire {
    pub fn normalize(self) -> QuestionFetch {
        let question = if self.complete {
            None
        } else {
            self.current_question
                .as_ref()
                .and_then(question_text)
                .map(|text| Question {
                    text,
                    index: self.question_number.unwrap_or(1),
                    total: self.total_questions.unwrap_or(0),
                })
        };

        QuestionFetch {
            question,
            complete: self.complete,
            tts_audio_base64: self.tts_audio_base64,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAnswerRequest {
    pub response_id: String,
    pub question: String,
    pub transcript: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswerResponse {
    #[serde(
        default,
        alias = "interviewCompleted",
        alias = "interview_completed"
    )]
    pub complete: bool,
    #[serde(default, alias = "questionNumber")]
    pub question_number: Option<u32>,
    #[serde(default, alias = "totalQuestions")]
    pub total_questions: Option<u32>,
    #[serde(default, alias = "questionsAnswered")]
    pub questions_answered: Option<u32>,
    /// Per-answer analysis blob, opaque to the client.
    #[serde(default)]
    pub analysis: Option<Value>,
    #[serde(default, alias = "finalAnalysis")]
    pub final_analysis: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndInterviewSummary {
    #[serde(default, alias = "questionsAnswered")]
    pub questions_answered: Option<u32>,
    #[serde(default, alias = "totalQuestions")]
    pub total_questions: Option<u32>,
    #[serde(default, alias = "isPartiallyComplete")]
    pub is_partially_complete: Option<bool>,
    #[serde(default, alias = "durationSeconds")]
    pub duration_seconds: Option<u64>,
    #[serde(default, alias = "videoMerged")]
    pub video_merged: Option<bool>,
    #[serde(default, alias = "videoUrl")]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseSummary {
    #[serde(default, alias = "generalSummary")]
    pub general_summary: Option<Value>,
}

/// Suspicious-activity record forwarded for audit.
#[derive(Debug, Clone, Serialize)]
pub struct CheatingAlert {
    pub response_id: String,
    pub alert_type: String,
    pub details: Option<String>,
    pub timestamp_ms: i64,
}
