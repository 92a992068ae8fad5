//! Interview backend HTTP API
//!
//! The session orchestrator is the only component that calls the
//! lifecycle endpoints here; pipelines and the integrity monitor use only
//! the alert and media upload paths.

mod client;
mod types;

pub use client::HttpBackend;
pub use types::{
    question_text, CheatingAlert, EndInterviewSummary, Question, QuestionFetch, QuestionWire,
    ResponseSummary, StartInterviewRequest, StartInterviewResponse, SubmitAnswerRequest,
    SubmitAnswerResponse,
};

use anyhow::Result;

/// Seam over the interview backend's HTTP surface. Production uses
/// [`HttpBackend`]; tests substitute a scripted implementation.
#[async_trait::async_trait]
pub trait InterviewBackend: Send + Sync {
    async fn start_interview(&self, req: &StartInterviewRequest) -> Result<StartInterviewResponse>;

    async fn current_question(&self, response_id: &str) -> Result<QuestionFetch>;

    async fn submit_answer(&self, req: &SubmitAnswerRequest) -> Result<SubmitAnswerResponse>;

    async fn end_interview(&self, response_id: &str) -> Result<EndInterviewSummary>;

    async fn response_summary(&self, response_id: &str) -> Result<ResponseSummary>;

    /// Best-effort audit telemetry; callers fire this from detached tasks
    /// and ignore the result.
    async fn record_alert(&self, alert: &CheatingAlert) -> Result<()>;

    /// Multipart upload of the candidate's webcam snapshot.
    async fn upload_candidate_image(&self, response_id: &str, image: Vec<u8>) -> Result<()>;

    /// Trigger the server-side merge of uploaded recording chunks.
    async fn finalize_recording(&self, response_id: &str) -> Result<()>;
}
