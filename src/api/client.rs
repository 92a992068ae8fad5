use anyhow::{Context, Result};
use reqwest::multipart;
use tracing::{debug, info};

use super::types::*;
use super::InterviewBackend;

/// HTTP client for the interview backend.
///
/// The backend keeps a public allowlist covering the candidate lifecycle
/// endpoints; everything off that list 401s without the shared API key,
/// sent as both `API_KEY` and `x-api-key` headers, matching what the
/// auth middleware accepts.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        info!("Interview backend client initialized: {}", base_url);

        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/interview/{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_key(path, self.client.post(self.url(path)))
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.with_key(path, self.client.get(self.url(path)))
    }

    fn with_key(&self, path: &str, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) if needs_api_key(path) => {
                req.header("API_KEY", key).header("x-api-key", key)
            }
            _ => req,
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{what} failed with {status}: {body}");
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("Malformed {what} response"))
    }
}

/// Whether an endpoint sits outside the backend's public allowlist and
/// needs the shared API key.
fn needs_api_key(path: &str) -> bool {
    matches!(
        path,
        "record-cheating-alert" | "upload-candidate-image" | "upload-candidate-video"
    )
}

#[async_trait::async_trait]
impl InterviewBackend for HttpBackend {
    async fn start_interview(&self, req: &StartInterviewRequest) -> Result<StartInterviewResponse> {
        debug!("POST start-interview (interview={})", req.interview_id);
        let response = self.post("start-interview")
            .json(req)
            .send()
            .await
            .context("start-interview request failed")?;
        Self::parse(response, "start-interview").await
    }

    async fn current_question(&self, response_id: &str) -> Result<QuestionFetch> {
        debug!("GET get-current-question");
        let response = self.get("get-current-question")
            .query(&[("response_id", response_id)])
            .send()
            .await
            .context("get-current-question request failed")?;
        let wire: QuestionWire = Self::parse(response, "get-current-question").await?;
        Ok(wire.normalize())
    }

    async fn submit_answer(&self, req: &SubmitAnswerRequest) -> Result<SubmitAnswerResponse> {
        debug!("POST submit-answer");
        let response = self.post("submit-answer")
            .json(req)
            .send()
            .await
            .context("submit-answer request failed")?;
        Self::parse(response, "submit-answer").await
    }

    async fn end_interview(&self, response_id: &str) -> Result<EndInterviewSummary> {
        debug!("POST end-interview");
        let response = self.post("end-interview")
            .json(&serde_json::json!({ "response_id": response_id }))
            .send()
            .await
            .context("end-interview request failed")?;
        Self::parse(response, "end-interview").await
    }

    async fn response_summary(&self, response_id: &str) -> Result<ResponseSummary> {
        debug!("GET get-response");
        let response = self
            .get("get-response")
            .query(&[("response_id", response_id)])
            .send()
            .await
            .context("get-response request failed")?;
        Self::parse(response, "get-response").await
    }

    async fn record_alert(&self, alert: &CheatingAlert) -> Result<()> {
        let response = self.post("record-cheating-alert")
            .json(alert)
            .send()
            .await
            .context("record-cheating-alert request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("record-cheating-alert failed with {status}");
        }
        Ok(())
    }

    async fn upload_candidate_image(&self, response_id: &str, image: Vec<u8>) -> Result<()> {
        debug!("POST upload-candidate-image ({} bytes)", image.len());
        let part = multipart::Part::bytes(image)
            .file_name("snapshot.png")
            .mime_str("image/png")
            .context("invalid image part")?;
        let form = multipart::Form::new()
            .part("image", part)
            .text("response_id", response_id.to_string());

        let response = self.post("upload-candidate-image")
            .multipart(form)
            .send()
            .await
            .context("upload-candidate-image request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("upload-candidate-image failed with {status}");
        }
        Ok(())
    }

    async fn finalize_recording(&self, response_id: &str) -> Result<()> {
        debug!("POST upload-candidate-video (finalize)");
        // The merge endpoint only needs the response id; the video field
        // is a placeholder, chunks were already uploaded over the channel.
        let part = multipart::Part::bytes(Vec::new())
            .file_name("chunks-already-uploaded")
            .mime_str("application/octet-stream")
            .context("invalid video part")?;
        let form = multipart::Form::new()
            .part("video", part)
            .text("response_id", response_id.to_string());

        let response = self.post("upload-candidate-video")
            .multipart(form)
            .send()
            .await
            .context("upload-candidate-video request failed")?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("upload-candidate-video failed with {status}");
        }
        Ok(())
    }
}
