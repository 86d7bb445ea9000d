use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::{AssessmentReport, Difficulty, SessionRecording};

/// A stateless transcript-to-score collaborator. The scoring logic itself is
/// external; the platform only submits a recording and stores the verdict.
#[async_trait]
pub trait AssessmentEngine: Send + Sync + 'static {
    async fn analyze(
        &self,
        request: AssessmentRequest<'_>,
    ) -> Result<AssessmentReport, AssessmentError>;
}

#[derive(Debug)]
pub struct AssessmentRequest<'a> {
    pub recording: &'a SessionRecording,
    pub case_question: &'a str,
    pub difficulty: Difficulty,
    pub candidate_answer: Option<&'a str>,
}

#[derive(Debug, Error)]
pub enum AssessmentError {
    #[error("Assessment request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Assessment service rejected the request with status {0}")]
    Rejected(StatusCode),
}

/// Configuration for the HTTP assessment engine
#[derive(Debug, Clone)]
pub struct AssessmentApiConfig {
    pub base_url: String,
    pub api_key: String,
}

/// Talks to the external assessment service over HTTP
pub struct HttpAssessmentEngine {
    client: Client,
    config: AssessmentApiConfig,
}

impl HttpAssessmentEngine {
    pub fn new(config: AssessmentApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AssessmentEngine for HttpAssessmentEngine {
    async fn analyze(
        &self,
        request: AssessmentRequest<'_>,
    ) -> Result<AssessmentReport, AssessmentError> {
        let body = json!({
            "sessionData": request.recording,
            "caseQuestion": request.case_question,
            "difficulty": request.difficulty,
            "candidateAnswer": request.candidate_answer,
        });

        let response = self
            .client
            .post(format!("{}/analyze", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AssessmentError::Rejected(response.status()));
        }

        Ok(response.json::<AssessmentReport>().await?)
    }
}
