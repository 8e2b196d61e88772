//! Question generation boundary.
//!
//! Question generation is an external concern; this module only defines the
//! narrow interface the settlement pipeline needs: given three category
//! labels, return a fixed-size question set. Payment is always verified
//! before this is called, so a slow or costly generator never runs for an
//! unpaid request.

use crate::config::QuestionConfig;
use crate::error::{Error, Result};
use crate::model::{CategoryPath, Question};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Produces a fixed-size question set for a category path.
#[async_trait]
pub trait QuestionSource: Send + Sync {
    /// Generate exactly `count` questions for the given categories.
    async fn generate(&self, categories: &CategoryPath, count: usize) -> Result<Vec<Question>>;
}

/// Remote question-source client.
pub struct HttpQuestionSource {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(flatten)]
    categories: &'a CategoryPath,
    count: usize,
}

impl HttpQuestionSource {
    /// Create a client for the configured question source.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: String, config: &QuestionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("skillcert-node/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Dependency(format!("failed to build question client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl QuestionSource for HttpQuestionSource {
    async fn generate(&self, categories: &CategoryPath, count: usize) -> Result<Vec<Question>> {
        debug!("requesting {count} questions for {}", categories.topic());

        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest { categories, count })
            .send()
            .await
            .map_err(|e| Error::Dependency(format!("question request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Dependency(format!(
                "question source returned status {}",
                response.status()
            )));
        }

        let questions: Vec<Question> = response
            .json()
            .await
            .map_err(|e| Error::Dependency(format!("failed to parse questions: {e}")))?;

        if questions.len() != count {
            return Err(Error::Dependency(format!(
                "question source returned {} questions, expected {count}",
                questions.len()
            )));
        }

        Ok(questions)
    }
}

/// Canned question source for development and tests.
///
/// Repeats a small bank of placeholder questions up to the requested count;
/// never use it behind a real deployment.
#[derive(Debug, Clone, Default)]
pub struct FixedQuestionSource;

#[async_trait]
impl QuestionSource for FixedQuestionSource {
    async fn generate(&self, categories: &CategoryPath, count: usize) -> Result<Vec<Question>> {
        let topic = categories.topic();
        Ok((0..count)
            .map(|i| Question {
                id: Uuid::new_v4().to_string(),
                question: format!("Placeholder question {} on {topic}", i + 1),
                options: vec![
                    "Option A".to_string(),
                    "Option B".to_string(),
                    "Option C".to_string(),
                    "Option D".to_string(),
                ],
                correct_answer: i % 4,
                points: 10,
            })
            .collect())
    }
}
