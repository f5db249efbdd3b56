//! Client-side view of the lesson platform API.
//!
//! The surface is split into three narrow traits so the engine can be
//! assembled over the HTTP client in production and over hand-rolled fakes
//! in tests: completion checks, answer grading, and content fetch.

use std::env;

use async_trait::async_trait;

use lesson_core::model::{AnswerCode, ConceptId, ExerciseId, LessonDocument, LessonId};

use crate::error::ApiError;

mod http;
mod types;

// Public API of the platform client subsystem.
pub use http::HttpLessonApi;
pub use types::{
    AnswerVerdict, ApiEnvelope, CompletionCheck, ConceptBlockDto, ConceptDto, ExampleDto,
    ExerciseDto, ExerciseScope, LessonContentDto, LessonDocumentDto, ObjectiveDto,
};

/// Production API host, overridable through the environment.
pub const DEFAULT_BASE_URL: &str = "https://fastlearnersapp.com/api/v1";

/// Connection settings for the platform API.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token; requests go out unauthenticated when absent.
    pub api_token: Option<String>,
}

impl ApiConfig {
    /// Reads `FASTLEARNERS_API_BASE_URL` and `FASTLEARNERS_API_TOKEN`,
    /// falling back to the production host and no token.
    #[must_use]
    pub fn from_env() -> Self {
        let base_url =
            env::var("FASTLEARNERS_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let api_token = env::var("FASTLEARNERS_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        Self {
            base_url,
            api_token,
        }
    }
}

/// Per-section completion checks against the remote authority.
///
/// One method per section kind; the concept check additionally names the
/// concept being verified.
#[async_trait]
pub trait CompletionChecks: Send + Sync {
    /// # Errors
    ///
    /// `ApiError::NoCompletionRecord` when the learner has no completion row
    /// for this lesson, otherwise the usual transport and server failures.
    async fn overview_completed(&self, lesson_id: LessonId) -> Result<CompletionCheck, ApiError>;

    /// # Errors
    ///
    /// Same failure shapes as [`CompletionChecks::overview_completed`].
    async fn concept_completed(
        &self,
        lesson_id: LessonId,
        concept_id: ConceptId,
    ) -> Result<CompletionCheck, ApiError>;

    /// # Errors
    ///
    /// Same failure shapes as [`CompletionChecks::overview_completed`].
    async fn summary_completed(&self, lesson_id: LessonId) -> Result<CompletionCheck, ApiError>;

    /// # Errors
    ///
    /// Same failure shapes as [`CompletionChecks::overview_completed`].
    async fn general_exercises_completed(
        &self,
        lesson_id: LessonId,
    ) -> Result<CompletionCheck, ApiError>;
}

/// Remote grading of one submitted answer.
///
/// Grading is never done locally; the verdict always comes from here.
#[async_trait]
pub trait AnswerChecks: Send + Sync {
    /// # Errors
    ///
    /// `ApiError::AlreadyAnswered` for a duplicate submission,
    /// `ApiError::Validation` for a malformed one, plus transport and server
    /// failures. A wrong answer is not an error; it comes back as a verdict.
    async fn check_answer(
        &self,
        exercise_id: ExerciseId,
        answer: AnswerCode,
        scope: ExerciseScope,
    ) -> Result<AnswerVerdict, ApiError>;
}

/// Source of validated lesson documents.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// # Errors
    ///
    /// Transport, decode, and server failures; document validation failures
    /// surface as `ApiError::Lesson`.
    async fn fetch_lesson(
        &self,
        subject_slug: &str,
        topic_slug: &str,
    ) -> Result<LessonDocument, ApiError>;

    /// Numeric-id route, deprecated upstream; kept while callers migrate to
    /// slug addressing.
    ///
    /// # Errors
    ///
    /// Same failure shapes as [`ContentSource::fetch_lesson`].
    async fn fetch_lesson_by_id(&self, lesson_id: LessonId) -> Result<LessonDocument, ApiError>;
}
