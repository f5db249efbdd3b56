//! Completion checks against the remote authority, with leniency.
//!
//! The platform keeps one completion row per learner and lesson; when that
//! row is missing the check endpoints answer with the distinguished
//! "no record" shape. A data gap upstream must never trap the learner, so
//! that case reports [`RemoteCompletion::MissingRecord`] and callers mark
//! the section complete anyway.

use std::sync::Arc;

use lesson_core::model::{LessonId, SectionId};

use crate::api::CompletionChecks;
use crate::error::ApiError;
use crate::retry::RetryPolicy;

/// What the remote authority said about one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteCompletion {
    /// Confirmed complete.
    Confirmed,
    /// No completion record exists for the lesson; treated as complete with
    /// a warning.
    MissingRecord,
    /// Explicitly not complete.
    Denied,
}

/// Dispatches a section to its check endpoint and interprets the response.
pub struct CompletionVerifier {
    checks: Arc<dyn CompletionChecks>,
    retry: RetryPolicy,
}

impl CompletionVerifier {
    #[must_use]
    pub fn new(checks: Arc<dyn CompletionChecks>) -> Self {
        Self {
            checks,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Asks the remote authority whether `section_id` is complete.
    ///
    /// Transport failures are retried under the policy; the distinguished
    /// "no record" error becomes `Ok(MissingRecord)` instead of a failure.
    ///
    /// # Errors
    ///
    /// Terminal `ApiError`s other than `NoCompletionRecord`: exhausted
    /// transport retries, auth rejection, validation, server failures.
    pub async fn check(
        &self,
        lesson_id: LessonId,
        section_id: &SectionId,
    ) -> Result<RemoteCompletion, ApiError> {
        let checks = &self.checks;
        let result = self
            .retry
            .run(ApiError::is_retryable, || match section_id {
                SectionId::Overview => checks.overview_completed(lesson_id),
                SectionId::Concept(concept_id) => checks.concept_completed(lesson_id, *concept_id),
                SectionId::SummaryApplication => checks.summary_completed(lesson_id),
                SectionId::GeneralExercises => checks.general_exercises_completed(lesson_id),
            })
            .await;

        match result {
            Ok(check) if check.is_completed => Ok(RemoteCompletion::Confirmed),
            Ok(_) => Ok(RemoteCompletion::Denied),
            Err(ApiError::NoCompletionRecord) => {
                tracing::warn!(
                    "no completion record for lesson {}, treating {} as complete",
                    lesson_id,
                    section_id
                );
                Ok(RemoteCompletion::MissingRecord)
            }
            Err(error) => Err(error),
        }
    }
}
