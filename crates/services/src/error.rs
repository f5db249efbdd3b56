//! Shared error types for the services crate.

use thiserror::Error;

use lesson_core::model::LessonError;
use storage::repository::StorageError;

/// One field-level message from a validation failure, as reported by the
/// platform's error envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Errors emitted by the lesson platform API client.
///
/// Only `Transport` is worth retrying; every other variant is a definitive
/// answer from the server and retrying would just repeat it.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("no completion record exists for this section")]
    NoCompletionRecord,
    #[error("exercise was already answered")]
    AlreadyAnswered,
    #[error("request rejected: {message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },
    #[error("authentication rejected")]
    Auth,
    #[error("server failed with status {status}: {message}")]
    Server { status: u16, message: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error(transparent)]
    Lesson(#[from] LessonError),
}

impl ApiError {
    /// Whether repeating the same request could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Errors emitted by `LessonEngine`.
///
/// API failures never surface here; the engine folds them into structured
/// outcomes so callers can distinguish "blocked" from "broken". Only the
/// local persistence layer can genuinely fail the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
