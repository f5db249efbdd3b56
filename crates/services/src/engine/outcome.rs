//! Structured results for the verification and submission pipelines.
//!
//! The engine never lets a platform failure escape as an error: whatever
//! happens on the wire is folded into one of these outcomes, each carrying
//! a message ready to show the learner.

use lesson_core::model::{ExerciseId, SectionId};

use crate::error::ApiError;

//
// ─── VERIFICATION ──────────────────────────────────────────────────────────────
//

/// Result of asking the platform whether a section is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// The authority confirmed completion and the ledger was updated.
    Completed {
        section_id: SectionId,
        newly_completed: bool,
    },
    /// The authority had no record, so the section was marked complete
    /// anyway. The warning is the caller's to surface or drop.
    CompletedWithWarning {
        section_id: SectionId,
        newly_completed: bool,
        warning: String,
    },
    /// Nothing was marked.
    Blocked(BlockReason),
}

impl VerifyOutcome {
    /// Whether the section counts as complete after this verification.
    /// Hosts gate forward navigation on this.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !matches!(self, VerifyOutcome::Blocked(_))
    }
}

/// Why a verification left the section unmarked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The authority answered and said the section is not done.
    Incomplete {
        section_id: SectionId,
        message: String,
    },
    /// The check itself failed after retries.
    CheckFailed {
        section_id: SectionId,
        message: String,
    },
}

impl BlockReason {
    #[must_use]
    pub fn section_id(&self) -> SectionId {
        match self {
            BlockReason::Incomplete { section_id, .. }
            | BlockReason::CheckFailed { section_id, .. } => *section_id,
        }
    }

    /// Learner-facing explanation of the block.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            BlockReason::Incomplete { message, .. }
            | BlockReason::CheckFailed { message, .. } => message,
        }
    }
}

//
// ─── SUBMISSION ────────────────────────────────────────────────────────────────
//

/// Result of pushing one exercise answer through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// The platform graded the answer.
    Answered {
        exercise_id: ExerciseId,
        correct: bool,
        message: String,
    },
    /// The exercise was already answered correctly, either locally or by a
    /// submission that crossed this one in flight.
    AlreadyAnswered {
        exercise_id: ExerciseId,
    },
    /// Captured by the offline queue for replay on reconnect.
    Deferred {
        exercise_id: ExerciseId,
        message: String,
    },
    /// Terminal failure. The ledger did not change, so the learner can try
    /// the same exercise again.
    Failed {
        exercise_id: ExerciseId,
        message: String,
    },
}

impl SubmissionOutcome {
    /// Whether the submission settled the exercise (graded or deduplicated).
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            SubmissionOutcome::Answered { .. } | SubmissionOutcome::AlreadyAnswered { .. }
        )
    }
}

//
// ─── LEARNER-FACING MESSAGES ───────────────────────────────────────────────────
//

// Concept sections get wording that points at exercises, since those are
// what completion actually hinges on there.

pub(crate) fn incomplete_message(section_id: &SectionId) -> String {
    if section_id.is_concept() {
        "Finish all exercises in this concept before moving on.".to_string()
    } else {
        format!("The {} section is not complete yet.", section_id.label())
    }
}

pub(crate) fn check_failed_message(section_id: &SectionId, error: &ApiError) -> String {
    if section_id.is_concept() {
        format!(
            "Could not confirm the concept section: {error}. All exercises in the concept must be finished."
        )
    } else {
        format!(
            "Could not confirm the {} section: {error}.",
            section_id.label()
        )
    }
}

pub(crate) fn missing_record_message(section_id: &SectionId) -> String {
    format!(
        "No completion record found for the {} section; it was marked complete anyway.",
        section_id.label()
    )
}

pub(crate) fn offline_deferred_message() -> String {
    "You are offline. The answer was saved and will be submitted when the connection returns."
        .to_string()
}

pub(crate) fn submission_failed_message(error: &ApiError) -> String {
    match error {
        ApiError::Auth => "Your session has expired. Sign in again to continue.".to_string(),
        ApiError::Validation { message, errors } => {
            let mut text = if message.is_empty() {
                "The submission was rejected.".to_string()
            } else {
                message.clone()
            };
            if let Some(field) = errors.first() {
                text.push(' ');
                text.push_str(&field.message);
            }
            text
        }
        _ => format!("Could not submit the answer: {error}. Try again."),
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
