use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ExerciseId, LessonId};
use crate::model::lesson::AnswerCode;
use crate::model::section::SectionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("section marked complete without a completion timestamp")]
    MissingCompletionTimestamp,

    #[error("exercises completed ({completed}) exceeds total ({total})")]
    ExerciseCountExceedsTotal { completed: u32, total: u32 },

    #[error("completed sections ({completed}) exceeds total sections ({total})")]
    CompletedExceedsTotal { completed: u32, total: u32 },

    #[error("overall progress {value} is not a percentage")]
    ProgressOutOfRange { value: u8 },

    #[error("exercise has attempts but no attempt timestamps")]
    MissingAttemptTimestamps,

    #[error("first attempt timestamp is after the last attempt")]
    AttemptTimestampOrder,

    #[error("score {value} is not a percentage")]
    ScoreOutOfRange { value: u8 },
}

/// Overall percentage for `completed` of `total` sections, rounded to the
/// nearest integer. Always recomputed from counts, never drifted.
#[must_use]
pub fn overall_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let ratio = f64::from(completed.min(total)) / f64::from(total);
    (ratio * 100.0).round() as u8
}

//
// ─── SECTION PROGRESS ──────────────────────────────────────────────────────────
//

/// Completion state for one section of one lesson.
///
/// Only ever moves toward "more complete"; nothing un-sets completion short
/// of a full lesson reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProgress {
    section_id: SectionId,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    attempts: u32,
    exercises_completed: u32,
    exercises_total: u32,
    score: Option<u8>,
}

impl SectionProgress {
    /// Fresh record for a section's first completion attempt.
    #[must_use]
    pub fn new(section_id: SectionId, exercises_total: u32) -> Self {
        Self {
            section_id,
            is_completed: false,
            completed_at: None,
            attempts: 0,
            exercises_completed: 0,
            exercises_total,
            score: None,
        }
    }

    /// Rehydrates a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::MissingCompletionTimestamp` for a completed
    /// record without a timestamp, `ProgressError::ExerciseCountExceedsTotal`
    /// for impossible exercise counts, and `ProgressError::ScoreOutOfRange`
    /// for a score above 100.
    pub fn from_persisted(
        section_id: SectionId,
        is_completed: bool,
        completed_at: Option<DateTime<Utc>>,
        attempts: u32,
        exercises_completed: u32,
        exercises_total: u32,
        score: Option<u8>,
    ) -> Result<Self, ProgressError> {
        if is_completed && completed_at.is_none() {
            return Err(ProgressError::MissingCompletionTimestamp);
        }
        if exercises_total > 0 && exercises_completed > exercises_total {
            return Err(ProgressError::ExerciseCountExceedsTotal {
                completed: exercises_completed,
                total: exercises_total,
            });
        }
        if let Some(value) = score {
            if value > 100 {
                return Err(ProgressError::ScoreOutOfRange { value });
            }
        }

        Ok(Self {
            section_id,
            is_completed,
            completed_at,
            attempts,
            exercises_completed,
            exercises_total,
            score,
        })
    }

    /// Counts one completion attempt, successful or not.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Marks the section complete. Returns true the first time only; the
    /// completion timestamp is never overwritten.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        self.completed_at = Some(now);
        true
    }

    /// Updates how many of the section's exercises are answered correctly.
    pub fn set_exercise_counts(&mut self, completed: u32, total: u32) {
        self.exercises_total = total;
        self.exercises_completed = completed.min(total);
    }

    /// Records the section score as a percentage, clamped to 100.
    pub fn set_score(&mut self, score: u8) {
        self.score = Some(score.min(100));
    }

    #[must_use]
    pub fn section_id(&self) -> &SectionId {
        &self.section_id
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn exercises_completed(&self) -> u32 {
        self.exercises_completed
    }

    #[must_use]
    pub fn exercises_total(&self) -> u32 {
        self.exercises_total
    }

    #[must_use]
    pub fn score(&self) -> Option<u8> {
        self.score
    }
}

//
// ─── EXERCISE PROGRESS ─────────────────────────────────────────────────────────
//

/// Submission state for one exercise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseProgress {
    exercise_id: ExerciseId,
    is_completed: bool,
    is_correct: Option<bool>,
    last_answer: Option<AnswerCode>,
    attempts: u32,
    first_attempt_at: Option<DateTime<Utc>>,
    last_attempt_at: Option<DateTime<Utc>>,
}

impl ExerciseProgress {
    /// Fresh record with no attempts.
    #[must_use]
    pub fn new(exercise_id: ExerciseId) -> Self {
        Self {
            exercise_id,
            is_completed: false,
            is_correct: None,
            last_answer: None,
            attempts: 0,
            first_attempt_at: None,
            last_attempt_at: None,
        }
    }

    /// Rehydrates a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::MissingAttemptTimestamps` when attempts exist
    /// without timestamps and `ProgressError::AttemptTimestampOrder` when
    /// the first attempt postdates the last.
    pub fn from_persisted(
        exercise_id: ExerciseId,
        is_completed: bool,
        is_correct: Option<bool>,
        last_answer: Option<AnswerCode>,
        attempts: u32,
        first_attempt_at: Option<DateTime<Utc>>,
        last_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        if attempts > 0 && (first_attempt_at.is_none() || last_attempt_at.is_none()) {
            return Err(ProgressError::MissingAttemptTimestamps);
        }
        if let (Some(first), Some(last)) = (first_attempt_at, last_attempt_at) {
            if first > last {
                return Err(ProgressError::AttemptTimestampOrder);
            }
        }

        Ok(Self {
            exercise_id,
            is_completed,
            is_correct,
            last_answer,
            attempts,
            first_attempt_at,
            last_attempt_at,
        })
    }

    /// Records one graded round trip.
    pub fn record_result(&mut self, answer: AnswerCode, correct: bool, now: DateTime<Utc>) {
        self.attempts += 1;
        self.is_completed = true;
        self.is_correct = Some(correct);
        self.last_answer = Some(answer);
        if self.first_attempt_at.is_none() {
            self.first_attempt_at = Some(now);
        }
        self.last_attempt_at = Some(now);
    }

    /// True once the exercise has been answered correctly; later
    /// submissions short-circuit on this.
    #[must_use]
    pub fn is_answered_correctly(&self) -> bool {
        self.is_completed && self.is_correct == Some(true)
    }

    /// True when the only graded attempt was correct.
    #[must_use]
    pub fn correct_on_first_try(&self) -> bool {
        self.attempts == 1 && self.is_correct == Some(true)
    }

    #[must_use]
    pub fn exercise_id(&self) -> ExerciseId {
        self.exercise_id
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn is_correct(&self) -> Option<bool> {
        self.is_correct
    }

    #[must_use]
    pub fn last_answer(&self) -> Option<AnswerCode> {
        self.last_answer
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn first_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.first_attempt_at
    }

    #[must_use]
    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }
}

//
// ─── LESSON METADATA ───────────────────────────────────────────────────────────
//

/// Roll-up progress for one lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonMetadata {
    lesson_id: LessonId,
    total_sections: u32,
    completed_sections: u32,
    overall_progress: u8,
    started_at: DateTime<Utc>,
    last_accessed_at: DateTime<Utc>,
    last_completed_section: Option<SectionId>,
}

impl LessonMetadata {
    /// Fresh metadata for a lesson visit starting now.
    #[must_use]
    pub fn new(lesson_id: LessonId, concept_count: usize, now: DateTime<Utc>) -> Self {
        let total_sections = u32::try_from(concept_count).unwrap_or(u32::MAX - 3) + 3;
        Self {
            lesson_id,
            total_sections,
            completed_sections: 0,
            overall_progress: 0,
            started_at: now,
            last_accessed_at: now,
            last_completed_section: None,
        }
    }

    /// Rehydrates metadata from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::CompletedExceedsTotal` when the completed
    /// count is impossible and `ProgressError::ProgressOutOfRange` when the
    /// stored percentage exceeds 100.
    pub fn from_persisted(
        lesson_id: LessonId,
        total_sections: u32,
        completed_sections: u32,
        overall_progress: u8,
        started_at: DateTime<Utc>,
        last_accessed_at: DateTime<Utc>,
        last_completed_section: Option<SectionId>,
    ) -> Result<Self, ProgressError> {
        if completed_sections > total_sections {
            return Err(ProgressError::CompletedExceedsTotal {
                completed: completed_sections,
                total: total_sections,
            });
        }
        if overall_progress > 100 {
            return Err(ProgressError::ProgressOutOfRange {
                value: overall_progress,
            });
        }

        Ok(Self {
            lesson_id,
            total_sections,
            completed_sections,
            overall_progress,
            started_at,
            last_accessed_at,
            last_completed_section,
        })
    }

    /// Stamps an interaction with the lesson.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }

    /// Replaces the completion roll-up; the percentage is recomputed from
    /// the counts, and the completed count can never exceed the total.
    pub fn update_completion(
        &mut self,
        completed_sections: u32,
        last_completed: Option<SectionId>,
        now: DateTime<Utc>,
    ) {
        self.completed_sections = completed_sections.min(self.total_sections);
        self.overall_progress = overall_percentage(self.completed_sections, self.total_sections);
        if last_completed.is_some() {
            self.last_completed_section = last_completed;
        }
        self.last_accessed_at = now;
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn total_sections(&self) -> u32 {
        self.total_sections
    }

    #[must_use]
    pub fn completed_sections(&self) -> u32 {
        self.completed_sections
    }

    #[must_use]
    pub fn overall_progress(&self) -> u8 {
        self.overall_progress
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_accessed_at(&self) -> DateTime<Utc> {
        self.last_accessed_at
    }

    #[must_use]
    pub fn last_completed_section(&self) -> Option<&SectionId> {
        self.last_completed_section.as_ref()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
