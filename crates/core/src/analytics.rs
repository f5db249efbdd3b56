use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::model::{ConceptId, ExerciseId, ExerciseProgress, LessonDocument, LessonId, LessonMetadata};

/// Concepts at or above this score count as strengths.
const STRONG_CONCEPT_THRESHOLD: u8 = 80;
/// Concepts below this score count as weaknesses.
const WEAK_CONCEPT_THRESHOLD: u8 = 70;
/// Pace considered optimal when rating time efficiency.
const OPTIMAL_SECS_PER_EXERCISE: f64 = 30.0;
/// Planning estimate for a not-yet-finished section.
const ESTIMATED_SECS_PER_SECTION: i64 = 300;

//
// ─── GRADE ─────────────────────────────────────────────────────────────────────
//

/// Letter grade on the platform's A to F scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl Grade {
    /// Grades a 0 to 100 percentage.
    #[must_use]
    pub fn from_percentage(percentage: u8) -> Self {
        match percentage.min(100) {
            90..=100 => Grade::A,
            80..=89 => Grade::B,
            70..=79 => Grade::C,
            60..=69 => Grade::D,
            50..=59 => Grade::E,
            _ => Grade::F,
        }
    }

    /// The 50 to 59 band is flagged for attention rather than failed.
    #[must_use]
    pub fn is_borderline(&self) -> bool {
        matches!(self, Grade::E)
    }

    /// Short learner-facing verdict for the grade.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Grade::A => "Excellent!",
            Grade::B => "Very Good!",
            Grade::C => "Good",
            Grade::D => "Fair",
            Grade::E => "Borderline. Needs Attention.",
            Grade::F => "Failed. Retake recommended.",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => 'A',
            Grade::B => 'B',
            Grade::C => 'C',
            Grade::D => 'D',
            Grade::E => 'E',
            Grade::F => 'F',
        };
        write!(f, "{letter}")
    }
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Per-concept accuracy roll-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptScore {
    pub concept_id: ConceptId,
    pub title: String,
    /// Correctly answered exercises over the concept's total, as a percentage.
    pub score: u8,
    pub attempted: u32,
    pub total: u32,
}

/// Derived view of a lesson's progress. Never authoritative; safe to throw
/// away and recompute after any ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub lesson_id: LessonId,
    /// Mirrors the ledger's overall progress percentage.
    pub completion_rate: u8,
    pub exercises_attempted: u32,
    pub exercises_correct: u32,
    /// Correct over attempted exercises, as a percentage.
    pub accuracy: u8,
    /// Exercises answered correctly on the very first attempt, as a
    /// percentage of attempted exercises.
    pub first_try_accuracy: u8,
    /// Extra attempts per attempted exercise, as a percentage. Exceeds 100
    /// when the learner averages more than one retry per exercise.
    pub retry_rate: u32,
    pub average_section_secs: Option<i64>,
    pub estimated_remaining_secs: i64,
    /// 0 to 100 rating of pace against the optimal seconds-per-exercise.
    pub time_efficiency: Option<u8>,
    pub concept_scores: Vec<ConceptScore>,
    pub grade: Grade,
    pub insight: String,
    pub recommendation: String,
    pub computed_at: DateTime<Utc>,
}

/// Computes a fresh snapshot from the authoritative records.
///
/// `section_time_secs` carries the net duration of every ended section
/// visit, current and persisted.
#[must_use]
pub fn compute_snapshot(
    document: &LessonDocument,
    metadata: &LessonMetadata,
    exercises: &HashMap<ExerciseId, ExerciseProgress>,
    section_time_secs: &[i64],
    now: DateTime<Utc>,
) -> AnalyticsSnapshot {
    let mut attempted: u32 = 0;
    let mut correct: u32 = 0;
    let mut first_try_correct: u32 = 0;
    let mut total_attempts: u32 = 0;

    for progress in exercises.values() {
        if !progress.is_completed() {
            continue;
        }
        attempted += 1;
        total_attempts += progress.attempts().max(1);
        if progress.is_correct() == Some(true) {
            correct += 1;
            if progress.attempts() == 1 {
                first_try_correct += 1;
            }
        }
    }

    let accuracy = ratio_percent(correct, attempted);
    let first_try_accuracy = ratio_percent(first_try_correct, attempted);
    let retry_rate = if attempted > 0 {
        let extra = f64::from(total_attempts - attempted);
        ((extra / f64::from(attempted)) * 100.0).round() as u32
    } else {
        0
    };

    let concept_scores = concept_breakdown(document, exercises);

    let average_section_secs = if section_time_secs.is_empty() {
        None
    } else {
        let total: i64 = section_time_secs.iter().sum();
        Some(total / section_time_secs.len() as i64)
    };

    let remaining_sections =
        i64::from(metadata.total_sections().saturating_sub(metadata.completed_sections()));
    let estimated_remaining_secs = remaining_sections * ESTIMATED_SECS_PER_SECTION;

    let time_efficiency = time_efficiency(section_time_secs, attempted);

    AnalyticsSnapshot {
        lesson_id: metadata.lesson_id(),
        completion_rate: metadata.overall_progress(),
        exercises_attempted: attempted,
        exercises_correct: correct,
        accuracy,
        first_try_accuracy,
        retry_rate,
        average_section_secs,
        estimated_remaining_secs,
        time_efficiency,
        grade: Grade::from_percentage(accuracy),
        insight: build_insight(accuracy, &concept_scores),
        recommendation: build_recommendation(accuracy),
        concept_scores,
        computed_at: now,
    }
}

fn ratio_percent(part: u32, whole: u32) -> u8 {
    if whole == 0 {
        return 0;
    }
    ((f64::from(part) / f64::from(whole)) * 100.0).round() as u8
}

fn concept_breakdown(
    document: &LessonDocument,
    exercises: &HashMap<ExerciseId, ExerciseProgress>,
) -> Vec<ConceptScore> {
    document
        .concepts()
        .iter()
        .map(|concept| {
            let total = concept.exercises.len() as u32;
            let mut attempted = 0;
            let mut correct = 0;
            for exercise in &concept.exercises {
                if let Some(progress) = exercises.get(&exercise.id) {
                    if progress.is_completed() {
                        attempted += 1;
                    }
                    if progress.is_answered_correctly() {
                        correct += 1;
                    }
                }
            }
            ConceptScore {
                concept_id: concept.id,
                title: concept.title.clone(),
                score: ratio_percent(correct, total),
                attempted,
                total,
            }
        })
        .collect()
}

fn time_efficiency(section_time_secs: &[i64], attempted: u32) -> Option<u8> {
    if attempted == 0 || section_time_secs.is_empty() {
        return None;
    }
    let total: i64 = section_time_secs.iter().sum();
    if total <= 0 {
        return None;
    }
    let per_exercise = total as f64 / f64::from(attempted);
    let rating = (OPTIMAL_SECS_PER_EXERCISE / per_exercise * 100.0).min(100.0);
    Some(rating.round() as u8)
}

/// Overall performance line plus the standout concept, when one exists.
fn build_insight(accuracy: u8, concept_scores: &[ConceptScore]) -> String {
    let mut insight = String::from(match accuracy {
        90..=100 => "Outstanding performance! You've demonstrated excellent mastery of the material.",
        75..=89 => "Great work! You have a solid understanding of most concepts.",
        60..=74 => "Good effort! There's room for improvement in some areas.",
        _ => "Keep practicing! Focus on reviewing the fundamental concepts.",
    });

    let attempted = |score: &&ConceptScore| score.attempted > 0;
    if let Some(strongest) = concept_scores
        .iter()
        .filter(attempted)
        .filter(|score| score.score >= STRONG_CONCEPT_THRESHOLD)
        .max_by_key(|score| score.score)
    {
        insight.push_str(&format!(
            " You excelled at \"{}\" with {}% mastery.",
            strongest.title, strongest.score
        ));
    }
    if let Some(weakest) = concept_scores
        .iter()
        .filter(attempted)
        .filter(|score| score.score < WEAK_CONCEPT_THRESHOLD)
        .min_by_key(|score| score.score)
    {
        insight.push_str(&format!(
            " Consider reviewing \"{}\" to strengthen your understanding.",
            weakest.title
        ));
    }

    insight
}

fn build_recommendation(accuracy: u8) -> String {
    String::from(match accuracy {
        80..=100 => "You're ready to advance to the next lesson",
        60..=79 => "Practice additional exercises before advancing",
        _ => "Retake this lesson after reviewing the concepts",
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
