//! The progress and metadata ledger for one lesson visit.
//!
//! Single source of truth for which sections and exercises are complete.
//! Rows only ever move toward "more complete"; nothing un-sets them short of
//! an explicit reset. The roll-up percentage is always recomputed from the
//! canonical section list, never drifted incrementally. The engine mirrors
//! every mutation here to the repository.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use lesson_core::model::{
    AnswerCode, ExerciseId, ExerciseProgress, LessonDocument, LessonId, LessonMetadata, SectionId,
    SectionProgress, canonical_sections, overall_percentage,
};
use storage::repository::LessonProgressSnapshot;

/// Result of one completion-marking call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionMarked {
    /// True the first time only; re-marking is idempotent.
    pub newly_completed: bool,
    /// Attempt count after this call.
    pub attempts: u32,
}

pub struct ProgressLedger {
    lesson_id: LessonId,
    /// Every section of the lesson in navigation order.
    canonical: Vec<SectionId>,
    section_exercises: HashMap<SectionId, Vec<ExerciseId>>,
    exercise_sections: HashMap<ExerciseId, SectionId>,
    sections: HashMap<SectionId, SectionProgress>,
    exercises: HashMap<ExerciseId, ExerciseProgress>,
    metadata: LessonMetadata,
}

impl ProgressLedger {
    /// An empty ledger shaped after the given document.
    #[must_use]
    pub fn new(document: &LessonDocument, now: DateTime<Utc>) -> Self {
        let canonical = canonical_sections(document);

        let mut section_exercises: HashMap<SectionId, Vec<ExerciseId>> = HashMap::new();
        let mut exercise_sections: HashMap<ExerciseId, SectionId> = HashMap::new();
        for section_id in &canonical {
            let ids: Vec<ExerciseId> = match section_id {
                SectionId::Concept(concept_id) => document
                    .concept_by_id(*concept_id)
                    .map(|concept| concept.exercises.iter().map(|e| e.id).collect())
                    .unwrap_or_default(),
                SectionId::GeneralExercises => {
                    document.general_exercises().iter().map(|e| e.id).collect()
                }
                _ => Vec::new(),
            };
            for id in &ids {
                exercise_sections.insert(*id, *section_id);
            }
            section_exercises.insert(*section_id, ids);
        }

        Self {
            lesson_id: document.id(),
            canonical,
            section_exercises,
            exercise_sections,
            sections: HashMap::new(),
            exercises: HashMap::new(),
            metadata: LessonMetadata::new(document.id(), document.concept_count(), now),
        }
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Marks a section complete, idempotently.
    ///
    /// Every call counts an attempt; only the first completion moves the
    /// roll-up. Completing a section with exercises freezes its score as the
    /// share answered correctly at that moment.
    pub fn mark_section_complete(
        &mut self,
        section_id: SectionId,
        now: DateTime<Utc>,
    ) -> SectionMarked {
        let exercises_total = self.exercise_total_for(&section_id);
        let entry = self
            .sections
            .entry(section_id)
            .or_insert_with(|| SectionProgress::new(section_id, exercises_total));
        entry.record_attempt();
        let newly_completed = entry.mark_completed(now);
        if newly_completed && entry.exercises_total() > 0 {
            entry.set_score(overall_percentage(
                entry.exercises_completed(),
                entry.exercises_total(),
            ));
        }
        let attempts = entry.attempts();

        if newly_completed {
            self.recompute_completion(Some(section_id), now);
        } else {
            self.metadata.touch(now);
        }

        SectionMarked {
            newly_completed,
            attempts,
        }
    }

    /// Records a graded answer round trip for an exercise.
    ///
    /// Attempts increment on every call; the owning section's exercise
    /// counts are refreshed when the exercise belongs to this lesson.
    pub fn record_exercise_result(
        &mut self,
        exercise_id: ExerciseId,
        answer: AnswerCode,
        correct: bool,
        now: DateTime<Utc>,
    ) {
        self.exercises
            .entry(exercise_id)
            .or_insert_with(|| ExerciseProgress::new(exercise_id))
            .record_result(answer, correct, now);
        if let Some(section_id) = self.exercise_sections.get(&exercise_id).copied() {
            self.refresh_exercise_counts(section_id);
        }
        self.metadata.touch(now);
    }

    /// Loads persisted rows, dropping any that no longer match the document.
    ///
    /// The persisted start timestamp survives; the completion roll-up is
    /// recomputed against the current canonical list rather than trusted
    /// from disk.
    pub fn hydrate(&mut self, snapshot: LessonProgressSnapshot, now: DateTime<Utc>) {
        for section in snapshot.sections {
            if self.canonical.contains(section.section_id()) {
                let section_id = *section.section_id();
                self.sections.insert(section_id, section);
            }
        }
        for exercise in snapshot.exercises {
            if self.exercise_sections.contains_key(&exercise.exercise_id()) {
                self.exercises.insert(exercise.exercise_id(), exercise);
            }
        }
        let canonical = self.canonical.clone();
        for section_id in canonical {
            self.refresh_exercise_counts(section_id);
        }

        if let Some(persisted) = snapshot.metadata {
            if persisted.lesson_id() == self.lesson_id {
                let total = u32::try_from(self.canonical.len()).unwrap_or(u32::MAX);
                let completed = self.completed_section_count().min(total);
                let last_completed = persisted
                    .last_completed_section()
                    .copied()
                    .filter(|id| self.canonical.contains(id));
                if let Ok(metadata) = LessonMetadata::from_persisted(
                    self.lesson_id,
                    total,
                    completed,
                    overall_percentage(completed, total),
                    persisted.started_at(),
                    now,
                    last_completed,
                ) {
                    self.metadata = metadata;
                }
            }
        }
        self.recompute_completion(None, now);
    }

    /// Clears every row and restarts the metadata at zero.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.sections.clear();
        self.exercises.clear();
        let concept_count = self.canonical.len().saturating_sub(3);
        self.metadata = LessonMetadata::new(self.lesson_id, concept_count, now);
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn metadata(&self) -> &LessonMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn section(&self, section_id: &SectionId) -> Option<&SectionProgress> {
        self.sections.get(section_id)
    }

    #[must_use]
    pub fn exercise(&self, exercise_id: ExerciseId) -> Option<&ExerciseProgress> {
        self.exercises.get(&exercise_id)
    }

    #[must_use]
    pub fn exercises(&self) -> &HashMap<ExerciseId, ExerciseProgress> {
        &self.exercises
    }

    #[must_use]
    pub fn canonical_sections(&self) -> &[SectionId] {
        &self.canonical
    }

    /// Position of the section in the canonical order.
    #[must_use]
    pub fn step_of(&self, section_id: &SectionId) -> Option<usize> {
        self.canonical.iter().position(|id| id == section_id)
    }

    #[must_use]
    pub fn is_section_complete(&self, section_id: &SectionId) -> bool {
        self.sections
            .get(section_id)
            .is_some_and(SectionProgress::is_completed)
    }

    #[must_use]
    pub fn is_lesson_complete(&self) -> bool {
        self.canonical.iter().all(|id| self.is_section_complete(id))
    }

    /// First canonical section the ledger does not mark complete.
    #[must_use]
    pub fn next_incomplete(&self) -> Option<SectionId> {
        self.canonical
            .iter()
            .copied()
            .find(|id| !self.is_section_complete(id))
    }

    #[must_use]
    pub fn is_exercise_answered(&self, exercise_id: ExerciseId) -> bool {
        self.exercises
            .get(&exercise_id)
            .is_some_and(ExerciseProgress::is_answered_correctly)
    }

    /// True when every exercise of the section has a correct answer.
    ///
    /// Sections without exercises count as answered.
    #[must_use]
    pub fn section_exercises_answered(&self, section_id: &SectionId) -> bool {
        self.section_exercises.get(section_id).is_none_or(|ids| {
            ids.iter().all(|id| {
                self.exercises
                    .get(id)
                    .is_some_and(ExerciseProgress::is_answered_correctly)
            })
        })
    }

    #[must_use]
    pub fn section_of_exercise(&self, exercise_id: ExerciseId) -> Option<SectionId> {
        self.exercise_sections.get(&exercise_id).copied()
    }

    /// Current rows in the persisted snapshot shape, for carrying progress
    /// across a document refresh.
    #[must_use]
    pub fn to_snapshot(&self) -> LessonProgressSnapshot {
        LessonProgressSnapshot {
            metadata: Some(self.metadata.clone()),
            sections: self
                .canonical
                .iter()
                .filter_map(|id| self.sections.get(id).cloned())
                .collect(),
            exercises: self.exercises.values().cloned().collect(),
        }
    }

    //
    // ─── INTERNALS ─────────────────────────────────────────────────────────────
    //

    fn exercise_total_for(&self, section_id: &SectionId) -> u32 {
        self.section_exercises
            .get(section_id)
            .map_or(0, |ids| u32::try_from(ids.len()).unwrap_or(u32::MAX))
    }

    fn completed_section_count(&self) -> u32 {
        let completed = self
            .canonical
            .iter()
            .filter(|id| self.is_section_complete(id))
            .count();
        u32::try_from(completed).unwrap_or(u32::MAX)
    }

    fn recompute_completion(&mut self, last_completed: Option<SectionId>, now: DateTime<Utc>) {
        let completed = self.completed_section_count();
        self.metadata.update_completion(completed, last_completed, now);
    }

    fn refresh_exercise_counts(&mut self, section_id: SectionId) {
        let Some(ids) = self.section_exercises.get(&section_id) else {
            return;
        };
        if ids.is_empty() {
            return;
        }
        let total = u32::try_from(ids.len()).unwrap_or(u32::MAX);
        let completed = ids
            .iter()
            .filter(|id| {
                self.exercises
                    .get(*id)
                    .is_some_and(ExerciseProgress::is_answered_correctly)
            })
            .count();
        let completed = u32::try_from(completed).unwrap_or(u32::MAX);
        // Section rows appear on first progress, not eagerly.
        if completed == 0 && !self.sections.contains_key(&section_id) {
            return;
        }
        let entry = self
            .sections
            .entry(section_id)
            .or_insert_with(|| SectionProgress::new(section_id, total));
        entry.set_exercise_counts(completed, total);
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
