use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{ConceptId, ExerciseId, LessonId};

/// Upper bound on concepts per lesson.
///
/// The upstream completion-marker schema tracks per-concept completion in
/// seven fixed columns, so a document with more concepts could never be
/// verified section by section.
pub const MAX_CONCEPTS: usize = 7;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson topic cannot be empty")]
    EmptyTopic,

    #[error("lesson has {count} concepts, at most {MAX_CONCEPTS} are supported")]
    TooManyConcepts { count: usize },

    #[error("duplicate concept id {id} in lesson document")]
    DuplicateConceptId { id: ConceptId },

    #[error("duplicate exercise id {id} in lesson document")]
    DuplicateExerciseId { id: ExerciseId },

    #[error("'{found}' is not a single-letter answer code")]
    InvalidAnswerCode { found: String },
}

//
// ─── ANSWER CODE ───────────────────────────────────────────────────────────────
//

/// A single-letter answer option code (`A`, `B`, `C`, ...).
///
/// The remote answer check accepts nothing else, so the type guards the
/// whole submission path. Lowercase input is normalized on construction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "char", into = "char")]
pub struct AnswerCode(char);

impl AnswerCode {
    /// Creates an answer code from a letter.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::InvalidAnswerCode` if the character is not an
    /// ASCII letter.
    pub fn new(letter: char) -> Result<Self, LessonError> {
        if letter.is_ascii_alphabetic() {
            Ok(Self(letter.to_ascii_uppercase()))
        } else {
            Err(LessonError::InvalidAnswerCode {
                found: letter.to_string(),
            })
        }
    }

    /// Returns the uppercase letter.
    #[must_use]
    pub fn letter(&self) -> char {
        self.0
    }
}

impl TryFrom<char> for AnswerCode {
    type Error = LessonError;

    fn try_from(letter: char) -> Result<Self, Self::Error> {
        Self::new(letter)
    }
}

impl From<AnswerCode> for char {
    fn from(code: AnswerCode) -> Self {
        code.0
    }
}

impl FromStr for AnswerCode {
    type Err = LessonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(letter), None) => Self::new(letter),
            _ => Err(LessonError::InvalidAnswerCode {
                found: s.to_string(),
            }),
        }
    }
}

impl fmt::Debug for AnswerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnswerCode({})", self.0)
    }
}

impl fmt::Display for AnswerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//
// ─── DOCUMENT PARTS ────────────────────────────────────────────────────────────
//

/// One block of a concept's explanation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptBlock {
    pub heading: Option<String>,
    pub body: String,
    pub points: Vec<String>,
    pub image_path: Option<String>,
}

/// A learning objective shown in the overview section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub description: String,
    pub points: Vec<String>,
}

/// A worked example inside a concept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub id: u64,
    pub title: String,
    pub problem: String,
    pub solution_steps: Vec<String>,
    pub answer: String,
}

/// An exercise the learner answers, concept-scoped or general.
///
/// The engine never grades locally; `correct_answer` is display data for
/// the post-answer walkthrough, the verdict always comes from the remote
/// authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub title: String,
    pub problem: String,
    pub solution_steps: Vec<String>,
    pub answer_options: Vec<String>,
    pub correct_answer: String,
}

/// A concept chapter of a lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub id: ConceptId,
    pub order_index: u32,
    pub title: String,
    pub blocks: Vec<ConceptBlock>,
    pub examples: Vec<Example>,
    pub exercises: Vec<Exercise>,
}

/// The prose payload of a lesson: everything that is not a concept or an
/// exercise list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonNarrative {
    pub overview: String,
    pub objectives: Vec<Objective>,
    pub key_concepts: BTreeMap<String, String>,
    pub summary: String,
    pub application: String,
    pub video_path: Option<String>,
}

//
// ─── LESSON DOCUMENT ───────────────────────────────────────────────────────────
//

/// Immutable snapshot of one lesson, fetched once per visit.
///
/// Concepts are kept sorted by their order index; the document is read-only
/// to the progress engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonDocument {
    id: LessonId,
    subject_slug: String,
    topic: String,
    narrative: LessonNarrative,
    concepts: Vec<Concept>,
    general_exercises: Vec<Exercise>,
}

impl LessonDocument {
    /// Builds a validated lesson document.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyTopic` if the topic is blank,
    /// `LessonError::TooManyConcepts` past the seven-concept ceiling, and
    /// the duplicate-id variants when concept or exercise ids repeat.
    pub fn new(
        id: LessonId,
        subject_slug: impl Into<String>,
        topic: impl Into<String>,
        narrative: LessonNarrative,
        mut concepts: Vec<Concept>,
        general_exercises: Vec<Exercise>,
    ) -> Result<Self, LessonError> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(LessonError::EmptyTopic);
        }
        if concepts.len() > MAX_CONCEPTS {
            return Err(LessonError::TooManyConcepts {
                count: concepts.len(),
            });
        }

        concepts.sort_by_key(|concept| concept.order_index);

        let mut concept_ids = HashSet::new();
        for concept in &concepts {
            if !concept_ids.insert(concept.id) {
                return Err(LessonError::DuplicateConceptId { id: concept.id });
            }
        }

        let mut exercise_ids = HashSet::new();
        let all_exercises = concepts
            .iter()
            .flat_map(|concept| concept.exercises.iter())
            .chain(general_exercises.iter());
        for exercise in all_exercises {
            if !exercise_ids.insert(exercise.id) {
                return Err(LessonError::DuplicateExerciseId { id: exercise.id });
            }
        }

        Ok(Self {
            id,
            subject_slug: subject_slug.into(),
            topic,
            narrative,
            concepts,
            general_exercises,
        })
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn subject_slug(&self) -> &str {
        &self.subject_slug
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn narrative(&self) -> &LessonNarrative {
        &self.narrative
    }

    #[must_use]
    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    #[must_use]
    pub fn general_exercises(&self) -> &[Exercise] {
        &self.general_exercises
    }

    #[must_use]
    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    /// Concept at a 0-based offset in document order, if in range.
    #[must_use]
    pub fn concept_at(&self, offset: usize) -> Option<&Concept> {
        self.concepts.get(offset)
    }

    #[must_use]
    pub fn concept_by_id(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.iter().find(|concept| concept.id == id)
    }

    /// Looks an exercise up in the concept lists and the general list.
    #[must_use]
    pub fn exercise_by_id(&self, id: ExerciseId) -> Option<&Exercise> {
        self.concepts
            .iter()
            .flat_map(|concept| concept.exercises.iter())
            .chain(self.general_exercises.iter())
            .find(|exercise| exercise.id == id)
    }

    /// The concept whose exercise list contains the given exercise.
    #[must_use]
    pub fn concept_owning_exercise(&self, id: ExerciseId) -> Option<&Concept> {
        self.concepts
            .iter()
            .find(|concept| concept.exercises.iter().any(|exercise| exercise.id == id))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn narrative() -> LessonNarrative {
        LessonNarrative {
            overview: "What fractions are".to_string(),
            objectives: vec![Objective {
                description: "Recognize a fraction".to_string(),
                points: vec!["numerator".to_string(), "denominator".to_string()],
            }],
            key_concepts: BTreeMap::new(),
            summary: "Fractions represent parts of a whole".to_string(),
            application: "Sharing a pizza fairly".to_string(),
            video_path: None,
        }
    }

    fn exercise(id: u64) -> Exercise {
        Exercise {
            id: ExerciseId::new(id),
            title: format!("Exercise {id}"),
            problem: "1/2 + 1/4 = ?".to_string(),
            solution_steps: vec!["Find a common denominator".to_string()],
            answer_options: vec!["3/4".to_string(), "2/6".to_string()],
            correct_answer: "A".to_string(),
        }
    }

    fn concept(id: u64, order_index: u32, exercise_ids: &[u64]) -> Concept {
        Concept {
            id: ConceptId::new(id),
            order_index,
            title: format!("Concept {id}"),
            blocks: vec![ConceptBlock {
                heading: None,
                body: "Definition".to_string(),
                points: Vec::new(),
                image_path: None,
            }],
            examples: Vec::new(),
            exercises: exercise_ids.iter().map(|&id| exercise(id)).collect(),
        }
    }

    fn document(concepts: Vec<Concept>) -> Result<LessonDocument, LessonError> {
        LessonDocument::new(
            LessonId::new(1),
            "mathematics",
            "Fractions",
            narrative(),
            concepts,
            vec![exercise(900), exercise(901)],
        )
    }

    #[test]
    fn builds_and_sorts_concepts_by_order_index() {
        let doc = document(vec![concept(20, 2, &[2]), concept(10, 1, &[1])]).unwrap();
        let ids: Vec<u64> = doc.concepts().iter().map(|c| c.id.value()).collect();
        assert_eq!(ids, vec![10, 20]);
        assert_eq!(doc.concept_count(), 2);
    }

    #[test]
    fn rejects_blank_topic() {
        let result = LessonDocument::new(
            LessonId::new(1),
            "mathematics",
            "   ",
            narrative(),
            Vec::new(),
            Vec::new(),
        );
        assert_eq!(result.unwrap_err(), LessonError::EmptyTopic);
    }

    #[test]
    fn rejects_eighth_concept() {
        let concepts = (1..=8).map(|i| concept(i, i as u32, &[])).collect();
        let result = document(concepts);
        assert_eq!(
            result.unwrap_err(),
            LessonError::TooManyConcepts { count: 8 }
        );
    }

    #[test]
    fn rejects_duplicate_concept_ids() {
        let result = document(vec![concept(5, 1, &[1]), concept(5, 2, &[2])]);
        assert_eq!(
            result.unwrap_err(),
            LessonError::DuplicateConceptId {
                id: ConceptId::new(5)
            }
        );
    }

    #[test]
    fn rejects_duplicate_exercise_ids_across_scopes() {
        // 900 appears both in a concept and in the general list.
        let result = document(vec![concept(5, 1, &[900])]);
        assert_eq!(
            result.unwrap_err(),
            LessonError::DuplicateExerciseId {
                id: ExerciseId::new(900)
            }
        );
    }

    #[test]
    fn finds_owning_concept_for_exercise() {
        let doc = document(vec![concept(5, 1, &[50, 51]), concept(6, 2, &[60])]).unwrap();
        let owner = doc.concept_owning_exercise(ExerciseId::new(51)).unwrap();
        assert_eq!(owner.id, ConceptId::new(5));
        assert!(doc.concept_owning_exercise(ExerciseId::new(900)).is_none());
        assert!(doc.exercise_by_id(ExerciseId::new(900)).is_some());
    }

    #[test]
    fn answer_code_normalizes_and_validates() {
        assert_eq!(AnswerCode::new('b').unwrap().letter(), 'B');
        assert_eq!("c".parse::<AnswerCode>().unwrap().letter(), 'C');
        assert!(AnswerCode::new('3').is_err());
        assert!("AB".parse::<AnswerCode>().is_err());
        assert_eq!(AnswerCode::new('A').unwrap().to_string(), "A");
    }
}
