//! Wire types for the lesson platform API.
//!
//! Every endpoint wraps its payload in the platform's standard envelope
//! (`success`, `message`, `content`, `code`, `errors`). The document DTOs
//! mirror the content endpoint's JSON and convert into the validated
//! `LessonDocument` from the core crate.

use std::collections::BTreeMap;

use serde::Deserialize;

use lesson_core::model::{
    Concept, ConceptBlock, ConceptId, Example, Exercise, ExerciseId, LessonDocument, LessonError,
    LessonId, LessonNarrative, Objective,
};

use crate::error::FieldError;

//
// ─── ENVELOPE ──────────────────────────────────────────────────────────────────
//

/// The platform's standard response envelope.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub content: Option<T>,
    /// Mirrors the HTTP status; 0 when the body omits it.
    #[serde(default)]
    pub code: u16,
    /// Field name to messages, populated on validation failures.
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<String>>,
}

impl<T> ApiEnvelope<T> {
    /// Flattens the per-field error map into a list, field order stable.
    #[must_use]
    pub fn field_errors(&self) -> Vec<FieldError> {
        self.errors
            .iter()
            .flat_map(|(field, messages)| {
                messages.iter().map(|message| FieldError {
                    field: field.clone(),
                    message: message.clone(),
                })
            })
            .collect()
    }
}

//
// ─── CHECK PAYLOADS ────────────────────────────────────────────────────────────
//

/// Content of a section completion check.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CompletionCheck {
    pub is_completed: bool,
}

/// Graded result of one answer submission, assembled from the envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerVerdict {
    pub is_correct: bool,
    pub message: String,
}

/// Which answer-check endpoint a submission goes to.
///
/// Concept exercises and general exercises are distinct resources upstream
/// with separate endpoints and payload key names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExerciseScope {
    Concept,
    General,
}

//
// ─── CONTENT DTOS ──────────────────────────────────────────────────────────────
//

/// Content of the lesson content endpoint; the document sits under `lesson`.
#[derive(Debug, Deserialize)]
pub struct LessonContentDto {
    pub lesson: LessonDocumentDto,
}

/// Lesson row as served by the content endpoint, narrative fields flat.
#[derive(Debug, Deserialize)]
pub struct LessonDocumentDto {
    pub id: u64,
    pub subject_slug: String,
    pub topic: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub objectives: Vec<ObjectiveDto>,
    #[serde(default)]
    pub key_concepts: BTreeMap<String, String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    pub concepts: Vec<ConceptDto>,
    #[serde(default)]
    pub general_exercises: Vec<ExerciseDto>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectiveDto {
    pub description: String,
    #[serde(default)]
    pub points: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConceptDto {
    pub id: u64,
    #[serde(default)]
    pub order_index: u32,
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<ConceptBlockDto>,
    #[serde(default)]
    pub examples: Vec<ExampleDto>,
    #[serde(default)]
    pub exercises: Vec<ExerciseDto>,
}

#[derive(Debug, Deserialize)]
pub struct ConceptBlockDto {
    #[serde(default)]
    pub heading: Option<String>,
    pub body: String,
    #[serde(default)]
    pub points: Vec<String>,
    #[serde(default)]
    pub image_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExampleDto {
    pub id: u64,
    pub title: String,
    pub problem: String,
    #[serde(default)]
    pub solution_steps: Vec<String>,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Deserialize)]
pub struct ExerciseDto {
    pub id: u64,
    pub title: String,
    pub problem: String,
    #[serde(default)]
    pub solution_steps: Vec<String>,
    #[serde(default)]
    pub answer_options: Vec<String>,
    #[serde(default)]
    pub correct_answer: String,
}

//
// ─── DTO TO DOMAIN ─────────────────────────────────────────────────────────────
//

impl From<ObjectiveDto> for Objective {
    fn from(dto: ObjectiveDto) -> Self {
        Objective {
            description: dto.description,
            points: dto.points,
        }
    }
}

impl From<ConceptBlockDto> for ConceptBlock {
    fn from(dto: ConceptBlockDto) -> Self {
        ConceptBlock {
            heading: dto.heading,
            body: dto.body,
            points: dto.points,
            image_path: dto.image_path,
        }
    }
}

impl From<ExampleDto> for Example {
    fn from(dto: ExampleDto) -> Self {
        Example {
            id: dto.id,
            title: dto.title,
            problem: dto.problem,
            solution_steps: dto.solution_steps,
            answer: dto.answer,
        }
    }
}

impl From<ExerciseDto> for Exercise {
    fn from(dto: ExerciseDto) -> Self {
        Exercise {
            id: ExerciseId::new(dto.id),
            title: dto.title,
            problem: dto.problem,
            solution_steps: dto.solution_steps,
            answer_options: dto.answer_options,
            correct_answer: dto.correct_answer,
        }
    }
}

impl From<ConceptDto> for Concept {
    fn from(dto: ConceptDto) -> Self {
        Concept {
            id: ConceptId::new(dto.id),
            order_index: dto.order_index,
            title: dto.title,
            blocks: dto.blocks.into_iter().map(ConceptBlock::from).collect(),
            examples: dto.examples.into_iter().map(Example::from).collect(),
            exercises: dto.exercises.into_iter().map(Exercise::from).collect(),
        }
    }
}

impl TryFrom<LessonDocumentDto> for LessonDocument {
    type Error = LessonError;

    fn try_from(dto: LessonDocumentDto) -> Result<Self, Self::Error> {
        let narrative = LessonNarrative {
            overview: dto.overview,
            objectives: dto.objectives.into_iter().map(Objective::from).collect(),
            key_concepts: dto.key_concepts,
            summary: dto.summary,
            application: dto.application,
            video_path: dto.video_path,
        };
        LessonDocument::new(
            LessonId::new(dto.id),
            dto.subject_slug,
            dto.topic,
            narrative,
            dto.concepts.into_iter().map(Concept::from).collect(),
            dto.general_exercises
                .into_iter()
                .map(Exercise::from)
                .collect(),
        )
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_decodes_platform_shape() {
        let body = r#"{
            "success": false,
            "message": "The given data was invalid.",
            "content": null,
            "code": 422,
            "errors": {
                "answer": ["The answer field is required."],
                "exercise_id": ["The selected exercise id is invalid."]
            }
        }"#;

        let envelope: ApiEnvelope<CompletionCheck> =
            serde_json::from_str(body).expect("envelope should decode");

        assert!(!envelope.success);
        assert_eq!(envelope.code, 422);
        assert!(envelope.content.is_none());

        let fields = envelope.field_errors();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].field, "answer");
        assert_eq!(fields[1].field, "exercise_id");
    }

    #[test]
    fn envelope_tolerates_missing_optional_fields() {
        let body = r#"{"success": true, "content": {"is_completed": true}}"#;

        let envelope: ApiEnvelope<CompletionCheck> =
            serde_json::from_str(body).expect("envelope should decode");

        assert!(envelope.success);
        assert_eq!(envelope.code, 0);
        assert!(envelope.message.is_empty());
        assert!(envelope.content.map(|c| c.is_completed).unwrap_or(false));
    }

    #[test]
    fn lesson_dto_converts_into_validated_document() {
        let body = r#"{
            "id": 42,
            "subject_slug": "mathematics",
            "topic": "fractions",
            "overview": "What fractions are",
            "objectives": [{"description": "Recognize a fraction"}],
            "summary": "Parts of a whole",
            "application": "Sharing fairly",
            "concepts": [
                {
                    "id": 7,
                    "order_index": 2,
                    "title": "Equivalent fractions",
                    "exercises": [
                        {"id": 71, "title": "Ex 1", "problem": "1/2 = ?", "correct_answer": "B"}
                    ]
                },
                {"id": 5, "order_index": 1, "title": "Naming fractions"}
            ],
            "general_exercises": [
                {"id": 90, "title": "Mixed", "problem": "2/4 + 1/4 = ?", "correct_answer": "A"}
            ]
        }"#;

        let dto: LessonDocumentDto = serde_json::from_str(body).expect("dto should decode");
        let document = LessonDocument::try_from(dto).expect("document should validate");

        assert_eq!(document.id(), LessonId::new(42));
        assert_eq!(document.concept_count(), 2);
        // Sorted by order_index, not wire order.
        assert_eq!(document.concepts()[0].id, ConceptId::new(5));
        assert_eq!(document.concepts()[1].id, ConceptId::new(7));
        assert!(document.exercise_by_id(ExerciseId::new(90)).is_some());
        assert!(
            document
                .concept_owning_exercise(ExerciseId::new(71))
                .is_some()
        );
    }

    #[test]
    fn lesson_dto_with_blank_topic_is_rejected() {
        let body = r#"{"id": 1, "subject_slug": "math", "topic": "   "}"#;

        let dto: LessonDocumentDto = serde_json::from_str(body).expect("dto should decode");

        assert!(matches!(
            LessonDocument::try_from(dto),
            Err(LessonError::EmptyTopic)
        ));
    }
}
