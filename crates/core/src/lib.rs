#![forbid(unsafe_code)]

pub mod analytics;
pub mod model;
pub mod time;

pub use analytics::{AnalyticsSnapshot, ConceptScore, Grade, compute_snapshot};
pub use model::{
    AnswerCode, Concept, ConceptId, Exercise, ExerciseId, ExerciseProgress, LessonDocument,
    LessonId, LessonMetadata, Section, SectionId, SectionProgress, SectionTimeTracking,
};
pub use time::Clock;
