mod ids;
mod lesson;
mod progress;
mod section;
mod timer;

pub use ids::{ConceptId, ExerciseId, LessonId, ParseIdError};

pub use lesson::{
    AnswerCode, Concept, ConceptBlock, Example, Exercise, LessonDocument, LessonError,
    LessonNarrative, MAX_CONCEPTS, Objective,
};
pub use progress::{
    ExerciseProgress, LessonMetadata, ProgressError, SectionProgress, overall_percentage,
};
pub use section::{
    ParseSectionIdError, Section, SectionData, SectionId, canonical_sections, max_step,
    section_data, section_data_at, section_id_at, section_id_for, total_sections,
};
pub use timer::{PauseInterval, SectionTimeTracking};
