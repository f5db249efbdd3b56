use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::ConceptId;
use crate::model::lesson::{Concept, Exercise, LessonDocument, Objective};

//
// ─── SECTION ID ────────────────────────────────────────────────────────────────
//

/// Stable key naming one navigable unit of a lesson.
///
/// The string form (`overview`, `concept_<id>`, `summary_application`,
/// `general_exercises`) is the join key shared by navigation, verification,
/// the ledger, and the timer, and is what persistence stores. Concept ids
/// are globally unique, so keys never collide across lessons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SectionId {
    Overview,
    Concept(ConceptId),
    SummaryApplication,
    GeneralExercises,
}

impl SectionId {
    #[must_use]
    pub fn is_concept(&self) -> bool {
        matches!(self, SectionId::Concept(_))
    }

    /// The concept id, when this key names a concept section.
    #[must_use]
    pub fn concept_id(&self) -> Option<ConceptId> {
        match self {
            SectionId::Concept(id) => Some(*id),
            _ => None,
        }
    }

    /// Short human label used in learner-facing messages.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            SectionId::Overview => "overview",
            SectionId::Concept(_) => "concept",
            SectionId::SummaryApplication => "summary and application",
            SectionId::GeneralExercises => "general exercises",
        }
    }
}

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionId::Overview => write!(f, "overview"),
            SectionId::Concept(id) => write!(f, "concept_{id}"),
            SectionId::SummaryApplication => write!(f, "summary_application"),
            SectionId::GeneralExercises => write!(f, "general_exercises"),
        }
    }
}

/// Error type for parsing a section key from its string form.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unrecognized section id '{0}'")]
pub struct ParseSectionIdError(String);

impl FromStr for SectionId {
    type Err = ParseSectionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overview" => Ok(SectionId::Overview),
            "summary_application" => Ok(SectionId::SummaryApplication),
            "general_exercises" => Ok(SectionId::GeneralExercises),
            other => other
                .strip_prefix("concept_")
                .and_then(|raw| raw.parse::<ConceptId>().ok())
                .map(SectionId::Concept)
                .ok_or_else(|| ParseSectionIdError(other.to_string())),
        }
    }
}

impl From<SectionId> for String {
    fn from(id: SectionId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for SectionId {
    type Error = ParseSectionIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

//
// ─── STEP CLASSIFICATION ───────────────────────────────────────────────────────
//

/// Where a step index lands inside a lesson's linear flow.
///
/// The flow is overview, each concept in document order, summary and
/// application, then general exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Overview,
    Concept { offset: usize },
    SummaryApplication,
    GeneralExercises,
}

impl Section {
    /// Classifies a 0-based step index against the lesson's concept count.
    ///
    /// Out-of-range indices classify back to the overview instead of
    /// failing, so a stale index observed during resume never strands the
    /// caller.
    #[must_use]
    pub fn classify(step: usize, concept_count: usize) -> Self {
        match step {
            0 => Section::Overview,
            s if (1..=concept_count).contains(&s) => Section::Concept { offset: s - 1 },
            s if s == concept_count + 1 => Section::SummaryApplication,
            s if s == concept_count + 2 => Section::GeneralExercises,
            _ => Section::Overview,
        }
    }

    /// The step index this section occupies for the given concept count.
    #[must_use]
    pub fn step_index(&self, concept_count: usize) -> usize {
        match self {
            Section::Overview => 0,
            Section::Concept { offset } => offset + 1,
            Section::SummaryApplication => concept_count + 1,
            Section::GeneralExercises => concept_count + 2,
        }
    }
}

/// Last valid step index for a lesson with `concept_count` concepts.
#[must_use]
pub fn max_step(concept_count: usize) -> usize {
    concept_count + 2
}

/// Number of navigable sections: overview + concepts + summary + general.
#[must_use]
pub fn total_sections(concept_count: usize) -> usize {
    concept_count + 3
}

/// The canonical ordered section keys for a document.
#[must_use]
pub fn canonical_sections(document: &LessonDocument) -> Vec<SectionId> {
    let mut sections = Vec::with_capacity(total_sections(document.concept_count()));
    sections.push(SectionId::Overview);
    sections.extend(
        document
            .concepts()
            .iter()
            .map(|concept| SectionId::Concept(concept.id)),
    );
    sections.push(SectionId::SummaryApplication);
    sections.push(SectionId::GeneralExercises);
    sections
}

/// Resolves the section key a classified section refers to in this document.
///
/// Returns `None` only for a concept offset the document does not have,
/// which can happen transiently when a classification outlives a document
/// refresh during resume or navigation.
#[must_use]
pub fn section_id_for(document: &LessonDocument, section: Section) -> Option<SectionId> {
    match section {
        Section::Overview => Some(SectionId::Overview),
        Section::Concept { offset } => document
            .concept_at(offset)
            .map(|concept| SectionId::Concept(concept.id)),
        Section::SummaryApplication => Some(SectionId::SummaryApplication),
        Section::GeneralExercises => Some(SectionId::GeneralExercises),
    }
}

/// Classifies a step against this document and resolves its section key.
#[must_use]
pub fn section_id_at(document: &LessonDocument, step: usize) -> Option<SectionId> {
    section_id_for(document, Section::classify(step, document.concept_count()))
}

//
// ─── SECTION DATA ──────────────────────────────────────────────────────────────
//

/// The payload a renderer needs for one section, borrowed from the document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SectionData<'a> {
    Overview {
        overview: &'a str,
        objectives: &'a [Objective],
    },
    Concept(&'a Concept),
    SummaryApplication {
        summary: &'a str,
        application: &'a str,
    },
    GeneralExercises(&'a [Exercise]),
}

/// Extracts the payload for a classified section.
///
/// A concept offset out of the document's range yields `None` rather than
/// an error; every other classification always has data.
#[must_use]
pub fn section_data(document: &LessonDocument, section: Section) -> Option<SectionData<'_>> {
    match section {
        Section::Overview => Some(SectionData::Overview {
            overview: &document.narrative().overview,
            objectives: &document.narrative().objectives,
        }),
        Section::Concept { offset } => document.concept_at(offset).map(SectionData::Concept),
        Section::SummaryApplication => Some(SectionData::SummaryApplication {
            summary: &document.narrative().summary,
            application: &document.narrative().application,
        }),
        Section::GeneralExercises => {
            Some(SectionData::GeneralExercises(document.general_exercises()))
        }
    }
}

/// Classifies a step against this document and extracts its payload.
#[must_use]
pub fn section_data_at(document: &LessonDocument, step: usize) -> Option<SectionData<'_>> {
    section_data(document, Section::classify(step, document.concept_count()))
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::{ExerciseId, LessonId};
    use crate::model::lesson::LessonNarrative;
    use std::collections::BTreeMap;

    fn concept(id: u64, order_index: u32) -> Concept {
        Concept {
            id: ConceptId::new(id),
            order_index,
            title: format!("Concept {id}"),
            blocks: Vec::new(),
            examples: Vec::new(),
            exercises: vec![Exercise {
                id: ExerciseId::new(id * 10),
                title: "Practice".to_string(),
                problem: "Solve".to_string(),
                solution_steps: Vec::new(),
                answer_options: vec!["A".to_string(), "B".to_string()],
                correct_answer: "A".to_string(),
            }],
        }
    }

    fn document(concept_count: u64) -> LessonDocument {
        let narrative = LessonNarrative {
            overview: "Overview text".to_string(),
            objectives: Vec::new(),
            key_concepts: BTreeMap::new(),
            summary: "Summary text".to_string(),
            application: "Application text".to_string(),
            video_path: None,
        };
        let concepts = (1..=concept_count)
            .map(|i| concept(i, u32::try_from(i).unwrap()))
            .collect();
        LessonDocument::new(
            LessonId::new(7),
            "mathematics",
            "Fractions",
            narrative,
            concepts,
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn classifies_every_step_for_three_concepts() {
        assert_eq!(Section::classify(0, 3), Section::Overview);
        assert_eq!(Section::classify(2, 3), Section::Concept { offset: 1 });
        assert_eq!(Section::classify(4, 3), Section::SummaryApplication);
        assert_eq!(Section::classify(5, 3), Section::GeneralExercises);
    }

    #[test]
    fn out_of_range_step_falls_back_to_overview() {
        assert_eq!(Section::classify(6, 3), Section::Overview);
        assert_eq!(Section::classify(99, 3), Section::Overview);
    }

    #[test]
    fn classification_round_trips_through_step_index() {
        for step in 0..=max_step(3) {
            let section = Section::classify(step, 3);
            assert_eq!(section.step_index(3), step);
        }
    }

    #[test]
    fn zero_concepts_still_has_three_sections() {
        assert_eq!(total_sections(0), 3);
        assert_eq!(Section::classify(1, 0), Section::SummaryApplication);
        assert_eq!(Section::classify(2, 0), Section::GeneralExercises);
    }

    #[test]
    fn canonical_order_matches_document_order() {
        let doc = document(2);
        let sections = canonical_sections(&doc);
        assert_eq!(
            sections,
            vec![
                SectionId::Overview,
                SectionId::Concept(ConceptId::new(1)),
                SectionId::Concept(ConceptId::new(2)),
                SectionId::SummaryApplication,
                SectionId::GeneralExercises,
            ]
        );
    }

    #[test]
    fn section_id_string_round_trip() {
        let ids = [
            SectionId::Overview,
            SectionId::Concept(ConceptId::new(42)),
            SectionId::SummaryApplication,
            SectionId::GeneralExercises,
        ];
        for id in ids {
            let parsed: SectionId = id.to_string().parse().unwrap();
            assert_eq!(parsed, id);
        }
        assert_eq!(SectionId::Concept(ConceptId::new(42)).to_string(), "concept_42");
        assert!("concept_x".parse::<SectionId>().is_err());
        assert!("quiz".parse::<SectionId>().is_err());
    }

    #[test]
    fn stale_concept_classification_yields_no_data() {
        // A classification taken against a three-concept document, applied
        // after the document was refreshed down to one concept.
        let doc = document(1);
        let stale = Section::Concept { offset: 2 };
        assert!(section_data(&doc, stale).is_none());
        assert!(section_id_for(&doc, stale).is_none());
        assert_eq!(
            section_id_at(&doc, 1),
            Some(SectionId::Concept(ConceptId::new(1)))
        );
    }

    #[test]
    fn section_data_covers_prose_sections() {
        let doc = document(1);
        match section_data_at(&doc, 0) {
            Some(SectionData::Overview { overview, .. }) => {
                assert_eq!(overview, "Overview text");
            }
            other => panic!("expected overview data, got {other:?}"),
        }
        match section_data_at(&doc, 2) {
            Some(SectionData::SummaryApplication { summary, application }) => {
                assert_eq!(summary, "Summary text");
                assert_eq!(application, "Application text");
            }
            other => panic!("expected summary data, got {other:?}"),
        }
        match section_data_at(&doc, 3) {
            Some(SectionData::GeneralExercises(list)) => assert!(list.is_empty()),
            other => panic!("expected general exercises, got {other:?}"),
        }
    }
}
