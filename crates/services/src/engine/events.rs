//! Events the engine broadcasts while a lesson is in progress.

use lesson_core::model::{ExerciseId, LessonId, SectionId};

/// Capacity of the engine's broadcast channel. Observers that fall more
/// than this many events behind start losing the oldest ones.
pub const EVENT_CAPACITY: usize = 64;

/// Notification stream for hosts that render progress live.
///
/// Events describe state that already changed; every mutation they report
/// has been applied to the ledger (and persisted) before the event is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineEvent {
    /// A section was confirmed complete. `warning` carries the lenient-path
    /// notice when the authority had no record for the section.
    SectionCompleted {
        section_id: SectionId,
        newly_completed: bool,
        warning: Option<String>,
    },
    /// The lesson-level counters moved.
    ProgressChanged {
        completed_sections: u32,
        total_sections: u32,
        overall_progress: u8,
    },
    /// Every canonical section is complete.
    LessonCompleted { lesson_id: LessonId },
    /// An answer was captured offline for later replay.
    AnswerDeferred { exercise_id: ExerciseId },
    /// A reconnect drain finished. `pending` counts actions still queued
    /// because their replay failed with retries left.
    QueueDrained {
        replayed: usize,
        dropped: usize,
        pending: usize,
    },
    /// The view moved to another step.
    Navigated { step: usize, section_id: SectionId },
    /// The host reported a connectivity change.
    ConnectivityChanged { online: bool },
}
