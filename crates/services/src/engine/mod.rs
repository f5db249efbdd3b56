mod events;
mod outcome;
mod service;

// Public API of the engine subsystem.
pub use events::{EVENT_CAPACITY, EngineEvent};
pub use outcome::{BlockReason, SubmissionOutcome, VerifyOutcome};
pub use service::LessonEngine;
