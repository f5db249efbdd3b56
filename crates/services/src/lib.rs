#![forbid(unsafe_code)]

pub mod api;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod offline;
pub mod retry;
pub mod timer;
pub mod verifier;

pub use lesson_core::Clock;

pub use error::{ApiError, EngineError, FieldError};

pub use api::{
    AnswerChecks, AnswerVerdict, ApiConfig, CompletionCheck, CompletionChecks, ContentSource,
    DEFAULT_BASE_URL, ExerciseScope, HttpLessonApi,
};
pub use engine::{
    BlockReason, EVENT_CAPACITY, EngineEvent, LessonEngine, SubmissionOutcome, VerifyOutcome,
};
pub use ledger::{ProgressLedger, SectionMarked};
pub use offline::{OfflineQueue, QueuedAction, QueuedActionKind, RETRY_CEILING};
pub use retry::RetryPolicy;
pub use timer::SectionTimerService;
pub use verifier::{CompletionVerifier, RemoteCompletion};
