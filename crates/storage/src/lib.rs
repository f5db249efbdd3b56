#![forbid(unsafe_code)]

//! Persistence layer for lesson progress.
//!
//! Exposes repository traits over the progress ledger and section timings,
//! an in-memory implementation for tests, and a `SQLite` implementation for
//! durable storage.

pub mod repository;
pub mod sqlite;

pub use repository::{
    InMemoryRepository, LessonProgressSnapshot, ProgressRepository, SectionTimeRecord,
    SectionTimeRepository, Storage, StorageError,
};
pub use sqlite::{SqliteInitError, SqliteRepository};
