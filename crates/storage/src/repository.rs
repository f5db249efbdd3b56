use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lesson_core::model::{
    ExerciseProgress, LessonId, LessonMetadata, SectionId, SectionProgress, SectionTimeTracking,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Persisted shape for one ended section visit.
///
/// Live pause windows never reach storage; a record is written only once a
/// visit has ended, with the pause arithmetic already settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionTimeRecord {
    pub lesson_id: LessonId,
    pub section_id: SectionId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub paused_secs: i64,
    pub time_spent_secs: i64,
}

impl SectionTimeRecord {
    /// Builds a record from an ended tracking entry; `None` while the entry
    /// is still running.
    #[must_use]
    pub fn from_tracking(lesson_id: LessonId, tracking: &SectionTimeTracking) -> Option<Self> {
        let ended_at = tracking.ended_at()?;
        let time_spent = tracking.time_spent()?;
        Some(Self {
            lesson_id,
            section_id: *tracking.section_id(),
            started_at: tracking.started_at(),
            ended_at,
            paused_secs: tracking.paused_total().num_seconds(),
            time_spent_secs: time_spent.num_seconds(),
        })
    }
}

/// Everything persisted for one lesson's progress.
#[derive(Debug, Clone, Default)]
pub struct LessonProgressSnapshot {
    pub metadata: Option<LessonMetadata>,
    pub sections: Vec<SectionProgress>,
    pub exercises: Vec<ExerciseProgress>,
}

/// Repository contract for the progress ledger.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Persist or update a lesson's metadata roll-up.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the metadata cannot be stored.
    async fn upsert_metadata(&self, metadata: &LessonMetadata) -> Result<(), StorageError>;

    /// Persist or update one section's progress.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_section_progress(
        &self,
        lesson_id: LessonId,
        progress: &SectionProgress,
    ) -> Result<(), StorageError>;

    /// Persist or update one exercise's progress.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_exercise_progress(
        &self,
        lesson_id: LessonId,
        progress: &ExerciseProgress,
    ) -> Result<(), StorageError>;

    /// Fetch everything stored for a lesson. An unknown lesson yields an
    /// empty snapshot, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be read.
    async fn load_progress(&self, lesson_id: LessonId)
    -> Result<LessonProgressSnapshot, StorageError>;

    /// Remove every stored record for a lesson, timing history included.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the deletion fails.
    async fn delete_progress(&self, lesson_id: LessonId) -> Result<(), StorageError>;
}

/// Repository contract for ended section timings.
#[async_trait]
pub trait SectionTimeRepository: Send + Sync {
    /// Append one ended section visit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn record_section_time(&self, record: &SectionTimeRecord) -> Result<(), StorageError>;

    /// Fetch every ended visit for a lesson, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the records cannot be read.
    async fn load_section_times(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<SectionTimeRecord>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    metadata: Arc<Mutex<HashMap<LessonId, LessonMetadata>>>,
    sections: Arc<Mutex<HashMap<(LessonId, SectionId), SectionProgress>>>,
    exercises: Arc<Mutex<HashMap<LessonId, HashMap<u64, ExerciseProgress>>>>,
    times: Arc<Mutex<Vec<SectionTimeRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn upsert_metadata(&self, metadata: &LessonMetadata) -> Result<(), StorageError> {
        let mut guard = self
            .metadata
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(metadata.lesson_id(), metadata.clone());
        Ok(())
    }

    async fn upsert_section_progress(
        &self,
        lesson_id: LessonId,
        progress: &SectionProgress,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .sections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((lesson_id, *progress.section_id()), progress.clone());
        Ok(())
    }

    async fn upsert_exercise_progress(
        &self,
        lesson_id: LessonId,
        progress: &ExerciseProgress,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .entry(lesson_id)
            .or_default()
            .insert(progress.exercise_id().value(), progress.clone());
        Ok(())
    }

    async fn load_progress(
        &self,
        lesson_id: LessonId,
    ) -> Result<LessonProgressSnapshot, StorageError> {
        let metadata = self
            .metadata
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .get(&lesson_id)
            .cloned();
        let sections = self
            .sections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .iter()
            .filter(|((lesson, _), _)| *lesson == lesson_id)
            .map(|(_, progress)| progress.clone())
            .collect();
        let exercises = self
            .exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .get(&lesson_id)
            .map(|by_id| by_id.values().cloned().collect())
            .unwrap_or_default();

        Ok(LessonProgressSnapshot {
            metadata,
            sections,
            exercises,
        })
    }

    async fn delete_progress(&self, lesson_id: LessonId) -> Result<(), StorageError> {
        self.metadata
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .remove(&lesson_id);
        self.sections
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .retain(|(lesson, _), _| *lesson != lesson_id);
        self.exercises
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .remove(&lesson_id);
        self.times
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .retain(|record| record.lesson_id != lesson_id);
        Ok(())
    }
}

#[async_trait]
impl SectionTimeRepository for InMemoryRepository {
    async fn record_section_time(&self, record: &SectionTimeRecord) -> Result<(), StorageError> {
        self.times
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .push(record.clone());
        Ok(())
    }

    async fn load_section_times(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<SectionTimeRecord>, StorageError> {
        let mut records: Vec<SectionTimeRecord> = self
            .times
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?
            .iter()
            .filter(|record| record.lesson_id == lesson_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.ended_at);
        Ok(records)
    }
}

/// Aggregates the progress and timing repositories behind trait objects so
/// backends can be swapped.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub section_times: Arc<dyn SectionTimeRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressRepository> = Arc::new(repo.clone());
        let section_times: Arc<dyn SectionTimeRepository> = Arc::new(repo);
        Self {
            progress,
            section_times,
        }
    }
}
