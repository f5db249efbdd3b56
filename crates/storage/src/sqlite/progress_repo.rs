use lesson_core::model::{ExerciseProgress, LessonId, LessonMetadata, SectionProgress};

use super::{
    SqliteRepository,
    mapping::{lesson_id_to_i64, map_exercise_row, map_metadata_row, map_section_row},
};
use crate::repository::{LessonProgressSnapshot, ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn upsert_metadata(&self, metadata: &LessonMetadata) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO lesson_metadata (
                lesson_id, total_sections, completed_sections, overall_progress,
                started_at, last_accessed_at, last_completed_section
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(lesson_id) DO UPDATE SET
                -- keep started_at from the original insert; only update mutable fields
                total_sections = excluded.total_sections,
                completed_sections = excluded.completed_sections,
                overall_progress = excluded.overall_progress,
                last_accessed_at = excluded.last_accessed_at,
                last_completed_section = excluded.last_completed_section
            ",
        )
        .bind(lesson_id_to_i64(metadata.lesson_id())?)
        .bind(i64::from(metadata.total_sections()))
        .bind(i64::from(metadata.completed_sections()))
        .bind(i64::from(metadata.overall_progress()))
        .bind(metadata.started_at())
        .bind(metadata.last_accessed_at())
        .bind(metadata.last_completed_section().map(|s| s.to_string()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn upsert_section_progress(
        &self,
        lesson_id: LessonId,
        progress: &SectionProgress,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO section_progress (
                lesson_id, section_id, is_completed, completed_at,
                attempts, exercises_completed, exercises_total, score
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(lesson_id, section_id) DO UPDATE SET
                is_completed = excluded.is_completed,
                completed_at = excluded.completed_at,
                attempts = excluded.attempts,
                exercises_completed = excluded.exercises_completed,
                exercises_total = excluded.exercises_total,
                score = excluded.score
            ",
        )
        .bind(lesson_id_to_i64(lesson_id)?)
        .bind(progress.section_id().to_string())
        .bind(progress.is_completed())
        .bind(progress.completed_at())
        .bind(i64::from(progress.attempts()))
        .bind(i64::from(progress.exercises_completed()))
        .bind(i64::from(progress.exercises_total()))
        .bind(progress.score().map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn upsert_exercise_progress(
        &self,
        lesson_id: LessonId,
        progress: &ExerciseProgress,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO exercise_progress (
                lesson_id, exercise_id, is_completed, is_correct,
                last_answer, attempts, first_attempt_at, last_attempt_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(lesson_id, exercise_id) DO UPDATE SET
                is_completed = excluded.is_completed,
                is_correct = excluded.is_correct,
                last_answer = excluded.last_answer,
                attempts = excluded.attempts,
                first_attempt_at = excluded.first_attempt_at,
                last_attempt_at = excluded.last_attempt_at
            ",
        )
        .bind(lesson_id_to_i64(lesson_id)?)
        .bind(
            i64::try_from(progress.exercise_id().value())
                .map_err(|_| StorageError::Serialization("exercise_id overflow".into()))?,
        )
        .bind(progress.is_completed())
        .bind(progress.is_correct())
        .bind(progress.last_answer().map(|a| a.to_string()))
        .bind(i64::from(progress.attempts()))
        .bind(progress.first_attempt_at())
        .bind(progress.last_attempt_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn load_progress(
        &self,
        lesson_id: LessonId,
    ) -> Result<LessonProgressSnapshot, StorageError> {
        let lesson = lesson_id_to_i64(lesson_id)?;

        let metadata = sqlx::query(
            r"
            SELECT
                lesson_id, total_sections, completed_sections, overall_progress,
                started_at, last_accessed_at, last_completed_section
            FROM lesson_metadata
            WHERE lesson_id = ?1
            ",
        )
        .bind(lesson)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .map(|row| map_metadata_row(&row))
        .transpose()?;

        let section_rows = sqlx::query(
            r"
            SELECT
                section_id, is_completed, completed_at, attempts,
                exercises_completed, exercises_total, score
            FROM section_progress
            WHERE lesson_id = ?1
            ORDER BY section_id ASC
            ",
        )
        .bind(lesson)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut sections = Vec::with_capacity(section_rows.len());
        for row in section_rows {
            sections.push(map_section_row(&row)?);
        }

        let exercise_rows = sqlx::query(
            r"
            SELECT
                exercise_id, is_completed, is_correct, last_answer,
                attempts, first_attempt_at, last_attempt_at
            FROM exercise_progress
            WHERE lesson_id = ?1
            ORDER BY exercise_id ASC
            ",
        )
        .bind(lesson)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut exercises = Vec::with_capacity(exercise_rows.len());
        for row in exercise_rows {
            exercises.push(map_exercise_row(&row)?);
        }

        Ok(LessonProgressSnapshot {
            metadata,
            sections,
            exercises,
        })
    }

    async fn delete_progress(&self, lesson_id: LessonId) -> Result<(), StorageError> {
        let lesson = lesson_id_to_i64(lesson_id)?;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM section_times WHERE lesson_id = ?1")
            .bind(lesson)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM exercise_progress WHERE lesson_id = ?1")
            .bind(lesson)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM section_progress WHERE lesson_id = ?1")
            .bind(lesson)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query("DELETE FROM lesson_metadata WHERE lesson_id = ?1")
            .bind(lesson)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
