use lesson_core::model::LessonId;

use super::{
    SqliteRepository,
    mapping::{lesson_id_to_i64, map_time_row},
};
use crate::repository::{SectionTimeRecord, SectionTimeRepository, StorageError};

#[async_trait::async_trait]
impl SectionTimeRepository for SqliteRepository {
    async fn record_section_time(&self, record: &SectionTimeRecord) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO section_times (
                lesson_id, section_id, started_at, ended_at, paused_secs, time_spent_secs
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(lesson_id_to_i64(record.lesson_id)?)
        .bind(record.section_id.to_string())
        .bind(record.started_at)
        .bind(record.ended_at)
        .bind(record.paused_secs)
        .bind(record.time_spent_secs)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn load_section_times(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<SectionTimeRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                lesson_id, section_id, started_at, ended_at, paused_secs, time_spent_secs
            FROM section_times
            WHERE lesson_id = ?1
            ORDER BY ended_at ASC, id ASC
            ",
        )
        .bind(lesson_id_to_i64(lesson_id)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(map_time_row(&row)?);
        }
        Ok(records)
    }
}
