use lesson_core::model::{
    AnswerCode, ExerciseId, ExerciseProgress, LessonId, LessonMetadata, SectionId, SectionProgress,
};
use sqlx::Row;

use crate::repository::{SectionTimeRecord, StorageError};

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

fn i64_to_u8(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(i64_to_u64("lesson_id", v)?))
}

pub(crate) fn lesson_id_to_i64(id: LessonId) -> Result<i64, StorageError> {
    i64::try_from(id.value())
        .map_err(|_| StorageError::Serialization("lesson_id overflow".into()))
}

pub(crate) fn exercise_id_from_i64(v: i64) -> Result<ExerciseId, StorageError> {
    Ok(ExerciseId::new(i64_to_u64("exercise_id", v)?))
}

pub(crate) fn parse_section_id(s: &str) -> Result<SectionId, StorageError> {
    s.parse::<SectionId>().map_err(ser)
}

fn parse_answer(s: &str) -> Result<AnswerCode, StorageError> {
    s.parse::<AnswerCode>().map_err(ser)
}

pub(crate) fn map_metadata_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<LessonMetadata, StorageError> {
    let last_completed = row
        .try_get::<Option<String>, _>("last_completed_section")
        .map_err(ser)?
        .map(|s| parse_section_id(&s))
        .transpose()?;

    LessonMetadata::from_persisted(
        lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
        i64_to_u32(
            "total_sections",
            row.try_get::<i64, _>("total_sections").map_err(ser)?,
        )?,
        i64_to_u32(
            "completed_sections",
            row.try_get::<i64, _>("completed_sections").map_err(ser)?,
        )?,
        i64_to_u8(
            "overall_progress",
            row.try_get::<i64, _>("overall_progress").map_err(ser)?,
        )?,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("last_accessed_at").map_err(ser)?,
        last_completed,
    )
    .map_err(ser)
}

pub(crate) fn map_section_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SectionProgress, StorageError> {
    let section_id: String = row.try_get("section_id").map_err(ser)?;
    let score = row
        .try_get::<Option<i64>, _>("score")
        .map_err(ser)?
        .map(|v| i64_to_u8("score", v))
        .transpose()?;

    SectionProgress::from_persisted(
        parse_section_id(&section_id)?,
        row.try_get("is_completed").map_err(ser)?,
        row.try_get("completed_at").map_err(ser)?,
        i64_to_u32("attempts", row.try_get::<i64, _>("attempts").map_err(ser)?)?,
        i64_to_u32(
            "exercises_completed",
            row.try_get::<i64, _>("exercises_completed").map_err(ser)?,
        )?,
        i64_to_u32(
            "exercises_total",
            row.try_get::<i64, _>("exercises_total").map_err(ser)?,
        )?,
        score,
    )
    .map_err(ser)
}

pub(crate) fn map_exercise_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ExerciseProgress, StorageError> {
    let last_answer = row
        .try_get::<Option<String>, _>("last_answer")
        .map_err(ser)?
        .map(|s| parse_answer(&s))
        .transpose()?;

    ExerciseProgress::from_persisted(
        exercise_id_from_i64(row.try_get::<i64, _>("exercise_id").map_err(ser)?)?,
        row.try_get("is_completed").map_err(ser)?,
        row.try_get("is_correct").map_err(ser)?,
        last_answer,
        i64_to_u32("attempts", row.try_get::<i64, _>("attempts").map_err(ser)?)?,
        row.try_get("first_attempt_at").map_err(ser)?,
        row.try_get("last_attempt_at").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_time_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SectionTimeRecord, StorageError> {
    let section_id: String = row.try_get("section_id").map_err(ser)?;

    Ok(SectionTimeRecord {
        lesson_id: lesson_id_from_i64(row.try_get::<i64, _>("lesson_id").map_err(ser)?)?,
        section_id: parse_section_id(&section_id)?,
        started_at: row.try_get("started_at").map_err(ser)?,
        ended_at: row.try_get("ended_at").map_err(ser)?,
        paused_secs: row.try_get("paused_secs").map_err(ser)?,
        time_spent_secs: row.try_get("time_spent_secs").map_err(ser)?,
    })
}
