use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (lesson metadata, section and exercise progress,
/// section timings, and indexes).
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS lesson_metadata (
                    lesson_id INTEGER PRIMARY KEY,
                    total_sections INTEGER NOT NULL CHECK (total_sections >= 3),
                    completed_sections INTEGER NOT NULL CHECK (completed_sections >= 0),
                    overall_progress INTEGER NOT NULL CHECK (overall_progress BETWEEN 0 AND 100),
                    started_at TEXT NOT NULL,
                    last_accessed_at TEXT NOT NULL,
                    last_completed_section TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS section_progress (
                    lesson_id INTEGER NOT NULL,
                    section_id TEXT NOT NULL,
                    is_completed INTEGER NOT NULL CHECK (is_completed IN (0, 1)),
                    completed_at TEXT,
                    attempts INTEGER NOT NULL CHECK (attempts >= 0),
                    exercises_completed INTEGER NOT NULL CHECK (exercises_completed >= 0),
                    exercises_total INTEGER NOT NULL CHECK (exercises_total >= 0),
                    score INTEGER CHECK (score BETWEEN 0 AND 100),
                    PRIMARY KEY (lesson_id, section_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS exercise_progress (
                    lesson_id INTEGER NOT NULL,
                    exercise_id INTEGER NOT NULL,
                    is_completed INTEGER NOT NULL CHECK (is_completed IN (0, 1)),
                    is_correct INTEGER,
                    last_answer TEXT,
                    attempts INTEGER NOT NULL CHECK (attempts >= 0),
                    first_attempt_at TEXT,
                    last_attempt_at TEXT,
                    PRIMARY KEY (lesson_id, exercise_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS section_times (
                    id INTEGER PRIMARY KEY,
                    lesson_id INTEGER NOT NULL,
                    section_id TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    ended_at TEXT NOT NULL,
                    paused_secs INTEGER NOT NULL CHECK (paused_secs >= 0),
                    time_spent_secs INTEGER NOT NULL CHECK (time_spent_secs >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_section_progress_lesson
                    ON section_progress (lesson_id, section_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_exercise_progress_lesson
                    ON exercise_progress (lesson_id, exercise_id);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_section_times_lesson_ended
                    ON section_times (lesson_id, ended_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
