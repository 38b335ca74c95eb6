use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates students, quiz configs, the question bank, attempts with their
/// question sets, and per-question answers.
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
                CREATE TABLE IF NOT EXISTS students (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    category TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // An empty category is the default configuration.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS quiz_configs (
                    category TEXT PRIMARY KEY,
                    total_questions INTEGER NOT NULL CHECK (total_questions > 0),
                    time_limit_minutes INTEGER NOT NULL CHECK (time_limit_minutes > 0),
                    permitted_attempts INTEGER NOT NULL CHECK (permitted_attempts > 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    category TEXT,
                    prompt TEXT NOT NULL,
                    image_url TEXT
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS answer_options (
                    question_id INTEGER NOT NULL,
                    id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    PRIMARY KEY (question_id, id),
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempts (
                    id TEXT PRIMARY KEY,
                    student_id INTEGER NOT NULL,
                    started_at TEXT NOT NULL,
                    time_limit_secs INTEGER NOT NULL CHECK (time_limit_secs >= 0),
                    status TEXT NOT NULL CHECK (status IN ('in_progress', 'finished')),
                    ended_at TEXT,
                    time_used_secs INTEGER,
                    score INTEGER CHECK (score BETWEEN 0 AND 100),
                    confirmed_count INTEGER,
                    correct_count INTEGER,
                    FOREIGN KEY (student_id) REFERENCES students(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempt_questions (
                    attempt_id TEXT NOT NULL,
                    position INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    PRIMARY KEY (attempt_id, position),
                    UNIQUE (attempt_id, question_id),
                    FOREIGN KEY (attempt_id) REFERENCES attempts(id) ON DELETE CASCADE,
                    FOREIGN KEY (question_id) REFERENCES questions(id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        // One row per (attempt, question): saving an answer is an upsert.
        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempt_answers (
                    attempt_id TEXT NOT NULL,
                    question_id INTEGER NOT NULL,
                    option_id INTEGER NOT NULL,
                    elapsed_secs INTEGER NOT NULL CHECK (elapsed_secs >= 0),
                    is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
                    saved_at TEXT NOT NULL,
                    PRIMARY KEY (attempt_id, question_id),
                    FOREIGN KEY (attempt_id, question_id)
                        REFERENCES attempt_questions(attempt_id, question_id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_attempts_student_status
                    ON attempts (student_id, status, started_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_category
                    ON questions (category);
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
