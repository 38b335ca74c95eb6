use chrono::Utc;
use quiz_core::model::{
    Attempt, AttemptId, AttemptStatus, Eligibility, Finalization, NewAttempt, QuestionId,
    RecordedAnswer, StudentId,
};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{
        attempt_id_from_str, conn, id_i64, map_answer_row, map_attempt_row, question_id_from_i64,
        ser, u32_from_i64,
    },
};
use crate::repository::{ActiveAttempt, AttemptRepository, QuizRepository, StorageError};

impl SqliteRepository {
    async fn attempt_question_ids(&self, id: AttemptId) -> Result<Vec<QuestionId>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT question_id FROM attempt_questions
                WHERE attempt_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(question_id_from_i64(
                row.try_get::<i64, _>("question_id").map_err(ser)?,
            )?);
        }
        Ok(out)
    }
}

const ATTEMPT_COLUMNS: &str = r"
    id, student_id, started_at, time_limit_secs, status, ended_at,
    time_used_secs, score, confirmed_count, correct_count
";

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn fetch_eligibility(&self, student: StudentId) -> Result<Eligibility, StorageError> {
        let sid = id_i64("student_id", student.value())?;
        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM students WHERE id = ?1")
            .bind(sid)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        if exists.is_none() {
            return Err(StorageError::NotFound);
        }

        let category = self.student_category(student).await?;
        let config = self.fetch_quiz_config(category.as_ref()).await?;

        let finished: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attempts WHERE student_id = ?1 AND status = 'finished'",
        )
        .bind(sid)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        let active: Option<String> = sqlx::query_scalar(
            r"
                SELECT id FROM attempts
                WHERE student_id = ?1 AND status = 'in_progress'
                ORDER BY started_at DESC
                LIMIT 1
            ",
        )
        .bind(sid)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        Ok(Eligibility::evaluate(
            config.permitted_attempts(),
            u32_from_i64("finished_attempts", finished)?,
            active.as_deref().map(attempt_id_from_str).transpose()?,
        ))
    }

    async fn create_attempt(&self, new: &NewAttempt) -> Result<Attempt, StorageError> {
        let attempt = Attempt::start(AttemptId::generate(), new.clone())
            .map_err(|e| StorageError::Conflict(e.to_string()))?;
        let id = attempt.id().to_string();

        let mut tx = self.pool.begin().await.map_err(conn)?;
        sqlx::query(
            r"
                INSERT INTO attempts (id, student_id, started_at, time_limit_secs, status)
                VALUES (?1, ?2, ?3, ?4, ?5)
            ",
        )
        .bind(id.as_str())
        .bind(id_i64("student_id", attempt.student_id().value())?)
        .bind(attempt.started_at())
        .bind(i64::from(attempt.time_limit_secs()))
        .bind(AttemptStatus::InProgress.as_str())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        for (position, question_id) in attempt.question_ids().iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO attempt_questions (attempt_id, position, question_id)
                    VALUES (?1, ?2, ?3)
                ",
            )
            .bind(id.as_str())
            .bind(i64::try_from(position).map_err(ser)?)
            .bind(id_i64("question_id", question_id.value())?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(attempt)
    }

    async fn fetch_active_attempt(
        &self,
        student: StudentId,
    ) -> Result<Option<ActiveAttempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts
             WHERE student_id = ?1 AND status = 'in_progress'
             ORDER BY started_at DESC
             LIMIT 1"
        );
        let Some(row) = sqlx::query(&sql)
            .bind(id_i64("student_id", student.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
        else {
            return Ok(None);
        };

        let id = attempt_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?;
        let question_ids = self.attempt_question_ids(id).await?;
        let attempt = map_attempt_row(&row, question_ids)?;
        let questions = self.load_questions(attempt.question_ids()).await?;
        let answers = self.answers_for_attempt(id).await?;

        Ok(Some(ActiveAttempt {
            attempt,
            questions,
            answers,
        }))
    }

    async fn save_answer(
        &self,
        attempt: AttemptId,
        answer: &RecordedAnswer,
    ) -> Result<(), StorageError> {
        let id = attempt.to_string();
        let qid = id_i64("question_id", answer.question_id.value())?;
        let oid = id_i64("option_id", answer.option_id.value())?;

        let status: String = sqlx::query_scalar("SELECT status FROM attempts WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        if AttemptStatus::parse(&status).map_err(ser)? == AttemptStatus::Finished {
            return Err(StorageError::Conflict(format!("attempt {attempt} is finished")));
        }

        let belongs: Option<i64> = sqlx::query_scalar(
            r"
                SELECT 1
                FROM attempt_questions aq
                JOIN answer_options o ON o.question_id = aq.question_id
                WHERE aq.attempt_id = ?1 AND aq.question_id = ?2 AND o.id = ?3
            ",
        )
        .bind(id.as_str())
        .bind(qid)
        .bind(oid)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;
        if belongs.is_none() {
            return Err(StorageError::Conflict(format!(
                "option {} of question {} is not part of attempt {attempt}",
                answer.option_id, answer.question_id
            )));
        }

        sqlx::query(
            r"
                INSERT INTO attempt_answers (
                    attempt_id, question_id, option_id, elapsed_secs, is_correct, saved_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(attempt_id, question_id) DO UPDATE SET
                    option_id = excluded.option_id,
                    elapsed_secs = excluded.elapsed_secs,
                    is_correct = excluded.is_correct,
                    saved_at = excluded.saved_at
            ",
        )
        .bind(id.as_str())
        .bind(qid)
        .bind(oid)
        .bind(i64::from(answer.elapsed_secs))
        .bind(answer.is_correct)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn finish_attempt(
        &self,
        attempt: AttemptId,
        finalization: &Finalization,
    ) -> Result<(), StorageError> {
        let mut stored = self.get_attempt(attempt).await?;
        stored
            .finish(finalization)
            .map_err(|e| StorageError::Conflict(e.to_string()))?;

        let res = sqlx::query(
            r"
                UPDATE attempts SET
                    status = ?2,
                    ended_at = ?3,
                    time_used_secs = ?4,
                    score = ?5,
                    confirmed_count = ?6,
                    correct_count = ?7
                WHERE id = ?1 AND status = 'in_progress'
            ",
        )
        .bind(attempt.to_string())
        .bind(AttemptStatus::Finished.as_str())
        .bind(finalization.ended_at)
        .bind(i64::from(finalization.time_used_secs))
        .bind(i64::from(finalization.score))
        .bind(i64::from(finalization.confirmed_count))
        .bind(i64::from(finalization.correct_count))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::Conflict(format!(
                "attempt {attempt} is already finished"
            )));
        }
        Ok(())
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;
        let question_ids = self.attempt_question_ids(id).await?;
        map_attempt_row(&row, question_ids)
    }

    async fn answers_for_attempt(
        &self,
        id: AttemptId,
    ) -> Result<Vec<RecordedAnswer>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT a.question_id, a.option_id, a.elapsed_secs, a.is_correct
                FROM attempt_answers a
                JOIN attempt_questions aq
                    ON aq.attempt_id = a.attempt_id AND aq.question_id = a.question_id
                WHERE a.attempt_id = ?1
                ORDER BY aq.position ASC
            ",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_answer_row(&row)?);
        }
        Ok(out)
    }
}
