use quiz_core::model::{AnswerOption, Category, Question, QuestionId, QuizConfig, StudentId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{
        config_key, conn, id_i64, option_id_from_i64, parse_category, question_id_from_i64, ser,
        u32_from_i64,
    },
};
use crate::repository::{QuizRepository, StorageError};

impl SqliteRepository {
    pub(crate) async fn student_category(
        &self,
        student: StudentId,
    ) -> Result<Option<Category>, StorageError> {
        let raw: Option<Option<String>> =
            sqlx::query_scalar("SELECT category FROM students WHERE id = ?1")
                .bind(id_i64("student_id", student.value())?)
                .fetch_optional(&self.pool)
                .await
                .map_err(conn)?;
        parse_category(raw.flatten())
    }

    /// Load full questions in the order of `ids`.
    pub(crate) async fn load_questions(
        &self,
        ids: &[QuestionId],
    ) -> Result<Vec<Question>, StorageError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let qid = id_i64("question_id", id.value())?;
            let row = sqlx::query("SELECT prompt, image_url FROM questions WHERE id = ?1")
                .bind(qid)
                .fetch_optional(&self.pool)
                .await
                .map_err(conn)?
                .ok_or(StorageError::NotFound)?;

            let option_rows = sqlx::query(
                r"
                    SELECT id, text, is_correct
                    FROM answer_options
                    WHERE question_id = ?1
                    ORDER BY position ASC, id ASC
                ",
            )
            .bind(qid)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

            let mut options = Vec::with_capacity(option_rows.len());
            for opt in option_rows {
                options.push(
                    AnswerOption::new(
                        option_id_from_i64(opt.try_get::<i64, _>("id").map_err(ser)?)?,
                        opt.try_get::<String, _>("text").map_err(ser)?,
                        opt.try_get::<bool, _>("is_correct").map_err(ser)?,
                    )
                    .map_err(ser)?,
                );
            }

            let image = row
                .try_get::<Option<String>, _>("image_url")
                .map_err(ser)?
                .map(|raw| Question::parse_image(&raw))
                .transpose()
                .map_err(ser)?;

            out.push(
                Question::new(
                    *id,
                    row.try_get::<String, _>("prompt").map_err(ser)?,
                    image,
                    options,
                )
                .map_err(ser)?,
            );
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn fetch_quiz_config(
        &self,
        category: Option<&Category>,
    ) -> Result<QuizConfig, StorageError> {
        // Category-specific row first, default ('') second.
        let row = sqlx::query(
            r"
                SELECT total_questions, time_limit_minutes, permitted_attempts
                FROM quiz_configs
                WHERE category IN (?1, '')
                ORDER BY CASE WHEN category = '' THEN 1 ELSE 0 END
                LIMIT 1
            ",
        )
        .bind(config_key(category))
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        QuizConfig::new(
            u32_from_i64("total_questions", row.try_get("total_questions").map_err(ser)?)?,
            u32_from_i64(
                "time_limit_minutes",
                row.try_get("time_limit_minutes").map_err(ser)?,
            )?,
            u32_from_i64(
                "permitted_attempts",
                row.try_get("permitted_attempts").map_err(ser)?,
            )?,
        )
        .map_err(ser)
    }

    async fn fetch_questions(
        &self,
        count: u32,
        category: Option<&Category>,
        student: Option<StudentId>,
    ) -> Result<Vec<Question>, StorageError> {
        let category = match (category, student) {
            (Some(c), _) => Some(c.clone()),
            (None, Some(student)) => self.student_category(student).await?,
            (None, None) => None,
        };

        let rows = sqlx::query(
            r"
                SELECT id FROM questions
                WHERE (?1 IS NULL OR category = ?1)
                ORDER BY RANDOM()
                LIMIT ?2
            ",
        )
        .bind(category.as_ref().map(|c| c.as_str().to_owned()))
        .bind(i64::from(count))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?);
        }
        self.load_questions(&ids).await
    }

    async fn upsert_quiz_config(
        &self,
        category: Option<&Category>,
        config: &QuizConfig,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO quiz_configs (
                    category, total_questions, time_limit_minutes, permitted_attempts
                )
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(category) DO UPDATE SET
                    total_questions = excluded.total_questions,
                    time_limit_minutes = excluded.time_limit_minutes,
                    permitted_attempts = excluded.permitted_attempts
            ",
        )
        .bind(config_key(category))
        .bind(i64::from(config.total_questions()))
        .bind(i64::from(config.time_limit_minutes()))
        .bind(i64::from(config.permitted_attempts()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn upsert_question(
        &self,
        category: Option<&Category>,
        question: &Question,
    ) -> Result<(), StorageError> {
        let qid = id_i64("question_id", question.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO questions (id, category, prompt, image_url)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    category = excluded.category,
                    prompt = excluded.prompt,
                    image_url = excluded.image_url
            ",
        )
        .bind(qid)
        .bind(category.map(|c| c.as_str().to_owned()))
        .bind(question.prompt())
        .bind(question.image().map(ToString::to_string))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query("DELETE FROM answer_options WHERE question_id = ?1")
            .bind(qid)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, option) in question.options().iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO answer_options (question_id, id, position, text, is_correct)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(qid)
            .bind(id_i64("option_id", option.id().value())?)
            .bind(i64::try_from(position).map_err(ser)?)
            .bind(option.text())
            .bind(option.is_correct())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
