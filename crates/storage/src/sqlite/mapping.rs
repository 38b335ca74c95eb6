use quiz_core::model::{
    Attempt, AttemptId, AttemptStatus, Category, Finalization, OptionId, QuestionId,
    RecordedAnswer, StudentId,
};
use sqlx::Row;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn student_id_from_i64(v: i64) -> Result<StudentId, StorageError> {
    Ok(StudentId::new(i64_to_u64("student_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn option_id_from_i64(v: i64) -> Result<OptionId, StorageError> {
    Ok(OptionId::new(i64_to_u64("option_id", v)?))
}

pub(crate) fn attempt_id_from_str(raw: &str) -> Result<AttemptId, StorageError> {
    raw.parse::<AttemptId>().map_err(ser)
}

/// Key under which a configuration is stored; the empty string is the default.
pub(crate) fn config_key(category: Option<&Category>) -> String {
    category.map(|c| c.as_str().to_owned()).unwrap_or_default()
}

pub(crate) fn parse_category(raw: Option<String>) -> Result<Option<Category>, StorageError> {
    raw.filter(|s| !s.trim().is_empty())
        .map(Category::new)
        .transpose()
        .map_err(ser)
}

pub(crate) fn map_answer_row(row: &sqlx::sqlite::SqliteRow) -> Result<RecordedAnswer, StorageError> {
    Ok(RecordedAnswer {
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        option_id: option_id_from_i64(row.try_get::<i64, _>("option_id").map_err(ser)?)?,
        elapsed_secs: u32_from_i64(
            "elapsed_secs",
            row.try_get::<i64, _>("elapsed_secs").map_err(ser)?,
        )?,
        is_correct: row.try_get::<bool, _>("is_correct").map_err(ser)?,
    })
}

fn required_u32(row: &sqlx::sqlite::SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    let value = row
        .try_get::<Option<i64>, _>(field)
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization(format!("missing {field}")))?;
    u32_from_i64(field, value)
}

/// Map an `attempts` row plus its ordered question ids into a domain `Attempt`.
pub(crate) fn map_attempt_row(
    row: &sqlx::sqlite::SqliteRow,
    question_ids: Vec<QuestionId>,
) -> Result<Attempt, StorageError> {
    let id = attempt_id_from_str(&row.try_get::<String, _>("id").map_err(ser)?)?;
    let status_raw: String = row.try_get("status").map_err(ser)?;
    let status = AttemptStatus::parse(&status_raw).map_err(ser)?;

    let finalization = match status {
        AttemptStatus::InProgress => None,
        AttemptStatus::Finished => Some(Finalization {
            time_used_secs: required_u32(row, "time_used_secs")?,
            score: required_u32(row, "score")?,
            confirmed_count: required_u32(row, "confirmed_count")?,
            correct_count: required_u32(row, "correct_count")?,
            ended_at: row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>("ended_at")
                .map_err(ser)?
                .ok_or_else(|| StorageError::Serialization("missing ended_at".into()))?,
        }),
    };

    Attempt::from_persisted(
        id,
        student_id_from_i64(row.try_get::<i64, _>("student_id").map_err(ser)?)?,
        row.try_get("started_at").map_err(ser)?,
        u32_from_i64(
            "time_limit_secs",
            row.try_get::<i64, _>("time_limit_secs").map_err(ser)?,
        )?,
        status,
        question_ids,
        finalization,
    )
    .map_err(ser)
}
