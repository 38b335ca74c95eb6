use quiz_core::model::{Student, StudentId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, parse_category, ser},
};
use crate::repository::{StorageError, StudentRepository};

#[async_trait::async_trait]
impl StudentRepository for SqliteRepository {
    async fn get_student(&self, id: StudentId) -> Result<Student, StorageError> {
        let row = sqlx::query("SELECT id, name, category FROM students WHERE id = ?1")
            .bind(id_i64("student_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
            .ok_or(StorageError::NotFound)?;

        Ok(Student {
            id,
            name: row.try_get("name").map_err(ser)?,
            category: parse_category(row.try_get("category").map_err(ser)?)?,
        })
    }

    async fn upsert_student(&self, student: &Student) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO students (id, name, category)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    category = excluded.category
            ",
        )
        .bind(id_i64("student_id", student.id.value())?)
        .bind(student.name.as_str())
        .bind(student.category.as_ref().map(|c| c.as_str().to_owned()))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
