use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AnswerSheet, Attempt, Question, QuizConfig, StudentId};

/// Current on-disk format of [`ProgressSnapshot`]. Bump on any field change.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// How long a snapshot stays eligible for resume.
#[must_use]
pub fn default_snapshot_max_age() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("snapshot schema version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("snapshot belongs to student {found}, not {expected}")]
    StudentMismatch { expected: StudentId, found: StudentId },

    #[error("snapshot is stale ({age_secs}s old)")]
    Stale { age_secs: i64 },

    #[error("snapshot is inconsistent: {0}")]
    Inconsistent(String),
}

/// Only the version field, read before committing to a full decode.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SnapshotHeader {
    pub schema_version: u32,
}

/// Device-local record of an in-flight attempt, used for crash/reload recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub schema_version: u32,
    pub student_id: StudentId,
    pub answers: AnswerSheet,
    pub remaining_secs: u32,
    pub current_index: usize,
    pub questions: Vec<Question>,
    pub config: QuizConfig,
    pub attempt: Attempt,
    pub captured_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Decide whether this snapshot may be used to resume for `student` at `now`.
    ///
    /// A snapshot is honoured whole or not at all.
    ///
    /// # Errors
    ///
    /// Returns the first reason the snapshot has to be discarded.
    pub fn check_resumable(
        &self,
        student: StudentId,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> Result<(), SnapshotError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: self.schema_version,
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        if self.student_id != student {
            return Err(SnapshotError::StudentMismatch {
                expected: student,
                found: self.student_id,
            });
        }
        let age = now.signed_duration_since(self.captured_at);
        if age >= max_age {
            return Err(SnapshotError::Stale {
                age_secs: age.num_seconds(),
            });
        }
        self.check_consistency()
    }

    fn check_consistency(&self) -> Result<(), SnapshotError> {
        if self.questions.is_empty() {
            return Err(SnapshotError::Inconsistent("no questions".into()));
        }
        if self.current_index >= self.questions.len() {
            return Err(SnapshotError::Inconsistent(format!(
                "current index {} out of range",
                self.current_index
            )));
        }
        if self.attempt.is_finished() {
            return Err(SnapshotError::Inconsistent(format!(
                "attempt {} is already finished",
                self.attempt.id()
            )));
        }
        if self.attempt.student_id() != self.student_id {
            return Err(SnapshotError::Inconsistent(
                "attempt belongs to another student".into(),
            ));
        }
        if self.remaining_secs > self.attempt.time_limit_secs() {
            return Err(SnapshotError::Inconsistent(format!(
                "remaining time {}s exceeds limit {}s",
                self.remaining_secs,
                self.attempt.time_limit_secs()
            )));
        }
        for (question_id, option_id) in self.answers.iter() {
            let Some(question) = self.questions.iter().find(|q| q.id() == question_id) else {
                return Err(SnapshotError::Inconsistent(format!(
                    "answer for unknown question {question_id}"
                )));
            };
            if !question.has_option(option_id) {
                return Err(SnapshotError::Inconsistent(format!(
                    "option {option_id} does not belong to question {question_id}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerOption, AttemptId, NewAttempt, OptionId, QuestionId};
    use crate::time::fixed_now;

    fn question(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            None,
            vec![
                AnswerOption::new(OptionId::new(id * 10), "a", true).unwrap(),
                AnswerOption::new(OptionId::new(id * 10 + 1), "b", false).unwrap(),
            ],
        )
        .unwrap()
    }

    fn snapshot() -> ProgressSnapshot {
        let questions = vec![question(1), question(2)];
        let attempt = Attempt::start(
            AttemptId::generate(),
            NewAttempt {
                student_id: StudentId::new(5),
                question_ids: questions.iter().map(Question::id).collect(),
                time_limit_secs: 600,
                started_at: fixed_now(),
            },
        )
        .unwrap();
        let mut answers = AnswerSheet::new();
        answers.set(QuestionId::new(1), OptionId::new(11));
        ProgressSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            student_id: StudentId::new(5),
            answers,
            remaining_secs: 420,
            current_index: 1,
            questions,
            config: QuizConfig::new(2, 10, 1).unwrap(),
            attempt,
            captured_at: fixed_now(),
        }
    }

    #[test]
    fn fresh_snapshot_for_same_student_is_resumable() {
        let snap = snapshot();
        let now = fixed_now() + Duration::hours(23);
        assert!(snap.check_resumable(StudentId::new(5), now, default_snapshot_max_age()).is_ok());
    }

    #[test]
    fn snapshot_older_than_a_day_is_stale() {
        let snap = snapshot();
        let now = fixed_now() + Duration::hours(24);
        assert!(matches!(
            snap.check_resumable(StudentId::new(5), now, default_snapshot_max_age()),
            Err(SnapshotError::Stale { .. })
        ));
    }

    #[test]
    fn snapshot_for_other_student_is_rejected() {
        let snap = snapshot();
        assert!(matches!(
            snap.check_resumable(StudentId::new(6), fixed_now(), default_snapshot_max_age()),
            Err(SnapshotError::StudentMismatch { .. })
        ));
    }

    #[test]
    fn unknown_schema_version_is_rejected() {
        let mut snap = snapshot();
        snap.schema_version = SNAPSHOT_SCHEMA_VERSION + 1;
        assert!(matches!(
            snap.check_resumable(StudentId::new(5), fixed_now(), default_snapshot_max_age()),
            Err(SnapshotError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn foreign_option_makes_snapshot_inconsistent() {
        let mut snap = snapshot();
        snap.answers.set(QuestionId::new(2), OptionId::new(99));
        assert!(matches!(
            snap.check_resumable(StudentId::new(5), fixed_now(), default_snapshot_max_age()),
            Err(SnapshotError::Inconsistent(_))
        ));
    }

    #[test]
    fn snapshot_survives_json() {
        let snap = snapshot();
        let json = serde_json::to_string(&snap).unwrap();
        let header: SnapshotHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(header.schema_version, SNAPSHOT_SCHEMA_VERSION);
        let back: ProgressSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snap);
    }
}
