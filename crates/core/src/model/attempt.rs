use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AttemptId, QuestionId, StudentId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("an attempt needs at least one question")]
    EmptyQuestionSet,

    #[error("attempt {0} is already finished")]
    AlreadyFinished(AttemptId),

    #[error("confirmed answers ({confirmed}) exceed total questions ({total})")]
    ConfirmedExceedsTotal { confirmed: u32, total: u32 },

    #[error("correct answers ({correct}) exceed confirmed answers ({confirmed})")]
    CorrectExceedsConfirmed { correct: u32, confirmed: u32 },

    #[error("score must be within 0..=100, got {0}")]
    ScoreOutOfRange(u32),

    #[error("invalid attempt status: {0}")]
    InvalidStatus(String),

    #[error("too many questions for a single attempt: {0}")]
    TooManyQuestions(usize),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Finished,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Finished => "finished",
        }
    }

    /// # Errors
    ///
    /// Returns `AttemptError::InvalidStatus` for unknown values.
    pub fn parse(raw: &str) -> Result<Self, AttemptError> {
        match raw {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "finished" => Ok(AttemptStatus::Finished),
            other => Err(AttemptError::InvalidStatus(other.to_string())),
        }
    }
}

//
// ─── NEW ATTEMPT / FINALIZATION ────────────────────────────────────────────────
//

/// Everything a store needs to open a new attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub student_id: StudentId,
    pub question_ids: Vec<QuestionId>,
    pub time_limit_secs: u32,
    pub started_at: DateTime<Utc>,
}

/// Values written by the single call that flips an attempt to finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalization {
    pub time_used_secs: u32,
    pub score: u32,
    pub confirmed_count: u32,
    pub correct_count: u32,
    pub ended_at: DateTime<Utc>,
}

impl Finalization {
    /// Check the counts against the attempt's question total.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if counts are inconsistent or the score is not a percentage.
    pub fn validate(&self, total_questions: u32) -> Result<(), AttemptError> {
        if self.confirmed_count > total_questions {
            return Err(AttemptError::ConfirmedExceedsTotal {
                confirmed: self.confirmed_count,
                total: total_questions,
            });
        }
        if self.correct_count > self.confirmed_count {
            return Err(AttemptError::CorrectExceedsConfirmed {
                correct: self.correct_count,
                confirmed: self.confirmed_count,
            });
        }
        if self.score > 100 {
            return Err(AttemptError::ScoreOutOfRange(self.score));
        }
        Ok(())
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One student's single pass at the quiz, from creation to finalize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    id: AttemptId,
    student_id: StudentId,
    started_at: DateTime<Utc>,
    time_limit_secs: u32,
    ended_at: Option<DateTime<Utc>>,
    status: AttemptStatus,
    total_questions: u32,
    confirmed_count: u32,
    correct_count: u32,
    score: Option<u32>,
    time_used_secs: Option<u32>,
    question_ids: Vec<QuestionId>,
}

impl Attempt {
    /// Open a new in-progress attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::EmptyQuestionSet` if there are no questions.
    pub fn start(id: AttemptId, new: NewAttempt) -> Result<Self, AttemptError> {
        if new.question_ids.is_empty() {
            return Err(AttemptError::EmptyQuestionSet);
        }
        let total_questions = u32::try_from(new.question_ids.len())
            .map_err(|_| AttemptError::TooManyQuestions(new.question_ids.len()))?;
        Ok(Self {
            id,
            student_id: new.student_id,
            started_at: new.started_at,
            time_limit_secs: new.time_limit_secs,
            ended_at: None,
            status: AttemptStatus::InProgress,
            total_questions,
            confirmed_count: 0,
            correct_count: 0,
            score: None,
            time_used_secs: None,
            question_ids: new.question_ids,
        })
    }

    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the stored counts are inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        student_id: StudentId,
        started_at: DateTime<Utc>,
        time_limit_secs: u32,
        status: AttemptStatus,
        question_ids: Vec<QuestionId>,
        finalization: Option<Finalization>,
    ) -> Result<Self, AttemptError> {
        let mut attempt = Self::start(
            id,
            NewAttempt {
                student_id,
                question_ids,
                time_limit_secs,
                started_at,
            },
        )?;
        match (status, finalization) {
            (AttemptStatus::Finished, Some(f)) => attempt.finish(&f)?,
            (AttemptStatus::Finished, None) => {
                return Err(AttemptError::InvalidStatus(
                    "finished attempt without finalization".into(),
                ));
            }
            (AttemptStatus::InProgress, _) => {}
        }
        Ok(attempt)
    }

    /// Flip the attempt to finished. Allowed exactly once.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadyFinished` on a second call, or a count error
    /// if the finalization does not fit this attempt.
    pub fn finish(&mut self, finalization: &Finalization) -> Result<(), AttemptError> {
        if self.is_finished() {
            return Err(AttemptError::AlreadyFinished(self.id));
        }
        finalization.validate(self.total_questions)?;
        self.status = AttemptStatus::Finished;
        self.ended_at = Some(finalization.ended_at);
        self.confirmed_count = finalization.confirmed_count;
        self.correct_count = finalization.correct_count;
        self.score = Some(finalization.score);
        self.time_used_secs = Some(finalization.time_used_secs);
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_secs
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status == AttemptStatus::Finished
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn confirmed_count(&self) -> u32 {
        self.confirmed_count
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn score(&self) -> Option<u32> {
        self.score
    }

    #[must_use]
    pub fn time_used_secs(&self) -> Option<u32> {
        self.time_used_secs
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }
}

//
// ─── ELIGIBILITY ───────────────────────────────────────────────────────────────
//

/// Whether a student may start (or continue) an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub can_start: bool,
    pub reason: Option<String>,
    pub has_active_attempt: bool,
    pub active_attempt_id: Option<AttemptId>,
}

impl Eligibility {
    /// Decide eligibility from the attempt quota and the student's history.
    ///
    /// An active attempt can always be continued; otherwise the student needs
    /// a free slot in the quota.
    #[must_use]
    pub fn evaluate(permitted: u32, finished: u32, active: Option<AttemptId>) -> Self {
        if let Some(active_id) = active {
            return Self {
                can_start: true,
                reason: None,
                has_active_attempt: true,
                active_attempt_id: Some(active_id),
            };
        }
        if finished >= permitted {
            let noun = if permitted == 1 { "attempt" } else { "attempts" };
            return Self {
                can_start: false,
                reason: Some(format!(
                    "you have already used all {permitted} permitted {noun} for this quiz"
                )),
                has_active_attempt: false,
                active_attempt_id: None,
            };
        }
        Self {
            can_start: true,
            reason: None,
            has_active_attempt: false,
            active_attempt_id: None,
        }
    }
}
