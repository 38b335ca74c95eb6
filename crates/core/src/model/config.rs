use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizConfigError {
    #[error("total questions must be > 0")]
    InvalidTotalQuestions,

    #[error("time limit must be > 0 minutes")]
    InvalidTimeLimit,

    #[error("permitted attempts must be > 0")]
    InvalidPermittedAttempts,
}

/// Quiz configuration, loaded once per session and immutable during an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizConfig {
    total_questions: u32,
    time_limit_minutes: u32,
    permitted_attempts: u32,
}

impl QuizConfig {
    /// # Errors
    ///
    /// Returns `QuizConfigError` if any of the values is zero.
    pub fn new(
        total_questions: u32,
        time_limit_minutes: u32,
        permitted_attempts: u32,
    ) -> Result<Self, QuizConfigError> {
        if total_questions == 0 {
            return Err(QuizConfigError::InvalidTotalQuestions);
        }
        if time_limit_minutes == 0 {
            return Err(QuizConfigError::InvalidTimeLimit);
        }
        if permitted_attempts == 0 {
            return Err(QuizConfigError::InvalidPermittedAttempts);
        }
        Ok(Self {
            total_questions,
            time_limit_minutes,
            permitted_attempts,
        })
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> u32 {
        self.time_limit_minutes
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_minutes.saturating_mul(60)
    }

    #[must_use]
    pub fn permitted_attempts(&self) -> u32 {
        self.permitted_attempts
    }
}
