//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AttemptError, OptionId, QuestionError, QuestionId, QuizConfigError};
use storage::repository::StorageError;

/// Errors emitted by the quiz session controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// Manual finish was requested while some questions have no answer.
    /// Holds 1-based question numbers.
    #[error("{} question(s) unanswered: {}", .unanswered.len(), join_numbers(.unanswered))]
    Incomplete { unanswered: Vec<usize> },

    #[error("operation requires state {expected}, session is {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("session already completed")]
    Completed,

    #[error("question {0} is not part of this attempt")]
    UnknownQuestion(QuestionId),

    #[error("option {option} does not belong to question {question}")]
    InvalidOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("question number {index} is out of range (1..={total})")]
    QuestionOutOfRange { index: usize, total: usize },

    /// The call that flips the attempt to finished failed; the session stays in
    /// `Finishing` and may be confirmed again.
    #[error("failed to finalize attempt: {0}")]
    Finalize(#[source] StorageError),

    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Config(#[from] QuizConfigError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
}

fn join_numbers(numbers: &[usize]) -> String {
    numbers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
