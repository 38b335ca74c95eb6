use thiserror::Error;

use crate::model::{AttemptError, CategoryError, QuestionError, QuizConfigError, SnapshotError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Category(#[from] CategoryError),
    #[error(transparent)]
    Config(#[from] QuizConfigError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
