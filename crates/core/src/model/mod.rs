mod answer;
mod attempt;
mod category;
mod config;
mod ids;
mod question;
mod snapshot;
mod student;

pub use answer::{AnswerSheet, RecordedAnswer};
pub use attempt::{
    Attempt, AttemptError, AttemptStatus, Eligibility, Finalization, NewAttempt,
};
pub use category::{Category, CategoryError};
pub use config::{QuizConfig, QuizConfigError};
pub use ids::{AttemptId, OptionId, ParseIdError, QuestionId, StudentId};
pub use question::{AnswerOption, Question, QuestionError};
pub use snapshot::{
    ProgressSnapshot, SNAPSHOT_SCHEMA_VERSION, SnapshotError, SnapshotHeader,
    default_snapshot_max_age,
};
pub use student::Student;
