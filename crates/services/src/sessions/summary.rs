use chrono::{DateTime, Utc};
use serde::Serialize;

use quiz_core::model::{AttemptId, RecordedAnswer, Student};

use super::reconcile::FailedWrite;
use super::state::FinishTrigger;

/// Outcome handed to the presentation layer once the attempt is finalized.
///
/// Score and counts come from `confirmed` only; `failed` lists answers the
/// store never acknowledged, so the split is always inspectable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    pub attempt_id: AttemptId,
    pub student: Student,
    pub score: u32,
    pub correct_count: u32,
    pub total_questions: u32,
    pub time_used_secs: u32,
    pub confirmed: Vec<RecordedAnswer>,
    pub failed: Vec<FailedWrite>,
    pub trigger: FinishTrigger,
    pub finished_at: DateTime<Utc>,
}

impl ResultSummary {
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.confirmed.len()
    }

    #[must_use]
    pub fn has_unconfirmed(&self) -> bool {
        !self.failed.is_empty()
    }
}
