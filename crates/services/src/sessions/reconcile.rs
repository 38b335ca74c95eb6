//! Finish-time reconciliation: make every optimistic answer durable, and keep
//! an exact record of which writes the store acknowledged.

use serde::Serialize;
use tracing::{debug, warn};

use quiz_core::model::{AttemptId, OptionId, QuestionId, RecordedAnswer};
use storage::repository::AttemptRepository;

/// A write the store did not acknowledge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedWrite {
    pub answer: RecordedAnswer,
    pub error: String,
}

impl FailedWrite {
    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.answer.question_id
    }

    #[must_use]
    pub fn option_id(&self) -> OptionId {
        self.answer.option_id
    }
}

/// Confirmed and failed writes of one reconciliation pass, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub confirmed: Vec<RecordedAnswer>,
    pub failed: Vec<FailedWrite>,
}

impl ReconciliationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Write every answer, even ones an earlier save already confirmed.
pub async fn reconcile(
    attempts: &dyn AttemptRepository,
    attempt_id: AttemptId,
    answers: &[RecordedAnswer],
) -> ReconciliationReport {
    let mut report = ReconciliationReport::default();
    for answer in answers {
        match attempts.save_answer(attempt_id, answer).await {
            Ok(()) => report.confirmed.push(*answer),
            Err(err) => {
                warn!(
                    %attempt_id,
                    question_id = %answer.question_id,
                    error = %err,
                    "answer write failed during reconciliation"
                );
                report.failed.push(FailedWrite {
                    answer: *answer,
                    error: err.to_string(),
                });
            }
        }
    }
    debug!(
        %attempt_id,
        confirmed = report.confirmed.len(),
        failed = report.failed.len(),
        "reconciliation pass complete"
    );
    report
}

/// Retry each failed write exactly once. Returns how many recovered.
pub async fn retry_failed(
    attempts: &dyn AttemptRepository,
    attempt_id: AttemptId,
    report: &mut ReconciliationReport,
) -> usize {
    let failed = std::mem::take(&mut report.failed);
    let mut recovered = 0;
    for mut failure in failed {
        match attempts.save_answer(attempt_id, &failure.answer).await {
            Ok(()) => {
                recovered += 1;
                report.confirmed.push(failure.answer);
            }
            Err(err) => {
                warn!(
                    %attempt_id,
                    question_id = %failure.answer.question_id,
                    error = %err,
                    "answer write failed again on retry"
                );
                failure.error = err.to_string();
                report.failed.push(failure);
            }
        }
    }
    recovered
}
