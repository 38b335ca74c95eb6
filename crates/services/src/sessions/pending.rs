use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use quiz_core::model::{AttemptId, QuestionId, RecordedAnswer};
use storage::repository::{AttemptRepository, StorageError};

/// Result of one background answer write.
#[derive(Debug)]
pub struct WriteOutcome {
    pub seq: u64,
    pub question_id: QuestionId,
    pub result: Result<(), StorageError>,
}

/// Per-answer saves issued while the attempt is in progress.
///
/// Writes run in the background so navigation never waits on the store.
/// Finishing drains the queue before reconciling, so no late write can land
/// after the reconciliation pass.
pub struct PendingWrites {
    attempts: Arc<dyn AttemptRepository>,
    in_flight: JoinSet<WriteOutcome>,
    next_seq: u64,
}

impl PendingWrites {
    #[must_use]
    pub fn new(attempts: Arc<dyn AttemptRepository>) -> Self {
        Self {
            attempts,
            in_flight: JoinSet::new(),
            next_seq: 0,
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Queue a background write. Returns its sequence number.
    pub fn enqueue(&mut self, attempt_id: AttemptId, answer: RecordedAnswer) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        let attempts = Arc::clone(&self.attempts);
        self.in_flight.spawn(async move {
            let result = attempts.save_answer(attempt_id, &answer).await;
            WriteOutcome {
                seq,
                question_id: answer.question_id,
                result,
            }
        });
        seq
    }

    /// Outcomes of writes that have already completed, without waiting.
    pub fn collect_settled(&mut self) -> Vec<WriteOutcome> {
        let mut settled = Vec::new();
        while let Some(joined) = self.in_flight.try_join_next() {
            if let Some(outcome) = log_outcome(joined) {
                settled.push(outcome);
            }
        }
        settled
    }

    /// Wait for every in-flight write.
    pub async fn drain(&mut self) -> Vec<WriteOutcome> {
        let mut settled = Vec::new();
        while let Some(joined) = self.in_flight.join_next().await {
            if let Some(outcome) = log_outcome(joined) {
                settled.push(outcome);
            }
        }
        settled.sort_by_key(|o| o.seq);
        settled
    }
}

fn log_outcome(joined: Result<WriteOutcome, tokio::task::JoinError>) -> Option<WriteOutcome> {
    match joined {
        Ok(outcome) => {
            match &outcome.result {
                Ok(()) => debug!(seq = outcome.seq, question_id = %outcome.question_id, "answer saved"),
                Err(err) => warn!(
                    seq = outcome.seq,
                    question_id = %outcome.question_id,
                    error = %err,
                    "answer save deferred to reconciliation"
                ),
            }
            Some(outcome)
        }
        Err(err) => {
            warn!(error = %err, "answer save task did not complete");
            None
        }
    }
}
