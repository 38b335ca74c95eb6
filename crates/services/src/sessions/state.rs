use std::fmt;

use super::reconcile::ReconciliationReport;
use super::summary::ResultSummary;

/// What sent the session into `Finishing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishTrigger {
    /// The student asked to finish and every question had an answer.
    Manual,
    /// The countdown reached zero.
    TimeExpired,
}

/// Progress through the finish protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishStage {
    /// Manual finish waits for the student to confirm (or cancel).
    AwaitingConfirmation,
    /// Answers are being written durably.
    Reconciling,
    /// Some writes failed; one of the [`RecoveryChoice`] actions is required.
    AwaitingRecovery(ReconciliationReport),
    /// The finalize call failed; confirming again re-runs the protocol.
    FinalizeFailed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finishing {
    pub trigger: FinishTrigger,
    /// Seconds used; tracks the countdown while awaiting confirmation, frozen once reconciling.
    pub time_used_secs: u32,
    pub stage: FinishStage,
}

/// Why a session cannot proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The attempt quota is exhausted (or the store refused for another reason).
    Ineligible(String),
    /// No questions are configured for the student yet.
    ExamUnavailable,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Ineligible(reason) => f.write_str(reason),
            BlockReason::ExamUnavailable => f.write_str("the exam is not available yet"),
        }
    }
}

/// Action taken after reconciliation reported failed writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    /// Run the whole finish protocol again from scratch.
    RetryAll,
    /// Retry exactly the failed writes once, then finalize.
    RetryFailed,
    /// Finalize with what is confirmed now.
    Proceed,
}

/// Lifecycle of one attempt session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Resuming,
    Loading,
    InProgress,
    Finishing(Finishing),
    Finished(Box<ResultSummary>),
    Blocked(BlockReason),
}

impl SessionState {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Initializing => "initializing",
            SessionState::Resuming => "resuming",
            SessionState::Loading => "loading",
            SessionState::InProgress => "in_progress",
            SessionState::Finishing(_) => "finishing",
            SessionState::Finished(_) => "finished",
            SessionState::Blocked(_) => "blocked",
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished(_) | SessionState::Blocked(_))
    }
}
