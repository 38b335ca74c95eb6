mod attempt_session;
mod controller;
mod notice;
mod pending;
mod progress;
mod reconcile;
mod state;
mod summary;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use attempt_session::AttemptSession;
pub use controller::{QuizSessionController, TickOutcome};
pub use notice::SessionNotice;
pub use pending::{PendingWrites, WriteOutcome};
pub use progress::SessionProgress;
pub use reconcile::{FailedWrite, ReconciliationReport, reconcile, retry_failed};
pub use state::{BlockReason, FinishStage, FinishTrigger, Finishing, RecoveryChoice, SessionState};
pub use summary::ResultSummary;
