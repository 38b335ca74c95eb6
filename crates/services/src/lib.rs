#![forbid(unsafe_code)]

pub mod error;
pub mod sessions;
pub mod settings;
pub mod timer;

pub use quiz_core::Clock;
pub use sessions as session;

pub use error::SessionError;
pub use settings::SessionSettings;
pub use timer::{Countdown, CountdownTick, TimerService};

pub use sessions::{
    AttemptSession, BlockReason, FailedWrite, FinishStage, FinishTrigger, Finishing,
    QuizSessionController, ReconciliationReport, RecoveryChoice, ResultSummary, SessionNotice,
    SessionProgress, SessionState, TickOutcome,
};
