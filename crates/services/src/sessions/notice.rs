use quiz_core::model::QuestionId;

/// Side notifications for the presentation layer. None of them change state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Resumed from the local progress cache.
    ProgressRestored { answered: usize, remaining_secs: u32 },
    /// Resumed an active attempt held by the attempt store.
    ResumedFromStore { answered: usize },
    /// A background save failed; reconciliation at finish will retry it.
    AnswerWriteDeferred { question_id: QuestionId },
    /// A cached snapshot was ignored.
    SnapshotDiscarded { reason: String },
    /// Result of retrying only the failed writes.
    RetryCompleted { recovered: usize, still_failed: usize },
}
