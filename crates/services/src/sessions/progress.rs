use serde::Serialize;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub unanswered: usize,
    /// Zero-based index of the question on screen.
    pub current_index: usize,
    pub remaining_secs: u32,
}

impl SessionProgress {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.unanswered == 0
    }
}
