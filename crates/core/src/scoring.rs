//! Score computation from durably confirmed answers.
//!
//! Only answers the attempt store acknowledged count. An optimistic choice that
//! never got confirmed contributes nothing, so a stored score can always be
//! recomputed from server-side state alone.

use crate::model::RecordedAnswer;

/// `round(100 * correct / total)`, rounding halves up. Zero when `total` is zero.
#[must_use]
pub fn score_percent(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let correct = u64::from(correct.min(total));
    let total = u64::from(total);
    let rounded = (200 * correct + total) / (2 * total);
    // correct <= total keeps this within 0..=100.
    u32::try_from(rounded).unwrap_or(100)
}

/// Aggregate outcome of an attempt, derived purely from confirmed answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreCard {
    pub score: u32,
    pub correct_count: u32,
    pub confirmed_count: u32,
    pub total_questions: u32,
}

impl ScoreCard {
    #[must_use]
    pub fn from_confirmed<'a>(
        confirmed: impl IntoIterator<Item = &'a RecordedAnswer>,
        total_questions: u32,
    ) -> Self {
        let mut confirmed_count = 0_u32;
        let mut correct_count = 0_u32;
        for answer in confirmed {
            confirmed_count = confirmed_count.saturating_add(1);
            if answer.is_correct {
                correct_count = correct_count.saturating_add(1);
            }
        }
        Self {
            score: score_percent(correct_count, total_questions),
            correct_count,
            confirmed_count,
            total_questions,
        }
    }
}
