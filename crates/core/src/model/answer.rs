use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ids::{OptionId, QuestionId};

/// Chosen option per question. At most one entry per question; absence means unanswered.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSheet(BTreeMap<QuestionId, OptionId>);

impl AnswerSheet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a choice, replacing any earlier one. Returns the previous option.
    pub fn set(&mut self, question: QuestionId, option: OptionId) -> Option<OptionId> {
        self.0.insert(question, option)
    }

    #[must_use]
    pub fn get(&self, question: QuestionId) -> Option<OptionId> {
        self.0.get(&question).copied()
    }

    #[must_use]
    pub fn contains(&self, question: QuestionId) -> bool {
        self.0.contains_key(&question)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuestionId, OptionId)> + '_ {
        self.0.iter().map(|(q, o)| (*q, *o))
    }
}

impl FromIterator<(QuestionId, OptionId)> for AnswerSheet {
    fn from_iter<T: IntoIterator<Item = (QuestionId, OptionId)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An answer as written to (or acknowledged by) the attempt store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedAnswer {
    pub question_id: QuestionId,
    pub option_id: OptionId,
    /// Seconds spent on the question. Not tracked precisely; written as zero.
    pub elapsed_secs: u32,
    pub is_correct: bool,
}

impl RecordedAnswer {
    #[must_use]
    pub fn new(question_id: QuestionId, option_id: OptionId, is_correct: bool) -> Self {
        Self {
            question_id,
            option_id,
            elapsed_secs: 0,
            is_correct,
        }
    }
}
