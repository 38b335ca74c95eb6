use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::model::ids::{OptionId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question {0} has no options")]
    NoOptions(QuestionId),

    #[error("option {option} appears more than once in question {question}")]
    DuplicateOption { question: QuestionId, option: OptionId },

    #[error("option text cannot be empty")]
    EmptyOptionText,

    #[error("invalid image reference: {0}")]
    InvalidImage(String),
}

//
// ─── OPTION ────────────────────────────────────────────────────────────────────
//

/// One selectable answer of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    id: OptionId,
    text: String,
    is_correct: bool,
}

impl AnswerOption {
    /// # Errors
    ///
    /// Returns `QuestionError::EmptyOptionText` if the text is blank.
    pub fn new(id: OptionId, text: impl Into<String>, is_correct: bool) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyOptionText);
        }
        Ok(Self {
            id,
            text,
            is_correct,
        })
    }

    #[must_use]
    pub fn id(&self) -> OptionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this is the correct choice. Only the scoring path should read this.
    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple-choice question. Immutable once loaded into an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    prompt: String,
    image: Option<Url>,
    options: Vec<AnswerOption>,
}

impl Question {
    /// Build a validated question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, there are no options,
    /// or two options share an id.
    pub fn new(
        id: QuestionId,
        prompt: impl Into<String>,
        image: Option<Url>,
        options: Vec<AnswerOption>,
    ) -> Result<Self, QuestionError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if options.is_empty() {
            return Err(QuestionError::NoOptions(id));
        }
        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if !seen.insert(option.id) {
                return Err(QuestionError::DuplicateOption {
                    question: id,
                    option: option.id,
                });
            }
        }
        Ok(Self {
            id,
            prompt,
            image,
            options,
        })
    }

    /// Parse an image reference as stored by the question bank.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidImage` if the value is not a URL.
    pub fn parse_image(raw: &str) -> Result<Url, QuestionError> {
        Url::parse(raw.trim()).map_err(|e| QuestionError::InvalidImage(e.to_string()))
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn image(&self) -> Option<&Url> {
        self.image.as_ref()
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    #[must_use]
    pub fn option(&self, id: OptionId) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.id == id)
    }

    #[must_use]
    pub fn has_option(&self, id: OptionId) -> bool {
        self.option(id).is_some()
    }

    /// `Some(true)` if `id` is the correct option, `None` if it is not part of this question.
    #[must_use]
    pub fn is_correct(&self, id: OptionId) -> Option<bool> {
        self.option(id).map(AnswerOption::is_correct)
    }

    /// Reorder the display order of options. Ids and correctness are untouched.
    pub fn rearrange_options(&mut self, f: impl FnOnce(&mut [AnswerOption])) {
        f(&mut self.options);
    }
}
