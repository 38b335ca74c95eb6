use chrono::{DateTime, Utc};

use quiz_core::model::{
    AnswerSheet, Attempt, OptionId, ProgressSnapshot, Question, QuestionId, QuizConfig,
    RecordedAnswer, SNAPSHOT_SCHEMA_VERSION, StudentId,
};

use crate::error::SessionError;
use crate::timer::{Countdown, CountdownTick};

use super::progress::SessionProgress;

/// In-memory state of one attempt: question set, optimistic answers,
/// cursor and countdown. Owned by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptSession {
    attempt: Attempt,
    config: QuizConfig,
    questions: Vec<Question>,
    answers: AnswerSheet,
    current: usize,
    countdown: Countdown,
}

impl AttemptSession {
    /// # Errors
    ///
    /// Returns `SessionError::UnknownQuestion` if `answers` references a
    /// question outside `questions`.
    pub fn new(
        attempt: Attempt,
        config: QuizConfig,
        questions: Vec<Question>,
        answers: AnswerSheet,
        countdown: Countdown,
    ) -> Result<Self, SessionError> {
        for (question_id, option_id) in answers.iter() {
            let question = questions
                .iter()
                .find(|q| q.id() == question_id)
                .ok_or(SessionError::UnknownQuestion(question_id))?;
            if !question.has_option(option_id) {
                return Err(SessionError::InvalidOption {
                    question: question_id,
                    option: option_id,
                });
            }
        }
        Ok(Self {
            attempt,
            config,
            questions,
            answers,
            current: 0,
            countdown,
        })
    }

    /// Hydrate every field from a snapshot that passed the resume checks.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` if the snapshot answers do not fit its questions.
    pub fn from_snapshot(snapshot: ProgressSnapshot, grace_ticks: u32) -> Result<Self, SessionError> {
        let mut session = Self::new(
            snapshot.attempt,
            snapshot.config,
            snapshot.questions,
            snapshot.answers,
            Countdown::with_grace(snapshot.remaining_secs, grace_ticks),
        )?;
        session.current = snapshot.current_index;
        Ok(session)
    }

    #[must_use]
    pub fn snapshot(&self, student_id: StudentId, captured_at: DateTime<Utc>) -> ProgressSnapshot {
        ProgressSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            student_id,
            answers: self.answers.clone(),
            remaining_secs: self.countdown.remaining_secs(),
            current_index: self.current,
            questions: self.questions.clone(),
            config: self.config,
            attempt: self.attempt.clone(),
            captured_at,
        }
    }

    #[must_use]
    pub fn attempt(&self) -> &Attempt {
        &self.attempt
    }

    pub(crate) fn attempt_mut(&mut self) -> &mut Attempt {
        &mut self.attempt
    }

    #[must_use]
    pub fn config(&self) -> &QuizConfig {
        &self.config
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSheet {
        &self.answers
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.countdown.remaining_secs()
    }

    #[must_use]
    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn tick(&mut self) -> CountdownTick {
        self.countdown.tick()
    }

    /// Seconds consumed so far against the attempt's limit.
    #[must_use]
    pub fn time_used_secs(&self) -> u32 {
        self.attempt
            .time_limit_secs()
            .saturating_sub(self.countdown.remaining_secs())
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.questions.len()
    }

    /// Move forward. Returns false at the last question.
    pub fn next(&mut self) -> bool {
        if self.current + 1 < self.questions.len() {
            self.current += 1;
            true
        } else {
            false
        }
    }

    /// Move back. Returns false at the first question.
    pub fn previous(&mut self) -> bool {
        if self.current > 0 {
            self.current -= 1;
            true
        } else {
            false
        }
    }

    /// Jump to a zero-based index.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::QuestionOutOfRange` (reported 1-based).
    pub fn go_to(&mut self, index: usize) -> Result<(), SessionError> {
        if index >= self.questions.len() {
            return Err(SessionError::QuestionOutOfRange {
                index: index + 1,
                total: self.questions.len(),
            });
        }
        self.current = index;
        Ok(())
    }

    /// Record an optimistic answer for the current question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidOption` if the option is not part of the
    /// current question.
    pub fn select(&mut self, option: OptionId) -> Result<RecordedAnswer, SessionError> {
        let question = self
            .questions
            .get(self.current)
            .ok_or(SessionError::QuestionOutOfRange {
                index: self.current + 1,
                total: self.questions.len(),
            })?;
        let is_correct = question
            .is_correct(option)
            .ok_or(SessionError::InvalidOption {
                question: question.id(),
                option,
            })?;
        let question_id = question.id();
        self.answers.set(question_id, option);
        Ok(RecordedAnswer::new(question_id, option, is_correct))
    }

    /// 1-based numbers of questions without an answer, in display order.
    #[must_use]
    pub fn unanswered_questions(&self) -> Vec<usize> {
        self.questions
            .iter()
            .enumerate()
            .filter(|(_, q)| !self.answers.contains(q.id()))
            .map(|(i, _)| i + 1)
            .collect()
    }

    /// Optimistic answers as store writes, in question order.
    #[must_use]
    pub fn recorded_answers(&self) -> Vec<RecordedAnswer> {
        self.questions
            .iter()
            .filter_map(|q| {
                let option = self.answers.get(q.id())?;
                let is_correct = q.is_correct(option)?;
                Some(RecordedAnswer::new(q.id(), option, is_correct))
            })
            .collect()
    }

    #[must_use]
    pub fn answer_for(&self, question: QuestionId) -> Option<OptionId> {
        self.answers.get(question)
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let answered = self
            .questions
            .iter()
            .filter(|q| self.answers.contains(q.id()))
            .count();
        SessionProgress {
            total: self.questions.len(),
            answered,
            unanswered: self.questions.len() - answered,
            current_index: self.current,
            remaining_secs: self.countdown.remaining_secs(),
        }
    }
}
