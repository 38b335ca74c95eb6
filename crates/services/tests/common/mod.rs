#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quiz_core::model::{
    AnswerOption, Attempt, AttemptId, Eligibility, Finalization, NewAttempt, OptionId, Question,
    QuestionId, QuizConfig, RecordedAnswer, Student, StudentId,
};
use services::{Clock, QuizSessionController, SessionSettings};
use storage::repository::{
    ActiveAttempt, AttemptRepository, InMemoryProgressCache, InMemoryRepository, ProgressCache,
    QuizRepository, Storage, StorageError, StudentRepository,
};

/// Attempt store that fails selected writes on demand.
#[derive(Clone, Default)]
pub struct FlakyAttempts {
    inner: InMemoryRepository,
    save_failures: Arc<Mutex<HashMap<QuestionId, u32>>>,
    finish_failures: Arc<Mutex<u32>>,
    save_calls: Arc<AtomicUsize>,
    finish_calls: Arc<AtomicUsize>,
}

impl FlakyAttempts {
    pub fn new(inner: InMemoryRepository) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Fail the next `times` saves for `question`.
    pub fn fail_saves(&self, question: u64, times: u32) {
        self.save_failures
            .lock()
            .unwrap()
            .insert(QuestionId::new(question), times);
    }

    pub fn fail_finish(&self, times: u32) {
        *self.finish_failures.lock().unwrap() = times;
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn finish_calls(&self) -> usize {
        self.finish_calls.load(Ordering::SeqCst)
    }
}

fn injected() -> StorageError {
    StorageError::Connection("injected failure".into())
}

#[async_trait]
impl AttemptRepository for FlakyAttempts {
    async fn fetch_eligibility(&self, student: StudentId) -> Result<Eligibility, StorageError> {
        self.inner.fetch_eligibility(student).await
    }

    async fn create_attempt(&self, new: &NewAttempt) -> Result<Attempt, StorageError> {
        self.inner.create_attempt(new).await
    }

    async fn fetch_active_attempt(
        &self,
        student: StudentId,
    ) -> Result<Option<ActiveAttempt>, StorageError> {
        self.inner.fetch_active_attempt(student).await
    }

    async fn save_answer(
        &self,
        attempt: AttemptId,
        answer: &RecordedAnswer,
    ) -> Result<(), StorageError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.save_failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&answer.question_id) {
                if *left > 0 {
                    *left -= 1;
                    return Err(injected());
                }
            }
        }
        self.inner.save_answer(attempt, answer).await
    }

    async fn finish_attempt(
        &self,
        attempt: AttemptId,
        finalization: &Finalization,
    ) -> Result<(), StorageError> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut left = self.finish_failures.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(injected());
            }
        }
        self.inner.finish_attempt(attempt, finalization).await
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        self.inner.get_attempt(id).await
    }

    async fn answers_for_attempt(&self, id: AttemptId) -> Result<Vec<RecordedAnswer>, StorageError> {
        self.inner.answers_for_attempt(id).await
    }
}

pub struct Fixture {
    pub repo: InMemoryRepository,
    pub attempts: FlakyAttempts,
    pub cache: Arc<InMemoryProgressCache>,
    pub storage: Storage,
}

impl Fixture {
    pub fn controller(&self, student: u64, clock: Clock) -> QuizSessionController {
        self.controller_with_cache(student, clock, self.cache.clone())
    }

    pub fn controller_with_cache(
        &self,
        student: u64,
        clock: Clock,
        cache: Arc<dyn ProgressCache>,
    ) -> QuizSessionController {
        QuizSessionController::new(StudentId::new(student), &self.storage, cache)
            .with_clock(clock)
            .with_settings(SessionSettings::default())
    }
}

pub fn question(id: u64) -> Question {
    Question::new(
        QuestionId::new(id),
        format!("Question {id}"),
        None,
        vec![
            AnswerOption::new(correct(id), "right", true).unwrap(),
            AnswerOption::new(wrong(id), "wrong", false).unwrap(),
            AnswerOption::new(OptionId::new(id * 10 + 2), "also wrong", false).unwrap(),
        ],
    )
    .unwrap()
}

pub fn correct(question: u64) -> OptionId {
    OptionId::new(question * 10)
}

pub fn wrong(question: u64) -> OptionId {
    OptionId::new(question * 10 + 1)
}

/// Two students, a default config of `total` questions and a bank of `bank` questions.
pub async fn fixture_with_bank(total: u32, bank: u64, minutes: u32, permitted: u32) -> Fixture {
    let repo = InMemoryRepository::new();
    repo.upsert_student(&Student::new(StudentId::new(1), "Ada Lovelace", None))
        .await
        .unwrap();
    repo.upsert_student(&Student::new(StudentId::new(2), "Grace Hopper", None))
        .await
        .unwrap();
    repo.upsert_quiz_config(None, &QuizConfig::new(total, minutes, permitted).unwrap())
        .await
        .unwrap();
    for id in 1..=bank {
        repo.upsert_question(None, &question(id)).await.unwrap();
    }

    let attempts = FlakyAttempts::new(repo.clone());
    let storage = Storage {
        students: Arc::new(repo.clone()),
        quizzes: Arc::new(repo.clone()),
        attempts: Arc::new(attempts.clone()),
    };
    Fixture {
        repo,
        attempts,
        cache: Arc::new(InMemoryProgressCache::new()),
        storage,
    }
}

pub async fn fixture(total: u32, minutes: u32, permitted: u32) -> Fixture {
    fixture_with_bank(total, u64::from(total), minutes, permitted).await
}

/// Answer 1-based question `number` with `option`.
pub async fn answer(ctrl: &mut QuizSessionController, number: u64, option: OptionId) {
    ctrl.go_to(usize::try_from(number - 1).unwrap())
        .await
        .unwrap();
    ctrl.select_option(option).await.unwrap();
}

pub async fn answer_all_correct(ctrl: &mut QuizSessionController, count: u64) {
    for q in 1..=count {
        answer(ctrl, q, correct(q)).await;
    }
}
