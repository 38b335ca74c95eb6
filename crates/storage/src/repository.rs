use async_trait::async_trait;
use quiz_core::model::{
    Attempt, AttemptId, AttemptStatus, Category, Eligibility, Finalization, NewAttempt,
    ProgressSnapshot, Question, QuestionId, QuizConfig, RecordedAnswer, Student, StudentId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// An in-progress attempt as the store knows it: its question set and the
/// answers it has already acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAttempt {
    pub attempt: Attempt,
    pub questions: Vec<Question>,
    pub answers: Vec<RecordedAnswer>,
}

/// Student directory. Authentication itself happens elsewhere.
#[async_trait]
pub trait StudentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the student is unknown.
    async fn get_student(&self, id: StudentId) -> Result<Student, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the student cannot be stored.
    async fn upsert_student(&self, student: &Student) -> Result<(), StorageError>;
}

/// Question bank and quiz configuration.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Configuration for a category, falling back to the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if neither exists.
    async fn fetch_quiz_config(&self, category: Option<&Category>)
    -> Result<QuizConfig, StorageError>;

    /// Draw up to `count` questions.
    ///
    /// When `category` is `None` and a student is given, the student's assigned
    /// category is used. An empty list means the exam is not available yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn fetch_questions(
        &self,
        count: u32,
        category: Option<&Category>,
        student: Option<StudentId>,
    ) -> Result<Vec<Question>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the configuration cannot be stored.
    async fn upsert_quiz_config(
        &self,
        category: Option<&Category>,
        config: &QuizConfig,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(
        &self,
        category: Option<&Category>,
        question: &Question,
    ) -> Result<(), StorageError>;
}

/// Durable attempt store.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the student or the applicable configuration is missing.
    async fn fetch_eligibility(&self, student: StudentId) -> Result<Eligibility, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the attempt is invalid.
    async fn create_attempt(&self, new: &NewAttempt) -> Result<Attempt, StorageError>;

    /// The student's in-progress attempt with its confirmed answers, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn fetch_active_attempt(
        &self,
        student: StudentId,
    ) -> Result<Option<ActiveAttempt>, StorageError>;

    /// Upsert the answer for `(attempt, answer.question_id)`. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the attempt is finished or the
    /// question/option pair does not belong to it.
    async fn save_answer(
        &self,
        attempt: AttemptId,
        answer: &RecordedAnswer,
    ) -> Result<(), StorageError>;

    /// Flip the attempt to finished with its final numbers.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the finalization is inconsistent.
    async fn finish_attempt(
        &self,
        attempt: AttemptId,
        finalization: &Finalization,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn answers_for_attempt(&self, id: AttemptId)
    -> Result<Vec<RecordedAnswer>, StorageError>;
}

/// Single-slot, device-local cache of the in-flight attempt.
#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Replace whatever snapshot is stored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    async fn save(&self, snapshot: &ProgressSnapshot) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored record cannot be
    /// decoded or has an unsupported schema version.
    async fn load(&self) -> Result<Option<ProgressSnapshot>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the slot cannot be cleared.
    async fn clear(&self) -> Result<(), StorageError>;
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(e.to_string())
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    students: Arc<Mutex<HashMap<StudentId, Student>>>,
    configs: Arc<Mutex<HashMap<Option<Category>, QuizConfig>>>,
    questions: Arc<Mutex<Vec<(Option<Category>, Question)>>>,
    attempts: Arc<Mutex<HashMap<AttemptId, Attempt>>>,
    answers: Arc<Mutex<HashMap<(AttemptId, QuestionId), RecordedAnswer>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn student_category(&self, student: StudentId) -> Result<Option<Category>, StorageError> {
        let guard = self.students.lock().map_err(lock_err)?;
        Ok(guard.get(&student).and_then(|s| s.category.clone()))
    }

    fn config_for(&self, category: Option<&Category>) -> Result<QuizConfig, StorageError> {
        let guard = self.configs.lock().map_err(lock_err)?;
        category
            .and_then(|c| guard.get(&Some(c.clone())))
            .or_else(|| guard.get(&None))
            .copied()
            .ok_or(StorageError::NotFound)
    }

    fn questions_by_id(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        ids.iter()
            .map(|id| {
                guard
                    .iter()
                    .find(|(_, q)| q.id() == *id)
                    .map(|(_, q)| q.clone())
                    .ok_or(StorageError::NotFound)
            })
            .collect()
    }
}

#[async_trait]
impl StudentRepository for InMemoryRepository {
    async fn get_student(&self, id: StudentId) -> Result<Student, StorageError> {
        let guard = self.students.lock().map_err(lock_err)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn upsert_student(&self, student: &Student) -> Result<(), StorageError> {
        let mut guard = self.students.lock().map_err(lock_err)?;
        guard.insert(student.id, student.clone());
        Ok(())
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn fetch_quiz_config(
        &self,
        category: Option<&Category>,
    ) -> Result<QuizConfig, StorageError> {
        self.config_for(category)
    }

    async fn fetch_questions(
        &self,
        count: u32,
        category: Option<&Category>,
        student: Option<StudentId>,
    ) -> Result<Vec<Question>, StorageError> {
        let category = match (category, student) {
            (Some(c), _) => Some(c.clone()),
            (None, Some(student)) => self.student_category(student)?,
            (None, None) => None,
        };
        let limit = usize::try_from(count).unwrap_or(usize::MAX);
        let guard = self.questions.lock().map_err(lock_err)?;
        Ok(guard
            .iter()
            .filter(|(c, _)| category.is_none() || c.as_ref() == category.as_ref())
            .map(|(_, q)| q.clone())
            .take(limit)
            .collect())
    }

    async fn upsert_quiz_config(
        &self,
        category: Option<&Category>,
        config: &QuizConfig,
    ) -> Result<(), StorageError> {
        let mut guard = self.configs.lock().map_err(lock_err)?;
        guard.insert(category.cloned(), *config);
        Ok(())
    }

    async fn upsert_question(
        &self,
        category: Option<&Category>,
        question: &Question,
    ) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(lock_err)?;
        if let Some(slot) = guard.iter_mut().find(|(_, q)| q.id() == question.id()) {
            *slot = (category.cloned(), question.clone());
        } else {
            guard.push((category.cloned(), question.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn fetch_eligibility(&self, student: StudentId) -> Result<Eligibility, StorageError> {
        let category = {
            let guard = self.students.lock().map_err(lock_err)?;
            guard
                .get(&student)
                .ok_or(StorageError::NotFound)?
                .category
                .clone()
        };
        let config = self.config_for(category.as_ref())?;

        let guard = self.attempts.lock().map_err(lock_err)?;
        let mine = guard.values().filter(|a| a.student_id() == student);
        let mut finished = 0_u32;
        let mut active: Option<&Attempt> = None;
        for attempt in mine {
            match attempt.status() {
                AttemptStatus::Finished => finished = finished.saturating_add(1),
                AttemptStatus::InProgress => {
                    if active.is_none_or(|a| a.started_at() < attempt.started_at()) {
                        active = Some(attempt);
                    }
                }
            }
        }
        Ok(Eligibility::evaluate(
            config.permitted_attempts(),
            finished,
            active.map(Attempt::id),
        ))
    }

    async fn create_attempt(&self, new: &NewAttempt) -> Result<Attempt, StorageError> {
        let attempt = Attempt::start(AttemptId::generate(), new.clone())
            .map_err(|e| StorageError::Conflict(e.to_string()))?;
        let mut guard = self.attempts.lock().map_err(lock_err)?;
        guard.insert(attempt.id(), attempt.clone());
        Ok(attempt)
    }

    async fn fetch_active_attempt(
        &self,
        student: StudentId,
    ) -> Result<Option<ActiveAttempt>, StorageError> {
        let attempt = {
            let guard = self.attempts.lock().map_err(lock_err)?;
            guard
                .values()
                .filter(|a| a.student_id() == student && !a.is_finished())
                .max_by_key(|a| a.started_at())
                .cloned()
        };
        let Some(attempt) = attempt else {
            return Ok(None);
        };
        let questions = self.questions_by_id(attempt.question_ids())?;
        let answers = self.answers_for_attempt(attempt.id()).await?;
        Ok(Some(ActiveAttempt {
            attempt,
            questions,
            answers,
        }))
    }

    async fn save_answer(
        &self,
        attempt: AttemptId,
        answer: &RecordedAnswer,
    ) -> Result<(), StorageError> {
        {
            let guard = self.attempts.lock().map_err(lock_err)?;
            let stored = guard.get(&attempt).ok_or(StorageError::NotFound)?;
            if stored.is_finished() {
                return Err(StorageError::Conflict(format!(
                    "attempt {attempt} is finished"
                )));
            }
            if !stored.question_ids().contains(&answer.question_id) {
                return Err(StorageError::Conflict(format!(
                    "question {} is not part of attempt {attempt}",
                    answer.question_id
                )));
            }
        }
        let question = self
            .questions_by_id(&[answer.question_id])?
            .pop()
            .ok_or(StorageError::NotFound)?;
        if !question.has_option(answer.option_id) {
            return Err(StorageError::Conflict(format!(
                "option {} does not belong to question {}",
                answer.option_id, answer.question_id
            )));
        }

        let mut guard = self.answers.lock().map_err(lock_err)?;
        guard.insert((attempt, answer.question_id), *answer);
        Ok(())
    }

    async fn finish_attempt(
        &self,
        attempt: AttemptId,
        finalization: &Finalization,
    ) -> Result<(), StorageError> {
        let mut guard = self.attempts.lock().map_err(lock_err)?;
        let stored = guard.get_mut(&attempt).ok_or(StorageError::NotFound)?;
        stored
            .finish(finalization)
            .map_err(|e| StorageError::Conflict(e.to_string()))
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn answers_for_attempt(
        &self,
        id: AttemptId,
    ) -> Result<Vec<RecordedAnswer>, StorageError> {
        let order = {
            let guard = self.attempts.lock().map_err(lock_err)?;
            guard
                .get(&id)
                .ok_or(StorageError::NotFound)?
                .question_ids()
                .to_vec()
        };
        let guard = self.answers.lock().map_err(lock_err)?;
        Ok(order
            .into_iter()
            .filter_map(|q| guard.get(&(id, q)).copied())
            .collect())
    }
}

/// Progress cache kept in process memory. Lost on restart.
#[derive(Clone, Default)]
pub struct InMemoryProgressCache {
    slot: Arc<Mutex<Option<ProgressSnapshot>>>,
}

impl InMemoryProgressCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressCache for InMemoryProgressCache {
    async fn save(&self, snapshot: &ProgressSnapshot) -> Result<(), StorageError> {
        let mut guard = self.slot.lock().map_err(lock_err)?;
        *guard = Some(snapshot.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<ProgressSnapshot>, StorageError> {
        let guard = self.slot.lock().map_err(lock_err)?;
        Ok(guard.clone())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self.slot.lock().map_err(lock_err)?;
        *guard = None;
        Ok(())
    }
}

/// Aggregates the attempt store repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub students: Arc<dyn StudentRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            students: Arc::new(repo.clone()),
            quizzes: Arc::new(repo.clone()),
            attempts: Arc::new(repo),
        }
    }
}
