use std::collections::VecDeque;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::{debug, error, info, warn};

use quiz_core::model::{
    AnswerSheet, Finalization, NewAttempt, OptionId, ProgressSnapshot, Question, RecordedAnswer,
    Student, StudentId,
};
use quiz_core::scoring::ScoreCard;
use storage::repository::{
    AttemptRepository, ProgressCache, QuizRepository, Storage, StorageError, StudentRepository,
};

use crate::Clock;
use crate::error::SessionError;
use crate::settings::SessionSettings;
use crate::timer::{Countdown, CountdownTick, TimerService};

use super::attempt_session::AttemptSession;
use super::notice::SessionNotice;
use super::pending::{PendingWrites, WriteOutcome};
use super::progress::SessionProgress;
use super::reconcile::{self, ReconciliationReport};
use super::state::{
    BlockReason, FinishStage, FinishTrigger, Finishing, RecoveryChoice, SessionState,
};
use super::summary::ResultSummary;

/// What a countdown tick did to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session is not in progress; nothing happened.
    Ignored,
    Held { grace_left: u32 },
    Counted { remaining_secs: u32 },
    /// Time ran out and the finish protocol ran.
    Expired,
}

/// State machine for a single timed attempt.
///
/// All mutation goes through `&mut self`, so state-machine steps never run in
/// parallel. Per-answer saves are the only work that leaves the controller's
/// control flow, and the finish protocol drains them first.
pub struct QuizSessionController {
    clock: Clock,
    settings: SessionSettings,
    student_id: StudentId,
    student: Option<Student>,
    students: Arc<dyn StudentRepository>,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    cache: Arc<dyn ProgressCache>,
    state: SessionState,
    session: Option<AttemptSession>,
    pending: PendingWrites,
    timer: TimerService,
    notices: VecDeque<SessionNotice>,
}

impl QuizSessionController {
    #[must_use]
    pub fn new(student_id: StudentId, storage: &Storage, cache: Arc<dyn ProgressCache>) -> Self {
        let settings = SessionSettings::default();
        Self {
            clock: Clock::default(),
            timer: TimerService::new(settings.tick_period),
            settings,
            student_id,
            student: None,
            students: Arc::clone(&storage.students),
            quizzes: Arc::clone(&storage.quizzes),
            attempts: Arc::clone(&storage.attempts),
            pending: PendingWrites::new(Arc::clone(&storage.attempts)),
            cache,
            state: SessionState::Initializing,
            session: None,
            notices: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_settings(mut self, settings: SessionSettings) -> Self {
        self.timer = TimerService::new(settings.tick_period);
        self.settings = settings;
        self
    }

    //
    // ─── QUERIES ───────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn student(&self) -> Option<&Student> {
        self.student.as_ref()
    }

    #[must_use]
    pub fn session(&self) -> Option<&AttemptSession> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.session.as_ref().and_then(AttemptSession::current_question)
    }

    #[must_use]
    pub fn progress(&self) -> Option<SessionProgress> {
        self.session.as_ref().map(AttemptSession::progress)
    }

    /// 1-based numbers of unanswered questions.
    #[must_use]
    pub fn unanswered_questions(&self) -> Vec<usize> {
        self.session
            .as_ref()
            .map(AttemptSession::unanswered_questions)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn result(&self) -> Option<&ResultSummary> {
        match &self.state {
            SessionState::Finished(summary) => Some(&**summary),
            _ => None,
        }
    }

    /// Reconciliation failures awaiting a [`RecoveryChoice`].
    #[must_use]
    pub fn recovery_report(&self) -> Option<&ReconciliationReport> {
        match &self.state {
            SessionState::Finishing(Finishing {
                stage: FinishStage::AwaitingRecovery(report),
                ..
            }) => Some(report),
            _ => None,
        }
    }

    pub fn drain_notices(&mut self) -> Vec<SessionNotice> {
        self.notices.drain(..).collect()
    }

    /// Wait for the next countdown tick. Pends forever while no countdown runs.
    pub async fn wait_tick(&mut self) {
        self.timer.next_tick().await;
    }

    //
    // ─── START ─────────────────────────────────────────────────────────────────
    //

    /// Resolve the student, then resume from the local cache or load from the store.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` when the student, configuration or
    /// questions cannot be loaded. The controller returns to `Initializing`
    /// so the caller may try again.
    pub async fn start(&mut self) -> Result<&SessionState, SessionError> {
        if !matches!(self.state, SessionState::Initializing) {
            return Err(invalid_state("initializing", &self.state));
        }
        let student = self.students.get_student(self.student_id).await?;
        self.student = Some(student.clone());

        if let Some(snapshot) = self.resumable_snapshot().await {
            self.state = SessionState::Resuming;
            match AttemptSession::from_snapshot(snapshot, self.settings.resume_grace_ticks) {
                Ok(session) => {
                    let progress = session.progress();
                    info!(
                        attempt_id = %session.attempt().id(),
                        answered = progress.answered,
                        remaining_secs = progress.remaining_secs,
                        "progress restored from local cache"
                    );
                    self.notices.push_back(SessionNotice::ProgressRestored {
                        answered: progress.answered,
                        remaining_secs: progress.remaining_secs,
                    });
                    self.enter_in_progress(session).await;
                    return Ok(&self.state);
                }
                Err(err) => self.discard_snapshot(err.to_string()).await,
            }
        }

        self.state = SessionState::Loading;
        if let Err(err) = self.load(&student).await {
            error!(student_id = %self.student_id, error = %err, "failed to load quiz");
            self.session = None;
            self.state = SessionState::Initializing;
            return Err(err);
        }
        Ok(&self.state)
    }

    async fn resumable_snapshot(&mut self) -> Option<ProgressSnapshot> {
        let snapshot = match self.cache.load().await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "progress cache unreadable");
                self.discard_snapshot(err.to_string()).await;
                return None;
            }
        };
        if let Err(err) = snapshot.check_resumable(
            self.student_id,
            self.clock.now(),
            self.settings.snapshot_max_age,
        ) {
            self.discard_snapshot(err.to_string()).await;
            return None;
        }

        let attempt_id = snapshot.attempt.id();
        match self.attempts.get_attempt(attempt_id).await {
            Ok(stored) if stored.is_finished() => {
                self.discard_snapshot(format!("attempt {attempt_id} is already finished"))
                    .await;
                None
            }
            Ok(_) => Some(snapshot),
            Err(StorageError::NotFound) => {
                self.discard_snapshot(format!("attempt {attempt_id} is unknown to the store"))
                    .await;
                None
            }
            // Offline: trust the snapshot, reconciliation settles it at finish.
            Err(err) => {
                warn!(%attempt_id, error = %err, "could not check cached attempt against store");
                Some(snapshot)
            }
        }
    }

    async fn discard_snapshot(&mut self, reason: String) {
        info!(student_id = %self.student_id, %reason, "discarding cached progress");
        self.notices
            .push_back(SessionNotice::SnapshotDiscarded { reason });
        self.clear_cache().await;
    }

    async fn load(&mut self, student: &Student) -> Result<(), SessionError> {
        let eligibility = self.attempts.fetch_eligibility(student.id).await?;

        if eligibility.has_active_attempt {
            if let Some(active) = self.attempts.fetch_active_attempt(student.id).await? {
                let config = self
                    .quizzes
                    .fetch_quiz_config(student.category.as_ref())
                    .await?;
                let answers: AnswerSheet = active
                    .answers
                    .iter()
                    .map(|a| (a.question_id, a.option_id))
                    .collect();
                let answered = answers.len();
                // Store-side resume restores the full time limit.
                let limit = active.attempt.time_limit_secs();
                let session = AttemptSession::new(
                    active.attempt,
                    config,
                    active.questions,
                    answers,
                    Countdown::new(limit),
                )?;
                info!(
                    attempt_id = %session.attempt().id(),
                    answered,
                    "resumed active attempt from store"
                );
                self.notices
                    .push_back(SessionNotice::ResumedFromStore { answered });
                self.enter_in_progress(session).await;
                return Ok(());
            }
            warn!(
                student_id = %student.id,
                "store reported an active attempt but returned none"
            );
        }

        if !eligibility.can_start {
            let reason = eligibility
                .reason
                .unwrap_or_else(|| "you are not eligible to take this quiz".to_string());
            info!(student_id = %student.id, %reason, "session blocked");
            self.state = SessionState::Blocked(BlockReason::Ineligible(reason));
            return Ok(());
        }

        let config = self
            .quizzes
            .fetch_quiz_config(student.category.as_ref())
            .await?;
        let mut questions = self
            .quizzes
            .fetch_questions(
                config.total_questions(),
                student.category.as_ref(),
                Some(student.id),
            )
            .await?;
        if questions.is_empty() {
            info!(student_id = %student.id, "no questions available");
            self.state = SessionState::Blocked(BlockReason::ExamUnavailable);
            return Ok(());
        }
        if self.settings.shuffle_options {
            shuffle_options(&mut questions);
        }

        let new = NewAttempt {
            student_id: student.id,
            question_ids: questions.iter().map(Question::id).collect(),
            time_limit_secs: config.time_limit_secs(),
            started_at: self.clock.now(),
        };
        let attempt = self.attempts.create_attempt(&new).await?;
        info!(
            attempt_id = %attempt.id(),
            questions = questions.len(),
            time_limit_secs = config.time_limit_secs(),
            "attempt started"
        );
        let session = AttemptSession::new(
            attempt,
            config,
            questions,
            AnswerSheet::new(),
            Countdown::new(config.time_limit_secs()),
        )?;
        self.enter_in_progress(session).await;
        Ok(())
    }

    async fn enter_in_progress(&mut self, session: AttemptSession) {
        self.session = Some(session);
        self.pending = PendingWrites::new(Arc::clone(&self.attempts));
        self.state = SessionState::InProgress;
        self.timer.start();
        self.persist_progress().await;
    }

    //
    // ─── IN PROGRESS ───────────────────────────────────────────────────────────
    //

    /// Move to the next question. Returns false at the last one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` unless the session is in progress.
    pub async fn next(&mut self) -> Result<bool, SessionError> {
        self.require_in_progress()?;
        let moved = self.session_mut()?.next();
        if moved {
            self.persist_progress().await;
        }
        Ok(moved)
    }

    /// Move to the previous question. Returns false at the first one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError` unless the session is in progress.
    pub async fn previous(&mut self) -> Result<bool, SessionError> {
        self.require_in_progress()?;
        let moved = self.session_mut()?.previous();
        if moved {
            self.persist_progress().await;
        }
        Ok(moved)
    }

    /// Jump to a zero-based question index.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::QuestionOutOfRange` for an invalid index.
    pub async fn go_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.require_in_progress()?;
        self.session_mut()?.go_to(index)?;
        self.persist_progress().await;
        Ok(())
    }

    /// Answer the current question.
    ///
    /// The answer is recorded locally at once and saved to the store in the
    /// background; a failed save only surfaces as a notice and is repaired at
    /// finish.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidOption` for an option of another
    /// question, or a state error unless the session is in progress.
    pub async fn select_option(&mut self, option: OptionId) -> Result<RecordedAnswer, SessionError> {
        self.require_in_progress()?;
        self.note_settled_writes();
        let session = self.session_mut()?;
        let answer = session.select(option)?;
        let attempt_id = session.attempt().id();
        let seq = self.pending.enqueue(attempt_id, answer);
        debug!(%attempt_id, question_id = %answer.question_id, seq, "answer recorded");
        self.persist_progress().await;
        Ok(answer)
    }

    /// Advance the countdown by one tick.
    ///
    /// While a manual finish awaits confirmation the clock keeps running but
    /// reaching zero triggers nothing; once reconciliation starts ticks are
    /// ignored. Reaching zero while in progress enters `Finishing` without
    /// completeness checks or confirmation and runs the finish protocol.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finalize` if expiry finalization fails.
    pub async fn tick(&mut self) -> Result<TickOutcome, SessionError> {
        match &self.state {
            SessionState::InProgress => {}
            SessionState::Finishing(Finishing {
                stage: FinishStage::AwaitingConfirmation,
                ..
            }) => return self.tick_while_confirming().await,
            _ => return Ok(TickOutcome::Ignored),
        }
        self.note_settled_writes();
        match self.session_mut()?.tick() {
            CountdownTick::Held { grace_left } => Ok(TickOutcome::Held { grace_left }),
            CountdownTick::Counted { remaining_secs } => {
                self.persist_progress().await;
                Ok(TickOutcome::Counted { remaining_secs })
            }
            CountdownTick::Expired => {
                self.persist_progress().await;
                info!(student_id = %self.student_id, "time expired, finishing attempt");
                self.enter_finishing(FinishTrigger::TimeExpired, FinishStage::Reconciling)?;
                self.run_finish_protocol().await?;
                Ok(TickOutcome::Expired)
            }
        }
    }

    async fn tick_while_confirming(&mut self) -> Result<TickOutcome, SessionError> {
        let session = self.session_mut()?;
        let outcome = match session.tick() {
            CountdownTick::Held { grace_left } => return Ok(TickOutcome::Held { grace_left }),
            CountdownTick::Counted { remaining_secs } => TickOutcome::Counted { remaining_secs },
            CountdownTick::Expired => TickOutcome::Counted { remaining_secs: 0 },
        };
        let used = session.time_used_secs();
        if let SessionState::Finishing(finishing) = &mut self.state {
            finishing.time_used_secs = used;
        }
        self.persist_progress().await;
        Ok(outcome)
    }

    /// Abandon interactive use for now: wait for background saves, store a
    /// final snapshot and stop the countdown. The attempt stays in progress.
    pub async fn suspend(&mut self) {
        self.timer.stop();
        let drained = self.pending.drain().await;
        self.note_write_outcomes(drained);
        let resumable = matches!(
            self.state,
            SessionState::InProgress
                | SessionState::Finishing(Finishing {
                    stage: FinishStage::AwaitingConfirmation,
                    ..
                })
        );
        if resumable {
            self.persist_progress().await;
        }
    }

    //
    // ─── FINISHING ─────────────────────────────────────────────────────────────
    //

    /// Ask to finish manually. Every question must have an answer.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Incomplete` listing unanswered questions.
    pub fn request_finish(&mut self) -> Result<(), SessionError> {
        self.require_in_progress()?;
        let unanswered = self.unanswered_questions();
        if !unanswered.is_empty() {
            return Err(SessionError::Incomplete { unanswered });
        }
        self.enter_finishing(FinishTrigger::Manual, FinishStage::AwaitingConfirmation)
    }

    /// Decline the manual finish confirmation and keep answering.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless a confirmation is pending.
    pub fn cancel_finish(&mut self) -> Result<(), SessionError> {
        let awaiting = matches!(
            self.state,
            SessionState::Finishing(Finishing {
                trigger: FinishTrigger::Manual,
                stage: FinishStage::AwaitingConfirmation,
                ..
            })
        );
        if !awaiting {
            return Err(invalid_state("finishing", &self.state));
        }
        self.state = SessionState::InProgress;
        if !self.timer.is_running() {
            self.timer.start();
        }
        Ok(())
    }

    /// Confirm the finish and run the protocol. Also the way back in after a
    /// failed finalize.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Finalize` if the finalize call fails.
    pub async fn confirm_finish(&mut self) -> Result<&SessionState, SessionError> {
        match &self.state {
            SessionState::Finishing(Finishing {
                stage: FinishStage::AwaitingConfirmation | FinishStage::FinalizeFailed { .. },
                ..
            }) => {}
            SessionState::Finished(_) => return Err(SessionError::Completed),
            other => return Err(invalid_state("finishing", other)),
        }
        self.run_finish_protocol().await?;
        Ok(&self.state)
    }

    /// Apply the caller's choice after reconciliation reported failed writes.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidState` unless a recovery decision is
    /// pending, or `SessionError::Finalize` if finalization fails.
    pub async fn resolve_recovery(
        &mut self,
        choice: RecoveryChoice,
    ) -> Result<&SessionState, SessionError> {
        let report = match &self.state {
            SessionState::Finishing(Finishing {
                stage: FinishStage::AwaitingRecovery(report),
                ..
            }) => report.clone(),
            SessionState::Finished(_) => return Err(SessionError::Completed),
            other => return Err(invalid_state("finishing", other)),
        };
        info!(?choice, failed = report.failed.len(), "recovery choice");
        match choice {
            RecoveryChoice::RetryAll => self.run_finish_protocol().await?,
            RecoveryChoice::RetryFailed => {
                let mut report = report;
                self.set_stage(FinishStage::Reconciling);
                let attempt_id = self.session_ref()?.attempt().id();
                let recovered =
                    reconcile::retry_failed(self.attempts.as_ref(), attempt_id, &mut report).await;
                self.notices.push_back(SessionNotice::RetryCompleted {
                    recovered,
                    still_failed: report.failed.len(),
                });
                self.finalize(report).await?;
            }
            RecoveryChoice::Proceed => self.finalize(report).await?,
        }
        Ok(&self.state)
    }

    fn enter_finishing(
        &mut self,
        trigger: FinishTrigger,
        stage: FinishStage,
    ) -> Result<(), SessionError> {
        let time_used_secs = self.session_ref()?.time_used_secs();
        self.state = SessionState::Finishing(Finishing {
            trigger,
            time_used_secs,
            stage,
        });
        Ok(())
    }

    fn set_stage(&mut self, stage: FinishStage) {
        if let SessionState::Finishing(finishing) = &mut self.state {
            finishing.stage = stage;
        }
    }

    async fn run_finish_protocol(&mut self) -> Result<(), SessionError> {
        self.timer.stop();
        self.set_stage(FinishStage::Reconciling);
        let session = self.session_ref()?;
        let attempt_id = session.attempt().id();
        let answers = session.recorded_answers();

        let drained = self.pending.drain().await;
        debug!(%attempt_id, drained = drained.len(), "background saves settled");

        let report = reconcile::reconcile(self.attempts.as_ref(), attempt_id, &answers).await;
        if report.is_clean() {
            return self.finalize(report).await;
        }
        info!(
            %attempt_id,
            confirmed = report.confirmed.len(),
            failed = report.failed.len(),
            "reconciliation incomplete, awaiting recovery choice"
        );
        self.set_stage(FinishStage::AwaitingRecovery(report));
        Ok(())
    }

    /// The single call that flips the attempt to finished.
    async fn finalize(&mut self, report: ReconciliationReport) -> Result<(), SessionError> {
        let (trigger, time_used_secs) = match &self.state {
            SessionState::Finishing(f) => (f.trigger, f.time_used_secs),
            other => return Err(invalid_state("finishing", other)),
        };
        let student = self
            .student
            .clone()
            .ok_or_else(|| invalid_state("finishing", &self.state))?;
        let session = self.session_ref()?;
        let attempt_id = session.attempt().id();
        let total = session.attempt().total_questions();

        let card = ScoreCard::from_confirmed(&report.confirmed, total);
        let finalization = Finalization {
            time_used_secs,
            score: card.score,
            confirmed_count: card.confirmed_count,
            correct_count: card.correct_count,
            ended_at: self.clock.now(),
        };

        if let Err(err) = self.attempts.finish_attempt(attempt_id, &finalization).await {
            error!(%attempt_id, error = %err, "failed to finalize attempt");
            self.set_stage(FinishStage::FinalizeFailed {
                error: err.to_string(),
            });
            return Err(SessionError::Finalize(err));
        }
        if let Err(err) = self.session_mut()?.attempt_mut().finish(&finalization) {
            warn!(%attempt_id, error = %err, "local attempt record out of step with store");
        }
        self.clear_cache().await;

        info!(
            %attempt_id,
            score = card.score,
            confirmed = card.confirmed_count,
            failed = report.failed.len(),
            ?trigger,
            "attempt finalized"
        );
        self.state = SessionState::Finished(Box::new(ResultSummary {
            attempt_id,
            student,
            score: card.score,
            correct_count: card.correct_count,
            total_questions: total,
            time_used_secs,
            confirmed: report.confirmed,
            failed: report.failed,
            trigger,
            finished_at: finalization.ended_at,
        }));
        Ok(())
    }

    //
    // ─── HELPERS ───────────────────────────────────────────────────────────────
    //

    fn require_in_progress(&self) -> Result<(), SessionError> {
        match &self.state {
            SessionState::InProgress => Ok(()),
            SessionState::Finished(_) => Err(SessionError::Completed),
            other => Err(invalid_state("in_progress", other)),
        }
    }

    fn session_ref(&self) -> Result<&AttemptSession, SessionError> {
        self.session
            .as_ref()
            .ok_or_else(|| invalid_state("in_progress", &self.state))
    }

    fn session_mut(&mut self) -> Result<&mut AttemptSession, SessionError> {
        let actual = self.state.name();
        self.session.as_mut().ok_or(SessionError::InvalidState {
            expected: "in_progress",
            actual,
        })
    }

    fn note_settled_writes(&mut self) {
        let settled = self.pending.collect_settled();
        self.note_write_outcomes(settled);
    }

    fn note_write_outcomes(&mut self, outcomes: Vec<WriteOutcome>) {
        for outcome in outcomes {
            if outcome.result.is_err() {
                self.notices.push_back(SessionNotice::AnswerWriteDeferred {
                    question_id: outcome.question_id,
                });
            }
        }
    }

    async fn persist_progress(&self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let snapshot = session.snapshot(self.student_id, self.clock.now());
        if let Err(err) = self.cache.save(&snapshot).await {
            warn!(attempt_id = %session.attempt().id(), error = %err, "failed to cache progress");
        }
    }

    async fn clear_cache(&self) {
        if let Err(err) = self.cache.clear().await {
            warn!(error = %err, "failed to clear cached progress");
        }
    }
}

fn invalid_state(expected: &'static str, actual: &SessionState) -> SessionError {
    SessionError::InvalidState {
        expected,
        actual: actual.name(),
    }
}

fn shuffle_options(questions: &mut [Question]) {
    let mut rng = rand::rng();
    for question in questions {
        question.rearrange_options(|options| options.shuffle(&mut rng));
    }
}
