mod common;

use common::{answer, answer_all_correct, correct, fixture, fixture_with_bank, wrong};
use quiz_core::model::{OptionId, QuestionId, QuizConfig};
use quiz_core::time::fixed_clock;
use services::{
    BlockReason, FinishStage, FinishTrigger, Finishing, QuizSessionController, RecoveryChoice,
    SessionError, SessionNotice, SessionSettings, SessionState, TickOutcome,
};
use storage::repository::{
    AttemptRepository, InMemoryProgressCache, InMemoryRepository, ProgressCache, QuizRepository,
    Storage, StorageError, StudentRepository,
};

fn stage(ctrl: &QuizSessionController) -> Option<&FinishStage> {
    match ctrl.state() {
        SessionState::Finishing(Finishing { stage, .. }) => Some(stage),
        _ => None,
    }
}

#[tokio::test]
async fn manual_finish_is_gated_on_completeness_and_scores_confirmed_answers() {
    let fx = fixture(10, 5, 1).await;
    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    assert_eq!(ctrl.state(), &SessionState::InProgress);

    for q in 1..=9 {
        let option = if q <= 7 { correct(q) } else { wrong(q) };
        answer(&mut ctrl, q, option).await;
    }
    for _ in 0..42 {
        ctrl.tick().await.unwrap();
    }

    match ctrl.request_finish() {
        Err(SessionError::Incomplete { unanswered }) => assert_eq!(unanswered, vec![10]),
        other => panic!("expected incomplete, got {other:?}"),
    }
    assert_eq!(ctrl.state(), &SessionState::InProgress);

    answer(&mut ctrl, 10, wrong(10)).await;
    ctrl.request_finish().unwrap();
    assert_eq!(stage(&ctrl), Some(&FinishStage::AwaitingConfirmation));

    ctrl.confirm_finish().await.unwrap();
    let result = ctrl.result().expect("finished").clone();
    assert_eq!(result.score, 70);
    assert_eq!(result.correct_count, 7);
    assert_eq!(result.total_questions, 10);
    assert_eq!(result.confirmed_count(), 10);
    assert!(result.failed.is_empty());
    assert_eq!(result.time_used_secs, 42);
    assert_eq!(result.trigger, FinishTrigger::Manual);
    assert_eq!(result.student.name, "Ada Lovelace");

    let stored = fx.repo.get_attempt(result.attempt_id).await.unwrap();
    assert!(stored.is_finished());
    assert_eq!(stored.score(), Some(70));
    assert_eq!(stored.confirmed_count(), 10);
    assert_eq!(stored.correct_count(), 7);
    assert_eq!(stored.time_used_secs(), Some(42));

    let answers = fx.repo.answers_for_attempt(result.attempt_id).await.unwrap();
    assert_eq!(answers.len(), 10);
    assert!(fx.cache.load().await.unwrap().is_none());
}

#[tokio::test]
async fn expiry_finishes_without_confirmation_or_completeness() {
    let fx = fixture(10, 1, 1).await;
    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();

    for q in 1..=6 {
        let option = if q <= 4 { correct(q) } else { wrong(q) };
        answer(&mut ctrl, q, option).await;
    }

    for expected in (1..60).rev() {
        assert_eq!(
            ctrl.tick().await.unwrap(),
            TickOutcome::Counted {
                remaining_secs: expected
            }
        );
    }
    assert_eq!(ctrl.tick().await.unwrap(), TickOutcome::Expired);

    let result = ctrl.result().expect("finished").clone();
    assert_eq!(result.trigger, FinishTrigger::TimeExpired);
    assert_eq!(result.confirmed_count(), 6);
    assert_eq!(result.score, 40);
    assert_eq!(result.time_used_secs, 60);

    assert_eq!(ctrl.tick().await.unwrap(), TickOutcome::Ignored);
    let stored = fx.repo.get_attempt(result.attempt_id).await.unwrap();
    assert_eq!(stored.confirmed_count(), 6);
    assert_eq!(fx.attempts.finish_calls(), 1);
}

#[tokio::test]
async fn retry_failed_only_finalizes_with_what_recovered() {
    let fx = fixture(10, 5, 1).await;
    fx.attempts.fail_saves(3, u32::MAX);
    // One failure for the background save, one for reconciliation.
    fx.attempts.fail_saves(7, 2);

    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    answer_all_correct(&mut ctrl, 10).await;
    ctrl.request_finish().unwrap();
    ctrl.confirm_finish().await.unwrap();

    let report = ctrl.recovery_report().expect("awaiting recovery").clone();
    assert_eq!(report.confirmed.len(), 8);
    let failed: Vec<QuestionId> = report.failed.iter().map(|f| f.question_id()).collect();
    assert_eq!(failed, vec![QuestionId::new(3), QuestionId::new(7)]);
    assert!(ctrl.result().is_none());

    ctrl.resolve_recovery(RecoveryChoice::RetryFailed)
        .await
        .unwrap();
    let result = ctrl.result().expect("finished").clone();
    assert_eq!(result.confirmed_count(), 9);
    assert_eq!(result.failed.len(), 1);
    assert_eq!(result.failed[0].question_id(), QuestionId::new(3));
    assert_eq!(result.failed[0].option_id(), correct(3));
    assert_eq!(result.score, 90);
    assert!(ctrl.drain_notices().contains(&SessionNotice::RetryCompleted {
        recovered: 1,
        still_failed: 1
    }));

    let stored = fx.repo.get_attempt(result.attempt_id).await.unwrap();
    assert_eq!(stored.confirmed_count(), 9);
    assert_eq!(stored.score(), Some(90));
}

#[tokio::test]
async fn retry_all_reruns_the_whole_protocol() {
    let fx = fixture(4, 5, 1).await;
    fx.attempts.fail_saves(2, 2);

    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    answer_all_correct(&mut ctrl, 4).await;
    ctrl.request_finish().unwrap();
    ctrl.confirm_finish().await.unwrap();
    assert!(matches!(stage(&ctrl), Some(FinishStage::AwaitingRecovery(_))));

    let calls_before = fx.attempts.save_calls();
    ctrl.resolve_recovery(RecoveryChoice::RetryAll).await.unwrap();
    assert_eq!(fx.attempts.save_calls() - calls_before, 4);

    let result = ctrl.result().expect("finished");
    assert_eq!(result.confirmed_count(), 4);
    assert!(result.failed.is_empty());
    assert_eq!(result.score, 100);
}

#[tokio::test]
async fn proceed_keeps_the_confirmed_unconfirmed_split_visible() {
    let fx = fixture(4, 5, 1).await;
    fx.attempts.fail_saves(2, u32::MAX);

    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    answer_all_correct(&mut ctrl, 4).await;
    ctrl.request_finish().unwrap();
    ctrl.confirm_finish().await.unwrap();
    ctrl.resolve_recovery(RecoveryChoice::Proceed).await.unwrap();

    let result = ctrl.result().expect("finished");
    assert!(result.has_unconfirmed());
    assert_eq!(result.confirmed_count(), 3);
    assert_eq!(result.failed[0].question_id(), QuestionId::new(2));
    assert_eq!(result.score, 75);
}

#[tokio::test]
async fn finalize_failure_stays_in_finishing_until_confirmed_again() {
    let fx = fixture(3, 5, 1).await;
    fx.attempts.fail_finish(1);

    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    answer_all_correct(&mut ctrl, 3).await;
    ctrl.request_finish().unwrap();

    let err = ctrl.confirm_finish().await.unwrap_err();
    assert!(matches!(err, SessionError::Finalize(StorageError::Connection(_))));
    assert!(matches!(
        stage(&ctrl),
        Some(FinishStage::FinalizeFailed { .. })
    ));
    assert!(ctrl.result().is_none());
    assert!(fx.cache.load().await.unwrap().is_some());

    ctrl.confirm_finish().await.unwrap();
    assert_eq!(ctrl.result().expect("finished").score, 100);
    assert_eq!(fx.attempts.finish_calls(), 2);
    assert!(fx.cache.load().await.unwrap().is_none());
}

#[tokio::test]
async fn nothing_is_written_after_finish() {
    let fx = fixture(2, 5, 1).await;
    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    answer_all_correct(&mut ctrl, 2).await;
    ctrl.request_finish().unwrap();
    ctrl.confirm_finish().await.unwrap();

    let saves = fx.attempts.save_calls();
    assert!(matches!(
        ctrl.select_option(correct(1)).await,
        Err(SessionError::Completed)
    ));
    assert!(matches!(ctrl.next().await, Err(SessionError::Completed)));
    assert!(matches!(ctrl.request_finish(), Err(SessionError::Completed)));
    assert!(matches!(ctrl.confirm_finish().await, Err(SessionError::Completed)));
    assert!(matches!(
        ctrl.resolve_recovery(RecoveryChoice::RetryAll).await,
        Err(SessionError::Completed)
    ));
    assert_eq!(ctrl.tick().await.unwrap(), TickOutcome::Ignored);

    assert_eq!(fx.attempts.save_calls(), saves);
    assert_eq!(fx.attempts.finish_calls(), 1);
}

#[tokio::test]
async fn clock_keeps_running_while_confirming_and_cancel_resumes() {
    let fx = fixture(2, 5, 1).await;
    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    answer_all_correct(&mut ctrl, 2).await;
    for _ in 0..5 {
        ctrl.tick().await.unwrap();
    }

    ctrl.request_finish().unwrap();
    assert_eq!(
        ctrl.tick().await.unwrap(),
        TickOutcome::Counted { remaining_secs: 294 }
    );
    assert_eq!(ctrl.progress().unwrap().remaining_secs, 294);
    assert!(matches!(
        ctrl.select_option(wrong(2)).await,
        Err(SessionError::InvalidState { .. })
    ));

    ctrl.cancel_finish().unwrap();
    assert_eq!(ctrl.state(), &SessionState::InProgress);
    assert_eq!(
        ctrl.tick().await.unwrap(),
        TickOutcome::Counted { remaining_secs: 293 }
    );
    assert!(matches!(
        ctrl.cancel_finish(),
        Err(SessionError::InvalidState { .. })
    ));

    ctrl.request_finish().unwrap();
    ctrl.tick().await.unwrap();
    ctrl.confirm_finish().await.unwrap();
    let result = ctrl.result().unwrap();
    assert_eq!(result.time_used_secs, 8);
    assert_eq!(result.score, 100);
}

#[tokio::test]
async fn waiting_out_the_confirmation_cannot_buy_time() {
    let fx = fixture(2, 1, 1).await;
    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    answer_all_correct(&mut ctrl, 2).await;

    ctrl.request_finish().unwrap();
    for _ in 0..600 {
        assert!(matches!(
            ctrl.tick().await.unwrap(),
            TickOutcome::Counted { .. }
        ));
    }
    assert_eq!(ctrl.progress().unwrap().remaining_secs, 0);
    assert!(matches!(
        ctrl.state(),
        SessionState::Finishing(Finishing {
            stage: FinishStage::AwaitingConfirmation,
            ..
        })
    ));

    ctrl.cancel_finish().unwrap();
    assert_eq!(ctrl.progress().unwrap().remaining_secs, 0);
    assert_eq!(ctrl.tick().await.unwrap(), TickOutcome::Expired);
    let result = ctrl.result().unwrap();
    assert_eq!(result.trigger, FinishTrigger::TimeExpired);
    assert_eq!(result.time_used_secs, 60);
    assert_eq!(result.score, 100);
}

#[tokio::test]
async fn suspend_reports_background_saves_that_failed() {
    let fx = fixture(3, 5, 1).await;
    fx.attempts.fail_saves(2, 1);
    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    answer(&mut ctrl, 1, correct(1)).await;
    answer(&mut ctrl, 2, correct(2)).await;
    ctrl.drain_notices();

    ctrl.suspend().await;
    let notices = ctrl.drain_notices();
    assert!(notices.contains(&SessionNotice::AnswerWriteDeferred {
        question_id: QuestionId::new(2)
    }));
    assert!(!notices.contains(&SessionNotice::AnswerWriteDeferred {
        question_id: QuestionId::new(1)
    }));
}

#[tokio::test]
async fn navigation_and_selection_are_validated() {
    let fx = fixture(3, 5, 1).await;
    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();

    assert!(!ctrl.previous().await.unwrap());
    assert!(ctrl.next().await.unwrap());
    assert_eq!(ctrl.current_question().unwrap().id(), QuestionId::new(2));
    assert!(matches!(
        ctrl.go_to(3).await,
        Err(SessionError::QuestionOutOfRange { index: 4, total: 3 })
    ));
    assert!(matches!(
        ctrl.select_option(correct(1)).await,
        Err(SessionError::InvalidOption { .. })
    ));

    ctrl.select_option(wrong(2)).await.unwrap();
    ctrl.select_option(correct(2)).await.unwrap();
    assert_eq!(ctrl.unanswered_questions(), vec![1, 3]);
    assert_eq!(ctrl.progress().unwrap().answered, 1);

    let snapshot = fx.cache.load().await.unwrap().expect("progress cached");
    assert_eq!(snapshot.current_index, 1);
    assert_eq!(snapshot.answers.get(QuestionId::new(2)), Some(correct(2)));
}

#[tokio::test]
async fn exhausted_quota_blocks_with_reason() {
    let fx = fixture(1, 5, 1).await;
    let mut first = fx.controller(1, fixed_clock());
    first.start().await.unwrap();
    answer_all_correct(&mut first, 1).await;
    first.request_finish().unwrap();
    first.confirm_finish().await.unwrap();

    let mut second = fx.controller(1, fixed_clock());
    second.start().await.unwrap();
    match second.state() {
        SessionState::Blocked(BlockReason::Ineligible(reason)) => {
            assert!(reason.contains("1 permitted attempt"), "{reason}");
        }
        other => panic!("expected blocked, got {other:?}"),
    }
    assert!(second.session().is_none());
}

#[tokio::test]
async fn empty_question_bank_blocks_as_unavailable() {
    let fx = fixture_with_bank(5, 0, 5, 1).await;
    let mut ctrl = fx.controller(1, fixed_clock());
    ctrl.start().await.unwrap();
    assert_eq!(
        ctrl.state(),
        &SessionState::Blocked(BlockReason::ExamUnavailable)
    );
    assert_eq!(
        BlockReason::ExamUnavailable.to_string(),
        "the exam is not available yet"
    );
}

#[tokio::test]
async fn load_failure_returns_to_initializing() {
    let repo = InMemoryRepository::new();
    repo.upsert_student(&quiz_core::model::Student::new(
        quiz_core::model::StudentId::new(1),
        "Ada",
        None,
    ))
    .await
    .unwrap();
    let storage = Storage {
        students: std::sync::Arc::new(repo.clone()),
        quizzes: std::sync::Arc::new(repo.clone()),
        attempts: std::sync::Arc::new(repo.clone()),
    };
    let mut ctrl = QuizSessionController::new(
        quiz_core::model::StudentId::new(1),
        &storage,
        std::sync::Arc::new(InMemoryProgressCache::new()),
    )
    .with_clock(fixed_clock());

    let err = ctrl.start().await.unwrap_err();
    assert!(matches!(err, SessionError::Storage(StorageError::NotFound)));
    assert_eq!(ctrl.state(), &SessionState::Initializing);

    repo.upsert_quiz_config(None, &QuizConfig::new(1, 5, 1).unwrap())
        .await
        .unwrap();
    repo.upsert_question(None, &common::question(1)).await.unwrap();
    ctrl.start().await.unwrap();
    assert_eq!(ctrl.state(), &SessionState::InProgress);
    assert!(matches!(
        ctrl.start().await,
        Err(SessionError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn shuffled_options_keep_ids_and_correctness() {
    let fx = fixture(3, 5, 1).await;
    let mut ctrl = QuizSessionController::new(
        quiz_core::model::StudentId::new(1),
        &fx.storage,
        fx.cache.clone(),
    )
    .with_clock(fixed_clock())
    .with_settings(SessionSettings::default().with_shuffle_options(true));
    ctrl.start().await.unwrap();

    let questions = ctrl.session().unwrap().questions().to_vec();
    for question in &questions {
        let mut ids: Vec<OptionId> = question.options().iter().map(|o| o.id()).collect();
        ids.sort();
        let n = question.id().value();
        assert_eq!(
            ids,
            vec![correct(n), wrong(n), OptionId::new(n * 10 + 2)]
        );
        assert_eq!(question.is_correct(correct(n)), Some(true));
    }

    answer_all_correct(&mut ctrl, 3).await;
    ctrl.request_finish().unwrap();
    ctrl.confirm_finish().await.unwrap();
    assert_eq!(ctrl.result().unwrap().score, 100);
}
