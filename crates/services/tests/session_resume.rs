mod common;

use std::sync::Arc;

use chrono::Duration;
use common::{answer, correct, fixture, wrong};
use quiz_core::Clock;
use quiz_core::model::{QuestionId, SNAPSHOT_SCHEMA_VERSION};
use quiz_core::time::{fixed_clock, fixed_now};
use services::{SessionNotice, SessionState, TickOutcome};
use storage::cache::JsonFileProgressCache;
use storage::repository::{AttemptRepository, ProgressCache};

fn later(hours: i64) -> Clock {
    Clock::fixed(fixed_now() + Duration::hours(hours))
}

#[tokio::test]
async fn fresh_snapshot_restores_every_field_and_holds_the_clock() {
    let fx = fixture(5, 5, 1).await;
    let mut first = fx.controller(1, fixed_clock());
    first.start().await.unwrap();
    answer(&mut first, 1, correct(1)).await;
    answer(&mut first, 2, wrong(2)).await;
    first.go_to(3).await.unwrap();
    for _ in 0..10 {
        first.tick().await.unwrap();
    }
    first.suspend().await;
    let attempt_id = first.session().unwrap().attempt().id();
    drop(first);

    let snapshot = fx.cache.load().await.unwrap().expect("snapshot cached");
    assert_eq!(snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION);
    assert_eq!(snapshot.remaining_secs, 290);

    let mut second = fx.controller(1, later(23));
    second.start().await.unwrap();
    assert_eq!(second.state(), &SessionState::InProgress);
    assert!(second.drain_notices().contains(&SessionNotice::ProgressRestored {
        answered: 2,
        remaining_secs: 290
    }));

    let session = second.session().unwrap();
    assert_eq!(session.attempt().id(), attempt_id);
    assert_eq!(session.answers(), &snapshot.answers);
    assert_eq!(session.remaining_secs(), snapshot.remaining_secs);
    assert_eq!(session.current_index(), snapshot.current_index);
    assert_eq!(session.questions(), snapshot.questions.as_slice());
    assert_eq!(session.config(), &snapshot.config);

    for grace_left in [2, 1, 0] {
        assert_eq!(
            second.tick().await.unwrap(),
            TickOutcome::Held { grace_left }
        );
    }
    assert_eq!(
        second.tick().await.unwrap(),
        TickOutcome::Counted { remaining_secs: 289 }
    );

    for q in 1..=5 {
        answer(&mut second, q, correct(q)).await;
    }
    second.request_finish().unwrap();
    second.confirm_finish().await.unwrap();
    let result = second.result().expect("finished");
    assert_eq!(result.attempt_id, attempt_id);
    assert_eq!(result.score, 100);
    assert_eq!(result.time_used_secs, 11);
}

#[tokio::test]
async fn stale_snapshot_falls_back_to_the_store_with_full_time() {
    let fx = fixture(5, 5, 1).await;
    let mut first = fx.controller(1, fixed_clock());
    first.start().await.unwrap();
    answer(&mut first, 1, correct(1)).await;
    answer(&mut first, 4, wrong(4)).await;
    for _ in 0..30 {
        first.tick().await.unwrap();
    }
    first.suspend().await;
    let attempt_id = first.session().unwrap().attempt().id();
    drop(first);

    let mut second = fx.controller(1, later(24));
    second.start().await.unwrap();
    let notices = second.drain_notices();
    assert!(
        notices
            .iter()
            .any(|n| matches!(n, SessionNotice::SnapshotDiscarded { .. }))
    );
    assert!(notices.contains(&SessionNotice::ResumedFromStore { answered: 2 }));

    let session = second.session().unwrap();
    assert_eq!(session.attempt().id(), attempt_id);
    assert_eq!(session.remaining_secs(), 300);
    assert_eq!(session.current_index(), 0);
    assert_eq!(session.answer_for(QuestionId::new(4)), Some(wrong(4)));
    assert_eq!(second.unanswered_questions(), vec![2, 3, 5]);

    let recached = fx.cache.load().await.unwrap().expect("fresh snapshot");
    assert_eq!(recached.captured_at, later(24).now());
}

#[tokio::test]
async fn foreign_snapshot_is_ignored_entirely() {
    let fx = fixture(3, 5, 1).await;
    let mut ada = fx.controller(1, fixed_clock());
    ada.start().await.unwrap();
    answer(&mut ada, 1, correct(1)).await;
    ada.suspend().await;
    let ada_attempt = ada.session().unwrap().attempt().id();
    drop(ada);

    let mut grace = fx.controller(2, fixed_clock());
    grace.start().await.unwrap();
    assert!(
        grace
            .drain_notices()
            .iter()
            .any(|n| matches!(n, SessionNotice::SnapshotDiscarded { .. }))
    );
    let session = grace.session().unwrap();
    assert_ne!(session.attempt().id(), ada_attempt);
    assert_eq!(session.attempt().student_id().value(), 2);
    assert!(session.answers().is_empty());
    assert_eq!(session.remaining_secs(), 300);
}

#[tokio::test]
async fn file_cache_survives_a_new_controller() {
    let fx = fixture(3, 2, 1).await;
    let path = std::env::temp_dir().join(format!(
        "quiz-resume-{}-{}.json",
        std::process::id(),
        fixed_now().timestamp()
    ));
    let cache: Arc<dyn ProgressCache> = Arc::new(JsonFileProgressCache::new(path.clone()));

    let mut first = fx.controller_with_cache(1, fixed_clock(), Arc::clone(&cache));
    first.start().await.unwrap();
    answer(&mut first, 2, correct(2)).await;
    first.tick().await.unwrap();
    first.suspend().await;
    drop(first);

    let mut second = fx.controller_with_cache(1, later(1), Arc::clone(&cache));
    second.start().await.unwrap();
    let session = second.session().unwrap();
    assert_eq!(session.remaining_secs(), 119);
    assert_eq!(session.current_index(), 1);
    assert_eq!(session.answer_for(QuestionId::new(2)), Some(correct(2)));

    for q in [1, 3] {
        answer(&mut second, q, correct(q)).await;
    }
    second.request_finish().unwrap();
    second.confirm_finish().await.unwrap();
    let result = second.result().expect("finished").clone();
    assert!(!path.exists());

    let stored = fx.repo.get_attempt(result.attempt_id).await.unwrap();
    assert_eq!(stored.confirmed_count(), 3);
}

#[tokio::test]
async fn leftover_snapshot_of_a_finished_attempt_is_discarded() {
    let fx = fixture(2, 5, 2).await;
    let mut first = fx.controller(1, fixed_clock());
    first.start().await.unwrap();
    answer(&mut first, 1, correct(1)).await;
    answer(&mut first, 2, correct(2)).await;
    let leftover = fx.cache.load().await.unwrap().expect("snapshot cached");
    first.request_finish().unwrap();
    first.confirm_finish().await.unwrap();
    let finished_id = first.result().unwrap().attempt_id;
    drop(first);

    // As if clearing the cache had failed after finalize.
    fx.cache.save(&leftover).await.unwrap();

    let mut second = fx.controller(1, fixed_clock());
    second.start().await.unwrap();
    assert!(
        second
            .drain_notices()
            .iter()
            .any(|n| matches!(n, SessionNotice::SnapshotDiscarded { reason } if reason.contains("finished")))
    );
    assert_eq!(second.state(), &SessionState::InProgress);
    let session = second.session().unwrap();
    assert_ne!(session.attempt().id(), finished_id);
    assert!(session.answers().is_empty());
    assert_eq!(session.remaining_secs(), 300);
}
