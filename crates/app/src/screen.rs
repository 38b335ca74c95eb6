//! Plain-text rendering of the session on stdout.

use services::{
    FinishStage, Finishing, QuizSessionController, ResultSummary, SessionNotice, SessionState,
};

pub fn clock(secs: u32) -> String {
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

pub fn help() {
    println!("Commands:");
    println!("  <k>            choose option k for the current question");
    println!("  n / p          next / previous question");
    println!("  g <k>          go to question k");
    println!("  f              finish the quiz");
    println!("  y / c          confirm / cancel finishing");
    println!("  retry all      re-run the whole finish step");
    println!("  retry failed   retry only the failed answers, then finish");
    println!("  proceed        finish with the answers saved so far");
    println!("  q              leave; progress is kept on this device");
}

pub fn render(ctrl: &QuizSessionController) {
    match ctrl.state() {
        SessionState::InProgress => render_question(ctrl),
        SessionState::Finishing(finishing) => render_finishing(finishing),
        SessionState::Finished(summary) => render_result(summary),
        SessionState::Blocked(reason) => println!("You cannot take this quiz: {reason}."),
        SessionState::Initializing | SessionState::Resuming | SessionState::Loading => {
            println!("Loading...");
        }
    }
}

fn render_question(ctrl: &QuizSessionController) {
    let (Some(progress), Some(session), Some(question)) =
        (ctrl.progress(), ctrl.session(), ctrl.current_question())
    else {
        return;
    };
    println!();
    println!(
        "Question {}/{}   answered {}   time left {}",
        progress.current_index + 1,
        progress.total,
        progress.answered,
        clock(progress.remaining_secs)
    );
    println!("{}", question.prompt());
    if let Some(image) = question.image() {
        println!("[image: {image}]");
    }
    let chosen = session.answer_for(question.id());
    for (i, option) in question.options().iter().enumerate() {
        let mark = if chosen == Some(option.id()) { '*' } else { ' ' };
        println!(" {mark} {}. {}", i + 1, option.text());
    }
}

fn render_finishing(finishing: &Finishing) {
    match &finishing.stage {
        FinishStage::AwaitingConfirmation => {
            println!("Finish the quiz now? Answers cannot be changed afterwards. [y/c]");
        }
        FinishStage::Reconciling => println!("Saving your answers..."),
        FinishStage::AwaitingRecovery(report) => {
            println!(
                "{} answer(s) saved, {} could not be saved:",
                report.confirmed.len(),
                report.failed.len()
            );
            for failure in &report.failed {
                println!("  question {}: {}", failure.question_id(), failure.error);
            }
            println!("Choose: retry all | retry failed | proceed");
        }
        FinishStage::FinalizeFailed { error } => {
            println!("Submitting the quiz failed: {error}");
            println!("Type y to try again.");
        }
    }
}

fn render_result(summary: &ResultSummary) {
    println!();
    println!("Quiz finished for {}.", summary.student.name);
    println!(
        "Score: {}%  ({} of {} correct)",
        summary.score, summary.correct_count, summary.total_questions
    );
    println!("Time used: {}", clock(summary.time_used_secs));
    println!("Saved answers: {}", summary.confirmed_count());
    if summary.has_unconfirmed() {
        println!(
            "Not saved ({}), not counted in the score:",
            summary.failed.len()
        );
        for failure in &summary.failed {
            println!("  question {}", failure.question_id());
        }
    }
}

pub fn notices(notices: Vec<SessionNotice>) {
    for notice in notices {
        match notice {
            SessionNotice::ProgressRestored {
                answered,
                remaining_secs,
            } => println!(
                "Progress restored: {answered} answered, {} left. The clock resumes in a moment.",
                clock(remaining_secs)
            ),
            SessionNotice::ResumedFromStore { answered } => {
                println!("Continuing your unfinished attempt ({answered} answers saved).");
            }
            SessionNotice::RetryCompleted {
                recovered,
                still_failed,
            } => println!("Retry saved {recovered} answer(s); {still_failed} still unsaved."),
            // Logged by the controller; nothing for the student to act on.
            SessionNotice::AnswerWriteDeferred { .. } | SessionNotice::SnapshotDiscarded { .. } => {}
        }
    }
}
