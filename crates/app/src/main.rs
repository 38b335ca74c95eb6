use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use quiz_core::model::StudentId;
use services::{QuizSessionController, RecoveryChoice, SessionSettings, TickOutcome};
use storage::cache::JsonFileProgressCache;
use storage::repository::Storage;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt as log_fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod command;
mod screen;

use command::{Command, CommandError};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingStudent,
    UnknownArg(String),
    InvalidStudentId { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingStudent => {
                write!(f, "a student is required (--student-id or QUIZ_STUDENT_ID)")
            }
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidStudentId { raw } => write!(f, "invalid --student-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

struct Args {
    db_url: String,
    student_id: StudentId,
    cache_path: PathBuf,
    shuffle: bool,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite://quiz.sqlite3?mode=rwc".into());
        let mut student_raw = std::env::var("QUIZ_STUDENT_ID").ok();
        let mut cache_path = std::env::var("QUIZ_CACHE_PATH")
            .map_or_else(|_| PathBuf::from(".quiz-progress.json"), PathBuf::from);
        let mut shuffle = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--student-id" => student_raw = Some(require_value(args, "--student-id")?),
                "--cache" => cache_path = PathBuf::from(require_value(args, "--cache")?),
                "--shuffle" => shuffle = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        let raw = student_raw.ok_or(ArgsError::MissingStudent)?;
        let student_id = raw
            .parse()
            .map_err(|_| ArgsError::InvalidStudentId { raw: raw.clone() })?;

        Ok(Self {
            db_url,
            student_id,
            cache_path,
            shuffle,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- --student-id <id> [--db <sqlite_url>] [--cache <path>] [--shuffle]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite://quiz.sqlite3?mode=rwc");
    eprintln!("  --cache .quiz-progress.json");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_STUDENT_ID, QUIZ_CACHE_PATH, RUST_LOG");
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the quiz screen.
    let stderr_layer = log_fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .init();
}

async fn apply(
    ctrl: &mut QuizSessionController,
    command: Command,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Next => {
            ctrl.next().await?;
        }
        Command::Previous => {
            ctrl.previous().await?;
        }
        Command::GoTo(number) => ctrl.go_to(number - 1).await?,
        Command::Choose(position) => {
            let option = ctrl
                .current_question()
                .and_then(|q| q.options().get(position - 1))
                .map(|o| o.id())
                .ok_or(CommandError::NoSuchOption(position))?;
            ctrl.select_option(option).await?;
        }
        Command::Finish => ctrl.request_finish()?,
        Command::Confirm => {
            ctrl.confirm_finish().await?;
        }
        Command::Cancel => ctrl.cancel_finish()?,
        Command::RetryAll => {
            ctrl.resolve_recovery(RecoveryChoice::RetryAll).await?;
        }
        Command::RetryFailed => {
            ctrl.resolve_recovery(RecoveryChoice::RetryFailed).await?;
        }
        Command::Proceed => {
            ctrl.resolve_recovery(RecoveryChoice::Proceed).await?;
        }
        Command::Help => screen::help(),
        Command::Quit => {}
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();
    tracing::info!(student_id = %args.student_id, db = %args.db_url, "starting quiz session");

    let storage = Storage::sqlite(&args.db_url).await?;
    let cache = Arc::new(JsonFileProgressCache::new(args.cache_path.clone()));
    let settings = SessionSettings::default().with_shuffle_options(args.shuffle);
    let mut ctrl =
        QuizSessionController::new(args.student_id, &storage, cache).with_settings(settings);

    ctrl.start().await?;
    screen::notices(ctrl.drain_notices());
    screen::render(&ctrl);
    if ctrl.state().is_terminal() {
        return Ok(());
    }
    screen::help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = ctrl.wait_tick() => {
                match ctrl.tick().await {
                    Ok(TickOutcome::Counted { remaining_secs })
                        if remaining_secs % 60 == 0 || remaining_secs <= 10 =>
                    {
                        println!("time left {}", screen::clock(remaining_secs));
                    }
                    Ok(TickOutcome::Expired) => {
                        println!("Time is up.");
                        screen::render(&ctrl);
                    }
                    Ok(_) => {}
                    Err(err) => {
                        eprintln!("{err}");
                        screen::render(&ctrl);
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    ctrl.suspend().await;
                    break;
                };
                match Command::parse(&line) {
                    Ok(Command::Quit) => {
                        ctrl.suspend().await;
                        println!("Progress saved on this device. Run again to continue.");
                        break;
                    }
                    Ok(command) => {
                        if let Err(err) = apply(&mut ctrl, command).await {
                            println!("{err}");
                        }
                        screen::render(&ctrl);
                    }
                    Err(err) => println!("{err}"),
                }
            }
        }

        screen::notices(ctrl.drain_notices());
        if ctrl.state().is_terminal() {
            break;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
