use std::fmt;

use quiz_core::model::{
    AnswerOption, Category, OptionId, Question, QuestionId, QuizConfig, Student, StudentId,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    questions: u32,
    category: Option<Category>,
    time_limit_minutes: u32,
    permitted_attempts: u32,
    student_id: StudentId,
    student_name: String,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
    InvalidCategory { raw: String },
    InvalidStudentId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidCategory { raw } => write!(f, "invalid --category value: {raw:?}"),
            ArgsError::InvalidStudentId { raw } => write!(f, "invalid --student-id value: {raw}"),
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

fn parse_u32(flag: &'static str, raw: String) -> Result<u32, ArgsError> {
    raw.parse::<u32>()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite://quiz.sqlite3?mode=rwc".into());
        let mut questions = 10;
        let mut category = None;
        let mut time_limit_minutes = 5;
        let mut permitted_attempts = 1;
        let mut student_id = std::env::var("QUIZ_STUDENT_ID")
            .ok()
            .and_then(|value| value.parse::<StudentId>().ok())
            .unwrap_or_else(|| StudentId::new(1));
        let mut student_name = "Demo Student".to_string();

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--questions" => {
                    questions = parse_u32("--questions", require_value(&mut args, "--questions")?)?;
                }
                "--category" => {
                    let value = require_value(&mut args, "--category")?;
                    category = Some(
                        Category::new(value.clone())
                            .map_err(|_| ArgsError::InvalidCategory { raw: value })?,
                    );
                }
                "--time-limit" => {
                    time_limit_minutes =
                        parse_u32("--time-limit", require_value(&mut args, "--time-limit")?)?;
                }
                "--attempts" => {
                    permitted_attempts =
                        parse_u32("--attempts", require_value(&mut args, "--attempts")?)?;
                }
                "--student-id" => {
                    let value = require_value(&mut args, "--student-id")?;
                    student_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidStudentId { raw: value.clone() })?;
                }
                "--student-name" => {
                    student_name = require_value(&mut args, "--student-name")?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            questions,
            category,
            time_limit_minutes,
            permitted_attempts,
            student_id,
            student_name,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://quiz.sqlite3?mode=rwc)");
    eprintln!("  --questions <n>           Questions in the bank and per attempt (default: 10)");
    eprintln!("  --category <name>         Category for questions, config and student");
    eprintln!("  --time-limit <minutes>    Time limit per attempt (default: 5)");
    eprintln!("  --attempts <n>            Permitted attempts per student (default: 1)");
    eprintln!("  --student-id <id>         Student to upsert (default: 1)");
    eprintln!("  --student-name <name>     Student display name (default: Demo Student)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_STUDENT_ID");
}

/// Arithmetic question with one right answer and three near misses.
fn sample_question(n: u32) -> Result<Question, quiz_core::Error> {
    let a = 3 + n * 7 % 23;
    let b = 2 + n * 5 % 17;
    let right = a + b;
    let mut choices = [right, right + 1, right - 2, right + 10];
    let len = choices.len();
    choices.rotate_left(n as usize % len);

    let qid = u64::from(n);
    let options = (0_u64..)
        .zip(choices)
        .map(|(i, value)| {
            AnswerOption::new(OptionId::new(qid * 100 + i), value.to_string(), value == right)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Question::new(
        QuestionId::new(qid),
        format!("What is {a} + {b}?"),
        None,
        options,
    )?)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let config = QuizConfig::new(args.questions, args.time_limit_minutes, args.permitted_attempts)?;

    storage
        .quizzes
        .upsert_quiz_config(args.category.as_ref(), &config)
        .await?;
    storage
        .students
        .upsert_student(&Student::new(
            args.student_id,
            args.student_name.clone(),
            args.category.clone(),
        ))
        .await?;

    for n in 1..=args.questions {
        let question = sample_question(n)?;
        storage
            .quizzes
            .upsert_question(args.category.as_ref(), &question)
            .await?;
    }

    println!(
        "Seeded {} questions ({} min, {} attempt(s)) and student {} into {}",
        args.questions,
        args.time_limit_minutes,
        args.permitted_attempts,
        args.student_id,
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
