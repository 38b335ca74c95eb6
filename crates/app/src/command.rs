use std::fmt;

/// One line of student input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Previous,
    /// 1-based question number.
    GoTo(usize),
    /// 1-based option position on screen.
    Choose(usize),
    Finish,
    Confirm,
    Cancel,
    RetryAll,
    RetryFailed,
    Proceed,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Empty,
    Unknown(String),
    InvalidNumber(String),
    NoSuchOption(usize),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Empty => write!(f, "type a command (h for help)"),
            CommandError::Unknown(raw) => write!(f, "unknown command: {raw} (h for help)"),
            CommandError::InvalidNumber(raw) => write!(f, "not a question number: {raw}"),
            CommandError::NoSuchOption(n) => write!(f, "there is no option {n}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let line = line.trim().to_ascii_lowercase();
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(CommandError::Empty);
        };
        let rest: Vec<&str> = words.collect();

        let command = match (head, rest.as_slice()) {
            ("n" | "next", []) => Command::Next,
            ("p" | "prev" | "previous", []) => Command::Previous,
            ("g" | "goto", [number]) => Command::GoTo(parse_positive(number)?),
            ("f" | "finish", []) => Command::Finish,
            ("y" | "yes", []) => Command::Confirm,
            ("c" | "cancel" | "no", []) => Command::Cancel,
            ("retry", ["all"]) => Command::RetryAll,
            ("retry", ["failed"]) => Command::RetryFailed,
            ("proceed", []) => Command::Proceed,
            ("h" | "help" | "?", []) => Command::Help,
            ("q" | "quit", []) => Command::Quit,
            (raw, []) if raw.chars().all(|c| c.is_ascii_digit()) => {
                Command::Choose(parse_positive(raw)?)
            }
            _ => return Err(CommandError::Unknown(line.clone())),
        };
        Ok(command)
    }
}

fn parse_positive(raw: &str) -> Result<usize, CommandError> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommandError::InvalidNumber(raw.to_string())),
    }
}
