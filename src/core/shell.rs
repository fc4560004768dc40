//! Line-oriented command front end
//!
//! Turns one line of user input into a [`Command`] and runs it against a
//! [`StorageEngine`]. Every outcome, including engine errors, becomes text
//! for the user; only `quit` ends the session.

use crate::engine::{Listing, StorageEngine};
use crate::io::BackingStore;
use crate::sort::SortStrategy;
use std::fmt::Write as _;
use std::io::{BufRead, Write};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  create <name> <count>        create a file of <count> random integers (criar)
  delete <name>                remove a file (apagar)
  list                         show files, total and free space (listar)
  sort <name>                  sort a file ascending in place (ordenar)
  read <name> <start> <end>    print integers start..=end (ler)
  concatenate <name1> <name2>  append name2 to name1, remove name2 (concatenar)
  check                        verify catalog and allocator agree
  help                         show this message
  quit                         exit (sair)";

/// A parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create { name: String, count: i64 },
    Delete { name: String },
    List,
    Sort { name: String },
    Read { name: String, start: i64, end: i64 },
    Concatenate { first: String, second: String },
    Check,
    Help,
    Quit,
}

/// Why a line could not be turned into a command
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command: {0} (type 'help' for a list)")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Not an integer: {0}")]
    NotANumber(String),
}

/// What the loop should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue(String),
    Quit,
}

impl Command {
    /// Parse a line; blank lines yield `None`
    pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = tokens.split_first() else {
            return Ok(None);
        };

        let command = match verb {
            "create" | "criar" => match args {
                [name, count] => Command::Create {
                    name: name.to_string(),
                    count: parse_int(count)?,
                },
                _ => return Err(ParseError::Usage("create <name> <count>")),
            },
            "delete" | "apagar" => match args {
                [name] => Command::Delete {
                    name: name.to_string(),
                },
                _ => return Err(ParseError::Usage("delete <name>")),
            },
            "list" | "listar" => match args {
                [] => Command::List,
                _ => return Err(ParseError::Usage("list")),
            },
            "sort" | "ordenar" => match args {
                [name] => Command::Sort {
                    name: name.to_string(),
                },
                _ => return Err(ParseError::Usage("sort <name>")),
            },
            "read" | "ler" => match args {
                [name, start, end] => Command::Read {
                    name: name.to_string(),
                    start: parse_int(start)?,
                    end: parse_int(end)?,
                },
                _ => return Err(ParseError::Usage("read <name> <start> <end>")),
            },
            "concatenate" | "concatenar" => match args {
                [first, second] => Command::Concatenate {
                    first: first.to_string(),
                    second: second.to_string(),
                },
                _ => return Err(ParseError::Usage("concatenate <name1> <name2>")),
            },
            "check" => Command::Check,
            "help" => Command::Help,
            "quit" | "exit" | "sair" => Command::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }
}

fn parse_int(token: &str) -> Result<i64, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::NotANumber(token.to_string()))
}

/// Parse and run one line of input
pub fn run_line<S: BackingStore>(engine: &mut StorageEngine<S>, line: &str) -> Outcome {
    match Command::parse(line) {
        Ok(Some(command)) => execute(engine, command),
        Ok(None) => Outcome::Continue(String::new()),
        Err(e) => Outcome::Continue(format!("Error: {}", e)),
    }
}

/// Run a command, rendering its result or error as text
pub fn execute<S: BackingStore>(engine: &mut StorageEngine<S>, command: Command) -> Outcome {
    let result = match command {
        Command::Quit => return Outcome::Quit,
        Command::Help => Ok(HELP.to_string()),
        Command::Create { name, count } => engine
            .create(&name, count)
            .map(|_| format!("File '{}' created ({} integers)", name, count)),
        Command::Delete { name } => engine
            .delete(&name)
            .map(|_| format!("File '{}' deleted", name)),
        Command::List => Ok(render_listing(&engine.list())),
        Command::Sort { name } => engine.sort(&name).map(|report| {
            let how = match report.strategy {
                SortStrategy::InMemory => "in memory".to_string(),
                SortStrategy::ExternalMerge { runs } => format!(
                    "external merge, {} runs, {} passes",
                    runs, report.merge_passes
                ),
            };
            format!("File '{}' sorted ({} integers, {})", name, report.elements, how)
        }),
        Command::Read { name, start, end } => engine.read_range(&name, start, end).map(|values| {
            let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            format!(
                "Integers {} to {} of '{}':\n{}",
                start,
                end,
                name,
                joined.join(" ")
            )
        }),
        Command::Concatenate { first, second } => engine
            .concatenate(&first, &second)
            .map(|_| format!("Files '{}' and '{}' concatenated into '{}'", first, second, first)),
        Command::Check => engine.check_consistency().map(|_| {
            let stats = engine.stats();
            format!(
                "Consistent: {} files, {}/{} blocks free, largest free run {}, fragmentation {:.2}",
                stats.file_count,
                stats.free_blocks,
                stats.total_blocks,
                stats.largest_free_run,
                stats.fragmentation
            )
        }),
    };

    match result {
        Ok(text) => Outcome::Continue(text),
        Err(e) if e.is_invalid_argument() => {
            Outcome::Continue(format!("Error: {} (type 'help' for usage)", e))
        }
        Err(e) => Outcome::Continue(format!("Error: {}", e)),
    }
}

/// Prompt, read and run commands until `quit` or end of input
///
/// Input that is not valid UTF-8 is decoded lossily and reported like any
/// other malformed line.
pub fn run_session<S, R, W>(
    engine: &mut StorageEngine<S>,
    mut input: R,
    mut output: W,
) -> std::io::Result<()>
where
    S: BackingStore,
    R: BufRead,
    W: Write,
{
    let mut line = Vec::new();

    loop {
        write!(output, "> ")?;
        output.flush()?;

        line.clear();
        if input.read_until(b'\n', &mut line)? == 0 {
            writeln!(output)?;
            return Ok(());
        }

        match run_line(engine, &String::from_utf8_lossy(&line)) {
            Outcome::Quit => return Ok(()),
            Outcome::Continue(text) if text.is_empty() => {}
            Outcome::Continue(text) => writeln!(output, "{}", text)?,
        }
    }
}

/// Render a listing the way the `list` command prints it
pub fn render_listing(listing: &Listing) -> String {
    let mut out = String::from("Files:\n");

    for file in &listing.files {
        let modified = chrono::DateTime::<chrono::Utc>::from_timestamp(file.modified_at as i64, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(out, "{} - {} bytes (modified {})", file.name, file.size, modified);
    }

    let _ = writeln!(out, "\nTotal space: {} bytes", listing.total_capacity);
    let _ = write!(out, "Free space: {} bytes", listing.free_bytes);

    out
}
