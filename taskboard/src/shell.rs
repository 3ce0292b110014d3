//! Line-oriented command shell over an [`Engine`].

use std::fmt::Write as _;
use std::str::FromStr;

use taskboard_proto::task::{NewTask, TaskId, TaskPatch, TaskStatus};

use crate::board::Board;
use crate::drag::DragGesture;
use crate::engine::{BoardEvent, Engine, MutationError};
use crate::gateway::GatewayError;
use crate::gateway::memory::InMemoryGateway;

/// Usage text printed by `help`.
pub const HELP: &str = "\
commands:
  add <title>                  create a task in todo
  edit <id> <title>            rename a task
  move <id> <column>           move a task (todo, in-progress, completed)
  drag <id> <from> <to>        drag a task between columns
  rm <id>                      delete a task
  board [search]               show the board, optionally filtered
  fail <status|transport> <msg> fail the next remote call
  refresh                      reload tasks from the remote store
  help                         show this text
  quit                         exit";

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a task.
    Add(String),
    /// Rename a task.
    Edit {
        /// Target task.
        id: TaskId,
        /// New title.
        title: String,
    },
    /// Move a task to a column.
    Move {
        /// Target task.
        id: TaskId,
        /// Destination column.
        status: TaskStatus,
    },
    /// Simulated drag gesture.
    Drag(DragGesture),
    /// Delete a task.
    Remove(TaskId),
    /// Print the board.
    Board(String),
    /// Queue a failure for the next remote call.
    Fail(GatewayError),
    /// Reload from the remote store.
    Refresh,
    /// Print usage.
    Help,
    /// Exit the shell.
    Quit,
}

/// Errors produced while parsing a command line.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseCommandError {
    /// The line was blank.
    #[error("empty command")]
    Empty,

    /// The first word is not a known command.
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),

    /// Arguments were missing.
    #[error("usage: {0}")]
    Usage(&'static str),

    /// A task id was not a non-negative integer.
    #[error("invalid task id: {0}")]
    InvalidId(String),

    /// A column name was not recognized.
    #[error("unknown column: {0}")]
    InvalidColumn(String),

    /// A failure status was neither `transport` nor an HTTP status code.
    #[error("invalid failure status: {0}")]
    InvalidStatus(String),
}

fn parse_id(word: Option<&str>, usage: &'static str) -> Result<TaskId, ParseCommandError> {
    let word = word.ok_or(ParseCommandError::Usage(usage))?;
    word.parse()
        .map_err(|_| ParseCommandError::InvalidId(word.to_string()))
}

fn rest(words: &[&str], usage: &'static str) -> Result<String, ParseCommandError> {
    if words.is_empty() {
        return Err(ParseCommandError::Usage(usage));
    }
    Ok(words.join(" "))
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Err(ParseCommandError::Empty);
        };

        match name {
            "add" => Ok(Self::Add(rest(args, "add <title>")?)),
            "edit" => {
                let usage = "edit <id> <title>";
                let id = parse_id(args.first().copied(), usage)?;
                let title = rest(args.get(1..).unwrap_or_default(), usage)?;
                Ok(Self::Edit { id, title })
            }
            "move" => {
                let usage = "move <id> <column>";
                let id = parse_id(args.first().copied(), usage)?;
                let column = args.get(1).ok_or(ParseCommandError::Usage(usage))?;
                let status = column
                    .parse()
                    .map_err(|_| ParseCommandError::InvalidColumn((*column).to_string()))?;
                Ok(Self::Move { id, status })
            }
            "drag" => {
                let usage = "drag <id> <from> <to>";
                let id = parse_id(args.first().copied(), usage)?;
                match args.get(1..3) {
                    Some([from, to]) => Ok(Self::Drag(DragGesture::new(id, *from, *to))),
                    _ => Err(ParseCommandError::Usage(usage)),
                }
            }
            "rm" => Ok(Self::Remove(parse_id(args.first().copied(), "rm <id>")?)),
            "board" | "ls" => Ok(Self::Board(args.join(" "))),
            "fail" => {
                let usage = "fail <status|transport> <message>";
                let status = args.first().ok_or(ParseCommandError::Usage(usage))?;
                let message = rest(args.get(1..).unwrap_or_default(), usage)?;
                if *status == "transport" {
                    return Ok(Self::Fail(GatewayError::Transport(message)));
                }
                let code: u16 = status
                    .parse()
                    .ok()
                    .filter(|code| (400..600).contains(code))
                    .ok_or_else(|| ParseCommandError::InvalidStatus((*status).to_string()))?;
                Ok(Self::Fail(GatewayError::rejected(code, message)))
            }
            "refresh" => Ok(Self::Refresh),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}

/// Renders a board as plain text, one section per column.
#[must_use]
pub fn render_board(board: &Board) -> String {
    let mut out = String::new();
    for (status, tasks) in board.columns() {
        let _ = writeln!(out, "[{status}] ({})", tasks.len());
        for task in tasks {
            let _ = write!(out, "  #{} {}", task.id, task.title);
            if let Some(priority) = task.priority {
                let _ = write!(out, " !{priority}");
            }
            if let Some(due) = task.due_date {
                let _ = write!(out, " due {due}");
            }
            out.push('\n');
        }
    }
    out
}

/// Describes a board event for the user.
#[must_use]
pub fn describe_event(event: &BoardEvent) -> String {
    match event {
        BoardEvent::Inserted(id) => format!("task #{id} added"),
        BoardEvent::Patched(id) => format!("task #{id} changed (pending)"),
        BoardEvent::Removed(id) => format!("task #{id} removed (pending)"),
        BoardEvent::Reconciled(id) => format!("task #{id} confirmed"),
        BoardEvent::RolledBack(id) => format!("task #{id} rolled back"),
        BoardEvent::Replaced => "board reloaded".to_string(),
    }
}

/// Runs one command and returns the text to print.
///
/// # Errors
///
/// Returns the [`MutationError`] of a failed mutation; the store has
/// already been rolled back.
pub async fn execute(
    engine: &Engine<InMemoryGateway>,
    command: Command,
) -> Result<String, MutationError> {
    match command {
        Command::Add(title) => {
            let task = engine.submit_create(NewTask::new(title)).await?;
            Ok(format!("created #{} {}", task.id, task.title))
        }
        Command::Edit { id, title } => {
            let task = engine.submit_update(id, TaskPatch::title(title)).await?;
            Ok(format!("renamed #{} to {}", task.id, task.title))
        }
        Command::Move { id, status } => {
            let task = engine.submit_move(id, status).await?;
            Ok(format!("moved #{} to {}", task.id, task.status))
        }
        Command::Drag(gesture) => Ok(match engine.submit_drag(&gesture).await? {
            Some(task) => format!("moved #{} to {}", task.id, task.status),
            None => "nothing to do".to_string(),
        }),
        Command::Remove(id) => {
            engine.submit_delete(id).await?;
            Ok(format!("deleted #{id}"))
        }
        Command::Board(search) => Ok(render_board(&engine.board(&search))),
        Command::Fail(error) => {
            let text = format!("next remote call will fail: {error}");
            engine.gateway().fail_next(error);
            Ok(text)
        }
        Command::Refresh => {
            let count = engine.refresh().await?;
            Ok(format!("loaded {count} tasks"))
        }
        Command::Help => Ok(HELP.to_string()),
        Command::Quit => Ok(String::new()),
    }
}
