// Presentation boundary. The dispatcher describes *what* to show as
// `View` values; a `Render` implementation decides how it looks.

use crate::api::{Method, TransportError};
use crate::outcome::Outcome;

/// Something the user should see.
#[derive(Debug, Clone, PartialEq)]
pub enum View {
    /// Uniform records, one row each.
    Table(Table),
    /// A single record as field/value pairs.
    Record(Record),
    /// One-line result of a mutating call.
    Status(Status),
    /// Informational state; nothing failed.
    Notice(Notice),
    /// A call failed at the transport level.
    Failure(Failure),
    /// Arguments did not fit the command; carries the usage line to show.
    Usage { reason: String, usage: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub title: Option<String>,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub title: String,
    pub fields: Vec<(&'static str, String)>,
    /// Free text shown under the fields, if any.
    pub description: Option<String>,
}

impl Record {
    pub fn new(title: impl Into<String>) -> Self {
        Record {
            title: title.into(),
            fields: Vec::new(),
            description: None,
        }
    }

    pub fn field(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    /// Attach a description, dropping it when blank.
    pub fn description(mut self, text: Option<&str>) -> Self {
        self.description = text
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Flag { outcome: Outcome, target: FlagTarget },
    Lifecycle {
        action: Lifecycle,
        machine_id: u64,
        /// Server message, if it sent one.
        message: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTarget {
    Machine(u64),
    SherlockTask { sherlock_id: u64, task_id: u64 },
    ReleaseMachine(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Spawned,
    Reset,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    MachineNotFound(u64),
    SherlockNotFound(u64),
    NoSherlockTasks(u64),
    NoActiveReleaseMachine,
    /// Polling gave up before the machine reported itself spawned.
    SpawnNotSettled(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub method: Method,
    pub path: String,
    pub reason: String,
}

impl From<&TransportError> for Failure {
    fn from(err: &TransportError) -> Self {
        Failure {
            method: err.method,
            path: err.path.clone(),
            reason: err.cause.to_string(),
        }
    }
}

/// Sink for views. The wait hooks bracket blocking pauses so a terminal
/// can show a spinner.
pub trait Render {
    fn emit(&mut self, view: View);

    fn wait_started(&mut self, _label: &str) {}

    fn wait_finished(&mut self) {}
}
