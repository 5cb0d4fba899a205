// UI layer: turns views into terminal output. Colours come from
// crossterm, the settle wait gets an indicatif spinner, and `login` uses
// a dialoguer password prompt. All user-facing wording lives here.

use std::fmt::Write as _;
use std::time::Duration;

use anyhow::Result;
use crossterm::style::Stylize;
use dialoguer::Password;
use indicatif::{ProgressBar, ProgressStyle};

use crate::outcome::Outcome;
use crate::render::{
    Failure, FlagTarget, Lifecycle, Notice, Record, Render, Status, Table, View,
};

/// Prints views to stdout (failures and usage to stderr).
#[derive(Default)]
pub struct Terminal {
    spinner: Option<ProgressBar>,
}

impl Terminal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Render for Terminal {
    fn emit(&mut self, view: View) {
        match view {
            View::Table(table) => println!("{}", draw_table(&table)),
            View::Record(record) => print_record(&record),
            View::Status(status) => println!("{}", status_line(&status)),
            View::Notice(notice) => println!("{}", notice_line(notice).yellow()),
            View::Failure(failure) => eprintln!("{}", failure_line(&failure).red()),
            View::Usage { reason, usage } => {
                eprintln!("{} {reason}", "error:".red().bold());
                eprintln!("usage: htb {usage}");
            }
        }
    }

    fn wait_started(&mut self, label: &str) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(label.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn wait_finished(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

/// Ask for a token without echoing it.
pub fn prompt_token() -> Result<String> {
    let token: String = Password::new().with_prompt("HTB API token").interact()?;
    Ok(token)
}

fn status_line(status: &Status) -> String {
    match status {
        Status::Flag { outcome, target } => {
            let what = match target {
                FlagTarget::Machine(id) => format!("machine {id}"),
                FlagTarget::ReleaseMachine(id) => format!("release machine {id}"),
                FlagTarget::SherlockTask {
                    sherlock_id,
                    task_id,
                } => format!("Sherlock {sherlock_id}, Task {task_id}"),
            };
            match outcome {
                Outcome::Correct => format!("Correct flag submitted for {what}").green().to_string(),
                Outcome::AlreadyCompleted => format!("Already completed: {what}").yellow().to_string(),
                Outcome::Incorrect => format!("Incorrect flag for {what}").red().to_string(),
                Outcome::Unknown(message) => format!("Response for {what}: {message}").blue().to_string(),
            }
        }
        Status::Lifecycle {
            action,
            machine_id,
            message,
        } => {
            let line = match action {
                Lifecycle::Spawned => format!("Spawned {machine_id}").green(),
                Lifecycle::Reset => format!("Reset {machine_id}").yellow(),
                Lifecycle::Terminated => format!("Terminated {machine_id}").red(),
            };
            match message {
                Some(message) => format!("{line} ({message})"),
                None => line.to_string(),
            }
        }
    }
}

fn notice_line(notice: Notice) -> String {
    match notice {
        Notice::MachineNotFound(id) => format!("Machine ID {id} not found"),
        Notice::SherlockNotFound(id) => format!("No details found for Sherlock ID {id}"),
        Notice::NoSherlockTasks(id) => format!("No tasks found for Sherlock ID {id}"),
        Notice::NoActiveReleaseMachine => "No active release machine".to_string(),
        Notice::SpawnNotSettled(id) => {
            format!("Release machine {id} has not reported as spawned yet; showing last state")
        }
    }
}

fn failure_line(failure: &Failure) -> String {
    format!("{} /{} failed: {}", failure.method, failure.path, failure.reason)
}

fn print_record(record: &Record) {
    println!("{}", record.title.as_str().bold());
    let width = record.fields.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in &record.fields {
        let label = format!("{name:<width$}");
        println!("  {}  {}", label.green().bold(), value.as_str().cyan());
    }
    if let Some(description) = &record.description {
        println!("\n{} {description}", "Desc:".green().bold());
    }
    println!("{}", "-".repeat(50));
}

/// Boxed ASCII table sized to its widest cell per column.
fn draw_table(table: &Table) -> String {
    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &table.rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }
    let rule = widths.iter().fold(String::from("+"), |mut acc, w| {
        acc.push_str(&"-".repeat(w + 2));
        acc.push('+');
        acc
    });
    let line = |cells: Vec<&str>| {
        let mut out = String::from("|");
        for (cell, width) in cells.iter().zip(&widths) {
            let pad = width - cell.chars().count();
            let _ = write!(out, " {cell}{} |", " ".repeat(pad));
        }
        out
    };

    let mut out = String::new();
    if let Some(title) = &table.title {
        let _ = writeln!(out, "{title}");
    }
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "{}", line(table.columns.clone()));
    let _ = writeln!(out, "{rule}");
    for row in &table.rows {
        let _ = writeln!(out, "{}", line(row.iter().map(String::as_str).collect()));
    }
    out.push_str(&rule);
    out
}
