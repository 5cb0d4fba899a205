// Command router: turns raw command tokens into a typed `Invocation`.
// Verbs and aliases live in one table; arity is checked here so that a
// malformed command never reaches the network.

use std::fmt::Write as _;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Machines,
    Spawn,
    Reset,
    Terminate,
    Flag,
    Sherlocks,
    Release,
    Login,
}

pub struct VerbEntry {
    pub verb: Verb,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub args: &'static str,
    pub about: &'static str,
}

pub const VERBS: &[VerbEntry] = &[
    VerbEntry {
        verb: Verb::Machines,
        name: "machines",
        aliases: &["m"],
        args: "[id]",
        about: "List machines, or show one machine's detail",
    },
    VerbEntry {
        verb: Verb::Spawn,
        name: "spawn",
        aliases: &["sp"],
        args: "<id>",
        about: "Spawn a machine and show its detail",
    },
    VerbEntry {
        verb: Verb::Reset,
        name: "reset",
        aliases: &["re"],
        args: "<id>",
        about: "Reset a machine",
    },
    VerbEntry {
        verb: Verb::Terminate,
        name: "terminate",
        aliases: &["t"],
        args: "<id>",
        about: "Terminate a machine",
    },
    VerbEntry {
        verb: Verb::Flag,
        name: "flag",
        aliases: &["f"],
        args: "<id> <flag>",
        about: "Submit a machine flag",
    },
    VerbEntry {
        verb: Verb::Sherlocks,
        name: "sherlocks",
        aliases: &["s"],
        args: "[<id> | f <id> <task_id> <flag>]",
        about: "List sherlocks, show one with its tasks, or submit a task flag",
    },
    VerbEntry {
        verb: Verb::Release,
        name: "release",
        aliases: &["r"],
        args: "[spawn|s | terminate|t | reset|re | flag|f <flag>]",
        about: "Show or act on the active release arena machine",
    },
    VerbEntry {
        verb: Verb::Login,
        name: "login",
        aliases: &[],
        args: "",
        about: "Store an API token for later runs",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReleaseVerb {
    Spawn,
    Terminate,
    Reset,
    Flag,
}

const RELEASE_VERBS: &[(ReleaseVerb, &str, &str)] = &[
    (ReleaseVerb::Spawn, "spawn", "s"),
    (ReleaseVerb::Terminate, "terminate", "t"),
    (ReleaseVerb::Reset, "reset", "re"),
    (ReleaseVerb::Flag, "flag", "f"),
];

/// What to do with the active release arena machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseAction {
    Show,
    Spawn,
    Terminate,
    Reset,
    Flag(String),
}

/// An operation against the platform API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListMachines,
    ShowMachine(u64),
    Spawn(u64),
    Reset(u64),
    Terminate(u64),
    SubmitFlag { id: u64, flag: String },
    ListSherlocks,
    ShowSherlock(u64),
    SubmitSherlockFlag { id: u64, task_id: u64, flag: String },
    Release(ReleaseAction),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// No command, or one we do not know: print usage and leave.
    Help,
    Login,
    Api(Command),
}

/// Arguments did not fit the verb. Raised before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct UsageError {
    pub verb: Verb,
    pub reason: String,
}

impl UsageError {
    fn new(verb: Verb, reason: impl Into<String>) -> Self {
        UsageError {
            verb,
            reason: reason.into(),
        }
    }

    /// The usage line for the verb that was misused.
    pub fn usage(&self) -> String {
        lookup_entry(self.verb).map(usage_line).unwrap_or_default()
    }
}

/// Find the table entry for a token, by name or alias.
pub fn lookup(token: &str) -> Option<&'static VerbEntry> {
    VERBS
        .iter()
        .find(|entry| entry.name == token || entry.aliases.contains(&token))
}

fn lookup_entry(verb: Verb) -> Option<&'static VerbEntry> {
    VERBS.iter().find(|entry| entry.verb == verb)
}

pub fn parse<S: AsRef<str>>(tokens: &[S]) -> Result<Invocation, UsageError> {
    let Some((head, rest)) = tokens.split_first() else {
        return Ok(Invocation::Help);
    };
    let Some(entry) = lookup(head.as_ref()) else {
        return Ok(Invocation::Help);
    };
    let args: Vec<&str> = rest.iter().map(AsRef::as_ref).collect();
    let verb = entry.verb;

    let command = match verb {
        Verb::Login => {
            expect_count(verb, &args, 0)?;
            return Ok(Invocation::Login);
        }
        Verb::Machines => match args.as_slice() {
            [] => Command::ListMachines,
            [id] => Command::ShowMachine(parse_id(verb, "machine id", id)?),
            _ => return Err(too_many(verb)),
        },
        Verb::Spawn => Command::Spawn(single_id(verb, &args)?),
        Verb::Reset => Command::Reset(single_id(verb, &args)?),
        Verb::Terminate => Command::Terminate(single_id(verb, &args)?),
        Verb::Flag => {
            expect_count(verb, &args, 2)?;
            Command::SubmitFlag {
                id: parse_id(verb, "machine id", args[0])?,
                flag: non_empty(verb, "flag", args[1])?,
            }
        }
        Verb::Sherlocks => parse_sherlocks(&args)?,
        Verb::Release => Command::Release(parse_release(&args)?),
    };
    Ok(Invocation::Api(command))
}

fn parse_sherlocks(args: &[&str]) -> Result<Command, UsageError> {
    let verb = Verb::Sherlocks;
    if args.len() > 4 {
        return Err(too_many(verb));
    }
    match args.first().copied() {
        None => Ok(Command::ListSherlocks),
        Some("f") => {
            let [_, id, task_id, flag] = args else {
                return Err(UsageError::new(
                    verb,
                    "flag submission needs a sherlock id, a task id and a flag",
                ));
            };
            Ok(Command::SubmitSherlockFlag {
                id: parse_id(verb, "sherlock id", id)?,
                task_id: parse_id(verb, "task id", task_id)?,
                flag: non_empty(verb, "flag", flag)?,
            })
        }
        Some(action) if !action.is_empty() && action.bytes().all(|b| b.is_ascii_digit()) => {
            Ok(Command::ShowSherlock(parse_id(verb, "sherlock id", action)?))
        }
        Some(_) => Ok(Command::ListSherlocks),
    }
}

fn parse_release(args: &[&str]) -> Result<ReleaseAction, UsageError> {
    let verb = Verb::Release;
    let Some((sub, rest)) = args.split_first() else {
        return Ok(ReleaseAction::Show);
    };
    let found = RELEASE_VERBS
        .iter()
        .find(|(_, name, alias)| sub == name || sub == alias)
        .map(|(release_verb, _, _)| *release_verb);
    let Some(release_verb) = found else {
        return Err(UsageError::new(verb, format!("unknown release action `{sub}`")));
    };
    match release_verb {
        ReleaseVerb::Flag => match rest {
            [flag] => Ok(ReleaseAction::Flag(non_empty(verb, "flag", flag)?)),
            [] => Err(UsageError::new(verb, "release flag needs a flag")),
            _ => Err(too_many(verb)),
        },
        other => {
            if !rest.is_empty() {
                return Err(too_many(verb));
            }
            Ok(match other {
                ReleaseVerb::Spawn => ReleaseAction::Spawn,
                ReleaseVerb::Terminate => ReleaseAction::Terminate,
                _ => ReleaseAction::Reset,
            })
        }
    }
}

fn single_id(verb: Verb, args: &[&str]) -> Result<u64, UsageError> {
    expect_count(verb, args, 1)?;
    parse_id(verb, "machine id", args[0])
}

fn expect_count(verb: Verb, args: &[&str], count: usize) -> Result<(), UsageError> {
    match args.len() {
        n if n == count => Ok(()),
        n if n > count => Err(too_many(verb)),
        _ => Err(UsageError::new(verb, "missing arguments")),
    }
}

fn too_many(verb: Verb) -> UsageError {
    UsageError::new(verb, "too many arguments")
}

fn parse_id(verb: Verb, what: &str, raw: &str) -> Result<u64, UsageError> {
    raw.parse()
        .map_err(|_| UsageError::new(verb, format!("{what} must be a number, got `{raw}`")))
}

fn non_empty(verb: Verb, what: &str, raw: &str) -> Result<String, UsageError> {
    if raw.trim().is_empty() {
        return Err(UsageError::new(verb, format!("{what} must not be empty")));
    }
    Ok(raw.to_string())
}

fn usage_line(entry: &VerbEntry) -> String {
    let mut names = entry.name.to_string();
    for alias in entry.aliases {
        names.push('|');
        names.push_str(alias);
    }
    if entry.args.is_empty() {
        names
    } else {
        format!("{names} {}", entry.args)
    }
}

/// Usage text for every verb, generated from the table.
pub fn usage() -> String {
    let lines: Vec<(String, &str)> = VERBS.iter().map(|e| (usage_line(e), e.about)).collect();
    let width = lines.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
    let mut out = String::from("Commands:\n");
    for (line, about) in lines {
        let _ = writeln!(out, "  {line:<width$}  {about}");
    }
    out
}
