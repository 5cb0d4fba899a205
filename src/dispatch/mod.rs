// Dispatcher: runs one routed `Command` end to end against the catalog
// and describes the result as views. Transport failures are shown and
// counted; calls that depend on a failed result are skipped, independent
// ones still run.

mod release;

use tracing::{debug, info};

use crate::api::{Transport, TransportError};
use crate::catalog::Catalog;
use crate::config::SettlePolicy;
use crate::model::{date_only, Machine, MachineSummary, MutationReply, Sherlock, Task};
use crate::outcome::{classify, classify_with_success, Outcome};
use crate::render::{FlagTarget, Lifecycle, Notice, Record, Render, Status, Table, View};
use crate::router::Command;

use release::ReleaseArena;

/// How a dispatch went, for the exit code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Report {
    pub failures: usize,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }
}

/// Render sink that also keeps count of failures.
pub(crate) struct Feed<'r> {
    out: &'r mut dyn Render,
    failures: usize,
}

impl<'r> Feed<'r> {
    fn new(out: &'r mut dyn Render) -> Self {
        Feed { out, failures: 0 }
    }

    pub(crate) fn emit(&mut self, view: View) {
        self.out.emit(view);
    }

    pub(crate) fn notice(&mut self, notice: Notice) {
        self.out.emit(View::Notice(notice));
    }

    pub(crate) fn status(&mut self, status: Status) {
        self.out.emit(View::Status(status));
    }

    pub(crate) fn failure(&mut self, err: &TransportError) {
        self.failures += 1;
        self.out.emit(View::Failure(err.into()));
    }

    /// Unwrap a call result, reporting the failure if there is one.
    pub(crate) fn check<T>(&mut self, result: Result<T, TransportError>) -> Option<T> {
        result.map_err(|err| self.failure(&err)).ok()
    }

    pub(crate) fn out(&mut self) -> &mut (dyn Render + 'r) {
        &mut *self.out
    }

    fn finish(self) -> Report {
        Report {
            failures: self.failures,
        }
    }
}

pub struct Dispatcher<'a, T: Transport + ?Sized> {
    catalog: Catalog<'a, T>,
    settle: SettlePolicy,
}

impl<'a, T: Transport + ?Sized> Dispatcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Dispatcher {
            catalog: Catalog::new(transport),
            settle: SettlePolicy::default(),
        }
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    pub fn run(&self, command: &Command, out: &mut dyn Render) -> Report {
        info!(?command, "dispatching");
        let mut feed = Feed::new(out);
        match command {
            Command::ListMachines => self.list_machines(&mut feed),
            Command::ShowMachine(id) => self.show_machine(*id, &mut feed),
            Command::Spawn(id) => {
                // Detail is shown even if the spawn call failed: it tells
                // the user what state the machine is actually in.
                self.lifecycle(*id, Lifecycle::Spawned, &mut feed);
                self.show_machine(*id, &mut feed);
            }
            Command::Reset(id) => self.lifecycle(*id, Lifecycle::Reset, &mut feed),
            Command::Terminate(id) => self.lifecycle(*id, Lifecycle::Terminated, &mut feed),
            Command::SubmitFlag { id, flag } => {
                if let Some(reply) = feed.check(self.catalog.submit_machine_flag(*id, flag)) {
                    feed.status(Status::Flag {
                        outcome: flag_outcome(&reply),
                        target: FlagTarget::Machine(*id),
                    });
                }
            }
            Command::ListSherlocks => self.list_sherlocks(&mut feed),
            Command::ShowSherlock(id) => {
                self.show_sherlock(*id, &mut feed);
                self.list_tasks(*id, &mut feed);
            }
            Command::SubmitSherlockFlag { id, task_id, flag } => {
                let result = self.catalog.submit_sherlock_flag(*id, *task_id, flag);
                if let Some(reply) = feed.check(result) {
                    feed.status(Status::Flag {
                        outcome: flag_outcome(&reply),
                        target: FlagTarget::SherlockTask {
                            sherlock_id: *id,
                            task_id: *task_id,
                        },
                    });
                }
            }
            Command::Release(action) => {
                let state = ReleaseArena::new(&self.catalog, self.settle).run(action, &mut feed);
                debug!(?state, "release command finished");
            }
        }
        feed.finish()
    }

    fn list_machines(&self, feed: &mut Feed<'_>) {
        if let Some(machines) = feed.check(self.catalog.list_machines()) {
            feed.emit(View::Table(machine_table(&machines)));
        }
    }

    fn show_machine(&self, id: u64, feed: &mut Feed<'_>) {
        match feed.check(self.catalog.machine(id)) {
            Some(Some(machine)) => feed.emit(View::Record(machine_record(&machine))),
            Some(None) => feed.notice(Notice::MachineNotFound(id)),
            None => {}
        }
    }

    fn lifecycle(&self, id: u64, action: Lifecycle, feed: &mut Feed<'_>) {
        let result = match action {
            Lifecycle::Spawned => self.catalog.spawn(id),
            Lifecycle::Reset => self.catalog.reset(id),
            Lifecycle::Terminated => self.catalog.terminate(id),
        };
        if let Some(reply) = feed.check(result) {
            feed.status(lifecycle_status(action, id, reply));
        }
    }

    fn list_sherlocks(&self, feed: &mut Feed<'_>) {
        if let Some(sherlocks) = feed.check(self.catalog.list_sherlocks()) {
            feed.emit(View::Table(sherlock_table(&sherlocks)));
        }
    }

    fn show_sherlock(&self, id: u64, feed: &mut Feed<'_>) {
        let detail = match feed.check(self.catalog.sherlock(id)) {
            Some(Some(detail)) => detail,
            Some(None) => return feed.notice(Notice::SherlockNotFound(id)),
            None => return,
        };
        let progress = feed.check(self.catalog.sherlock_progress(id)).flatten();
        let link = feed.check(self.catalog.sherlock_download_link(id)).flatten();

        let creators: Vec<&str> = detail.creators.iter().map(|c| c.name.as_str()).collect();
        let progress = match progress {
            Some(p) => format!(
                "{}% ({}/{} tasks), Owned: {}",
                p.percentage, p.tasks_answered, p.total_tasks, p.is_owned
            ),
            None => "-".to_string(),
        };
        let record = Record::new(format!("Sherlock {id}"))
            .field("Scenario", text_or_dash(detail.scenario.as_deref().map(str::trim)))
            .field("Created by", creators.join(", "))
            .field("File", text_or_dash(detail.file_name.as_deref()))
            .field("Size", detail.file_size.as_ref().map_or("-".into(), display_value))
            .field("Download", text_or_dash(link.as_deref()))
            .field("Progress", progress);
        feed.emit(View::Record(record));
    }

    fn list_tasks(&self, id: u64, feed: &mut Feed<'_>) {
        let Some(tasks) = feed.check(self.catalog.sherlock_tasks(id)) else {
            return;
        };
        if tasks.is_empty() {
            return feed.notice(Notice::NoSherlockTasks(id));
        }
        for task in &tasks {
            feed.emit(View::Record(task_record(task)));
        }
    }
}

/// Feedback for any flag reply: v5 replies carry `success`, legacy ones
/// only a message.
pub(crate) fn flag_outcome(reply: &MutationReply) -> Outcome {
    match reply.success {
        Some(success) => classify_with_success(success, &reply.message),
        None => classify(&reply.message),
    }
}

pub(crate) fn lifecycle_status(action: Lifecycle, machine_id: u64, reply: MutationReply) -> Status {
    let message = Some(reply.message).filter(|m| !m.trim().is_empty());
    Status::Lifecycle {
        action,
        machine_id,
        message,
    }
}

pub(crate) fn text_or_dash(value: Option<&str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.to_string(),
        _ => "-".to_string(),
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "-".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn machine_table(machines: &[MachineSummary]) -> Table {
    Table {
        title: None,
        columns: vec!["ID", "Name", "OS", "Release", "Difficulty", "UserOwn", "RootOwn"],
        rows: machines
            .iter()
            .map(|m| {
                vec![
                    m.id.to_string(),
                    m.name.clone(),
                    text_or_dash(m.os.as_deref()),
                    text_or_dash(m.release.as_deref().map(date_only)),
                    text_or_dash(m.difficulty_text.as_deref()),
                    m.auth_user_in_user_owns.to_string(),
                    m.auth_user_in_root_owns.to_string(),
                ]
            })
            .collect(),
    }
}

pub(crate) fn machine_record(m: &Machine) -> Record {
    Record::new(format!("Machine Detail: {}", m.name))
        .field("ID", m.id.to_string())
        .field("Name", m.name.clone())
        .field("OS", text_or_dash(m.os.as_deref()))
        .field("Active", m.active.to_string())
        .field("Retired", m.retired.to_string())
        .field("Release Date", text_or_dash(m.release.as_deref().map(date_only)))
        .field("User Owned", m.auth_user_in_user_owns.to_string())
        .field("Root Owned", m.auth_user_in_root_owns.to_string())
        .field("User Own Time", text_or_dash(m.auth_user_first_user_time.as_deref()))
        .field("Root Own Time", text_or_dash(m.auth_user_first_root_time.as_deref()))
        .field("Own Rank", m.own_rank.as_ref().map_or("-".into(), display_value))
        .field("IP", text_or_dash(m.ip.as_deref()))
        .description(m.description.as_deref())
}

pub(crate) fn sherlock_table(sherlocks: &[Sherlock]) -> Table {
    Table {
        title: None,
        columns: vec!["ID", "Name", "Diff", "State", "CatID", "CatName", "Owned", "Released"],
        rows: sherlocks
            .iter()
            .map(|s| {
                vec![
                    s.id.to_string(),
                    s.name.clone(),
                    text_or_dash(s.difficulty.as_deref()),
                    text_or_dash(s.state.as_deref()),
                    s.category_id.map_or("-".into(), |c| c.to_string()),
                    text_or_dash(s.category_name.as_deref()),
                    s.is_owned.to_string(),
                    text_or_dash(s.release_date.as_deref().map(date_only)),
                ]
            })
            .collect(),
    }
}

pub(crate) fn task_record(t: &Task) -> Record {
    Record::new(format!("Task {}", t.id))
        .field("Task ID", t.id.to_string())
        .field("Title", text_or_dash(t.title.as_deref()))
        .field("Description", text_or_dash(t.description.as_deref().map(str::trim)))
        .field("Flag", text_or_dash(t.flag.as_deref()))
        .field("Masked Flag", text_or_dash(t.masked_flag.as_deref()))
        .field("Hint", text_or_dash(t.hint.as_deref().map(str::trim)))
        .field("Completed", t.completed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Failure;
    use crate::router::{parse, Invocation};
    use crate::test_support::{Recorder, StubTransport};
    use serde_json::json;

    fn run(stub: &StubTransport, command: Command) -> (Recorder, Report) {
        let mut recorder = Recorder::default();
        let report = Dispatcher::new(stub).run(&command, &mut recorder);
        (recorder, report)
    }

    /// Tokens in, views out: route like the binary does, then dispatch
    /// against the stub. Usage errors never reach the transport.
    fn route_and_run(tokens: &[&str], stub: &StubTransport, out: &mut Recorder) -> Option<Report> {
        match parse(tokens) {
            Ok(Invocation::Api(command)) => Some(Dispatcher::new(stub).run(&command, out)),
            Ok(_) => None,
            Err(err) => {
                out.emit(View::Usage {
                    reason: err.to_string(),
                    usage: err.usage(),
                });
                None
            }
        }
    }

    #[test]
    fn lists_two_machines_with_exact_fields() {
        let stub = StubTransport::new().reply(json!({"data": [
            {"id": 1, "name": "Alpha", "os": "Linux", "release": "2024-01-02T19:00:00.000000Z",
             "difficultyText": "Easy", "authUserInUserOwns": true, "authUserInRootOwns": false},
            {"id": 2, "name": "Beta", "os": "Windows", "release": "2023-11-30T19:00:00.000000Z",
             "difficultyText": "Insane", "authUserInUserOwns": false, "authUserInRootOwns": true}
        ]}));
        let (rec, report) = run(&stub, Command::ListMachines);
        assert!(report.is_clean());
        let [View::Table(table)] = rec.views.as_slice() else {
            panic!("expected one table, got {:?}", rec.views);
        };
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.rows[0],
            ["1", "Alpha", "Linux", "2024-01-02", "Easy", "true", "false"]
        );
        assert_eq!(
            table.rows[1],
            ["2", "Beta", "Windows", "2023-11-30", "Insane", "false", "true"]
        );
    }

    #[test]
    fn missing_machine_is_a_notice_not_a_failure() {
        let stub = StubTransport::new().reply(json!({"info": null}));
        let (rec, report) = run(&stub, Command::ShowMachine(404));
        assert!(report.is_clean());
        assert_eq!(rec.views, [View::Notice(Notice::MachineNotFound(404))]);
        assert_eq!(stub.calls().len(), 1);
    }

    #[test]
    fn machine_detail_record() {
        let stub = StubTransport::new().reply(json!({"info": {
            "id": 9, "name": "Lame", "os": "Linux", "active": true, "retired": false,
            "release": "2017-03-14T19:00:00.000000Z", "ip": "10.10.10.3",
            "info_status": "  Box is fine  "
        }}));
        let (rec, _) = run(&stub, Command::ShowMachine(9));
        let [View::Record(record)] = rec.views.as_slice() else {
            panic!("expected a record, got {:?}", rec.views);
        };
        assert_eq!(record.get("ID"), Some("9"));
        assert_eq!(record.get("Release Date"), Some("2017-03-14"));
        assert_eq!(record.get("User Own Time"), Some("-"));
        assert_eq!(record.description.as_deref(), Some("Box is fine"));
    }

    #[test]
    fn spawn_then_shows_detail() {
        let stub = StubTransport::new()
            .reply(json!({"message": "Machine deployed"}))
            .reply(json!({"info": {"id": 5, "name": "Five"}}));
        let (rec, _) = run(&stub, Command::Spawn(5));
        assert_eq!(stub.paths(), ["vm/spawn", "machine/profile/5"]);
        assert_eq!(stub.calls()[0].body, Some(json!({"machine_id": 5})));
        assert_eq!(
            rec.views[0],
            View::Status(Status::Lifecycle {
                action: Lifecycle::Spawned,
                machine_id: 5,
                message: Some("Machine deployed".into()),
            })
        );
        assert!(matches!(rec.views[1], View::Record(_)));
    }

    #[test]
    fn failed_spawn_still_shows_detail() {
        let stub = StubTransport::new()
            .fail_status(500, None)
            .reply(json!({"info": {"id": 5, "name": "Five"}}));
        let (rec, report) = run(&stub, Command::Spawn(5));
        assert_eq!(report.failures, 1);
        assert!(matches!(&rec.views[0], View::Failure(Failure { path, .. }) if path == "vm/spawn"));
        assert!(matches!(rec.views[1], View::Record(_)));
    }

    #[test]
    fn reset_and_terminate_post_machine_id() {
        let stub = StubTransport::new()
            .reply(json!({"message": ""}))
            .reply(json!({"message": "Terminated"}));
        let (rec, _) = run(&stub, Command::Reset(3));
        assert_eq!(
            rec.views,
            [View::Status(Status::Lifecycle {
                action: Lifecycle::Reset,
                machine_id: 3,
                message: None,
            })]
        );
        run(&stub, Command::Terminate(3));
        assert_eq!(stub.paths(), ["vm/reset", "vm/terminate"]);
    }

    #[test]
    fn machine_flag_uses_success_field() {
        let stub = StubTransport::new()
            .reply(json!({"success": true, "message": "Lame user is now owned."}))
            .reply(json!({"success": false, "message": "Incorrect flag!"}));
        let flag = |flag: &str| Command::SubmitFlag {
            id: 1,
            flag: flag.into(),
        };
        let (rec, _) = run(&stub, flag("good"));
        assert_eq!(
            rec.views,
            [View::Status(Status::Flag {
                outcome: Outcome::Correct,
                target: FlagTarget::Machine(1),
            })]
        );
        let (rec, _) = run(&stub, flag("bad"));
        assert!(matches!(
            &rec.views[0],
            View::Status(Status::Flag { outcome: Outcome::Incorrect, .. })
        ));
    }

    #[test]
    fn sherlock_flag_with_missing_args_makes_no_calls() {
        let stub = StubTransport::new();
        for tokens in [
            &["sherlocks", "f"][..],
            &["sherlocks", "f", "1"][..],
            &["s", "f", "1", "2"][..],
        ] {
            let mut rec = Recorder::default();
            assert_eq!(route_and_run(tokens, &stub, &mut rec), None);
            assert!(matches!(rec.views.as_slice(), [View::Usage { .. }]));
        }
        assert!(stub.calls().is_empty());

        let stub = StubTransport::new().reply(json!({"message": "Task flag owned!"}));
        let mut rec = Recorder::default();
        let report = route_and_run(&["s", "f", "1", "2", "x"], &stub, &mut rec);
        assert_eq!(report, Some(Report { failures: 0 }));
        assert_eq!(stub.paths(), ["sherlocks/1/tasks/2/flag"]);
    }

    #[test]
    fn sherlock_flag_resubmission_is_already_completed() {
        let stub = StubTransport::new()
            .reply(json!({"message": "Task flag owned!"}))
            .reply(json!({"message": "already completed"}));
        let Ok(Invocation::Api(command)) = parse(&["s", "f", "7", "2", "answer"]) else {
            panic!("should route");
        };
        let target = FlagTarget::SherlockTask {
            sherlock_id: 7,
            task_id: 2,
        };

        let (first, _) = run(&stub, command.clone());
        assert_eq!(
            first.views,
            [View::Status(Status::Flag {
                outcome: Outcome::Correct,
                target
            })]
        );
        let (second, _) = run(&stub, command);
        assert_eq!(
            second.views,
            [View::Status(Status::Flag {
                outcome: Outcome::AlreadyCompleted,
                target
            })]
        );
        assert_eq!(stub.paths(), ["sherlocks/7/tasks/2/flag", "sherlocks/7/tasks/2/flag"]);
    }

    #[test]
    fn unknown_sherlock_reply_is_verbatim() {
        let stub = StubTransport::new().reply(json!({"message": "Slow down"}));
        let (rec, _) = run(
            &stub,
            Command::SubmitSherlockFlag {
                id: 1,
                task_id: 1,
                flag: "x".into(),
            },
        );
        assert!(matches!(
            &rec.views[0],
            View::Status(Status::Flag { outcome: Outcome::Unknown(m), .. }) if m == "Slow down"
        ));
    }

    #[test]
    fn sherlock_detail_then_tasks() {
        let stub = StubTransport::new()
            .reply(json!({"data": {
                "scenario": " Investigate \n", "creators": [{"name": "a"}, {"name": "b"}],
                "file_name": "case.zip", "file_size": "12 MB"
            }}))
            .reply(json!({"data": {"progress": 50, "total_tasks": 4, "tasks_answered": 2, "is_owned": false}}))
            .reply(json!({"url": "https://dl.example/case.zip"}))
            .reply(json!({"data": [
                {"id": 1, "title": "First", "description": "d", "masked_flag": "****", "completed": true},
                {"id": 2, "title": "Second", "hint": null, "completed": false}
            ]}));
        let (rec, report) = run(&stub, Command::ShowSherlock(30));
        assert!(report.is_clean());
        assert_eq!(
            stub.paths(),
            [
                "sherlocks/30/play",
                "sherlocks/30/progress",
                "sherlocks/30/download_link",
                "sherlocks/30/tasks"
            ]
        );
        let View::Record(detail) = &rec.views[0] else {
            panic!("expected detail record");
        };
        assert_eq!(detail.get("Scenario"), Some("Investigate"));
        assert_eq!(detail.get("Created by"), Some("a, b"));
        assert_eq!(detail.get("Download"), Some("https://dl.example/case.zip"));
        assert_eq!(detail.get("Progress"), Some("50% (2/4 tasks), Owned: false"));
        assert_eq!(rec.views.len(), 3);
        let View::Record(second) = &rec.views[2] else {
            panic!("expected task record");
        };
        assert_eq!(second.get("Hint"), Some("-"));
        assert_eq!(second.get("Completed"), Some("false"));
    }

    #[test]
    fn sherlock_without_detail_still_lists_tasks() {
        let stub = StubTransport::new()
            .reply(json!({"data": {}}))
            .reply(json!({"data": []}));
        let (rec, report) = run(&stub, Command::ShowSherlock(8));
        assert!(report.is_clean());
        assert_eq!(
            rec.views,
            [
                View::Notice(Notice::SherlockNotFound(8)),
                View::Notice(Notice::NoSherlockTasks(8)),
            ]
        );
    }

    #[test]
    fn sherlock_progress_failure_keeps_detail() {
        let stub = StubTransport::new()
            .reply(json!({"data": {"scenario": "s"}}))
            .fail_decode()
            .reply(json!({"url": null}))
            .reply(json!({"data": [{"id": 1}]}));
        let (rec, report) = run(&stub, Command::ShowSherlock(2));
        assert_eq!(report.failures, 1);
        assert!(matches!(rec.views[0], View::Failure(_)));
        let View::Record(detail) = &rec.views[1] else {
            panic!("expected detail record");
        };
        assert_eq!(detail.get("Progress"), Some("-"));
        assert_eq!(detail.get("Download"), Some("-"));
    }

    #[test]
    fn sherlock_list_renders_date_only() {
        let stub = StubTransport::new().reply(json!({"data": [
            {"id": 4, "name": "Brutus", "difficulty": "Very Easy", "state": "active",
             "category_id": 10, "category_name": "DFIR", "is_owned": true,
             "release_date": "2024-04-04T17:00:00.000000Z"}
        ]}));
        let (rec, _) = run(&stub, Command::ListSherlocks);
        let [View::Table(table)] = rec.views.as_slice() else {
            panic!("expected table");
        };
        assert_eq!(
            table.rows[0],
            ["4", "Brutus", "Very Easy", "active", "10", "DFIR", "true", "2024-04-04"]
        );
    }
}
