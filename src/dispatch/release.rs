// Release arena: every action targets the single season-scoped machine,
// so each one starts by looking it up. No machine means nothing to do,
// for every action including spawn.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::api::Transport;
use crate::catalog::Catalog;
use crate::config::SettlePolicy;
use crate::model::ReleaseMachine;
use crate::render::{FlagTarget, Lifecycle, Notice, Record, Status, View};
use crate::router::ReleaseAction;

use super::{flag_outcome, lifecycle_status, text_or_dash, Feed};

/// Where a release command ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum ReleaseState {
    /// The lookup failed at the transport level.
    Unresolved,
    NoActiveMachine,
    /// Machine resolved and shown, nothing else done.
    Idle(ReleaseMachine),
    Spawning(u64),
    Resetting(u64),
    Terminating(u64),
    SubmittingFlag(u64),
}

pub struct ReleaseArena<'c, 'a, T: Transport + ?Sized> {
    catalog: &'c Catalog<'a, T>,
    settle: SettlePolicy,
}

impl<'c, 'a, T: Transport + ?Sized> ReleaseArena<'c, 'a, T> {
    pub fn new(catalog: &'c Catalog<'a, T>, settle: SettlePolicy) -> Self {
        ReleaseArena { catalog, settle }
    }

    pub(crate) fn run(&self, action: &ReleaseAction, feed: &mut Feed<'_>) -> ReleaseState {
        let machine = match feed.check(self.catalog.active_release_machine()) {
            Some(Some(machine)) => machine,
            Some(None) => {
                feed.notice(Notice::NoActiveReleaseMachine);
                return ReleaseState::NoActiveMachine;
            }
            None => return ReleaseState::Unresolved,
        };
        let id = machine.id;
        debug!(id, ?action, "release machine resolved");

        match action {
            ReleaseAction::Show => {
                feed.emit(View::Record(release_record(&machine)));
                ReleaseState::Idle(machine)
            }
            ReleaseAction::Spawn => {
                // The re-fetch runs either way; a failed spawn only gets a
                // single look instead of the settle loop.
                let settle = match feed.check(self.catalog.spawn(id)) {
                    Some(reply) => {
                        feed.status(lifecycle_status(Lifecycle::Spawned, id, reply));
                        self.settle
                    }
                    None => SettlePolicy {
                        attempts: 1,
                        interval: Duration::ZERO,
                    },
                };
                self.settle_and_show(id, settle, feed);
                ReleaseState::Spawning(id)
            }
            ReleaseAction::Reset => {
                if let Some(reply) = feed.check(self.catalog.reset(id)) {
                    feed.status(lifecycle_status(Lifecycle::Reset, id, reply));
                }
                ReleaseState::Resetting(id)
            }
            ReleaseAction::Terminate => {
                if let Some(reply) = feed.check(self.catalog.terminate(id)) {
                    feed.status(lifecycle_status(Lifecycle::Terminated, id, reply));
                }
                ReleaseState::Terminating(id)
            }
            ReleaseAction::Flag(flag) => {
                if let Some(reply) = feed.check(self.catalog.submit_release_flag(id, flag)) {
                    feed.status(Status::Flag {
                        outcome: flag_outcome(&reply),
                        target: FlagTarget::ReleaseMachine(id),
                    });
                }
                ReleaseState::SubmittingFlag(id)
            }
        }
    }

    /// Re-fetch the machine until it reports itself spawned or the policy
    /// runs out, then show the last observation.
    fn settle_and_show(&self, id: u64, settle: SettlePolicy, feed: &mut Feed<'_>) {
        feed.out().wait_started("Waiting for the release machine to come up");
        let mut last = None;
        for attempt in 1..=settle.attempts.max(1) {
            thread::sleep(settle.interval);
            match self.catalog.active_release_machine() {
                Ok(Some(machine)) => {
                    let ready = machine.is_spawned();
                    debug!(attempt, ready, "polled release machine");
                    last = Some(Ok(machine));
                    if ready {
                        break;
                    }
                }
                Ok(None) => {
                    last = None;
                    break;
                }
                Err(err) => {
                    last = Some(Err(err));
                    break;
                }
            }
        }
        feed.out().wait_finished();

        match last {
            Some(Ok(machine)) => {
                if !machine.is_spawned() {
                    feed.notice(Notice::SpawnNotSettled(id));
                }
                feed.emit(View::Record(release_record(&machine)));
            }
            Some(Err(err)) => feed.failure(&err),
            None => feed.notice(Notice::NoActiveReleaseMachine),
        }
    }
}

pub(crate) fn release_record(m: &ReleaseMachine) -> Record {
    Record::new(format!("Release Machine: {}", m.name))
        .field("ID", m.id.to_string())
        .field("Name", m.name.clone())
        .field("IP", text_or_dash(m.ip.as_deref()))
        .field("OS", text_or_dash(m.os.as_deref()))
        .field("Difficulty", text_or_dash(m.difficulty_text.as_deref()))
        .field("User Owned", m.is_owned_user.to_string())
        .field("Root Owned", m.is_owned_root.to_string())
        .field("Spawned", m.is_spawned().to_string())
        .description(m.description.as_deref())
}
