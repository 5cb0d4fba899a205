// Endpoint catalog: one entry per logical platform operation. Each entry
// knows its verb, API version, path template and reply shape; the
// `Catalog` turns them into typed calls over any `Transport`.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::api::{ApiVersion, Method, Transport, TransportCause, TransportError};
use crate::model::{
    Machine, MachineSummary, MutationReply, ReleaseMachine, Sherlock, SherlockDetail,
    SherlockProgress, Task,
};

/// What a successful reply looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Data wrapped under a key (`data`, `info`, ...) or a bare field.
    Payload(&'static str),
    /// Legacy mutation reply: `{ "message": ... }`.
    Message,
    /// v5 mutation reply: `{ "success": bool, "message": ... }`.
    SuccessMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSpec {
    pub method: Method,
    pub version: ApiVersion,
    /// Path relative to the version root; each `{}` takes one id in order.
    pub template: &'static str,
    pub reply: ReplyShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    ListMachines,
    MachineProfile,
    Spawn,
    Reset,
    Terminate,
    SubmitMachineFlag,
    ListSherlocks,
    SherlockPlay,
    SherlockTasks,
    SherlockProgress,
    SherlockDownloadLink,
    SubmitSherlockFlag,
    ActiveReleaseMachine,
    SubmitReleaseFlag,
}

impl Endpoint {
    pub const fn spec(self) -> EndpointSpec {
        use ApiVersion::{V4, V5};
        use Method::{Get, Post};
        use ReplyShape::{Message, Payload, SuccessMessage};

        let (method, version, template, reply) = match self {
            Endpoint::ListMachines => (Get, V4, "machine/paginated?per_page=100", Payload("data")),
            Endpoint::MachineProfile => (Get, V4, "machine/profile/{}", Payload("info")),
            Endpoint::Spawn => (Post, V4, "vm/spawn", Message),
            Endpoint::Reset => (Post, V4, "vm/reset", Message),
            Endpoint::Terminate => (Post, V4, "vm/terminate", Message),
            Endpoint::SubmitMachineFlag => (Post, V5, "machine/own", SuccessMessage),
            Endpoint::ListSherlocks => (Get, V4, "sherlocks?state=active&per_page=100", Payload("data")),
            Endpoint::SherlockPlay => (Get, V4, "sherlocks/{}/play", Payload("data")),
            Endpoint::SherlockTasks => (Get, V4, "sherlocks/{}/tasks", Payload("data")),
            Endpoint::SherlockProgress => (Get, V4, "sherlocks/{}/progress", Payload("data")),
            Endpoint::SherlockDownloadLink => (Get, V4, "sherlocks/{}/download_link", Payload("url")),
            Endpoint::SubmitSherlockFlag => (Post, V4, "sherlocks/{}/tasks/{}/flag", Message),
            Endpoint::ActiveReleaseMachine => (Get, V4, "season/machine/active", Payload("data")),
            Endpoint::SubmitReleaseFlag => (Post, V4, "arena/own", Message),
        };
        EndpointSpec {
            method,
            version,
            template,
            reply,
        }
    }

    /// Fill the path template with `ids`, in order.
    pub fn path(self, ids: &[u64]) -> String {
        let mut ids = ids.iter();
        let mut parts = self.spec().template.split("{}");
        let mut path = parts.next().unwrap_or_default().to_string();
        for part in parts {
            if let Some(id) = ids.next() {
                path.push_str(&id.to_string());
            }
            path.push_str(part);
        }
        path
    }
}

/// Typed operations over a transport. Read calls return `None` (or an
/// empty list) for an absent payload; mutating calls return the server's
/// reply even when it came back with an error status.
pub struct Catalog<'a, T: Transport + ?Sized> {
    transport: &'a T,
}

impl<'a, T: Transport + ?Sized> Catalog<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Catalog { transport }
    }

    pub fn list_machines(&self) -> Result<Vec<MachineSummary>, TransportError> {
        Ok(self.read(Endpoint::ListMachines, &[])?.unwrap_or_default())
    }

    pub fn machine(&self, id: u64) -> Result<Option<Machine>, TransportError> {
        self.read(Endpoint::MachineProfile, &[id])
    }

    pub fn spawn(&self, id: u64) -> Result<MutationReply, TransportError> {
        self.mutate(Endpoint::Spawn, &[], json!({ "machine_id": id }))
    }

    pub fn reset(&self, id: u64) -> Result<MutationReply, TransportError> {
        self.mutate(Endpoint::Reset, &[], json!({ "machine_id": id }))
    }

    pub fn terminate(&self, id: u64) -> Result<MutationReply, TransportError> {
        self.mutate(Endpoint::Terminate, &[], json!({ "machine_id": id }))
    }

    pub fn submit_machine_flag(&self, id: u64, flag: &str) -> Result<MutationReply, TransportError> {
        self.mutate(Endpoint::SubmitMachineFlag, &[], json!({ "id": id, "flag": flag }))
    }

    /// Active sherlocks, newest release first.
    pub fn list_sherlocks(&self) -> Result<Vec<Sherlock>, TransportError> {
        let mut sherlocks: Vec<Sherlock> = self.read(Endpoint::ListSherlocks, &[])?.unwrap_or_default();
        sherlocks.sort_by_cached_key(|s| {
            std::cmp::Reverse(s.release_date.as_deref().and_then(parse_release_date))
        });
        Ok(sherlocks)
    }

    pub fn sherlock(&self, id: u64) -> Result<Option<SherlockDetail>, TransportError> {
        self.read(Endpoint::SherlockPlay, &[id])
    }

    pub fn sherlock_tasks(&self, id: u64) -> Result<Vec<Task>, TransportError> {
        Ok(self.read(Endpoint::SherlockTasks, &[id])?.unwrap_or_default())
    }

    pub fn sherlock_progress(&self, id: u64) -> Result<Option<SherlockProgress>, TransportError> {
        self.read(Endpoint::SherlockProgress, &[id])
    }

    pub fn sherlock_download_link(&self, id: u64) -> Result<Option<String>, TransportError> {
        self.read(Endpoint::SherlockDownloadLink, &[id])
    }

    pub fn submit_sherlock_flag(
        &self,
        id: u64,
        task_id: u64,
        flag: &str,
    ) -> Result<MutationReply, TransportError> {
        self.mutate(Endpoint::SubmitSherlockFlag, &[id, task_id], json!({ "flag": flag }))
    }

    pub fn active_release_machine(&self) -> Result<Option<ReleaseMachine>, TransportError> {
        self.read(Endpoint::ActiveReleaseMachine, &[])
    }

    pub fn submit_release_flag(&self, id: u64, flag: &str) -> Result<MutationReply, TransportError> {
        self.mutate(Endpoint::SubmitReleaseFlag, &[], json!({ "id": id, "flag": flag }))
    }

    fn read<D: DeserializeOwned>(&self, endpoint: Endpoint, ids: &[u64]) -> Result<Option<D>, TransportError> {
        let spec = endpoint.spec();
        let path = endpoint.path(ids);
        let ReplyShape::Payload(key) = spec.reply else {
            let cause = TransportCause::Decode(format!("{endpoint:?} has no payload to read"));
            return Err(TransportError::new(spec.method, path, cause));
        };
        let reply = self.transport.get(spec.version, &path)?;
        let payload = match reply.get(key) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Array(items)) if items.is_empty() => return Ok(None),
            Some(Value::Object(fields)) if fields.is_empty() => return Ok(None),
            Some(payload) => payload.clone(),
        };
        serde_json::from_value(payload)
            .map(Some)
            .map_err(|e| TransportError::new(spec.method, path, TransportCause::Decode(e.to_string())))
    }

    fn mutate(&self, endpoint: Endpoint, ids: &[u64], body: Value) -> Result<MutationReply, TransportError> {
        let spec = endpoint.spec();
        let path = endpoint.path(ids);
        let reply = match self.transport.post(spec.version, &path, &body) {
            Ok(reply) => reply,
            // The platform reports rejected flags and busy VMs with a 4xx
            // and a normal message body; that body is the answer.
            Err(err) => match err.body().filter(|b| b.get("message").is_some()) {
                Some(body) => body.clone(),
                None => return Err(err),
            },
        };
        if reply.is_null() {
            return Ok(MutationReply::default());
        }
        let mut parsed: MutationReply = serde_json::from_value(reply)
            .map_err(|e| TransportError::new(spec.method, path, TransportCause::Decode(e.to_string())))?;
        if spec.reply == ReplyShape::Message {
            parsed.success = None;
        }
        Ok(parsed)
    }
}

fn parse_release_date(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f").ok()
}
