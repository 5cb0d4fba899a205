// Shared test helpers: a `Transport` that replays queued responses and
// records every call, plus a `Render` sink that keeps what it was shown.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde_json::Value;

use crate::api::{ApiVersion, Method, Transport, TransportCause, TransportError};
use crate::render::{Render, View};

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub version: ApiVersion,
    pub path: String,
    pub body: Option<Value>,
}

/// Replays responses in FIFO order. Running out of responses is a test
/// bug and panics with the offending path.
#[derive(Default)]
pub struct StubTransport {
    responses: RefCell<VecDeque<Result<Value, TransportCause>>>,
    calls: RefCell<Vec<Call>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, value: Value) -> Self {
        self.responses.borrow_mut().push_back(Ok(value));
        self
    }

    pub fn fail_status(self, status: u16, body: Option<Value>) -> Self {
        self.responses
            .borrow_mut()
            .push_back(Err(TransportCause::Status { status, body }));
        self
    }

    pub fn fail_decode(self) -> Self {
        self.responses
            .borrow_mut()
            .push_back(Err(TransportCause::Decode("expected value".into())));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.path.clone()).collect()
    }

    fn answer(&self, call: Call) -> Result<Value, TransportError> {
        let (method, path) = (call.method, call.path.clone());
        self.calls.borrow_mut().push(call);
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(cause)) => Err(TransportError::new(method, path, cause)),
            None => panic!("unexpected {method} /{path}: no stubbed response left"),
        }
    }
}

impl Transport for StubTransport {
    fn get(&self, version: ApiVersion, path: &str) -> Result<Value, TransportError> {
        self.answer(Call {
            method: Method::Get,
            version,
            path: path.to_string(),
            body: None,
        })
    }

    fn post(&self, version: ApiVersion, path: &str, body: &Value) -> Result<Value, TransportError> {
        self.answer(Call {
            method: Method::Post,
            version,
            path: path.to_string(),
            body: Some(body.clone()),
        })
    }
}

/// Collects views instead of printing them.
#[derive(Default)]
pub struct Recorder {
    pub views: Vec<View>,
    pub waits: usize,
}

impl Render for Recorder {
    fn emit(&mut self, view: View) {
        self.views.push(view);
    }

    fn wait_started(&mut self, _label: &str) {
        self.waits += 1;
    }
}
