//! Scripted transport shared by the integration tests

#![allow(dead_code)]

use jirest_core::{IssueService, Transport};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

/// One request seen by the fake
#[derive(Debug, Clone)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

/// Transport answering from per-route queues and recording every request.
///
/// A route with no queued response fails like an unreachable server.
#[derive(Default)]
pub struct FakeTransport {
    responses: RefCell<HashMap<(String, String), VecDeque<Value>>>,
    log: RefCell<Vec<Request>>,
}

impl FakeTransport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn respond(&self, method: &str, path: &str, response: Value) {
        self.responses
            .borrow_mut()
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.log.borrow().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.log
            .borrow()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn total(&self) -> usize {
        self.log.borrow().len()
    }

    /// Body of the most recent request to `method path`
    pub fn last_body(&self, method: &str, path: &str) -> Option<Value> {
        self.log
            .borrow()
            .iter()
            .rev()
            .find(|r| r.method == method && r.path == path)
            .and_then(|r| r.body.clone())
    }

    fn answer(&self, method: &'static str, path: &str, body: Option<&Value>) -> Option<Value> {
        self.log.borrow_mut().push(Request {
            method,
            path: path.to_string(),
            body: body.cloned(),
        });
        self.responses
            .borrow_mut()
            .get_mut(&(method.to_string(), path.to_string()))
            .and_then(VecDeque::pop_front)
    }
}

impl Transport for FakeTransport {
    fn get(&self, path: &str, _query: &[(&str, &str)]) -> Option<Value> {
        self.answer("GET", path, None)
    }

    fn post(&self, path: &str, body: &Value) -> Option<Value> {
        self.answer("POST", path, Some(body))
    }

    fn put(&self, path: &str, body: &Value) -> Option<Value> {
        self.answer("PUT", path, Some(body))
    }

    fn delete(&self, path: &str, _query: &[(&str, &str)]) -> bool {
        self.answer("DELETE", path, None).is_some()
    }
}

/// A service over a fresh fake transport
pub fn service() -> (Rc<FakeTransport>, IssueService) {
    let transport = FakeTransport::new();
    let service = IssueService::new(transport.clone());
    (transport, service)
}
