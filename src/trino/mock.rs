//! Scripted Trino transport for tests.
//!
//! Replays a fixed sequence of responses: the first for `submit`, the rest for
//! successive `fetch` calls. Requests are recorded for assertions.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::client::{Session, TrinoTransport};
use super::protocol::{QueryResults, TrinoError};

#[derive(Debug)]
enum Step {
    Page(Value),
    Fail(TrinoError),
    Hang,
}

#[derive(Debug, Default)]
struct Recorded {
    submitted: Vec<(String, String)>,
    fetched: Vec<String>,
    cancelled: Vec<String>,
}

/// A transport that replays scripted pages.
#[derive(Debug, Default)]
pub struct MockTransport {
    steps: Mutex<VecDeque<Step>>,
    recorded: Mutex<Recorded>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a response page, given as protocol JSON.
    pub fn then(self, page: Value) -> Self {
        self.push(Step::Page(page))
    }

    /// Appends a failing response.
    pub fn then_fail(self, error: TrinoError) -> Self {
        self.push(Step::Fail(error))
    }

    /// Appends a response that never arrives.
    pub fn then_hang(self) -> Self {
        self.push(Step::Hang)
    }

    fn push(self, step: Step) -> Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    /// `(user, sql)` of every submitted statement.
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.recorded.lock().unwrap().submitted.clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.recorded.lock().unwrap().fetched.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.recorded.lock().unwrap().cancelled.clone()
    }

    async fn next_step(&self) -> Result<QueryResults, TrinoError> {
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Page(page)) => {
                serde_json::from_value(page).map_err(|e| TrinoError::Protocol(e.to_string()))
            }
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Hang) => futures::future::pending().await,
            None => Err(TrinoError::Protocol("script exhausted".to_string())),
        }
    }
}

#[async_trait]
impl TrinoTransport for MockTransport {
    async fn submit(&self, session: &Session, sql: &str) -> Result<QueryResults, TrinoError> {
        self.recorded
            .lock()
            .unwrap()
            .submitted
            .push((session.user.clone(), sql.to_string()));
        self.next_step().await
    }

    async fn fetch(&self, _session: &Session, next_uri: &str) -> Result<QueryResults, TrinoError> {
        self.recorded.lock().unwrap().fetched.push(next_uri.to_string());
        self.next_step().await
    }

    async fn cancel(&self, _session: &Session, next_uri: &str) -> Result<(), TrinoError> {
        self.recorded
            .lock()
            .unwrap()
            .cancelled
            .push(next_uri.to_string());
        Ok(())
    }
}
