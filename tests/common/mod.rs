//! Scripted transport shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use monkdb::{
    Client, ClientOptions, Connection, Endpoint, MonkError, MonkResult, Request, Response,
    Transport,
};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the transport does for one call.
pub enum Reply {
    Json(u16, JsonValue),
    Raw(u16, &'static str),
    /// Transport-level failure, e.g. connection refused.
    Fail(&'static str),
    /// Never completes.
    Hang,
}

/// Plays back replies in order and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<(String, Request)>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Endpoint URLs in call order.
    pub fn endpoints(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.calls.lock().unwrap().iter().map(|(_, r)| r.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, endpoint: &Endpoint, request: Request) -> MonkResult<Response> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.url().to_string(), request));
        let reply = self.script.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Json(status, body)) => Ok(Response::json(status, &body)),
            Some(Reply::Raw(status, body)) => Ok(Response::new(status, body)),
            Some(Reply::Fail(message)) => Err(MonkError::connection(message)),
            Some(Reply::Hang) => std::future::pending().await,
            None => Err(MonkError::connection("script exhausted")),
        }
    }
}

/// Options with the default backoff of 100ms doubling per attempt.
pub fn options(servers: &[&str]) -> ClientOptions {
    ClientOptions::new(servers.iter().copied())
        .retries(3)
        .backoff(Duration::from_millis(100), 2.0)
        .retry_interval(Duration::from_secs(30))
}

pub fn client(servers: &[&str], transport: Arc<ScriptedTransport>) -> Arc<Client> {
    Arc::new(Client::with_transport(&options(servers), transport).unwrap())
}

pub fn connection(servers: &[&str], transport: Arc<ScriptedTransport>) -> Connection {
    Connection::new(client(servers, transport))
}
