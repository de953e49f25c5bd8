//! Scripted transport and fixtures shared by unit tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde_json::Value;

use crate::config::ClientConfig;
use crate::http::{HttpRequest, HttpResponse, Transport};

/// Replays canned outcomes in order and records every request it sees.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: RefCell<VecDeque<Result<HttpResponse, String>>>,
    seen: RefCell<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn with(script: Vec<Result<HttpResponse, String>>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        self.seen.borrow_mut().push(request.clone());
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response left".to_string()))
    }
}

pub fn basic_config() -> ClientConfig {
    ClientConfig::builder("https://tpm.example.com")
        .username("USER")
        .password("PASS")
        .build()
        .unwrap()
}

pub fn key_config() -> ClientConfig {
    ClientConfig::builder("https://tpm.example.com")
        .private_key("private_secret")
        .public_key("public_secret")
        .build()
        .unwrap()
}

pub fn json_response(status: u16, body: Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body: body.to_string(),
    }
}

pub fn status_response(status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        headers: Vec::new(),
        body: body.to_string(),
    }
}
