//! Shared test fixtures.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use civicsync_client::{CivicClient, ClientConfig, StorageConfig};
use civicsync_common::{Error, Result};
use civicsync_storage::{KeyValueStore, MemoryStore};
use civicsync_transport::{Method, Transport, UploadPart};

/// How the fake backend answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Online,
    Offline,
    Status(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

/// In-memory stand-in for the REST backend.
pub struct FakeBackend {
    mode: Mutex<Mode>,
    issues: Mutex<Vec<Value>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mode: Mutex::new(Mode::Online),
            issues: Mutex::new(vec![json!({
                "id": 10,
                "title": "Broken streetlight",
                "description": "Dark corner at night",
                "category": "Electricity",
                "status": "pending",
                "upvotes": 2
            })]),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_issues(&self, issues: Vec<Value>) {
        *self.issues.lock().unwrap() = issues;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    fn check_mode(&self) -> Result<()> {
        let mode = *self.mode.lock().unwrap();
        match mode {
            Mode::Online => Ok(()),
            Mode::Offline => Err(Error::Unreachable("connection refused".to_string())),
            Mode::Status(status @ (401 | 403)) => Err(Error::AuthExpired { status }),
            Mode::Status(status) => Err(Error::Rejected {
                status,
                message: "server error".to_string(),
            }),
        }
    }

    fn respond(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        self.check_mode()?;

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method, segments.as_slice()) {
            (Method::Get, ["issues"]) => Ok(Value::Array(self.issues.lock().unwrap().clone())),
            (Method::Post, ["issues"]) => {
                let mut issue = body.unwrap_or_else(|| json!({}));
                let mut issues = self.issues.lock().unwrap();
                issue["id"] = json!(100 + issues.len());
                issue["status"] = json!("pending");
                issue["upvotes"] = json!(0);
                issues.push(issue.clone());
                Ok(issue)
            }
            (Method::Post, ["issues", id, "upvote"]) => {
                let mut issues = self.issues.lock().unwrap();
                let issue = issues
                    .iter_mut()
                    .find(|i| i["id"].to_string().trim_matches('"') == *id)
                    .ok_or_else(|| Error::Rejected {
                        status: 404,
                        message: "Issue not found".to_string(),
                    })?;
                let upvotes = issue["upvotes"].as_u64().unwrap_or(0) + 1;
                issue["upvotes"] = json!(upvotes);
                Ok(issue.clone())
            }
            (Method::Post, ["auth", "login"]) => {
                let body = body.unwrap_or_default();
                if body["password"] == "correct horse" {
                    Ok(json!({
                        "message": "Login successful",
                        "token": "token-abc",
                        "user": { "id": 7, "name": "Asha", "email": body["email"], "role": "citizen" }
                    }))
                } else {
                    Err(Error::Rejected {
                        status: 400,
                        message: "Invalid email or password".to_string(),
                    })
                }
            }
            (Method::Post, ["auth", "signup"]) => {
                let body = body.unwrap_or_default();
                Ok(json!({
                    "message": "User registered successfully",
                    "user": { "id": 8, "name": body["name"], "email": body["email"], "role": "citizen" }
                }))
            }
            _ => Err(Error::Rejected {
                status: 404,
                message: format!("no route for {} {}", method, path),
            }),
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body: body.clone(),
        });
        self.respond(method, path, body)
    }

    async fn upload(&self, path: &str, part: UploadPart) -> Result<Value> {
        self.calls.lock().unwrap().push(Call {
            method: Method::Post,
            path: path.to_string(),
            body: Some(json!({ "field": part.field, "fileName": part.file_name })),
        });
        self.check_mode()?;
        Ok(json!({ "url": format!("https://cdn.example.org/{}", part.file_name) }))
    }
}

/// A client over a fresh memory store and the given backend.
pub fn client_with(backend: Arc<FakeBackend>) -> (CivicClient, MemoryStore) {
    let store = MemoryStore::new();
    let config = ClientConfig {
        storage: StorageConfig::memory(),
        ..ClientConfig::default()
    };
    let client = CivicClient::builder(config)
        .store(Arc::new(store.clone()) as Arc<dyn KeyValueStore>)
        .transport(backend as Arc<dyn Transport>)
        .build()
        .unwrap();
    (client, store)
}
