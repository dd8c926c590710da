//! Stateful stand-in for the Automation Cloud API.
//!
//! A single routing responder serves every endpoint from a shared
//! [`MockState`]. Tests script the job by pushing events and outputs, or by
//! installing hooks that run when a job is created or an input is submitted.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use automation_cloud::{Auth, ClientConfig};
use serde_json::{Value, json};
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const SECRET_KEY: &str = "some-secret-key";
/// `Basic base64("some-secret-key:")`.
pub const SECRET_KEY_AUTH: &str = "Basic c29tZS1zZWNyZXQta2V5Og==";
pub const OAUTH_TOKEN: &str = "oauth-access-token";

type StateHook = Arc<dyn Fn(&mut MockState) + Send + Sync>;
type InputHook = Arc<dyn Fn(&mut MockState, &str, &Value) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

struct InjectedFailure {
    method: String,
    path: String,
    remaining: usize,
    status: u16,
    body: Option<Value>,
}

#[derive(Default)]
pub struct MockState {
    pub job: Option<Value>,
    pub events: Vec<Value>,
    pub outputs: HashMap<String, Value>,
    pub inputs: Vec<(String, Value)>,
    pub previous_outputs: Vec<Value>,
    pub tds: Option<Value>,
    pub requests: Vec<RecordedRequest>,
    failures: Vec<InjectedFailure>,
    on_create_job: Option<StateHook>,
    on_input: Option<InputHook>,
}

impl MockState {
    pub fn job_id(&self) -> Option<String> {
        self.job
            .as_ref()
            .and_then(|j| j["id"].as_str())
            .map(String::from)
    }

    pub fn push_event(&mut self, name: &str, key: Option<&str>) {
        let mut event = json!({
            "id": format!("event-{}", self.events.len()),
            "name": name,
            "createdAt": 1_700_000_000_000u64 + self.events.len() as u64,
        });
        if let Some(key) = key {
            event["key"] = json!(key);
        }
        self.events.push(event);
    }

    fn set_state(&mut self, state: &str) {
        if let Some(job) = self.job.as_mut() {
            job["state"] = json!(state);
        }
    }

    pub fn add_output(&mut self, key: &str, data: Value) {
        self.outputs.insert(key.to_string(), data);
        self.push_event("createOutput", Some(key));
    }

    pub fn request_input(&mut self, key: &str) {
        self.set_state("awaitingInput");
        if let Some(job) = self.job.as_mut() {
            job["awaitingInputKey"] = json!(key);
        }
        self.push_event("awaitingInput", Some(key));
    }

    pub fn processing(&mut self) {
        self.set_state("processing");
        self.push_event("processing", None);
    }

    pub fn success(&mut self) {
        self.set_state("success");
        self.push_event("success", None);
    }

    pub fn fail(&mut self, category: &str, code: &str, message: &str) {
        self.set_state("fail");
        if let Some(job) = self.job.as_mut() {
            job["error"] = json!({"category": category, "code": code, "message": message});
        }
        self.push_event("fail", None);
    }

    pub fn input(&self, key: &str) -> Option<Value> {
        self.inputs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, data)| data.clone())
    }
}

struct Router {
    state: Arc<Mutex<MockState>>,
}

fn json_response(status: u16, body: Value) -> ResponseTemplate {
    ResponseTemplate::new(status).set_body_json(body)
}

fn not_found(message: &str) -> ResponseTemplate {
    json_response(404, json!({"name": "NotFoundError", "message": message}))
}

impl Router {
    fn route(state: &mut MockState, method: &str, segments: &[&str], request: &Request, body: Option<Value>) -> ResponseTemplate {
        let body = body.unwrap_or(Value::Null);
        match (method, segments) {
            ("POST", ["auth", "token"]) => json_response(
                200,
                json!({"access_token": OAUTH_TOKEN, "token_type": "bearer", "expires_in": 3600}),
            ),
            ("POST", ["jobs"]) => {
                let id = uuid::Uuid::new_v4().to_string();
                state.job = Some(json!({
                    "id": id,
                    "serviceId": body["serviceId"],
                    "category": body["category"],
                    "state": "processing",
                }));
                state.events.clear();
                if let Some(input) = body["input"].as_object() {
                    for (key, data) in input {
                        state.inputs.push((key.clone(), data.clone()));
                    }
                }
                if let Some(hook) = state.on_create_job.clone() {
                    hook(state);
                }
                json_response(200, state.job.clone().unwrap_or_default())
            }
            (_, ["jobs", id, ..]) if state.job_id().as_deref() != Some(*id) => {
                not_found("Job not found")
            }
            ("GET", ["jobs", _]) => json_response(200, state.job.clone().unwrap_or_default()),
            ("GET", ["jobs", id, "end-user"]) => {
                json_response(200, json!({"token": format!("job-token-{id}")}))
            }
            ("GET", ["jobs", _, "events"]) => {
                let offset = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "offset")
                    .and_then(|(_, v)| v.parse::<usize>().ok())
                    .unwrap_or(0);
                let data: Vec<Value> = state.events.iter().skip(offset).cloned().collect();
                json_response(200, json!({"data": data}))
            }
            ("GET", ["jobs", id, "outputs", key]) => match state.outputs.get(*key) {
                Some(data) => json_response(200, json!({"jobId": id, "key": key, "data": data})),
                None => not_found("Output not found"),
            },
            ("POST", ["jobs", _, "inputs"]) => {
                let key = body["key"].as_str().unwrap_or_default().to_string();
                let data = body["data"].clone();
                state.inputs.push((key.clone(), data.clone()));
                if let Some(hook) = state.on_input.clone() {
                    hook(state, &key, &data);
                }
                json_response(200, json!({"key": key}))
            }
            ("POST", ["jobs", _, "cancel"]) => {
                state.fail("client", "JobCancelled", "Job cancelled by client");
                json_response(200, json!({}))
            }
            ("POST", ["services", _, "previous-job-outputs"]) => {
                let key = request
                    .url
                    .query_pairs()
                    .find(|(k, _)| k == "key")
                    .map(|(_, v)| v.into_owned());
                let data: Vec<Value> = state
                    .previous_outputs
                    .iter()
                    .filter(|o| key.as_deref().is_none_or(|k| o["key"] == k))
                    .cloned()
                    .collect();
                json_response(200, json!({"data": data}))
            }
            ("GET", ["3d-secure", id]) => match &state.tds {
                Some(tds) if tds["id"] == *id => json_response(200, tds.clone()),
                _ => not_found("3-D Secure challenge not found"),
            },
            _ => not_found("Route not found"),
        }
    }
}

impl Respond for Router {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let mut state = self.state.lock().unwrap();
        let method = request.method.as_str().to_string();
        let path = request.url.path().to_string();
        let body = serde_json::from_slice::<Value>(&request.body).ok();
        state.requests.push(RecordedRequest {
            method: method.clone(),
            path: path.clone(),
            query: request.url.query().map(String::from),
            authorization: request
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            body: body.clone(),
        });

        if let Some(failure) = state
            .failures
            .iter_mut()
            .find(|f| f.remaining > 0 && f.method == method && path.ends_with(&f.path))
        {
            failure.remaining -= 1;
            return match &failure.body {
                Some(body) => json_response(failure.status, body.clone()),
                None => ResponseTemplate::new(failure.status).set_body_string("upstream error"),
            };
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        Router::route(&mut state, &method, &segments, request, body)
    }
}

pub struct AcMock {
    pub server: MockServer,
    state: Arc<Mutex<MockState>>,
}

impl AcMock {
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let state = Arc::new(Mutex::new(MockState::default()));
        Mock::given(any())
            .respond_with(Router {
                state: state.clone(),
            })
            .mount(&server)
            .await;
        Self { server, state }
    }

    /// Client configuration pointing at this server with fast polling and retries.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new("service-1")
            .with_api_url(self.server.uri())
            .with_api_token_url(format!("{}/auth/token", self.server.uri()))
            .with_auth(Auth::shared_secret(SECRET_KEY))
            .with_poll_interval(Duration::from_millis(10))
            .with_retry(2, Duration::from_millis(5))
    }

    pub fn with_state<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        f(&mut self.state.lock().unwrap())
    }

    pub fn on_create_job(&self, hook: impl Fn(&mut MockState) + Send + Sync + 'static) {
        self.with_state(|s| s.on_create_job = Some(Arc::new(hook)));
    }

    pub fn on_input(&self, hook: impl Fn(&mut MockState, &str, &Value) + Send + Sync + 'static) {
        self.with_state(|s| s.on_input = Some(Arc::new(hook)));
    }

    /// Answers the next `times` matching requests with `status`.
    ///
    /// `path` matches the end of the request path; `body` defaults to plain text.
    pub fn fail_requests(&self, method: &str, path: &str, times: usize, status: u16, body: Option<Value>) {
        self.with_state(|s| {
            s.failures.push(InjectedFailure {
                method: method.to_string(),
                path: path.to_string(),
                remaining: times,
                status,
                body,
            })
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.with_state(|s| s.requests.clone())
    }

    pub fn count_requests(&self, method: &str, path_suffix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path.ends_with(path_suffix))
            .count()
    }

    pub fn input(&self, key: &str) -> Option<Value> {
        self.with_state(|s| s.input(key))
    }
}
