//! In-process Key-Value API server for integration tests
//!
//! Implements the subset of server behaviour the client relies on: versioned
//! documents, optimistic concurrency on PATCH, the history log with
//! pagination, batches, and the 100KB payload limit.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Bodies above this size are rejected with 413
pub const MAX_BODY_BYTES: usize = 100 * 1024;

const MAX_HISTORY_LIMIT: usize = 100;

struct Entry {
    data: Value,
    version: u64,
    updated_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

struct Event {
    token: String,
    seq: u64,
    created_at: DateTime<Utc>,
    classified_type: Option<String>,
    numeric_value: Option<f64>,
    text_value: Option<String>,
    payload: Value,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    events: Vec<Event>,
    next_seq: u64,
    generated: u64,
    requests: Vec<RecordedRequest>,
}

/// What the server saw for one request
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub token: Option<String>,
    pub version: hyper::Version,
}

type Shared = Arc<Mutex<State>>;

/// Running fake server. Stops when dropped.
pub struct FakeServer {
    addr: SocketAddr,
    scheme: &'static str,
    state: Shared,
    task: JoinHandle<()>,
}

impl FakeServer {
    /// Plain HTTP server on an ephemeral port
    pub async fn start() -> FakeServer {
        Self::spawn(None).await
    }

    /// HTTPS server using the given rustls config
    pub async fn start_tls(config: Arc<rustls::ServerConfig>) -> FakeServer {
        Self::spawn(Some(tokio_rustls::TlsAcceptor::from(config))).await
    }

    async fn spawn(acceptor: Option<tokio_rustls::TlsAcceptor>) -> FakeServer {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().expect("local addr");
        let state: Shared = Arc::new(Mutex::new(State::default()));
        let scheme = if acceptor.is_some() { "https" } else { "http" };

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    continue;
                };
                let state = task_state.clone();
                let acceptor = acceptor.clone();

                tokio::spawn(async move {
                    let service = service_fn(move |req| handle(state.clone(), req));
                    let builder = auto::Builder::new(TokioExecutor::new());
                    match acceptor {
                        Some(acceptor) => {
                            // Handshake failures are expected in negative TLS tests
                            let Ok(tls_stream) = acceptor.accept(stream).await else {
                                return;
                            };
                            let _ = builder.serve_connection(TokioIo::new(tls_stream), service).await;
                        }
                        None => {
                            let _ = builder.serve_connection(TokioIo::new(stream), service).await;
                        }
                    }
                });
            }
        });

        FakeServer {
            addr,
            scheme,
            state,
            task,
        }
    }

    /// `http://127.0.0.1:<port>` or `https://127.0.0.1:<port>`
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.addr)
    }

    /// Every request served so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Current version stored for `token`
    pub fn version_of(&self, token: &str) -> Option<u64> {
        self.state.lock().unwrap().entries.get(token).map(|e| e.version)
    }
}

impl Drop for FakeServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Listener that accepts connections and never answers.
/// Returns the base URL; connections stay open until the task is aborted.
pub async fn start_silent() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind silent listener");
    let addr = listener.local_addr().expect("local addr");
    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    (format!("http://{}", addr), task)
}

/// Address that refuses connections
pub async fn refused_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{}", addr)
}

fn now() -> DateTime<Utc> {
    Utc::now()
}

fn ts(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn reply(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("valid response")
}

fn fail(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    reply(status, json!({"success": false, "error": message}))
}

async fn handle(state: Shared, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let token = parts
        .headers
        .get("x-kv-token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let path = parts.uri.path().to_string();
    let query = parts.uri.query().unwrap_or("").to_string();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return Ok(fail(StatusCode::BAD_REQUEST, "Unreadable body")),
    };

    let mut state = state.lock().unwrap();
    state.requests.push(RecordedRequest {
        method: parts.method.clone(),
        path: path.clone(),
        token: token.clone(),
        version: parts.version,
    });

    if body.len() > MAX_BODY_BYTES {
        return Ok(fail(StatusCode::PAYLOAD_TOO_LARGE, "Payload exceeds 100KB limit"));
    }

    let json: Value = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(_) => return Ok(fail(StatusCode::BAD_REQUEST, "Invalid JSON")),
        }
    };

    let response = match (&parts.method, path.as_str()) {
        (&Method::POST, "/api/generate") => {
            state.generated += 1;
            reply(
                StatusCode::OK,
                json!({"success": true, "token": format!("test{}-amber-brook-cedar-delta", state.generated)}),
            )
        }
        (&Method::POST, "/api/batch") => batch(&mut state, &json),
        (_, "/api/store" | "/api/retrieve" | "/api/delete" | "/api/history") => {
            let Some(token) = token.filter(|t| !t.is_empty()) else {
                return Ok(fail(StatusCode::UNAUTHORIZED, "Missing X-KV-Token header"));
            };
            match (&parts.method, path.as_str()) {
                (&Method::POST, "/api/store") => {
                    let (status, body) = store(&mut state, &token, &json);
                    reply(status, body)
                }
                (&Method::PATCH, "/api/store") => {
                    let (status, body) = patch(&mut state, &token, &json);
                    reply(status, body)
                }
                (&Method::GET, "/api/retrieve") => {
                    let (status, body) = retrieve(&state, &token);
                    reply(status, body)
                }
                (&Method::DELETE, "/api/delete") => {
                    let (status, body) = delete(&mut state, &token);
                    reply(status, body)
                }
                (&Method::GET, "/api/history") => history(&state, &token, &query),
                _ => fail(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
            }
        }
        _ => fail(StatusCode::NOT_FOUND, "Not found"),
    };

    Ok(response)
}

fn ttl_of(json: &Value) -> Option<DateTime<Utc>> {
    json.get("ttl")
        .and_then(Value::as_i64)
        .map(|secs| now() + chrono::Duration::seconds(secs))
}

fn record_event(state: &mut State, token: &str, payload: &Value) {
    state.next_seq += 1;
    let (classified_type, numeric_value, text_value) = classify(payload);
    let event = Event {
        token: token.to_string(),
        seq: state.next_seq,
        created_at: now(),
        classified_type,
        numeric_value,
        text_value,
        payload: payload.clone(),
    };
    state.events.push(event);
}

/// First top-level field decides the type: numbers are readings, strings are text
fn classify(payload: &Value) -> (Option<String>, Option<f64>, Option<String>) {
    let Some((key, value)) = payload.as_object().and_then(|o| o.iter().next()) else {
        return (None, None, None);
    };
    match value {
        Value::Number(n) => (Some(key.clone()), n.as_f64(), None),
        Value::String(s) => (Some(key.clone()), None, Some(s.clone())),
        _ => (Some(key.clone()), None, None),
    }
}

fn store(state: &mut State, token: &str, json: &Value) -> (StatusCode, Value) {
    let Some(data) = json.get("data") else {
        return (
            StatusCode::BAD_REQUEST,
            json!({"success": false, "error": "Validation failed", "details": ["data is required"]}),
        );
    };

    let version = state.entries.get(token).map_or(0, |e| e.version) + 1;
    let entry = Entry {
        data: data.clone(),
        version,
        updated_at: now(),
        expires_at: ttl_of(json),
    };
    let body = json!({
        "success": true,
        "message": "Data stored successfully",
        "size": data.to_string().len(),
        "tier": "free",
        "version": version,
        "updated_at": ts(&entry.updated_at),
        "expires_at": entry.expires_at.as_ref().map(ts),
    });
    state.entries.insert(token.to_string(), entry);
    record_event(state, token, data);
    (StatusCode::OK, body)
}

fn retrieve(state: &State, token: &str) -> (StatusCode, Value) {
    match state.entries.get(token) {
        Some(entry) => (
            StatusCode::OK,
            json!({
                "success": true,
                "data": entry.data,
                "version": entry.version,
                "updated_at": ts(&entry.updated_at),
                "expires_at": entry.expires_at.as_ref().map(ts),
            }),
        ),
        None => (
            StatusCode::NOT_FOUND,
            json!({"success": false, "error": "Token not found"}),
        ),
    }
}

fn delete(state: &mut State, token: &str) -> (StatusCode, Value) {
    match state.entries.remove(token) {
        Some(_) => (
            StatusCode::OK,
            json!({"success": true, "message": "Data deleted successfully"}),
        ),
        None => (
            StatusCode::NOT_FOUND,
            json!({"success": false, "error": "Token not found"}),
        ),
    }
}

fn patch(state: &mut State, token: &str, json: &Value) -> (StatusCode, Value) {
    let Some(expected) = json.get("version").and_then(Value::as_u64) else {
        return (
            StatusCode::BAD_REQUEST,
            json!({"success": false, "error": "version is required"}),
        );
    };
    let Some(entry) = state.entries.get_mut(token) else {
        return (
            StatusCode::NOT_FOUND,
            json!({"success": false, "error": "Token not found"}),
        );
    };
    if entry.version != expected {
        return (
            StatusCode::CONFLICT,
            json!({"success": false, "error": "Version conflict", "current_version": entry.version}),
        );
    }

    let ops = json.get("patch").cloned().unwrap_or(Value::Null);
    if let Some(set) = ops.get("set").and_then(Value::as_object) {
        for (path, value) in set {
            set_path(&mut entry.data, path, value.clone());
        }
    }
    if let Some(remove) = ops.get("remove").and_then(Value::as_array) {
        for path in remove.iter().filter_map(Value::as_str) {
            remove_path(&mut entry.data, path);
        }
    }
    entry.version += 1;
    entry.updated_at = now();
    if let Some(expires_at) = ttl_of(json) {
        entry.expires_at = Some(expires_at);
    }

    let body = json!({
        "success": true,
        "version": entry.version,
        "data": entry.data,
        "updated_at": ts(&entry.updated_at),
        "expires_at": entry.expires_at.as_ref().map(ts),
        "size": entry.data.to_string().len(),
        "tier": "free",
    });
    let data = entry.data.clone();
    record_event(state, token, &data);
    (StatusCode::OK, body)
}

fn set_path(root: &mut Value, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else { return };
    let mut node = root;
    for segment in segments {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = node
            .as_object_mut()
            .expect("object")
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut().expect("object").insert(last.to_string(), value);
}

fn remove_path(root: &mut Value, path: &str) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else { return };
    let mut node = root;
    for segment in segments {
        match node.get_mut(segment) {
            Some(next) => node = next,
            None => return,
        }
    }
    if let Some(object) = node.as_object_mut() {
        object.remove(last);
    }
}

fn history(state: &State, token: &str, query: &str) -> Response<Full<Bytes>> {
    let mut limit = 50usize;
    let mut before: Option<u64> = None;
    let mut since: Option<String> = None;
    let mut kind: Option<String> = None;
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "limit" => limit = value.parse().unwrap_or(50),
            "before" => before = value.parse().ok(),
            "since" => since = Some(value.into_owned()),
            "type" => kind = Some(value.into_owned()),
            _ => {}
        }
    }
    let limit = limit.clamp(1, MAX_HISTORY_LIMIT);
    let since_time = match &since {
        Some(s) => match DateTime::parse_from_rfc3339(s) {
            Ok(t) => Some(t.with_timezone(&Utc)),
            Err(_) => return fail(StatusCode::BAD_REQUEST, "Invalid since timestamp"),
        },
        None => None,
    };

    let mut matching: Vec<&Event> = state
        .events
        .iter()
        .filter(|e| e.token == token)
        .filter(|e| before.map_or(true, |b| e.seq < b))
        .filter(|e| since_time.map_or(true, |s| e.created_at >= s))
        .filter(|e| kind.as_ref().map_or(true, |k| e.classified_type.as_ref() == Some(k)))
        .collect();
    matching.sort_by(|a, b| b.seq.cmp(&a.seq));

    let has_more = matching.len() > limit;
    let events: Vec<Value> = matching
        .into_iter()
        .take(limit)
        .map(|e| {
            json!({
                "seq": e.seq,
                "created_at": ts(&e.created_at),
                "expires_at": null,
                "classified_type": e.classified_type,
                "numeric_value": e.numeric_value,
                "text_value": e.text_value,
                "confidence": e.classified_type.as_ref().map(|_| 0.9),
                "payload": e.payload,
            })
        })
        .collect();

    reply(
        StatusCode::OK,
        json!({
            "success": true,
            "events": events,
            "pagination": {"limit": limit, "before": before, "since": since, "has_more": has_more},
        }),
    )
}

fn batch(state: &mut State, json: &Value) -> Response<Full<Bytes>> {
    let Some(operations) = json.get("operations").and_then(Value::as_array) else {
        return fail(StatusCode::BAD_REQUEST, "operations must be an array");
    };
    if operations.is_empty() || operations.len() > 100 {
        return fail(StatusCode::BAD_REQUEST, "Batch must contain 1-100 operations");
    }

    let mut results = Vec::with_capacity(operations.len());
    for op in operations {
        let action = op.get("action").and_then(Value::as_str).unwrap_or("");
        let token = op.get("token").and_then(Value::as_str).unwrap_or("").to_string();
        let (status, body) = match action {
            "store" => store(state, &token, op),
            "retrieve" => retrieve(state, &token),
            "delete" => delete(state, &token),
            "patch" => patch(state, &token, op),
            _ => (
                StatusCode::BAD_REQUEST,
                json!({"success": false, "error": "Unknown action"}),
            ),
        };
        let mut result = json!({"success": status.is_success(), "token": token, "action": action});
        if status.is_success() {
            if let Some(data) = body.get("data") {
                result["data"] = data.clone();
            }
            if let Some(version) = body.get("version") {
                result["version"] = version.clone();
            }
        } else {
            result["error"] = body.get("error").cloned().unwrap_or(Value::Null);
        }
        results.push(result);
    }

    let total = results.len();
    let succeeded = results.iter().filter(|r| r["success"] == true).count();
    let rate = format!("{:.1}%", succeeded as f64 * 100.0 / total as f64);
    reply(
        StatusCode::OK,
        json!({
            "success": true,
            "results": results,
            "summary": {"total": total, "succeeded": succeeded, "failed": total - succeeded, "successRate": rate},
        }),
    )
}
