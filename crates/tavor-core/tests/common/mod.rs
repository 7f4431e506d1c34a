//! Shared fixtures for the HTTP-level tests.

#![allow(dead_code)]

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tavor_core::{BoxHandle, Client, ClientConfig};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const API_KEY: &str = "sk-test";
pub const BOX_ID: &str = "box-1";

/// Client pointed at `server` with short timings.
pub fn client_for(server: &MockServer) -> Client {
    client_for_uri(&server.uri())
}

/// Client pointed at an arbitrary service root with short timings.
pub fn client_for_uri(uri: &str) -> Client {
    let config = ClientConfig::builder()
        .api_key(API_KEY)
        .base_url(uri)
        .box_ready_timeout(Duration::from_secs(2))
        .command_timeout(Duration::from_secs(2))
        .poll_interval(Duration::from_millis(10))
        .build()
        .unwrap();
    Client::new(config).unwrap()
}

pub async fn setup() -> (MockServer, Client) {
    let server = MockServer::start().await;
    let client = client_for(&server);
    (server, client)
}

/// A handle for [`BOX_ID`] in state `running`, fetched through the client.
pub async fn running_box(server: &MockServer, client: &Client) -> BoxHandle {
    let guard = Mock::given(method("GET"))
        .and(path(format!("/api/v2/boxes/{BOX_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": box_json(BOX_ID, "running")
        })))
        .expect(1)
        .mount_as_scoped(server)
        .await;
    let handle = client.get_box(BOX_ID).await.unwrap();
    drop(guard);
    handle
}

pub fn box_json(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "status": status,
        "metadata": {"env": "test"},
        "hostname": format!("{id}.tavor.app"),
        "created_at": "2025-01-01T00:00:00Z"
    })
}

pub fn command_json(id: &str, status: &str, stdout: &str, exit_code: Option<i32>) -> Value {
    let mut v = json!({
        "id": id,
        "box_id": BOX_ID,
        "cmd": "test",
        "status": status,
        "stdout": stdout,
        "stderr": "",
    });
    if let Some(code) = exit_code {
        v["exit_code"] = json!(code);
    }
    v
}

pub fn snapshot_json(id: &str, status: &str) -> Value {
    json!({
        "id": id,
        "box_id": BOX_ID,
        "snapshot_type": "disk",
        "status": status,
        "created_at": "2025-01-01T00:00:00Z",
        "orchestrator_id": "orch-1"
    })
}

/// Render `(event, payload)` pairs as an event-stream body.
pub fn sse_body(events: &[(&str, Value)]) -> String {
    events
        .iter()
        .map(|(name, data)| format!("event: {name}\ndata: {data}\n\n"))
        .collect()
}

pub fn sse_response(events: &[(&str, Value)]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(sse_body(events), "text/event-stream")
}

/// Replies with each template in turn, repeating the last one forever.
pub struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    pub fn new(responses: Vec<ResponseTemplate>) -> Self {
        assert!(!responses.is_empty());
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }

    /// JSON bodies wrapped in `{"data": ...}`.
    pub fn data(bodies: Vec<Value>) -> Self {
        Self::new(
            bodies
                .into_iter()
                .map(|b| ResponseTemplate::new(200).set_body_json(json!({ "data": b })))
                .collect(),
        )
    }

    /// Bare JSON bodies.
    pub fn bare(bodies: Vec<Value>) -> Self {
        Self::new(
            bodies
                .into_iter()
                .map(|b| ResponseTemplate::new(200).set_body_json(b))
                .collect(),
        )
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let i = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses[i.min(self.responses.len() - 1)].clone()
    }
}

/// Requests received on `path_str`, in order.
pub async fn requests_to(server: &MockServer, path_str: &str) -> Vec<Request> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.url.path() == path_str)
        .collect()
}

pub fn json_body(request: &Request) -> Value {
    serde_json::from_slice(&request.body).unwrap()
}

/// How [`raw_stream_server`] ends the event-stream body after the events.
#[derive(Debug, Clone, Copy)]
pub enum StreamEnd {
    /// Drop the connection without the terminating zero-length chunk.
    Truncate,
    /// Keep the connection open without sending anything more.
    Stall,
}

/// A bare HTTP/1.1 server for failure modes wiremock cannot produce.
///
/// `GET` requests get [`box_json`] for a running box; any other request gets
/// a chunked `text/event-stream` response carrying `events` in one chunk,
/// finished according to `end`. Returns the service root.
pub async fn raw_stream_server(events: Vec<u8>, end: StreamEnd) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_raw(socket, events.clone(), end));
        }
    });
    format!("http://{addr}")
}

async fn serve_raw(socket: TcpStream, events: Vec<u8>, end: StreamEnd) {
    let mut reader = BufReader::new(socket);
    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await.unwrap_or(0) == 0 {
            return;
        }
        let mut content_length = 0usize;
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).await.unwrap_or(0) == 0 {
                return;
            }
            let header = header.trim_end();
            if header.is_empty() {
                break;
            }
            if let Some((name, value)) = header.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().unwrap_or(0);
                }
            }
        }
        let mut body = vec![0u8; content_length];
        if reader.read_exact(&mut body).await.is_err() {
            return;
        }

        let socket = reader.get_mut();
        if request_line.starts_with("GET ") {
            let body = json!({ "data": box_json(BOX_ID, "running") }).to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            if socket.write_all(response.as_bytes()).await.is_err() {
                return;
            }
            continue;
        }

        let mut response = b"HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        response.extend_from_slice(format!("{:x}\r\n", events.len()).as_bytes());
        response.extend_from_slice(&events);
        response.extend_from_slice(b"\r\n");
        if socket.write_all(&response).await.is_err() {
            return;
        }
        let _ = socket.flush().await;

        match end {
            StreamEnd::Truncate => return,
            StreamEnd::Stall => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return;
            }
        }
    }
}

/// A handle for [`BOX_ID`] on a [`raw_stream_server`].
pub async fn raw_running_box(events: Vec<u8>, end: StreamEnd) -> BoxHandle {
    let uri = raw_stream_server(events, end).await;
    client_for_uri(&uri).get_box(BOX_ID).await.unwrap()
}
