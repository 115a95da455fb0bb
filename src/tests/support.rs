//! In-process stand-in for the document-chat backend.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use crate::client::DocChatClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedChunk {
    pub filename: Option<String>,
    pub index: u64,
    pub total: u64,
    pub len: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    Chunk(RecordedChunk),
    Complete(Value),
    Chat(Value),
    Summary,
    Review,
}

#[derive(Clone)]
pub struct MockConfig {
    /// Chunk index that gets rejected, with the status and body to reject it with.
    pub fail_chunk: Option<(u64, StatusCode, Value)>,
    pub temp_id_for: fn(u64) -> Option<String>,
    pub chunk_delay: Option<Duration>,
    /// Answer `/upload` with a 200 HTML page, like a misconfigured proxy.
    pub html_chunk_replies: bool,
    /// Same for `/upload/complete`.
    pub html_complete_replies: bool,
    pub complete: (StatusCode, Value),
    pub chat: (StatusCode, Value),
    pub summary: (StatusCode, Value),
    pub review: (StatusCode, Value),
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            fail_chunk: None,
            temp_id_for: |index| Some(format!("tmp-{index}")),
            chunk_delay: None,
            html_chunk_replies: false,
            html_complete_replies: false,
            complete: (
                StatusCode::OK,
                json!({"message": "File uploaded and processed", "status": "success"}),
            ),
            chat: (StatusCode::OK, json!({"response": "It is about Rust."})),
            summary: (
                StatusCode::OK,
                json!({"summary": "# Rust\n## Ownership\n- Borrowing\n- Moves\n## Traits"}),
            ),
            review: (StatusCode::OK, json!({"reviews": ["do X", "do Y"]})),
        }
    }
}

#[derive(Clone)]
pub struct MockBackend {
    requests: Arc<Mutex<Vec<Recorded>>>,
    config: Arc<MockConfig>,
}

impl MockBackend {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn chunks(&self) -> Vec<RecordedChunk> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Chunk(chunk) => Some(chunk),
                _ => None,
            })
            .collect()
    }

    pub fn completions(&self) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter_map(|r| match r {
                Recorded::Complete(body) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn record(&self, request: Recorded) {
        self.requests.lock().unwrap().push(request);
    }
}

fn html_page() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html")],
        "<html>proxy page</html>",
    )
        .into_response()
}

async fn handle_upload(
    State(backend): State<MockBackend>,
    mut multipart: Multipart,
) -> Response {
    let mut chunk = RecordedChunk {
        filename: None,
        index: 0,
        total: 0,
        len: 0,
    };

    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                chunk.filename = field.file_name().map(str::to_string);
                chunk.len = field.bytes().await.unwrap().len();
            }
            "chunk" => chunk.index = field.text().await.unwrap().parse().unwrap(),
            "chunks" => chunk.total = field.text().await.unwrap().parse().unwrap(),
            _ => {}
        }
    }

    let index = chunk.index;
    backend.record(Recorded::Chunk(chunk));

    if let Some(delay) = backend.config.chunk_delay {
        tokio::time::sleep(delay).await;
    }

    if let Some((fail_index, status, body)) = &backend.config.fail_chunk
        && *fail_index == index
    {
        return (*status, Json(body.clone())).into_response();
    }
    if backend.config.html_chunk_replies {
        return html_page();
    }

    let body = match (backend.config.temp_id_for)(index) {
        Some(temp_id) => json!({"message": format!("chunk {index} ok"), "temp_id": temp_id}),
        None => json!({"message": format!("chunk {index} ok")}),
    };
    (StatusCode::OK, Json(body)).into_response()
}

async fn handle_complete(
    State(backend): State<MockBackend>,
    Json(body): Json<Value>,
) -> Response {
    backend.record(Recorded::Complete(body));
    if backend.config.html_complete_replies {
        return html_page();
    }
    let (status, body) = backend.config.complete.clone();
    (status, Json(body)).into_response()
}

async fn handle_chat(
    State(backend): State<MockBackend>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    backend.record(Recorded::Chat(body));
    let (status, body) = backend.config.chat.clone();
    (status, Json(body))
}

async fn handle_summary(State(backend): State<MockBackend>) -> (StatusCode, Json<Value>) {
    backend.record(Recorded::Summary);
    let (status, body) = backend.config.summary.clone();
    (status, Json(body))
}

async fn handle_review(State(backend): State<MockBackend>) -> (StatusCode, Json<Value>) {
    backend.record(Recorded::Review);
    let (status, body) = backend.config.review.clone();
    (status, Json(body))
}

pub async fn spawn_backend(config: MockConfig) -> (DocChatClient, MockBackend) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let backend = MockBackend {
        requests: Arc::new(Mutex::new(Vec::new())),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/upload", post(handle_upload))
        .route("/upload/complete", post(handle_complete))
        .route("/chat", post(handle_chat))
        .route("/summary", post(handle_summary))
        .route("/review", post(handle_review))
        .layer(DefaultBodyLimit::disable())
        .with_state(backend.clone());

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let url = Url::parse(&format!("http://{addr}")).expect("server url");
    (DocChatClient::new(url, None), backend)
}

/// Writes `size` bytes of patterned data to `dir/name`.
pub fn write_file(dir: &tempfile::TempDir, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).expect("write test file");
    path
}
