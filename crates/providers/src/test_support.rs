//! Local axum server for exercising the HTTP clients without a network.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::IntoResponse;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A request as the server saw it.
pub struct Captured {
    /// `METHOD /path`.
    pub request_line: String,
    /// One `name: value` per line, lowercased.
    pub headers: String,
    pub body: serde_json::Value,
}

struct Canned {
    status: StatusCode,
    body: String,
    requests: mpsc::UnboundedSender<Captured>,
}

async fn answer(
    State(canned): State<Arc<Canned>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let headers = headers
        .iter()
        .map(|(name, value)| format!("{name}: {}", value.to_str().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("\n")
        .to_ascii_lowercase();
    let _ = canned.requests.send(Captured {
        request_line: format!("{method} {}", uri.path()),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    });
    (
        canned.status,
        [(header::CONTENT_TYPE, "application/json")],
        canned.body.clone(),
    )
}

/// Answer every request with `status` and a JSON `body`. Returns the base
/// URL and a handle resolving to the first captured request.
pub async fn serve_once(status: u16, body: &str) -> (String, JoinHandle<Captured>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let canned = Arc::new(Canned {
        status: StatusCode::from_u16(status).unwrap(),
        body: body.to_string(),
        requests: tx,
    });
    let app = Router::new().fallback(answer).with_state(canned);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });

    let handle = tokio::spawn(async move { rx.recv().await.unwrap() });
    (url, handle)
}
