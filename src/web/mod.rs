//! Single-page chat UI over HTTP.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::agent::Agent;

/// One question and its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub user: String,
    pub agent: String,
}

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    agent: Agent,
    history: Arc<RwLock<Vec<Exchange>>>,
}

impl AppState {
    pub fn new(agent: Agent) -> Self {
        Self {
            agent,
            history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A copy of the conversation history, oldest first.
    pub async fn history(&self) -> Vec<Exchange> {
        self.history.read().await.clone()
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub answer: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Builds the router for the chat page and its API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/query", post(query))
        .route("/api/history", get(history))
        .with_state(state)
}

/// Binds `addr` and serves until the process exits.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Chat page listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn query(State(state): State<AppState>, Json(req): Json<QueryRequest>) -> Response {
    let question = req.query.trim();
    if question.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "Query must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    match state.agent.invoke(question).await {
        Ok(answer) => {
            state.history.write().await.push(Exchange {
                user: question.to_string(),
                agent: answer.clone(),
            });
            Json(QueryResponse { answer }).into_response()
        }
        Err(e) => {
            error!(error = %e, "Query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: "The agent could not answer this question.".to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn history(State(state): State<AppState>) -> Json<Vec<Exchange>> {
    Json(state.history().await)
}

const INDEX_HTML: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>SQLite Data Talk Agent</title>
<style>
  body { font-family: sans-serif; max-width: 52rem; margin: 2rem auto; padding: 0 1rem; }
  form { display: flex; gap: .5rem; }
  input { flex: 1; padding: .5rem; }
  .answer { white-space: pre-wrap; background: #eef7ee; padding: .75rem; margin: 1rem 0; }
  .error { color: #a00; }
  .turn { border-bottom: 1px solid #ddd; padding: .5rem 0; white-space: pre-wrap; }
</style>
</head>
<body>
<h1>SQLite Data Talk Agent</h1>
<form id="ask">
  <input id="query" placeholder="Enter your query about the database:" autocomplete="off">
  <button type="submit">Ask</button>
</form>
<div id="status"></div>
<h2>Conversation History</h2>
<div id="history"></div>
<script>
const statusEl = document.getElementById("status");
const historyEl = document.getElementById("history");

function turn(label, text) {
  const div = document.createElement("div");
  const b = document.createElement("b");
  b.textContent = label + ": ";
  div.append(b, text);
  return div;
}

async function loadHistory() {
  const res = await fetch("/api/history");
  const items = await res.json();
  historyEl.replaceChildren(...items.map(item => {
    const el = document.createElement("div");
    el.className = "turn";
    el.append(turn("User", item.user), turn("Agent", item.agent));
    return el;
  }));
}

document.getElementById("ask").addEventListener("submit", async (event) => {
  event.preventDefault();
  const input = document.getElementById("query");
  const query = input.value.trim();
  if (!query) return;
  statusEl.className = "";
  statusEl.textContent = "Processing...";
  const res = await fetch("/api/query", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ query }),
  });
  const body = await res.json();
  if (res.ok) {
    statusEl.className = "answer";
    statusEl.textContent = body.answer;
    input.value = "";
    loadHistory();
  } else {
    statusEl.className = "error";
    statusEl.textContent = "Error: " + body.error;
  }
});

loadHistory();
</script>
</body>
</html>
"#;
