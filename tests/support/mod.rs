//! Fake Elasticsearch HTTP API for lifecycle tests.
//!
//! Serves just enough of the REST API for the readiness probe and the index
//! reset: `GET /`, `DELETE /{index}` and `PUT /{index}`. Every request is
//! recorded so tests can assert on order.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde_json::{Value, json};

/// A request the fake received.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

impl Recorded {
    pub fn summary(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

#[derive(Default)]
struct Inner {
    requests: Vec<Recorded>,
    probes: u32,
    not_ready_probes: u32,
    fail_wipe: bool,
    failing_indexes: HashSet<String>,
    indexes: BTreeMap<String, Value>,
}

#[derive(Clone, Default)]
pub struct FakeElastic {
    inner: Arc<Mutex<Inner>>,
}

impl FakeElastic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer 503 to the first `probes` readiness probes.
    pub fn not_ready_for(self, probes: u32) -> Self {
        self.inner.lock().unwrap().not_ready_probes = probes;
        self
    }

    /// Answer 500 to `DELETE /_all`.
    pub fn failing_wipe(self) -> Self {
        self.inner.lock().unwrap().fail_wipe = true;
        self
    }

    /// Answer 400 when `name` is created.
    pub fn failing_index(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .failing_indexes
            .insert(name.to_string());
        self
    }

    /// Pretend `name` already exists.
    pub fn with_existing_index(self, name: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .indexes
            .insert(name.to_string(), json!({}));
        self
    }

    /// Serve on an ephemeral loopback port.
    pub async fn serve(&self) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = Router::new()
            .route("/", get(root))
            .route("/{index}", axum::routing::delete(delete_index).put(create_index))
            .with_state(self.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// `METHOD /path` of every request except probes.
    pub fn index_requests(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.path != "/")
            .map(Recorded::summary)
            .collect()
    }

    pub fn probes(&self) -> u32 {
        self.inner.lock().unwrap().probes
    }

    /// Names of the indexes that currently exist.
    pub fn indexes(&self) -> Vec<String> {
        self.inner.lock().unwrap().indexes.keys().cloned().collect()
    }

    pub fn index_body(&self, name: &str) -> Option<Value> {
        self.inner.lock().unwrap().indexes.get(name).cloned()
    }
}

async fn root(State(es): State<FakeElastic>) -> (StatusCode, Json<Value>) {
    let mut inner = es.inner.lock().unwrap();
    inner.requests.push(Recorded {
        method: "GET",
        path: "/".to_string(),
        body: None,
    });
    inner.probes += 1;

    if inner.probes <= inner.not_ready_probes {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "cluster not ready", "status": 503 })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "name": "es-local",
            "cluster_name": "docker-cluster",
            "version": { "number": "7.13.2" },
            "tagline": "You Know, for Search"
        })),
    )
}

async fn delete_index(
    State(es): State<FakeElastic>,
    Path(index): Path<String>,
) -> (StatusCode, Json<Value>) {
    let mut inner = es.inner.lock().unwrap();
    inner.requests.push(Recorded {
        method: "DELETE",
        path: format!("/{index}"),
        body: None,
    });

    if index == "_all" {
        if inner.fail_wipe {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "wipe exploded", "status": 500 })),
            );
        }
        inner.indexes.clear();
    } else if inner.indexes.remove(&index).is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "index_not_found_exception", "status": 404 })),
        );
    }

    (StatusCode::OK, Json(json!({ "acknowledged": true })))
}

async fn create_index(
    State(es): State<FakeElastic>,
    Path(index): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut inner = es.inner.lock().unwrap();
    inner.requests.push(Recorded {
        method: "PUT",
        path: format!("/{index}"),
        body: Some(body.clone()),
    });

    if inner.failing_indexes.contains(&index) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "mapper_parsing_exception", "status": 400 })),
        );
    }
    if inner.indexes.contains_key(&index) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "resource_already_exists_exception", "status": 400 })),
        );
    }

    inner.indexes.insert(index.clone(), body);
    (
        StatusCode::OK,
        Json(json!({ "acknowledged": true, "shards_acknowledged": true, "index": index })),
    )
}
