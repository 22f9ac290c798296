//! Shared mock servers for integration tests.
//!
//! Every mock binds `127.0.0.1:0` and returns its base URL, so tests can run
//! in parallel without port clashes.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use lb_failover::config::{ControllerConfig, HttpConfig};

/// Serve `app` on an ephemeral port and return `http://127.0.0.1:{port}`.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// How a mock cluster status endpoint answers `GET /cluster`.
#[derive(Debug, Clone)]
pub enum ClusterBehavior {
    /// 200 with the given leader (plus one replica).
    Leader(&'static str),
    /// Sleep, then answer with the given leader.
    Slow(Duration, &'static str),
    /// Bare status code, empty body.
    Status(u16),
    /// 200 with a body that is not a cluster document.
    Garbage,
    /// First request answers with the first leader; later ones sleep, then
    /// answer with the second.
    StallAfterFirst(&'static str, Duration, &'static str),
}

pub fn cluster_document(leader: &str) -> Value {
    json!({
        "scope": "pg-cluster",
        "members": [
            {"name": "pg-1", "role": "replica", "state": "streaming", "host": "10.0.1.10", "port": 5432, "timeline": 7, "lag": 0},
            {"name": leader, "role": "leader", "state": "running", "host": "10.0.2.10", "port": 5432, "timeline": 7}
        ]
    })
}

pub async fn spawn_cluster_endpoint(behavior: ClusterBehavior) -> String {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route(
        "/cluster",
        get(move || {
            let behavior = behavior.clone();
            let hit = hits.fetch_add(1, Ordering::SeqCst);
            async move {
                match behavior {
                    ClusterBehavior::Leader(name) => (StatusCode::OK, Json(cluster_document(name))),
                    ClusterBehavior::Slow(delay, name) => {
                        tokio::time::sleep(delay).await;
                        (StatusCode::OK, Json(cluster_document(name)))
                    }
                    ClusterBehavior::Status(code) => (
                        StatusCode::from_u16(code).unwrap(),
                        Json(json!({})),
                    ),
                    ClusterBehavior::Garbage => (StatusCode::OK, Json(json!("not a cluster document"))),
                    ClusterBehavior::StallAfterFirst(first, _, _) if hit == 0 => {
                        (StatusCode::OK, Json(cluster_document(first)))
                    }
                    ClusterBehavior::StallAfterFirst(_, delay, later) => {
                        tokio::time::sleep(delay).await;
                        (StatusCode::OK, Json(cluster_document(later)))
                    }
                }
            }
        }),
    );
    serve(app).await
}

/// A recorded PATCH.
#[derive(Debug, Clone)]
pub struct Patch {
    pub server: String,
    pub index: usize,
    pub body: Value,
}

#[derive(Debug, Default)]
pub struct AdminState {
    pub servers: Value,
    pub patches: Vec<Patch>,
    pub gets: u32,
    pub patch_attempts: u32,
    /// Answer this many PATCHes with 500 before accepting.
    pub fail_patches: u32,
    /// Every PATCH answers 500.
    pub always_fail: bool,
    pub last_authorization: Option<String>,
}

/// Mock reverse-proxy admin API holding a mutable servers document.
#[derive(Clone)]
pub struct MockAdmin {
    pub url: String,
    pub state: Arc<Mutex<AdminState>>,
}

impl MockAdmin {
    pub async fn start(servers: Value) -> Self {
        let state = Arc::new(Mutex::new(AdminState {
            servers,
            ..AdminState::default()
        }));

        let app = Router::new()
            .route("/config/apps/http/servers", get(get_servers))
            .route(
                "/config/apps/http/servers/{server}/routes/{index}",
                axum::routing::patch(patch_route),
            )
            .with_state(state.clone());

        Self {
            url: serve(app).await,
            state,
        }
    }

    pub fn descriptor(&self, identifier: &str) -> String {
        format!("admin:secret@{};{}", self.url, identifier)
    }

    pub fn patches(&self) -> Vec<Patch> {
        self.state.lock().unwrap().patches.clone()
    }

    pub fn servers(&self) -> Value {
        self.state.lock().unwrap().servers.clone()
    }

    pub fn gets(&self) -> u32 {
        self.state.lock().unwrap().gets
    }

    pub fn patch_attempts(&self) -> u32 {
        self.state.lock().unwrap().patch_attempts
    }

    pub fn fail_next_patches(&self, count: u32) {
        self.state.lock().unwrap().fail_patches = count;
    }

    pub fn fail_all_patches(&self) {
        self.state.lock().unwrap().always_fail = true;
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state.lock().unwrap().last_authorization.clone()
    }
}

async fn get_servers(State(state): State<Arc<Mutex<AdminState>>>, headers: HeaderMap) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.gets += 1;
    state.last_authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    Json(state.servers.clone())
}

async fn patch_route(
    State(state): State<Arc<Mutex<AdminState>>>,
    Path((server, index)): Path<(String, usize)>,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut state = state.lock().unwrap();
    state.patch_attempts += 1;
    if state.always_fail {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    if state.fail_patches > 0 {
        state.fail_patches -= 1;
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    let Some(slot) = state
        .servers
        .get_mut(&server)
        .and_then(|s| s.get_mut("routes"))
        .and_then(|r| r.get_mut(index))
    else {
        return StatusCode::NOT_FOUND;
    };
    *slot = body.clone();
    state.patches.push(Patch { server, index, body });
    StatusCode::OK
}

/// Route for `domain` with a subroute-wrapped reverse proxy over two upstreams.
pub fn nested_route(domain: &str, first: &str, second: &str) -> Value {
    json!({
        "match": [{"host": [domain]}],
        "handle": [{
            "handler": "subroute",
            "routes": [{
                "handle": [{
                    "handler": "reverse_proxy",
                    "upstreams": [{"dial": first}, {"dial": second}]
                }]
            }]
        }],
        "terminal": true
    })
}

/// One server `srv0`: a static route for another host, then the db route.
pub fn servers_document(domain: &str) -> Value {
    json!({
        "srv0": {
            "listen": [":443"],
            "routes": [
                {
                    "match": [{"host": ["www.example.com"]}],
                    "handle": [{"handler": "static_response", "body": "ok"}]
                },
                nested_route(domain, "dc1-db.internal:5432", "dc2-db.internal:5432")
            ]
        }
    })
}

/// Controller config against the given admins, with fast retries.
pub fn switch_config(admins: &[&MockAdmin], domain: &str, cache_root: &std::path::Path) -> ControllerConfig {
    let mut config = ControllerConfig::default();
    config.switch.proxy_endpoints = admins
        .iter()
        .enumerate()
        .map(|(i, admin)| admin.descriptor(&format!("edge-{}", i)).parse().unwrap())
        .collect();
    config.switch.domains_to_switch = vec![domain.to_string()];
    config.http = fast_http();
    config.cache.root = cache_root.display().to_string();
    config
}

pub fn fast_http() -> HttpConfig {
    HttpConfig {
        max_attempts: 5,
        base_delay_ms: 5,
        max_delay_ms: 20,
        connect_timeout_secs: 2,
        request_timeout_secs: 5,
        ..HttpConfig::default()
    }
}

/// Alert sink that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl lb_failover::alerts::AlertSink for RecordingSink {
    async fn alert(&self, message: &str, _channel: &str, _topic: &str, _use_topic_routing: bool) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub fn recording_alerter() -> (lb_failover::alerts::Alerter, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let alerter = lb_failover::alerts::Alerter::new(sink.clone(), lb_failover::config::AlertConfig::default());
    (alerter, sink)
}

/// Switch engine for `config` that records its alerts.
pub fn engine_for(config: &ControllerConfig) -> (lb_failover::SwitchEngine, Arc<RecordingSink>) {
    let (alerter, sink) = recording_alerter();
    let engine = lb_failover::SwitchEngine::new(
        lb_failover::transport::HttpTransport::new(&config.http).unwrap(),
        config.switch.clone(),
        lb_failover::switch::PolicyCache::new(&config.cache.root),
        alerter,
    );
    (engine, sink)
}
