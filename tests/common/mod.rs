#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

/// What the `/flaky` route does on its next hit.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Sleep longer than any test timeout before answering.
    Hang,
    Status(u16),
}

#[derive(Default)]
struct Published {
    release_key: String,
    configurations: BTreeMap<String, String>,
}

#[derive(Default)]
pub struct MockState {
    configs: Mutex<HashMap<String, Published>>,
    notifications: Mutex<HashMap<String, i64>>,
    failing: Mutex<HashMap<String, u16>>,
    config_delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    steps: Mutex<VecDeque<Step>>,
    hits: Mutex<HashMap<String, usize>>,
}

impl MockState {
    fn hit(&self, route: &str) {
        *self.hits.lock().unwrap().entry(route.to_string()).or_default() += 1;
    }
}

/// In-process config service. Namespaces without a published config follow
/// the fixed rules: a release key shorter than 10 chars is 304, anything
/// else is 200 with `a1 = key` and `a2 = key` under release key `key + "z"`.
/// Notifications answer `id + 1` for ids of at least 50, otherwise 304.
pub struct MockServer {
    pub addr: String,
    state: Arc<MockState>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/configs/{app_id}/{cluster}/{namespace}", get(configs))
            .route("/notifications/v2", get(notifications))
            .route("/flaky", get(flaky))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: format!("http://{}", addr),
            state,
        }
    }

    /// Serve `configurations` under `release_key` for `namespace`.
    pub fn publish(&self, namespace: &str, release_key: &str, configurations: &[(&str, &str)]) {
        self.state.configs.lock().unwrap().insert(
            namespace.to_string(),
            Published {
                release_key: release_key.to_string(),
                configurations: configurations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
    }

    /// Report `namespace` as changed to clients holding a lower id.
    pub fn notify(&self, namespace: &str, notification_id: i64) {
        self.state
            .notifications
            .lock()
            .unwrap()
            .insert(namespace.to_string(), notification_id);
    }

    /// Answer config requests for `namespace` with `status`.
    pub fn fail(&self, namespace: &str, status: u16) {
        self.state
            .failing
            .lock()
            .unwrap()
            .insert(namespace.to_string(), status);
    }

    pub fn recover(&self, namespace: &str) {
        self.state.failing.lock().unwrap().remove(namespace);
    }

    /// Hold every config response for `delay`.
    pub fn delay_configs(&self, delay: Duration) {
        *self.state.config_delay.lock().unwrap() = delay;
    }

    /// Most config requests ever served at the same time.
    pub fn max_concurrent_configs(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn script(&self, steps: &[Step]) {
        self.state.steps.lock().unwrap().extend(steps.iter().copied());
    }

    pub fn hits(&self, route: &str) -> usize {
        self.state.hits.lock().unwrap().get(route).copied().unwrap_or(0)
    }
}

async fn configs(
    State(state): State<Arc<MockState>>,
    Path((app_id, cluster, namespace)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.hit("configs");
    let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_in_flight.fetch_max(now, Ordering::SeqCst);

    let delay = *state.config_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let response = config_response(&state, app_id, cluster, namespace, &query);

    state.in_flight.fetch_sub(1, Ordering::SeqCst);
    response
}

fn config_response(
    state: &MockState,
    app_id: String,
    cluster: String,
    namespace: String,
    query: &HashMap<String, String>,
) -> Response {
    if let Some(&status) = state.failing.lock().unwrap().get(&namespace) {
        return StatusCode::from_u16(status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response();
    }

    let release_key = query.get("releaseKey").cloned().unwrap_or_default();

    if let Some(published) = state.configs.lock().unwrap().get(&namespace) {
        if published.release_key == release_key {
            return StatusCode::NOT_MODIFIED.into_response();
        }
        return Json(json!({
            "appId": app_id,
            "cluster": cluster,
            "namespaceName": namespace,
            "releaseKey": published.release_key,
            "configurations": published.configurations,
        }))
        .into_response();
    }

    if release_key.len() < 10 {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    Json(json!({
        "appId": app_id,
        "cluster": cluster,
        "namespaceName": namespace,
        "releaseKey": format!("{}z", release_key),
        "configurations": {"a1": release_key, "a2": release_key},
    }))
    .into_response()
}

async fn notifications(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    state.hit("notifications");
    let Some(raw) = query.get("notifications") else {
        return StatusCode::FORBIDDEN.into_response();
    };
    let Ok(sent) = serde_json::from_str::<Vec<serde_json::Value>>(raw) else {
        return StatusCode::FORBIDDEN.into_response();
    };

    let published = state.notifications.lock().unwrap();
    let mut changed = Vec::new();
    for n in sent {
        let namespace = n["namespaceName"].as_str().unwrap_or_default().to_string();
        let id = n["notificationId"].as_i64().unwrap_or_default();

        let next = match published.get(&namespace) {
            Some(&latest) if latest > id => Some(latest),
            _ if id >= 50 => Some(id + 1),
            _ => None,
        };
        if let Some(next) = next {
            changed.push(json!({"namespaceName": namespace, "notificationId": next}));
        }
    }

    if changed.is_empty() {
        return StatusCode::NOT_MODIFIED.into_response();
    }
    Json(changed).into_response()
}

async fn flaky(State(state): State<Arc<MockState>>) -> Response {
    state.hit("flaky");
    let step = state.steps.lock().unwrap().pop_front();
    match step {
        Some(Step::Hang) => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            StatusCode::OK.into_response()
        }
        Some(Step::Status(code)) if code == 200 => Json(json!({"ok": true})).into_response(),
        Some(Step::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
