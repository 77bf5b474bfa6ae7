use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_COURSES: &str = "/lb/courses";
pub const PATH_COURSE: &str = "/lb/courses/{id}";
pub const PATH_ENROLL: &str = "/lb/enroll";
pub const PATH_QUEUE_STATUS: &str = "/lb/queue/status";
pub const PATH_SERVERS: &str = "/lb/servers";

/// Behaviour knobs for the mock enrollment service.
#[derive(Debug, Clone, Copy, Default)]
pub struct TestServerConfig {
    /// Added to every request before responding.
    pub latency: Duration,
    /// Every `n`th request answers `500`. `0` never fails.
    pub fail_every: u64,
}

impl TestServerConfig {
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    #[must_use]
    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = n;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    failed_total: Arc<AtomicU64>,
    enroll_total: Arc<AtomicU64>,
    enroll_rejected: Arc<AtomicU64>,
    queue_status_total: Arc<AtomicU64>,
    courses_total: Arc<AtomicU64>,
    in_flight: Arc<AtomicU64>,
    peak_in_flight: Arc<AtomicU64>,
}

impl TestServerStats {
    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn failed_total(&self) -> u64 {
        self.failed_total.load(Ordering::Relaxed)
    }

    pub fn enroll_total(&self) -> u64 {
        self.enroll_total.load(Ordering::Relaxed)
    }

    /// Enroll bodies that were not valid `{userId, courseId, priority}` JSON.
    pub fn enroll_rejected(&self) -> u64 {
        self.enroll_rejected.load(Ordering::Relaxed)
    }

    pub fn queue_status_total(&self) -> u64 {
        self.queue_status_total.load(Ordering::Relaxed)
    }

    pub fn courses_total(&self) -> u64 {
        self.courses_total.load(Ordering::Relaxed)
    }

    pub fn peak_in_flight(&self) -> u64 {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    fn enter(&self) -> InFlight<'_> {
        let seq = self.requests_total.fetch_add(1, Ordering::Relaxed) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::Relaxed);
        InFlight { stats: self, seq }
    }
}

struct InFlight<'a> {
    stats: &'a TestServerStats,
    /// 1-based arrival order of this request.
    seq: u64,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
struct AppState {
    config: TestServerConfig,
    stats: TestServerStats,
}

impl AppState {
    /// Applies the configured latency and decides whether this request fails.
    async fn simulate(&self, req: &InFlight<'_>) -> Result<(), Response> {
        if !self.config.latency.is_zero() {
            sleep(self.config.latency).await;
        }
        if self.config.fail_every != 0 && req.seq % self.config.fail_every == 0 {
            self.stats.failed_total.fetch_add(1, Ordering::Relaxed);
            return Err((StatusCode::INTERNAL_SERVER_ERROR, "injected failure").into_response());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Course {
    id: u64,
    name: &'static str,
    capacity: u32,
    current_enrollment: u32,
}

const COURSES: [Course; 3] = [
    Course {
        id: 1,
        name: "Operating Systems",
        capacity: 100,
        current_enrollment: 0,
    },
    Course {
        id: 2,
        name: "Computer Networks",
        capacity: 80,
        current_enrollment: 0,
    },
    Course {
        id: 3,
        name: "Databases",
        capacity: 120,
        current_enrollment: 0,
    },
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnrollmentRequest {
    user_id: u64,
    course_id: u64,
    priority: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueStatus {
    queue_size: u64,
    processed_count: u64,
}

async fn handle_courses(State(state): State<AppState>) -> Response {
    let guard = state.stats.enter();
    state.stats.courses_total.fetch_add(1, Ordering::Relaxed);
    if let Err(res) = state.simulate(&guard).await {
        return res;
    }
    Json(COURSES.to_vec()).into_response()
}

async fn handle_course(State(state): State<AppState>, Path(id): Path<u64>) -> Response {
    let guard = state.stats.enter();
    if let Err(res) = state.simulate(&guard).await {
        return res;
    }
    match COURSES.iter().find(|c| c.id == id) {
        Some(course) => Json(course.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn handle_enroll(State(state): State<AppState>, body: Bytes) -> Response {
    let guard = state.stats.enter();
    state.stats.enroll_total.fetch_add(1, Ordering::Relaxed);
    if let Err(res) = state.simulate(&guard).await {
        return res;
    }

    let req: EnrollmentRequest = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            state.stats.enroll_rejected.fetch_add(1, Ordering::Relaxed);
            return (StatusCode::BAD_REQUEST, "bad json").into_response();
        }
    };
    if req.user_id == 0 || req.course_id == 0 || req.priority > 99 {
        state.stats.enroll_rejected.fetch_add(1, Ordering::Relaxed);
        return (StatusCode::BAD_REQUEST, "bad enrollment").into_response();
    }

    Json(serde_json::json!({
        "status": "queued",
        "message": "Request added to queue",
    }))
    .into_response()
}

async fn handle_queue_status(State(state): State<AppState>) -> Response {
    let guard = state.stats.enter();
    state.stats.queue_status_total.fetch_add(1, Ordering::Relaxed);
    if let Err(res) = state.simulate(&guard).await {
        return res;
    }
    let enrolled = state.stats.enroll_total();
    Json(QueueStatus {
        queue_size: 0,
        processed_count: enrolled,
    })
    .into_response()
}

async fn handle_servers(State(state): State<AppState>) -> Response {
    let _guard = state.stats.enter();
    Json(serde_json::json!(["self"])).into_response()
}

pub fn router(config: TestServerConfig, stats: TestServerStats) -> Router {
    Router::new()
        .route(PATH_COURSES, get(handle_courses))
        .route(PATH_COURSE, get(handle_course))
        .route(PATH_ENROLL, post(handle_enroll))
        .route(PATH_QUEUE_STATUS, get(handle_queue_status))
        .route(PATH_SERVERS, get(handle_servers))
        .with_state(AppState { config, stats })
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(TestServerConfig::default()).await
    }

    pub async fn start_with(config: TestServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(config, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
