//! Query API over the stored traffic history using Axum

use crate::config::ServiceConfig;
use crate::query::{AnomalyView, QueryService, RowView, Statistics};
use crate::TrafficError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, Router},
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

/// Banner returned by the root endpoint
pub const API_NAME: &str = "Telecom Traffic Analysis API";

/// Service metrics
static SERVICE_METRICS: Lazy<ServiceMetrics> = Lazy::new(ServiceMetrics::new);

/// HTTP front of a [`QueryService`]
#[derive(Clone)]
pub struct TrafficService {
    queries: Arc<QueryService>,
    settings: ServiceConfig,
    start_time: std::time::Instant,
}

/// Body of `GET /`
#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    /// API banner
    pub message: String,
}

/// Body of `GET /health`
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `healthy` once the router is up
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since the service was created
    pub uptime_seconds: u64,
    /// Requests served so far
    pub requests_total: u64,
    /// Requests answered successfully
    pub requests_success: u64,
    /// Requests that ended in a store failure
    pub requests_failed: u64,
    /// Rows returned by list endpoints
    pub rows_served: u64,
}

/// Body of every failed query
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Underlying cause
    pub detail: String,
}

/// Query failure surfaced as HTTP 500
#[derive(Debug)]
pub struct ApiError(TrafficError);

impl From<TrafficError> for ApiError {
    fn from(e: TrafficError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Query failed: {}", self.0);
        SERVICE_METRICS.record_request(false);
        let body = ErrorResponse {
            detail: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

struct ServiceMetrics {
    requests_total: AtomicU64,
    requests_success: AtomicU64,
    requests_failed: AtomicU64,
    rows_served: AtomicU64,
}

impl ServiceMetrics {
    fn new() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            requests_success: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            rows_served: AtomicU64::new(0),
        }
    }

    fn record_request(&self, success: bool) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if success {
            self.requests_success.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_rows(&self, rows: usize) {
        self.record_request(true);
        self.rows_served.fetch_add(rows as u64, Ordering::Relaxed);
    }
}

impl TrafficService {
    /// Serve `queries` with default settings
    pub fn new(queries: Arc<QueryService>) -> Self {
        Self::with_settings(queries, ServiceConfig::default())
    }

    /// Serve `queries` with explicit timeout and concurrency settings
    pub fn with_settings(queries: Arc<QueryService>, settings: ServiceConfig) -> Self {
        Self {
            queries,
            settings,
            start_time: std::time::Instant::now(),
        }
    }

    /// Build the router with all middleware layers applied
    pub fn router(&self) -> Router {
        let app = Router::new()
            .route("/", get(Self::root_handler))
            .route("/health", get(Self::health_handler))
            .route("/api/anomalies", get(Self::anomalies_handler))
            .route(
                "/api/subscriber/{subscriber_id}",
                get(Self::subscriber_handler),
            )
            .route("/api/statistics", get(Self::statistics_handler))
            .with_state(self.clone());

        app.layer(TimeoutLayer::new(Duration::from_secs(
            self.settings.request_timeout_secs,
        )))
        .layer(ConcurrencyLimitLayer::new(
            self.settings.max_concurrent_requests.max(1),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
    }

    async fn root_handler() -> Json<RootResponse> {
        SERVICE_METRICS.record_request(true);
        Json(RootResponse {
            message: API_NAME.to_string(),
        })
    }

    async fn health_handler(State(service): State<TrafficService>) -> Json<HealthResponse> {
        Json(HealthResponse {
            status: "healthy".to_string(),
            version: crate::VERSION.to_string(),
            uptime_seconds: service.start_time.elapsed().as_secs(),
            requests_total: SERVICE_METRICS.requests_total.load(Ordering::Relaxed),
            requests_success: SERVICE_METRICS.requests_success.load(Ordering::Relaxed),
            requests_failed: SERVICE_METRICS.requests_failed.load(Ordering::Relaxed),
            rows_served: SERVICE_METRICS.rows_served.load(Ordering::Relaxed),
        })
    }

    async fn anomalies_handler(
        State(service): State<TrafficService>,
    ) -> Result<Json<Vec<AnomalyView>>, ApiError> {
        let anomalies = service.queries.list_anomalies().await?;
        SERVICE_METRICS.record_rows(anomalies.len());
        Ok(Json(anomalies.into_iter().map(AnomalyView::from).collect()))
    }

    async fn subscriber_handler(
        State(service): State<TrafficService>,
        Path(subscriber_id): Path<u64>,
    ) -> Result<Json<Vec<RowView>>, ApiError> {
        let rows = service.queries.get_subscriber(subscriber_id).await?;
        SERVICE_METRICS.record_rows(rows.len());
        Ok(Json(rows.into_iter().map(RowView::from).collect()))
    }

    async fn statistics_handler(
        State(service): State<TrafficService>,
    ) -> Result<Json<Statistics>, ApiError> {
        let stats = service.queries.get_statistics().await?;
        SERVICE_METRICS.record_request(true);
        Ok(Json(stats))
    }

    /// Bind `addr` and serve until the listener fails
    pub async fn serve(
        self,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
        let app = self.router();

        info!("Starting traffic API on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }
}
