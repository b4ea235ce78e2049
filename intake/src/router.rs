use std::future::ready;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::limiters::client::ClientLimiter;
use crate::limiters::window::SubmissionLimiter;
use crate::prometheus::track_metrics;
use crate::stores::{BlobStore, RowStore};
use crate::{endpoint, time::TimeSource};

/// Names of the sheets each form writes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SheetNames {
    pub rsvp: String,
    pub payment: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        SheetNames {
            rsvp: String::from("Page1"),
            payment: String::from("Payments"),
        }
    }
}

#[derive(Clone)]
pub struct State {
    pub rows: Arc<dyn RowStore + Send + Sync>,
    pub blobs: Arc<dyn BlobStore + Send + Sync>,
    pub timesource: Arc<dyn TimeSource + Send + Sync>,
    pub limiter: SubmissionLimiter,
    pub client_limiter: Option<ClientLimiter>,
    pub sheets: SheetNames,
}

async fn index() -> &'static str {
    "intake"
}

#[allow(clippy::too_many_arguments)]
pub fn router<
    TZ: TimeSource + Send + Sync + 'static,
    R: RowStore + Send + Sync + 'static,
    B: BlobStore + Send + Sync + 'static,
>(
    timesource: TZ,
    rows: R,
    blobs: B,
    limiter: SubmissionLimiter,
    client_limiter: Option<ClientLimiter>,
    sheets: SheetNames,
    slip_dir: Option<PathBuf>,
    max_body_bytes: usize,
    metrics: Option<PrometheusHandle>,
) -> Router {
    let state = State {
        rows: Arc::new(rows),
        blobs: Arc::new(blobs),
        timesource: Arc::new(timesource),
        limiter,
        client_limiter,
        sheets,
    };

    // The forms are served from a separately hosted static site
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .allow_origin(AllowOrigin::mirror_request());

    let mut router = Router::new()
        .route("/", get(index).post(endpoint::submit).options(endpoint::options))
        .route("/_readiness", get(index))
        .route("/_liveness", get(index))
        .route(
            "/submit",
            post(endpoint::submit).options(endpoint::options),
        )
        .route(
            "/submit/",
            post(endpoint::submit).options(endpoint::options),
        );

    if let Some(slip_dir) = slip_dir {
        router = router.nest_service("/slips", ServeDir::new(slip_dir));
    }

    // Installing a global recorder when intake is used as a library (during tests etc)
    // does not work well, so the caller owns the handle.
    if let Some(recorder_handle) = metrics {
        router = router.route("/metrics", get(move || ready(recorder_handle.render())));
    }

    router
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(axum::middleware::from_fn(track_metrics))
        .with_state(state)
}
