#![allow(dead_code)]

use std::num::NonZeroU32;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use time::OffsetDateTime;
use tower::ServiceExt;

use intake::limiters::client::ClientLimiter;
use intake::limiters::window::{SubmissionLimiter, WindowLimits};
use intake::redis::MockRedisClient;
use intake::router::{router, SheetNames};
use intake::stores::memory::{MemoryBlobStore, MemoryRowStore};
use intake::stores::{Row, RowStore, Sheet, StoreError};
use intake::time::FixedTime;

pub const SLIP_BASE_URL: &str = "http://localhost:3000/slips";
pub const CLIENT_IP: &str = "203.0.113.7";
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub struct TestApp {
    pub router: Router,
    pub rows: MemoryRowStore,
    pub blobs: MemoryBlobStore,
    pub clock: FixedTime,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: String,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("response is not json")
    }
}

pub fn start_time() -> OffsetDateTime {
    // Start of a 60s window
    OffsetDateTime::from_unix_timestamp(1_700_000_040).unwrap()
}

pub fn setup() -> TestApp {
    setup_with(WindowLimits::default(), MockRedisClient::new(), None)
}

pub fn setup_with(
    limits: WindowLimits,
    redis: MockRedisClient,
    client_limiter: Option<ClientLimiter>,
) -> TestApp {
    let rows = MemoryRowStore::new();
    let blobs = MemoryBlobStore::new(SLIP_BASE_URL);
    let clock = FixedTime::new(start_time());

    let limiter = SubmissionLimiter::new(Arc::new(redis), Arc::new(clock.clone()), None, limits);
    let router = router(
        clock.clone(),
        rows.clone(),
        blobs.clone(),
        limiter,
        client_limiter,
        SheetNames::default(),
        None,
        MAX_BODY_BYTES,
        None,
    );

    TestApp {
        router,
        rows,
        blobs,
        clock,
    }
}

pub fn strict_client_limiter() -> ClientLimiter {
    ClientLimiter::new(NonZeroU32::new(1).unwrap(), NonZeroU32::new(1).unwrap())
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("request failed");

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();

    TestResponse {
        status,
        content_type,
        body: String::from_utf8(body.to_vec()).expect("body is not utf-8"),
    }
}

pub fn post(uri: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, content_type)
        .header("X-Forwarded-For", CLIENT_IP)
        .body(body.into())
        .unwrap()
}

pub async fn post_form(router: &Router, body: &str) -> TestResponse {
    send(
        router,
        post(
            "/submit",
            "application/x-www-form-urlencoded",
            body.to_owned(),
        ),
    )
    .await
}

pub async fn post_json(router: &Router, body: &serde_json::Value) -> TestResponse {
    send(router, post("/submit", "application/json", body.to_string())).await
}

/// Row store where every call fails, as if the database were gone.
#[derive(Clone, Default)]
pub struct UnavailableRowStore {}

#[async_trait]
impl RowStore for UnavailableRowStore {
    async fn get_or_create_sheet(&self, _name: &str, _header: &[&str]) -> Result<Sheet, StoreError> {
        Err(StoreError::Unavailable(String::from("connection refused")))
    }

    async fn append_row(&self, _sheet: &Sheet, _row: Row) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(String::from("connection refused")))
    }

    async fn read_rows(&self, _sheet: &Sheet) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Unavailable(String::from("connection refused")))
    }

    async fn overwrite_row(&self, _sheet: &Sheet, _index: usize, _row: Row) -> Result<(), StoreError> {
        Err(StoreError::Unavailable(String::from("connection refused")))
    }
}
