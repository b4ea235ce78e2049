use std::collections::HashMap;
use std::net::IpAddr;

use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum_client_ip::InsecureClientIp;
use bytes::Bytes;
use tracing::{instrument, Span};

use crate::api::{Action, IntakeError, PaymentResponse};
use crate::normalize::SubmissionFields;
use crate::payment::{self, PaymentSubmission, PAYMENT_HEADER};
use crate::prometheus::{report_dropped_submission, report_received_submission};
use crate::router;
use crate::rsvp::{self, RsvpRecord, RSVP_HEADER};

/// Single intake endpoint for both forms. The `action` field picks the
/// handler, and each handler answers in the shape its form expects: plain
/// text for RSVPs, JSON for payments.
#[instrument(
    skip_all,
    fields(
        action = tracing::field::Empty,
        client_ip = tracing::field::Empty,
        content_type = tracing::field::Empty,
    )
)]
pub async fn submit(
    state: State<router::State>,
    ip: Option<InsecureClientIp>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let ip = ip.map(|InsecureClientIp(ip)| ip);
    if let Some(ip) = ip {
        Span::current().record("client_ip", tracing::field::display(ip));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    Span::current().record("content_type", content_type);

    // Decoding failures are answered in the payment shape only if the query
    // string already asked for it
    let query_action = match &query {
        Ok(Query(query)) => Action::from_discriminator(query.get("action").map(String::as_str)),
        Err(_) => Action::Rsvp,
    };

    let fields = match decode(query, content_type, body) {
        Ok(fields) => fields,
        Err(err) => {
            tracing::debug!("rejected undecodable submission: {}", err);
            report_dropped_submission(err.cause());
            return err.into_response_for(query_action);
        }
    };

    let action = Action::from_discriminator(fields.get("action"));
    Span::current().record("action", action.as_str());
    report_received_submission(action);

    match handle_submission(&state, ip, action, &fields).await {
        Ok(response) => response,
        Err(err) => {
            match err.status_code() {
                StatusCode::SERVICE_UNAVAILABLE => {
                    tracing::error!("failed to record submission: {}", err)
                }
                _ => tracing::debug!("rejected submission: {}", err),
            }
            report_dropped_submission(err.cause());
            err.into_response_for(action)
        }
    }
}

/// Folds extractor rejections into [`IntakeError`] so they get the same
/// response shapes as every other failure.
fn decode(
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
    content_type: &str,
    body: Result<Bytes, BytesRejection>,
) -> Result<SubmissionFields, IntakeError> {
    let Query(query) =
        query.map_err(|rejection| IntakeError::RequestDecodingError(rejection.body_text()))?;
    let body = body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => IntakeError::PayloadTooLarge,
        _ => IntakeError::RequestDecodingError(rejection.body_text()),
    })?;

    SubmissionFields::from_request(query, content_type, &body)
}

async fn handle_submission(
    state: &router::State,
    ip: Option<IpAddr>,
    action: Action,
    fields: &SubmissionFields,
) -> Result<Response, IntakeError> {
    if let (Some(limiter), Some(ip)) = (&state.client_limiter, ip) {
        if limiter.is_limited(&ip) {
            return Err(IntakeError::ClientRateLimited);
        }
    }
    if state.limiter.is_limited(action).await {
        return Err(IntakeError::RateLimited(action));
    }

    let timestamp = state.timesource.current_time();
    match action {
        Action::Rsvp => {
            let record = RsvpRecord::from_fields(fields, timestamp);
            let sheet = state
                .rows
                .get_or_create_sheet(&state.sheets.rsvp, &RSVP_HEADER)
                .await?;
            let outcome = rsvp::record(state.rows.as_ref(), &sheet, &record).await?;

            Ok(outcome.message().into_response())
        }
        Action::Payment => {
            let submission = PaymentSubmission::from_fields(fields, timestamp)?;
            let sheet = state
                .rows
                .get_or_create_sheet(&state.sheets.payment, &PAYMENT_HEADER)
                .await?;
            let file_url =
                payment::record(state.rows.as_ref(), state.blobs.as_ref(), &sheet, submission)
                    .await?;

            Ok(Json(PaymentResponse::success(file_url)).into_response())
        }
    }
}

/// Plain OPTIONS requests; real preflights are answered by the CORS layer.
pub async fn options() -> StatusCode {
    StatusCode::NO_CONTENT
}
