use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stores::{BlobError, StoreError};
use crate::validation::{InvalidAmount, InvalidSlipReason};

/// Which handler a submission is routed to. Also the rate-limit category.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Action {
    Rsvp,
    Payment,
}

impl Action {
    /// Anything but an explicit `payment` discriminator is an RSVP.
    pub fn from_discriminator(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("payment") => Action::Payment,
            _ => Action::Rsvp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Rsvp => "rsvp",
            Action::Payment => "payment",
        }
    }
}

impl Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum IntakeError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("request body is too large")]
    PayloadTooLarge,

    #[error("request holds no field")]
    EmptySubmission,
    #[error("payment submitted without a payer name")]
    MissingPayerName,
    #[error("invalid amount: {0}")]
    InvalidAmount(#[from] InvalidAmount),
    #[error("invalid slip: {0}")]
    InvalidSlip(#[from] InvalidSlipReason),

    #[error("too many {0} submissions, please retry later")]
    RateLimited(Action),
    #[error("too many submissions from this address, please retry later")]
    ClientRateLimited,

    #[error("failed to save submission: {0}")]
    RowStoreError(#[from] StoreError),
    #[error("failed to save slip: {0}")]
    BlobStoreError(#[from] BlobError),
}

impl IntakeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IntakeError::RequestDecodingError(_)
            | IntakeError::RequestParsingError(_)
            | IntakeError::EmptySubmission
            | IntakeError::MissingPayerName
            | IntakeError::InvalidAmount(_)
            | IntakeError::InvalidSlip(_) => StatusCode::BAD_REQUEST,

            IntakeError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            IntakeError::RateLimited(_) | IntakeError::ClientRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }

            IntakeError::RowStoreError(_) | IntakeError::BlobStoreError(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Short label for the dropped submissions metric.
    pub fn cause(&self) -> &'static str {
        match self {
            IntakeError::RequestDecodingError(_) => "request_decoding",
            IntakeError::RequestParsingError(_) => "request_parsing",
            IntakeError::PayloadTooLarge => "payload_too_large",
            IntakeError::EmptySubmission => "empty_submission",
            IntakeError::MissingPayerName => "missing_payer_name",
            IntakeError::InvalidAmount(_) => "invalid_amount",
            IntakeError::InvalidSlip(_) => "invalid_slip",
            IntakeError::RateLimited(_) => "rate_limited",
            IntakeError::ClientRateLimited => "client_rate_limited",
            IntakeError::RowStoreError(_) => "row_store",
            IntakeError::BlobStoreError(_) => "blob_store",
        }
    }

    /// Plain text rendering used by the RSVP form.
    pub fn into_text_response(self) -> Response {
        (self.status_code(), format!("Error: {self}")).into_response()
    }

    /// Structured rendering used by the payment form.
    pub fn into_json_response(self) -> Response {
        (
            self.status_code(),
            Json(PaymentResponse::error(self.to_string())),
        )
            .into_response()
    }

    pub fn into_response_for(self, action: Action) -> Response {
        match action {
            Action::Rsvp => self.into_text_response(),
            Action::Payment => self.into_json_response(),
        }
    }
}

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        self.into_text_response()
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Error,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub status: PaymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
}

impl PaymentResponse {
    pub fn success(file_url: Option<String>) -> Self {
        PaymentResponse {
            status: PaymentStatus::Success,
            message: Some(String::from("Payment confirmation received")),
            file_url,
        }
    }

    pub fn error(message: String) -> Self {
        PaymentResponse {
            status: PaymentStatus::Error,
            message: Some(message),
            file_url: None,
        }
    }
}
