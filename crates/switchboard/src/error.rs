// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for the router API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouterError {
    InvalidEnvelope,
    BadRequest,
    Unauthorized,
    Forbidden,
    AgentNotFound,
    Internal,
}

impl RouterError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidEnvelope | Self::BadRequest => 400,
            Self::Unauthorized => 401,
            Self::Forbidden => 403,
            Self::AgentNotFound => 404,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidEnvelope => "INVALID_ENVELOPE",
            Self::BadRequest => "BAD_REQUEST",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::AgentNotFound => "AGENT_NOT_FOUND",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn to_error_body(&self, message: impl Into<String>) -> ErrorBody {
        ErrorBody { code: self.as_str().to_owned(), message: message.into() }
    }

    pub fn to_http_response(
        &self,
        message: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse { error: self.to_error_body(message) };
        (status, Json(body))
    }
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Error body with machine-readable code and human-readable message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// One field-level diagnostic from envelope or registration validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// 400 response carrying per-field diagnostics alongside the error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionResponse {
    pub error: ErrorBody,
    pub fields: Vec<FieldError>,
}

impl RejectionResponse {
    pub fn invalid_envelope(fields: Vec<FieldError>) -> (StatusCode, Json<Self>) {
        let body = Self {
            error: RouterError::InvalidEnvelope.to_error_body("envelope failed validation"),
            fields,
        };
        (StatusCode::BAD_REQUEST, Json(body))
    }

    pub fn bad_request(message: impl Into<String>, fields: Vec<FieldError>) -> (StatusCode, Json<Self>) {
        let body = Self { error: RouterError::BadRequest.to_error_body(message), fields };
        (StatusCode::BAD_REQUEST, Json(body))
    }
}
