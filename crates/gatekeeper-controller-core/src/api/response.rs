// SPDX-FileCopyrightText: OpenTalk GmbH <mail@opentalk.eu>
//
// SPDX-License-Identifier: EUPL-1.2

//! API error responses

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use gatekeeper_permissions::PermissionRepositoryError;
use gatekeeper_resolver::PermissionResolutionError;
use serde::Serialize;
use snafu::{Report, Snafu};

/// Error shape returned to API consumers.
#[derive(Debug, Snafu)]
pub enum ApiError {
    #[snafu(display("resource not found"))]
    NotFound,

    #[snafu(display("{message}"))]
    BadRequest { message: String },

    #[snafu(display("reading permissions timed out"))]
    Timeout,

    #[snafu(display("internal server error"))]
    Internal,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: u16,
    message: &'a str,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = self.to_string();
        HttpResponse::build(status).json(ErrorBody {
            code: status.as_u16(),
            message: &message,
        })
    }
}

impl From<PermissionRepositoryError> for ApiError {
    fn from(error: PermissionRepositoryError) -> Self {
        if error.is_timeout() {
            return ApiError::Timeout;
        }
        log::error!("repository error: {}", Report::from_error(error));
        ApiError::Internal
    }
}

impl From<PermissionResolutionError> for ApiError {
    fn from(error: PermissionResolutionError) -> Self {
        log::error!("resolution error: {}", Report::from_error(error));
        ApiError::Internal
    }
}
