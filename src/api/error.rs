//! Boundary rendering of domain errors and success messages.
//!
//! Handlers never build user-facing text. They return an [`ApiError`] or a
//! [`Notice`]; both produce a bare status response carrying a report in the
//! response extensions. The [`render`] middleware turns that report into JSON
//! using the request path and the locale taken from `Accept-Language`.

use crate::{
    error::Error,
    locale::{Locale, Message},
    session::clock::now_millis,
    validation::FieldErrors,
};
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::error;
use utoipa::ToSchema;

/// Uniform error body.
#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub path: String,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<BTreeMap<String, String>>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct GenericMessage {
    pub message: String,
}

#[derive(Clone, Debug)]
struct ErrorReport {
    message: Message,
    validation_errors: Option<FieldErrors>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    report: ErrorReport,
}

impl ApiError {
    #[must_use]
    pub fn new(status: StatusCode, message: Message) -> Self {
        Self {
            status,
            report: ErrorReport {
                message,
                validation_errors: None,
            },
        }
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation(errors) => Self {
                status: StatusCode::BAD_REQUEST,
                report: ErrorReport {
                    message: Message::ValidationFailure,
                    validation_errors: Some(errors),
                },
            },
            Error::Unauthorized(message) => Self::new(StatusCode::UNAUTHORIZED, message),
            Error::Forbidden(message) => Self::new(StatusCode::FORBIDDEN, message),
            Error::NotFound(message) => Self::new(StatusCode::NOT_FOUND, message),
            Error::InvalidToken(message) => Self::new(StatusCode::BAD_REQUEST, message),
            Error::EmailFailure(_) => Self::new(StatusCode::BAD_GATEWAY, Message::EmailFailure),
            Error::Storage(err) => {
                error!("Request failed: {err:#}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, Message::InternalError)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = self.status.into_response();
        response.extensions_mut().insert(self.report);
        response
    }
}

/// `200 {message}` with a localized text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Notice(pub Message);

impl IntoResponse for Notice {
    fn into_response(self) -> Response {
        let mut response = StatusCode::OK.into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// Middleware that renders [`ApiError`] and [`Notice`] reports.
pub async fn render(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let locale = Locale::from_headers(request.headers());

    let mut response = next.run(request).await;
    let status = response.status();

    if let Some(report) = response.extensions_mut().remove::<ErrorReport>() {
        let body = ErrorBody {
            path,
            timestamp: now_millis(),
            message: report.message.text(locale).to_string(),
            validation_errors: report.validation_errors.map(|errors| {
                errors
                    .into_iter()
                    .map(|(field, message)| (field.to_string(), message.text(locale).to_string()))
                    .collect()
            }),
        };
        return (status, Json(body)).into_response();
    }

    if let Some(Notice(message)) = response.extensions_mut().remove::<Notice>() {
        let body = GenericMessage {
            message: message.text(locale).to_string(),
        };
        return (status, Json(body)).into_response();
    }

    response
}
