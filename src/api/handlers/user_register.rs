//! Registration and activation endpoints.

use crate::{
    accounts::{AccountService, Registration},
    api::error::{ApiError, ErrorBody, GenericMessage, Notice},
    locale::Message,
};
use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Default)]
pub struct RegisterRequest {
    username: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/1.0/users",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created, activation mail sent", body = GenericMessage),
        (status = 400, description = "Validation failure", body = ErrorBody),
        (status = 502, description = "Activation mail could not be sent, nothing was stored", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn register(
    accounts: Extension<AccountService>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<Notice, ApiError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    accounts
        .register(Registration {
            username: request.username,
            email: request.email,
            password: request.password,
        })
        .await?;
    Ok(Notice(Message::UserCreateSuccess))
}

#[utoipa::path(
    post,
    path = "/api/1.0/users/token/{token}",
    params(
        ("token" = String, Path, description = "Activation token from the e-mail")
    ),
    responses(
        (status = 200, description = "Account activated", body = GenericMessage),
        (status = 400, description = "Unknown or already used token", body = ErrorBody),
    ),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn activate(
    Path(token): Path<String>,
    accounts: Extension<AccountService>,
) -> Result<Notice, ApiError> {
    accounts.activate(&token).await?;
    Ok(Notice(Message::AccountActivationSuccess))
}
