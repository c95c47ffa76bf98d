//! Password recovery endpoints.

use crate::{
    accounts::AccountService,
    api::error::{ApiError, ErrorBody, GenericMessage, Notice},
    locale::Message,
};
use axum::{extract::Extension, Json};
use serde::Deserialize;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Default)]
pub struct PasswordResetRequest {
    email: Option<String>,
}

#[derive(ToSchema, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PasswordUpdate {
    password: Option<String>,
    password_reset_token: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/1.0/user/password",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset mail sent", body = GenericMessage),
        (status = 400, description = "Malformed e-mail", body = ErrorBody),
        (status = 404, description = "No account uses the e-mail", body = ErrorBody),
        (status = 502, description = "Reset mail could not be sent", body = ErrorBody),
    ),
    tag = "password"
)]
#[instrument(skip_all)]
pub async fn request_reset(
    accounts: Extension<AccountService>,
    payload: Option<Json<PasswordResetRequest>>,
) -> Result<Notice, ApiError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    accounts.request_password_reset(request.email.as_deref()).await?;
    Ok(Notice(Message::PasswordResetRequestSuccess))
}

#[utoipa::path(
    put,
    path = "/api/1.0/user/password",
    request_body = PasswordUpdate,
    responses(
        (status = 200, description = "Password replaced, every session revoked", body = GenericMessage),
        (status = 400, description = "Weak password", body = ErrorBody),
        (status = 403, description = "Missing or unknown reset token", body = ErrorBody),
    ),
    tag = "password"
)]
#[instrument(skip_all)]
pub async fn update_password(
    accounts: Extension<AccountService>,
    payload: Option<Json<PasswordUpdate>>,
) -> Result<Notice, ApiError> {
    let update = payload.map(|Json(update)| update).unwrap_or_default();
    accounts
        .update_password(
            update.password_reset_token.as_deref(),
            update.password.as_deref(),
        )
        .await?;
    Ok(Notice(Message::PasswordUpdateSuccess))
}
