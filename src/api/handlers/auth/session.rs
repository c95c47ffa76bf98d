//! Login and logout endpoints.

use super::gate::extract_bearer_token;
use crate::{
    accounts::AccountService,
    api::error::{ApiError, ErrorBody, GenericMessage, Notice},
    locale::Message,
    store::UserId,
};
use axum::{extract::Extension, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Default)]
pub struct Credentials {
    email: Option<String>,
    password: Option<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct LoginResponse {
    id: UserId,
    username: String,
    token: String,
}

#[utoipa::path(
    post,
    path = "/api/1.0/auth",
    request_body = Credentials,
    responses(
        (status = 200, description = "Session token issued", body = LoginResponse),
        (status = 401, description = "Incorrect credentials", body = ErrorBody),
        (status = 403, description = "Account not activated yet", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    accounts: Extension<AccountService>,
    payload: Option<Json<Credentials>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let credentials = payload.map(|Json(credentials)| credentials).unwrap_or_default();
    let grant = accounts
        .login(credentials.email.as_deref(), credentials.password.as_deref())
        .await?;
    Ok(Json(LoginResponse {
        id: grant.id,
        username: grant.username,
        token: grant.token,
    }))
}

#[utoipa::path(
    post,
    path = "/api/1.0/logout",
    responses(
        (status = 200, description = "Presented token revoked", body = GenericMessage),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn logout(
    headers: HeaderMap,
    accounts: Extension<AccountService>,
) -> Result<Notice, ApiError> {
    accounts
        .logout(extract_bearer_token(&headers).as_deref())
        .await?;
    Ok(Notice(Message::LogoutSuccess))
}
