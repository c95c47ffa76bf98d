//! Account listing, profile and owner-only mutation endpoints.

use super::{auth::principal::Caller, parse_id, PageParams, UserPage, UserView};
use crate::{
    accounts::AccountService,
    api::error::{ApiError, ErrorBody},
    error::Error,
    locale::Message,
};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Deserialize, Default)]
pub struct UserUpdate {
    username: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/1.0/users",
    params(PageParams),
    responses(
        (status = 200, description = "Active users ordered by id, without the caller", body = UserPage),
    ),
    tag = "users"
)]
pub async fn list_users(
    caller: Caller,
    Query(params): Query<PageParams>,
    accounts: Extension<AccountService>,
) -> Result<Json<UserPage>, ApiError> {
    let page = accounts
        .list_users(caller.user_id(), params.into())
        .await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    get,
    path = "/api/1.0/users/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Active user", body = UserView),
        (status = 404, description = "Unknown or inactive user", body = ErrorBody),
    ),
    tag = "users"
)]
pub async fn get_user(
    Path(id): Path<String>,
    accounts: Extension<AccountService>,
) -> Result<Json<UserView>, ApiError> {
    let id = parse_id(&id).ok_or(Error::NotFound(Message::UserNotFound))?;
    let user = accounts.find_user(id).await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path = "/api/1.0/users/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    request_body = UserUpdate,
    responses(
        (status = 200, description = "Updated user", body = UserView),
        (status = 400, description = "Validation failure", body = ErrorBody),
        (status = 403, description = "Caller does not own the account", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn update_user(
    Path(id): Path<String>,
    caller: Caller,
    accounts: Extension<AccountService>,
    payload: Option<Json<UserUpdate>>,
) -> Result<Json<UserView>, ApiError> {
    let id = parse_id(&id).ok_or(Error::Forbidden(Message::UnauthorizedUserUpdate))?;
    let update = payload.map(|Json(update)| update).unwrap_or_default();
    let user = accounts
        .update_username(caller.user_id(), id, update.username.as_deref())
        .await?;
    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/api/1.0/users/{id}",
    params(
        ("id" = i64, Path, description = "User id")
    ),
    responses(
        (status = 200, description = "Account, its hoaxes and its sessions deleted"),
        (status = 403, description = "Caller does not own the account", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn delete_user(
    Path(id): Path<String>,
    caller: Caller,
    accounts: Extension<AccountService>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id).ok_or(Error::Forbidden(Message::UnauthorizedUserDelete))?;
    accounts.delete_user(caller.user_id(), id).await?;
    Ok(StatusCode::OK)
}
