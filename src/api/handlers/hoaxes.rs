//! Hoax endpoints.

use super::{auth::principal::Caller, parse_id, HoaxPage, PageParams};
use crate::{
    api::error::{ApiError, ErrorBody, GenericMessage, Notice},
    error::Error,
    hoaxes::HoaxService,
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
pub struct HoaxSubmission {
    content: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/1.0/hoaxes",
    request_body = HoaxSubmission,
    responses(
        (status = 200, description = "Hoax stored", body = GenericMessage),
        (status = 400, description = "Content missing or out of bounds", body = ErrorBody),
        (status = 401, description = "No valid session token", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "hoaxes"
)]
#[instrument(skip_all)]
pub async fn submit(
    caller: Caller,
    hoaxes: Extension<HoaxService>,
    payload: Option<Json<HoaxSubmission>>,
) -> Result<Notice, ApiError> {
    let submission = payload.map(|Json(submission)| submission).unwrap_or_default();
    hoaxes
        .submit(caller.user_id(), submission.content.as_deref())
        .await?;
    Ok(Notice(Message::HoaxSubmitSuccess))
}

#[utoipa::path(
    get,
    path = "/api/1.0/hoaxes",
    params(PageParams),
    responses(
        (status = 200, description = "Hoaxes, newest first", body = HoaxPage),
    ),
    tag = "hoaxes"
)]
pub async fn list(
    Query(params): Query<PageParams>,
    hoaxes: Extension<HoaxService>,
) -> Result<Json<HoaxPage>, ApiError> {
    let page = hoaxes.list(None, params.into()).await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    get,
    path = "/api/1.0/users/{id}/hoaxes",
    params(
        ("id" = i64, Path, description = "Author id"),
        PageParams,
    ),
    responses(
        (status = 200, description = "Hoaxes of one author, newest first", body = HoaxPage),
        (status = 404, description = "Unknown or inactive author", body = ErrorBody),
    ),
    tag = "hoaxes"
)]
pub async fn user_hoaxes(
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
    hoaxes: Extension<HoaxService>,
) -> Result<Json<HoaxPage>, ApiError> {
    let id = parse_id(&id).ok_or(Error::NotFound(Message::UserNotFound))?;
    let page = hoaxes.list(Some(id), params.into()).await?;
    Ok(Json(page.into()))
}

#[utoipa::path(
    delete,
    path = "/api/1.0/hoaxes/{id}",
    params(
        ("id" = i64, Path, description = "Hoax id")
    ),
    responses(
        (status = 200, description = "Hoax deleted"),
        (status = 403, description = "Caller did not write the hoax", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "hoaxes"
)]
#[instrument(skip_all)]
pub async fn delete_hoax(
    Path(id): Path<String>,
    caller: Caller,
    hoaxes: Extension<HoaxService>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id).ok_or(Error::Forbidden(Message::UnauthorizedHoaxDelete))?;
    hoaxes.delete(caller.user_id(), id).await?;
    Ok(StatusCode::OK)
}
