use super::principal::Principal;
use crate::{api::error::ApiError, error::Error, session::TokenManager};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

/// Resolve the bearer token, if any, before the handler runs.
///
/// Only a storage failure stops the request; bad tokens fall through as
/// anonymous.
pub async fn authenticate(
    State(tokens): State<TokenManager>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = extract_bearer_token(request.headers()) {
        match tokens.validate(&token).await {
            Ok(Some(user_id)) => {
                request.extensions_mut().insert(Principal { user_id });
            }
            Ok(None) => debug!("unknown or stale session token, continuing anonymously"),
            Err(err) => return ApiError::from(Error::Storage(err)).into_response(),
        }
    }
    next.run(request).await
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
