use crate::{
    accounts::{AccountService, Passwords},
    email::Mailer,
    hoaxes::HoaxService,
    session::{spawn_token_reaper, TokenManager},
    store::Stores,
};
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{ACCEPT_LANGUAGE, AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    middleware,
    routing::{delete, get, post},
    Extension, Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod error;
pub(crate) mod handlers;
mod openapi;

pub use handlers::auth::{AuthConfig, DEFAULT_FRONTEND_BASE_URL};
pub use openapi::openapi;

use handlers::{auth, health, hoaxes, password, root, user_register, users};

/// Application routes with the authentication gate and error rendering.
///
/// Transport concerns (request ids, tracing spans, CORS) are added by [`new`].
pub fn router(accounts: AccountService, hoaxes_service: HoaxService, stores: Stores) -> Router {
    let tokens = accounts.tokens().clone();

    Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .route("/api/1.0/auth", post(auth::session::login))
        .route("/api/1.0/logout", post(auth::session::logout))
        .route(
            "/api/1.0/users",
            get(users::list_users).post(user_register::register),
        )
        .route("/api/1.0/users/token/:token", post(user_register::activate))
        .route(
            "/api/1.0/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/1.0/users/:id/hoaxes", get(hoaxes::user_hoaxes))
        .route(
            "/api/1.0/user/password",
            post(password::request_reset).put(password::update_password),
        )
        .route("/api/1.0/hoaxes", get(hoaxes::list).post(hoaxes::submit))
        .route("/api/1.0/hoaxes/:id", delete(hoaxes::delete_hoax))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(middleware::from_fn_with_state(
            tokens,
            auth::gate::authenticate,
        ))
        .layer(middleware::from_fn(error::render))
        .layer(Extension(accounts))
        .layer(Extension(hoaxes_service))
        .layer(Extension(stores))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, stores: Stores, auth_config: AuthConfig, mailer: Mailer) -> Result<()> {
    let tokens = TokenManager::new(stores.tokens.clone(), auth_config.session_stale_window());
    let accounts = AccountService::new(
        stores.users.clone(),
        tokens.clone(),
        mailer,
        Passwords::new()?,
    );
    let hoaxes_service = HoaxService::new(stores.hoaxes.clone(), stores.users.clone());

    let frontend_origin = frontend_origin(auth_config.frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, ACCEPT_LANGUAGE])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin));

    let app = router(accounts, hoaxes_service, stores).layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(cors),
    );

    let reaper = spawn_token_reaper(tokens, auth_config.token_reap_interval());

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    reaper.stop().await?;
    info!("Gracefully shutdown");

    served.map_err(|err| anyhow!("Server error: {err}"))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_drops_path_and_keeps_port() -> Result<()> {
        let origin = frontend_origin("http://localhost:8080/app/")?;
        assert_eq!(origin, "http://localhost:8080");

        let origin = frontend_origin("https://hoaxify.com")?;
        assert_eq!(origin, "https://hoaxify.com");
        Ok(())
    }

    #[test]
    fn frontend_origin_requires_host() {
        assert!(frontend_origin("not a url").is_err());
    }
}
