use axum::{
    Router,
    extract::FromRef,
    http::HeaderName,
    middleware,
};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Entities, tokens and their lifecycles.
pub mod auth_token;
pub mod models;
pub mod session;
pub mod token;

// Request pipeline: guards, composer, rate limiting, session resolution.
pub mod auth;
pub mod pipeline;
pub mod rate_limit;

// Collaborator contracts and their in-memory implementations.
pub mod mail;
pub mod repository;
pub mod storage;

pub mod config;
pub mod error;
pub mod handlers;
pub mod password;
pub mod views;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use mail::{LogMailer, MailerState};
pub use repository::{AuthTokenRepoState, SessionRepoState, UserRepoState};
pub use storage::{InMemoryAuthTokenRepository, InMemorySessionRepository, InMemoryUserRepository};

/// AppState
///
/// Single cloneable container of the collaborators every request may need. Rate limiters
/// are not here: each belongs to the route that composed it.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRepoState,
    pub auth_tokens: AuthTokenRepoState,
    /// User-management collaborator.
    pub users: UserRepoState,
    pub mailer: MailerState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for SessionRepoState {
    fn from_ref(app_state: &AppState) -> SessionRepoState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AuthTokenRepoState {
    fn from_ref(app_state: &AppState) -> AuthTokenRepoState {
        app_state.auth_tokens.clone()
    }
}

impl FromRef<AppState> for UserRepoState {
    fn from_ref(app_state: &AppState) -> UserRepoState {
        app_state.users.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every route with its pipeline, then the layers all requests pass through:
/// session resolution inside cookie management, inside request-id and tracing.
pub fn create_router(state: AppState) -> Router {
    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(public::public_routes(&state))
        .merge(authenticated::authenticated_routes(&state))
        .merge(admin::admin_routes(&state))
        .fallback(handlers::not_found)
        // Attaches `ClientInfo` and, when the cookie resolves, the session.
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::resolve_session,
        ))
        .layer(CookieManagerLayer::new())
        .with_state(state);

    base_router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace_span_logger)
                    .on_response(
                        DefaultOnResponse::new()
                            .level(Level::INFO)
                            .latency_unit(tower_http::LatencyUnit::Millis),
                    ),
            )
            .layer(PropagateRequestIdLayer::new(x_request_id)),
    )
}

/// trace_span_logger
///
/// Span for one request, correlated by the `x-request-id` set above.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
