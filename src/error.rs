use axum::{
    Json,
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use thiserror::Error;
use tower_cookies::Cookies;

use crate::mail::MailError;
use crate::pipeline::schema::ValidationError;
use crate::repository::RepositoryError;
use crate::views::{self, PageView};

/// Rejection
///
/// Outcome of a guard that stops the pipeline. How it is reported depends on the request
/// (see `into_response_for`), so it is not `IntoResponse` on its own.
#[derive(Debug, Error)]
pub enum Rejection {
    /// Input failed a declared schema constraint.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// The submitted CSRF token is absent or does not match the session's.
    #[error("request token missing")]
    RequestToken,
    /// No valid authenticated session on a protected route.
    #[error("not authenticated")]
    Unauthenticated,
    /// Authenticated, but the user's role is not admitted.
    #[error("role not permitted")]
    Unauthorized,
    /// An already logged-in user hit a guest-only route.
    #[error("already authenticated")]
    AlreadyAuthenticated,
    #[error("rate limit exceeded")]
    RateLimited,
}

/// RequestMeta
///
/// The parts of a request that decide how a rejection is reported.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub method: Method,
    pub path: String,
    /// Set for script-issued requests (`X-Requested-With: XMLHttpRequest`).
    pub ajax: bool,
}

impl RequestMeta {
    pub fn new(method: &Method, path: &str, headers: &HeaderMap) -> Self {
        let ajax = headers
            .get("x-requested-with")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("xmlhttprequest"));
        Self {
            method: method.clone(),
            path: path.to_string(),
            ajax,
        }
    }

    fn is_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

impl Rejection {
    /// into_response_for
    ///
    /// - 429 for rate limiting, with no detail about the limit.
    /// - Redirect to `/login` when unauthenticated, 401 when the role is wrong.
    /// - Validation failures: a "bad request" page on GET; on other methods a plain 400 for
    ///   AJAX requests, otherwise a flash message and a redirect back to the form.
    pub fn into_response_for(self, meta: &RequestMeta, cookies: Option<&Cookies>) -> Response {
        match self {
            Rejection::RateLimited => StatusCode::TOO_MANY_REQUESTS.into_response(),
            Rejection::Unauthenticated => Redirect::to("/login").into_response(),
            Rejection::Unauthorized => StatusCode::UNAUTHORIZED.into_response(),
            Rejection::AlreadyAuthenticated => Redirect::to("/").into_response(),
            Rejection::Validation(_) | Rejection::RequestToken => {
                let message_key = match self {
                    Rejection::RequestToken => "errors.requestToken",
                    _ => "errors.invalidInput",
                };

                if meta.is_read() {
                    let page = PageView::new("bad_request", None)
                        .with_message(Some(message_key.to_string()));
                    return (StatusCode::BAD_REQUEST, Json(page)).into_response();
                }

                match cookies {
                    Some(cookies) if !meta.ajax => {
                        views::flash(cookies, &meta.path, message_key);
                        Redirect::to(&meta.path).into_response()
                    }
                    _ => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
                }
            }
        }
    }
}

/// AppError
///
/// Failures inside route handlers. Lookup misses are reported as a bare 404 so responses
/// never distinguish "expired" from "never existed".
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Repository(RepositoryError),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error("request passed no session resolution")]
    MissingSession,
    #[error("client address unavailable; serve with connect info")]
    ClientAddress,
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => AppError::NotFound,
            other => AppError::Repository(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND.into_response(),
            err => {
                tracing::error!(error = %err, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
