use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_cookies::{
    Cookie, Cookies,
    cookie::{SameSite, time::OffsetDateTime},
};

use crate::{
    AppState,
    config::CookieSettings,
    error::AppError,
    models::User,
    repository::{RepositoryError, SessionRepository},
    session::Session,
    token::SecretToken,
};

/// Name of the cookie holding the raw session token.
pub const SESSION_COOKIE: &str = "wemorize-session";

/// ClientInfo
///
/// Network context a session is bound to. Inserted into the request extensions by
/// `resolve_session` for every request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    // Empty when the client sent no User-Agent header.
    pub user_agent: String,
}

impl ClientInfo {
    /// resolve
    ///
    /// Peer address through the `ConnectInfo` extractor, which also honours `MockConnectInfo`.
    /// A server started without connect info has no address to bind sessions and rate limits
    /// to, so that is an error rather than an empty IP.
    pub async fn resolve(parts: &mut Parts) -> Result<Self, AppError> {
        let ConnectInfo(addr) = ConnectInfo::<SocketAddr>::from_request_parts(parts, &())
            .await
            .map_err(|_| AppError::ClientAddress)?;
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(Self {
            ip: addr.ip().to_string(),
            user_agent,
        })
    }
}

/// CurrentSession Extractor Result
///
/// The session attached to the request, anonymous or authenticated. Every route mounted
/// through a `RouteConfig` has one by the time its handler runs.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Arc<Session>);

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or(AppError::MissingSession)
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ClientInfo>()
            .cloned()
            .ok_or(AppError::MissingSession)
    }
}

/// resolve_session
///
/// Global middleware. Resolves the session cookie to a session valid for this client and
/// attaches it; any failure along the way leaves the request without a session rather than
/// failing it. Only a missing peer address fails the request.
pub async fn resolve_session(
    State(state): State<AppState>,
    cookies: Cookies,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let client = match ClientInfo::resolve(&mut parts).await {
        Ok(client) => client,
        Err(err) => return err.into_response(),
    };
    let mut request = Request::from_parts(parts, body);

    if let Some(session) = lookup_session(state.sessions.as_ref(), &cookies, &client).await {
        request
            .extensions_mut()
            .insert(CurrentSession(Arc::new(session)));
    }
    request.extensions_mut().insert(client);

    next.run(request).await
}

/// lookup_session
///
/// Cookie -> format check -> hash -> repository -> fingerprint. Malformed cookies never reach
/// the repository. A session presented from another device is treated as absent.
pub async fn lookup_session(
    repo: &dyn SessionRepository,
    cookies: &Cookies,
    client: &ClientInfo,
) -> Option<Session> {
    let cookie = cookies.get(SESSION_COOKIE)?;
    let Some(raw) = SecretToken::parse(cookie.value()) else {
        tracing::debug!("Ignoring malformed session cookie");
        return None;
    };

    match repo.get_by_hash(&raw.hash()).await {
        Ok(session) if session.is_valid(&client.ip, &client.user_agent) => Some(session),
        Ok(session) => {
            tracing::warn!(
                token = ?session.token_hash,
                ip = %client.ip,
                "Session presented from a different client"
            );
            None
        }
        Err(RepositoryError::NotFound) => {
            tracing::debug!("Unknown or expired session");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "Session lookup failed, continuing without session");
            None
        }
    }
}

/// create_session
///
/// Creates and stores a session for `user` (anonymous when `None`), returning the raw token
/// for the cookie alongside the stored session.
pub async fn create_session(
    repo: &dyn SessionRepository,
    user: Option<User>,
    client_ip: &str,
    user_agent: &str,
) -> Result<(SecretToken, Session), RepositoryError> {
    let raw = SecretToken::generate();
    let session = Session::create_new(
        &raw,
        user,
        Session::ttl_for(user.as_ref()),
        client_ip,
        user_agent,
    );
    repo.create(session.clone()).await?;
    tracing::debug!(
        user_id = user.map(|u| u.id),
        expires = %session.expires,
        "Session created"
    );
    Ok((raw, session))
}

/// Creates a session for this client and sets the session cookie on the response.
pub async fn issue_session(
    state: &AppState,
    cookies: &Cookies,
    user: Option<User>,
    client: &ClientInfo,
) -> Result<Session, RepositoryError> {
    let (raw, session) =
        create_session(state.sessions.as_ref(), user, &client.ip, &client.user_agent).await?;
    cookies.add(session_cookie(&raw, session.expires, &state.config.cookie));
    Ok(session)
}

pub fn session_cookie(
    raw: &SecretToken,
    expires: DateTime<Utc>,
    settings: &CookieSettings,
) -> Cookie<'static> {
    let mut cookie = base_cookie(raw.as_str().to_string(), settings);
    if let Ok(at) = OffsetDateTime::from_unix_timestamp(expires.timestamp()) {
        cookie.set_expires(at);
    }
    cookie
}

/// Overwrites the session cookie with an empty value that expired long ago.
pub fn expired_session_cookie(settings: &CookieSettings) -> Cookie<'static> {
    let mut cookie = base_cookie(String::new(), settings);
    cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
    cookie
}

fn base_cookie(value: String, settings: &CookieSettings) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, value);
    cookie.set_http_only(true);
    cookie.set_secure(settings.secure);
    cookie.set_same_site(SameSite::Strict);
    if let Some(domain) = &settings.domain {
        cookie.set_domain(domain.clone());
    }
    cookie.set_path(settings.path.clone());
    cookie
}
