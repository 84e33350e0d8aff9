#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{self, Body},
    extract::connect_info::MockConnectInfo,
    http::{Request, Response, header},
    middleware,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tower_cookies::CookieManagerLayer;
use wemorize::{
    AppConfig, AppState, InMemoryAuthTokenRepository, InMemorySessionRepository,
    InMemoryUserRepository, auth,
    mail::{MailError, Mailer, OutboundMail},
    models::{AccountState, NewUser, Role, User},
    repository::{SessionRepository, UserRepository},
    session::Session,
};

pub const CLIENT_IP: [u8; 4] = [203, 0, 113, 7];
pub const USER_AGENT: &str = "integration-test/1.0";

// --- Recording Mailer ---

/// Keeps every message instead of delivering it, so tests can read the secrets.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OutboundMail>>,
}

impl RecordingMailer {
    pub fn last(&self) -> Option<OutboundMail> {
        self.sent.lock().unwrap().last().cloned()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(mail);
        Ok(())
    }
}

// --- Test Application ---

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub sessions: Arc<InMemorySessionRepository>,
    pub auth_tokens: Arc<InMemoryAuthTokenRepository>,
    pub users: Arc<InMemoryUserRepository>,
    pub mailer: Arc<RecordingMailer>,
}

pub fn create_app_state(config: AppConfig) -> TestApp {
    create_app_with_sessions(config, None)
}

/// Builds the real router over in-memory collaborators. `sessions` replaces the session
/// repository the router uses (the `sessions` field still holds a fresh in-memory one).
pub fn create_app_with_sessions(
    config: AppConfig,
    sessions: Option<Arc<dyn SessionRepository>>,
) -> TestApp {
    let memory_sessions = Arc::new(InMemorySessionRepository::new());
    let auth_tokens = Arc::new(InMemoryAuthTokenRepository::new());
    let users = Arc::new(InMemoryUserRepository::new());
    let mailer = Arc::new(RecordingMailer::default());

    let state = AppState {
        sessions: sessions.unwrap_or_else(|| memory_sessions.clone() as Arc<dyn SessionRepository>),
        auth_tokens: auth_tokens.clone(),
        users: users.clone(),
        mailer: mailer.clone(),
        config,
    };
    let router = wemorize::create_router(state.clone())
        .layer(MockConnectInfo(SocketAddr::from((CLIENT_IP, 40_000))));

    TestApp {
        router,
        state,
        sessions: memory_sessions,
        auth_tokens,
        users,
        mailer,
    }
}

pub fn spawn_default() -> TestApp {
    create_app_state(AppConfig::default())
}

pub fn client_ip() -> String {
    std::net::IpAddr::from(CLIENT_IP).to_string()
}

impl TestApp {
    /// Serves extra routes over this app's state, behind the same session and cookie layers
    /// as the real router.
    pub fn serve_routes(&self, routes: Router<AppState>) -> Router {
        routes
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                auth::resolve_session,
            ))
            .layer(CookieManagerLayer::new())
            .with_state(self.state.clone())
            .layer(MockConnectInfo(SocketAddr::from((CLIENT_IP, 40_000))))
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> Response<Body> {
        self.send(request("GET", path, cookie).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_form(
        &self,
        path: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> Response<Body> {
        self.send(form_request(path, cookie, fields, false)).await
    }

    pub async fn post_ajax(
        &self,
        path: &str,
        cookie: Option<&str>,
        fields: &[(&str, &str)],
    ) -> Response<Body> {
        self.send(form_request(path, cookie, fields, true)).await
    }

    /// Creates an account directly in the user store.
    pub async fn seed_user(&self, email: &str, password_hash: &str, role: Role, state: AccountState) -> User {
        let id = self
            .users
            .create(NewUser {
                name: "Ada Lovelace".to_string(),
                email: email.to_string(),
                password_hash: password_hash.to_string(),
                role,
                state,
            })
            .await
            .unwrap();
        User { id, role }
    }

    /// Logs `user` in without going through the form: returns the cookie value and session.
    pub async fn login_as(&self, user: Option<User>) -> (String, Session) {
        let (raw, session) = auth::create_session(
            self.state.sessions.as_ref(),
            user,
            &client_ip(),
            USER_AGENT,
        )
        .await
        .unwrap();
        (raw.as_str().to_string(), session)
    }
}

// --- Request / Response Helpers ---

pub fn request(method: &str, path: &str, cookie: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::USER_AGENT, USER_AGENT);
    match cookie {
        Some(value) => builder.header(header::COOKIE, format!("{}={}", auth::SESSION_COOKIE, value)),
        None => builder,
    }
}

pub fn form_request(
    path: &str,
    cookie: Option<&str>,
    fields: &[(&str, &str)],
    ajax: bool,
) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields)
        .finish();
    let mut builder = request("POST", path, cookie)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if ajax {
        builder = builder.header("x-requested-with", "XMLHttpRequest");
    }
    builder.body(Body::from(body)).unwrap()
}

/// All `Set-Cookie` headers of a response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Value of the `Set-Cookie` for `name`, if the response sets one.
pub fn cookie_value(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    set_cookies(response).into_iter().find_map(|c| {
        c.split(';')
            .next()
            .and_then(|pair| pair.strip_prefix(prefix.as_str()))
            .map(str::to_string)
    })
}

pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    cookie_value(response, auth::SESSION_COOKIE)
}

pub fn flash(response: &Response<Body>) -> Option<String> {
    cookie_value(response, wemorize::views::FLASH_COOKIE)
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
