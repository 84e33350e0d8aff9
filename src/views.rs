use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_cookies::{Cookie, Cookies};

use crate::models::User;
use crate::session::Session;

/// Cookie carrying a one-shot message key to the next page view of a path.
pub const FLASH_COOKIE: &str = "wemorize-flash";

/// PageView
///
/// Context handed to the template collaborator for a server-rendered page. Every view
/// carries the session's CSRF token so forms on the page can be submitted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PageView {
    pub view: String,
    pub request_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl PageView {
    pub fn new(view: &str, session: Option<&Session>) -> Self {
        Self {
            view: view.to_string(),
            request_token: session.map(|s| s.request_token.clone()).unwrap_or_default(),
            user: session.and_then(|s| s.user),
            message: None,
            data: Value::Null,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// flash
///
/// Queues `message_key` for the next page view of `path`.
pub fn flash(cookies: &Cookies, path: &str, message_key: &str) {
    let mut cookie = Cookie::new(FLASH_COOKIE, message_key.to_string());
    cookie.set_http_only(true);
    cookie.set_path(path.to_string());
    cookies.add(cookie);
}

/// Reads and clears the pending flash message for `path`, if any.
pub fn take_flash(cookies: &Cookies, path: &str) -> Option<String> {
    let message = cookies.get(FLASH_COOKIE)?.value().to_string();
    let mut cookie = Cookie::new(FLASH_COOKIE, "");
    cookie.set_path(path.to_string());
    cookies.remove(cookie);
    (!message.is_empty()).then_some(message)
}
