use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use serde_json::json;
use tower_cookies::Cookies;

use crate::{
    AppConfig, AppState, AuthTokenRepoState, SessionRepoState, UserRepoState,
    auth::{self, ClientInfo, CurrentSession},
    auth_token::{self, AuthTokenType, EMAIL_VERIFY_TTL_SECS, PASSWORD_RESET_TTL_SECS},
    error::AppError,
    mail::{MailTemplate, OutboundMail},
    models::{AccountState, NewUser, PublicProfile, Role, UserRecord},
    password,
    pipeline::{Input, ValidatedInput, schema::RequestPart},
    repository::RepositoryError,
    token::SecretToken,
    views::{self, PageView},
};

// Every page handler answers with a `PageView` for the template collaborator; every form
// handler answers with a redirect, carrying its outcome as a flash message key.

fn body<'a>(input: &'a ValidatedInput, name: &str) -> &'a str {
    input.str(RequestPart::Body, name).unwrap_or_default()
}

/// Raw token from the `{token}` path segment. The route's schema has already checked it.
fn path_token(input: &ValidatedInput) -> Result<SecretToken, AppError> {
    input
        .str(RequestPart::Params, "token")
        .and_then(SecretToken::parse)
        .ok_or(AppError::NotFound)
}

fn page(view: &str, session: &CurrentSession, cookies: &Cookies, path: &str) -> PageView {
    PageView::new(view, Some(&session.0)).with_message(views::take_flash(cookies, path))
}

fn flash_redirect(cookies: &Cookies, path: &str, message_key: &str) -> Response {
    views::flash(cookies, path, message_key);
    Redirect::to(path).into_response()
}

fn hash_password(password: &str) -> Result<String, AppError> {
    password::hash_password(password).map_err(|e| AppError::PasswordHash(e.to_string()))
}

async fn send_token_mail(
    state: &AppState,
    recipient: &str,
    user: &UserRecord,
    template: MailTemplate,
    token: SecretToken,
) -> Result<(), AppError> {
    state
        .mailer
        .send(OutboundMail {
            recipient: recipient.to_string(),
            username: user.name.clone(),
            template,
            token,
        })
        .await?;
    Ok(())
}

// --- Public Pages ---

/// health
pub async fn health() -> &'static str {
    "ok"
}

pub async fn home(session: CurrentSession, cookies: Cookies) -> Json<PageView> {
    Json(page("home", &session, &cookies, "/"))
}

// --- Login / Logout ---

pub async fn login_page(session: CurrentSession, cookies: Cookies) -> Json<PageView> {
    Json(page("login", &session, &cookies, "/login"))
}

/// login
///
/// Verifies the credentials, refuses accounts that are not active, then replaces the
/// pre-login session with an authenticated one. An unknown address is verified against a
/// dummy hash so the response does not reveal whether the account exists.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    client: ClientInfo,
    CurrentSession(session): CurrentSession,
    Input(input): Input,
) -> Result<Response, AppError> {
    let email = body(&input, "email");
    let password = body(&input, "password");

    let record = match state.users.get_by_email(email).await {
        Ok(record) => Some(record),
        Err(RepositoryError::NotFound) => None,
        Err(err) => return Err(err.into()),
    };
    let verified = match &record {
        Some(record) => password::verify_password(password, &record.password_hash),
        None => password::verify_dummy(password),
    };

    let record = match record {
        Some(record) if verified => record,
        _ => return Ok(flash_redirect(&cookies, "/login", "login.authFailed")),
    };
    if record.state != AccountState::Active {
        return Ok(flash_redirect(&cookies, "/login", record.state.message_key()));
    }

    if let Err(err) = state.sessions.delete(&session.token_hash).await {
        tracing::warn!(token = ?session.token_hash, error = %err, "Could not delete pre-login session");
    }
    auth::issue_session(&state, &cookies, Some(record.principal()), &client).await?;
    tracing::info!(user_id = record.id, "User logged in");

    Ok(Redirect::to("/").into_response())
}

/// Ends an authenticated session and expires the cookie. Anonymous sessions are left to expire.
pub async fn logout(
    State(sessions): State<SessionRepoState>,
    State(config): State<AppConfig>,
    cookies: Cookies,
    CurrentSession(session): CurrentSession,
) -> Response {
    if let Some(user) = session.user {
        if let Err(err) = sessions.delete(&session.token_hash).await {
            tracing::warn!(user_id = user.id, error = %err, "Could not delete session on logout");
        }
        tracing::info!(user_id = user.id, "User logged out");
    }
    cookies.add(auth::expired_session_cookie(&config.cookie));
    Redirect::to("/").into_response()
}

// --- Registration & Verification ---

pub async fn register_page(
    State(config): State<AppConfig>,
    session: CurrentSession,
    cookies: Cookies,
) -> Json<PageView> {
    Json(
        page("register", &session, &cookies, "/register")
            .with_data(json!({ "registration_enabled": config.enable_registration })),
    )
}

/// register
///
/// Creates an unverified account and mails an `email_verify` token. An address that is
/// already registered gets the same answer as a fresh one.
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Input(input): Input,
) -> Result<Response, AppError> {
    if !state.config.enable_registration {
        return Ok(flash_redirect(&cookies, "/register", "register.disabled"));
    }
    if body(&input, "password") != body(&input, "confirm_password") {
        return Ok(flash_redirect(&cookies, "/register", "register.passwordsNotMatching"));
    }

    let new_user = NewUser {
        name: body(&input, "username").to_string(),
        email: body(&input, "email").to_string(),
        password_hash: hash_password(body(&input, "password"))?,
        role: Role::User,
        state: AccountState::Unverified,
    };

    match state.users.create(new_user).await {
        Ok(id) => {
            let record = state.users.get_by_id(id).await?;
            let token = auth_token::issue(
                state.auth_tokens.as_ref(),
                record.principal(),
                AuthTokenType::EmailVerify,
                EMAIL_VERIFY_TTL_SECS,
            )
            .await?;
            send_token_mail(&state, &record.email, &record, MailTemplate::VerifyEmail, token).await?;
            tracing::info!(user_id = id, "User registered");
        }
        Err(RepositoryError::Conflict) => {
            tracing::info!("Registration attempted for an existing address");
        }
        Err(err) => return Err(err.into()),
    }

    Ok(flash_redirect(&cookies, "/login", "register.confirmationPending"))
}

/// verify
///
/// Redeems an `email_verify` token: activates an unverified account or confirms a pending
/// e-mail change. When there is nothing to do the token is left in place.
pub async fn verify(
    State(auth_tokens): State<AuthTokenRepoState>,
    State(users): State<UserRepoState>,
    CurrentSession(session): CurrentSession,
    Input(input): Input,
) -> Result<Response, AppError> {
    let raw = path_token(&input)?;
    let token = auth_token::lookup(auth_tokens.as_ref(), &raw, AuthTokenType::EmailVerify).await?;
    let mut record = users.get_by_id(token.user.id).await?;

    if record.state == AccountState::Unverified {
        // Someone else is logged in on this browser.
        if session.user.is_some() {
            return Ok(Redirect::to("/").into_response());
        }
        record.state = AccountState::Active;
    } else if let Some(new_email) = record.new_email.take() {
        record.email = new_email;
    } else {
        return Ok(Redirect::to("/").into_response());
    }

    if !users.update(&record).await? {
        return Err(AppError::NotFound);
    }
    auth_token::consume(auth_tokens.as_ref(), &token).await?;
    tracing::info!(user_id = record.id, "E-mail verified");

    Ok(Redirect::to("/login").into_response())
}

// --- Password Reset ---

pub async fn forgot_password_page(session: CurrentSession, cookies: Cookies) -> Json<PageView> {
    Json(page("forgot_password", &session, &cookies, "/forgot-password"))
}

/// forgot_password
///
/// Issues a `password_reset` token when the address belongs to an account. The answer is
/// the same either way; failures after the lookup are only logged.
pub async fn forgot_password(
    State(state): State<AppState>,
    cookies: Cookies,
    Input(input): Input,
) -> Result<Response, AppError> {
    match state.users.get_by_email(body(&input, "email")).await {
        Ok(record) => {
            if let Err(err) = send_reset_token(&state, &record).await {
                tracing::error!(user_id = record.id, error = %err, "Could not process password reset request");
            }
        }
        Err(RepositoryError::NotFound) => {}
        Err(err) => return Err(err.into()),
    }

    Ok(flash_redirect(&cookies, "/forgot-password", "forgotPassword.linkSent"))
}

async fn send_reset_token(state: &AppState, record: &UserRecord) -> Result<(), AppError> {
    let token = auth_token::issue(
        state.auth_tokens.as_ref(),
        record.principal(),
        AuthTokenType::PasswordReset,
        PASSWORD_RESET_TTL_SECS,
    )
    .await?;
    send_token_mail(state, &record.email, record, MailTemplate::ResetPassword, token).await
}

/// Form for a live `password_reset` token; 404 otherwise.
pub async fn reset_password_page(
    State(auth_tokens): State<AuthTokenRepoState>,
    session: CurrentSession,
    cookies: Cookies,
    Input(input): Input,
) -> Result<Json<PageView>, AppError> {
    let raw = path_token(&input)?;
    auth_token::lookup(auth_tokens.as_ref(), &raw, AuthTokenType::PasswordReset).await?;

    let path = format!("/reset-password/{}", raw.as_str());
    Ok(Json(
        page("reset_password", &session, &cookies, &path)
            .with_data(json!({ "token": raw.as_str() })),
    ))
}

/// reset_password
///
/// Sets the new password (activating an account that was never verified), then consumes the
/// token.
pub async fn reset_password(
    State(state): State<AppState>,
    cookies: Cookies,
    Input(input): Input,
) -> Result<Response, AppError> {
    let raw = path_token(&input)?;
    let token = auth_token::lookup(state.auth_tokens.as_ref(), &raw, AuthTokenType::PasswordReset).await?;

    if body(&input, "password") != body(&input, "confirm_password") {
        let path = format!("/reset-password/{}", raw.as_str());
        return Ok(flash_redirect(&cookies, &path, "resetPassword.notMatching"));
    }

    let mut record = state.users.get_by_id(token.user.id).await?;
    record.password_hash = hash_password(body(&input, "password"))?;
    if record.state == AccountState::Unverified {
        record.state = AccountState::Active;
    }

    if !state.users.update(&record).await? {
        return Err(AppError::NotFound);
    }
    auth_token::consume(state.auth_tokens.as_ref(), &token).await?;
    tracing::info!(user_id = record.id, "Password reset");

    Ok(flash_redirect(&cookies, "/login", "resetPassword.success"))
}

// --- Authenticated Pages ---

pub async fn dashboard(session: CurrentSession, cookies: Cookies) -> Json<PageView> {
    Json(page("dashboard", &session, &cookies, "/dashboard"))
}

/// Public part of an account. Unknown ids are a bare 404.
pub async fn profile(
    State(users): State<UserRepoState>,
    session: CurrentSession,
    Input(input): Input,
) -> Result<Json<PageView>, AppError> {
    let id = input.i64(RequestPart::Params, "id").ok_or(AppError::NotFound)?;
    let record = users.get_by_id(id).await?;
    let own_profile = session.0.user.is_some_and(|u| u.id == record.id);

    let profile = PublicProfile::from(&record);
    Ok(Json(PageView::new("profile", Some(&session.0)).with_data(json!({
        "profile": profile,
        "own_profile": own_profile,
    }))))
}

pub async fn account_settings_page(
    State(users): State<UserRepoState>,
    session: CurrentSession,
    cookies: Cookies,
) -> Result<Json<PageView>, AppError> {
    let user = session.0.user.ok_or(AppError::MissingSession)?;
    let record = users.get_by_id(user.id).await?;
    Ok(Json(
        page("settings", &session, &cookies, "/settings").with_data(json!({
            "username": record.name,
            "email": record.email,
            "new_email": record.new_email,
        })),
    ))
}

/// update_account
///
/// Renames the account and/or starts an e-mail change. A new address is only recorded as
/// pending: it replaces the current one once the `email_verify` token mailed to it is
/// redeemed.
pub async fn update_account(
    State(state): State<AppState>,
    cookies: Cookies,
    CurrentSession(session): CurrentSession,
    Input(input): Input,
) -> Result<Response, AppError> {
    let user = session.user.ok_or(AppError::MissingSession)?;
    let mut record = state.users.get_by_id(user.id).await?;
    let mut pending_email = None;

    if let Some(email) = input.str(RequestPart::Body, "email") {
        let unchanged = email.eq_ignore_ascii_case(&record.email)
            || record.new_email.as_deref() == Some(email);
        if !unchanged {
            match state.users.get_by_email(email).await {
                Ok(_) => return Ok(flash_redirect(&cookies, "/settings", "settings.emailTaken")),
                Err(RepositoryError::NotFound) => {}
                Err(err) => return Err(err.into()),
            }
            record.new_email = Some(email.to_string());
            pending_email = Some(email.to_string());
        }
    }

    let mut changed = pending_email.is_some();
    if let Some(name) = input.str(RequestPart::Body, "username") {
        if name != record.name {
            record.name = name.to_string();
            changed = true;
        }
    }
    if !changed {
        return Ok(Redirect::to("/settings").into_response());
    }

    match state.users.update(&record).await {
        Ok(true) => {}
        Ok(false) => return Err(AppError::NotFound),
        Err(RepositoryError::Conflict) => {
            return Ok(flash_redirect(&cookies, "/settings", "settings.emailTaken"));
        }
        Err(err) => return Err(err.into()),
    }

    if let Some(email) = pending_email {
        let token = auth_token::issue(
            state.auth_tokens.as_ref(),
            record.principal(),
            AuthTokenType::EmailVerify,
            EMAIL_VERIFY_TTL_SECS,
        )
        .await?;
        send_token_mail(&state, &email, &record, MailTemplate::VerifyEmail, token).await?;
        tracing::info!(user_id = record.id, "E-mail change requested");
    }

    Ok(flash_redirect(&cookies, "/settings", "settings.saved"))
}

pub async fn password_settings_page(session: CurrentSession, cookies: Cookies) -> Json<PageView> {
    Json(page("settings_password", &session, &cookies, "/settings/password"))
}

/// Changes the logged-in user's password.
pub async fn change_password(
    State(users): State<UserRepoState>,
    cookies: Cookies,
    CurrentSession(session): CurrentSession,
    Input(input): Input,
) -> Result<Response, AppError> {
    let user = session.user.ok_or(AppError::MissingSession)?;
    if body(&input, "password") != body(&input, "confirm_password") {
        return Ok(flash_redirect(&cookies, "/settings/password", "settings.passwordsNotMatching"));
    }

    let mut record = users.get_by_id(user.id).await?;
    record.password_hash = hash_password(body(&input, "password"))?;
    if !users.update(&record).await? {
        return Err(AppError::NotFound);
    }
    tracing::info!(user_id = user.id, "Password changed");

    Ok(flash_redirect(&cookies, "/settings/password", "settings.saved"))
}

pub async fn admin(session: CurrentSession) -> Json<PageView> {
    Json(PageView::new("admin", Some(&session.0)))
}

/// Fallback for paths no route matches.
pub async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}
