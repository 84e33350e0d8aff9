use axum::{
    body::{self, Body},
    extract::{FromRequestParts, RawPathParams, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use tower_cookies::Cookies;

use super::guards::CSRF_FIELD;
use super::schema::{Fields, RequestPart, ValidationError};
use super::{GuardContext, RouteConfig, Stage, ValidatedInput};
use crate::AppState;
use crate::auth::{self, ClientInfo, CurrentSession};
use crate::error::{AppError, Rejection, RequestMeta};
use crate::repository::RepositoryError;
use crate::session::Session;

/// Largest request body buffered for validation.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// State of one mounted route's pipeline layer.
#[derive(Clone)]
pub(crate) struct RouteGuard {
    pub app: AppState,
    pub config: Arc<RouteConfig>,
}

/// Why the pipeline stopped before the handler.
enum Halt {
    Rejected(Rejection),
    Failed(AppError),
}

impl From<Rejection> for Halt {
    fn from(rejection: Rejection) -> Self {
        Halt::Rejected(rejection)
    }
}

impl From<ValidationError> for Halt {
    fn from(err: ValidationError) -> Self {
        Halt::Rejected(classify(err))
    }
}

impl From<RepositoryError> for Halt {
    fn from(err: RepositoryError) -> Self {
        Halt::Failed(AppError::from(err))
    }
}

impl From<AppError> for Halt {
    fn from(err: AppError) -> Self {
        Halt::Failed(err)
    }
}

/// run_pipeline
///
/// Route layer executing a `RouteConfig` for one request. The session resolver has already
/// attached `ClientInfo` (and the session, if the cookie was good). On success the decoded
/// input is stored in the request extensions and the buffered body is handed on unchanged.
pub(crate) async fn run_pipeline(
    State(guard): State<RouteGuard>,
    cookies: Cookies,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let return_path = guard
        .config
        .return_path()
        .unwrap_or(parts.uri.path())
        .to_string();
    let meta = RequestMeta::new(&parts.method, &return_path, &parts.headers);

    match execute(&guard, &cookies, &mut parts, body).await {
        Ok(body) => next.run(Request::from_parts(parts, body)).await,
        Err(Halt::Rejected(rejection)) => rejection.into_response_for(&meta, Some(&cookies)),
        Err(Halt::Failed(err)) => err.into_response(),
    }
}

async fn execute(
    guard: &RouteGuard,
    cookies: &Cookies,
    parts: &mut Parts,
    body: Body,
) -> Result<Body, Halt> {
    let config = guard.config.as_ref();
    let client = parts
        .extensions
        .get::<ClientInfo>()
        .cloned()
        .ok_or(AppError::MissingSession)?;
    let path = parts.uri.path().to_string();
    let mut session = parts.extensions.get::<CurrentSession>().map(|s| s.0.clone());
    let mut input = ValidatedInput::default();

    run_stage(config, Stage::OnRequest, session.as_deref(), &client, &path, &input)?;

    // Every later stage, and every page the handler renders, needs a CSRF token.
    if session.is_none() {
        let created = Arc::new(auth::issue_session(&guard.app, cookies, None, &client).await?);
        parts.extensions.insert(CurrentSession(created.clone()));
        session = Some(created);
    }

    run_stage(config, Stage::PreValidation, session.as_deref(), &client, &path, &input)?;

    let body = decode_input(config, parts, body, &mut input).await?;
    for (part, schema) in config.schemas() {
        let empty = Fields::new();
        schema.validate(part, input.fields(part).unwrap_or(&empty))?;
    }
    run_stage(config, Stage::SchemaValidate, session.as_deref(), &client, &path, &input)?;

    run_stage(config, Stage::PreHandler, session.as_deref(), &client, &path, &input)?;

    parts.extensions.insert(input);
    Ok(body)
}

fn run_stage(
    config: &RouteConfig,
    stage: Stage,
    session: Option<&Session>,
    client: &ClientInfo,
    path: &str,
    input: &ValidatedInput,
) -> Result<(), Rejection> {
    let ctx = GuardContext {
        session,
        client,
        path,
        input,
    };
    config.hooks_for(stage).try_for_each(|hook| hook.run(&ctx))
}

/// A missing or malformed CSRF field is reported as such, not as a generic input error.
fn classify(err: ValidationError) -> Rejection {
    if err.part == RequestPart::Body && err.field == CSRF_FIELD {
        Rejection::RequestToken
    } else {
        Rejection::Validation(err)
    }
}

/// Decodes the request parts that carry a schema. The body is buffered and returned so it
/// can be handed to the handler.
async fn decode_input(
    config: &RouteConfig,
    parts: &mut Parts,
    body: Body,
    input: &mut ValidatedInput,
) -> Result<Body, Halt> {
    if config.schema(RequestPart::Params).is_some() {
        let params = RawPathParams::from_request_parts(parts, &())
            .await
            .map_err(|_| ValidationError::malformed(RequestPart::Params))?;
        let fields = params
            .iter()
            .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
            .collect();
        input.insert(RequestPart::Params, fields);
    }

    if config.schema(RequestPart::Query).is_some() {
        let query = parts.uri.query().unwrap_or_default();
        input.insert(RequestPart::Query, form_fields(query.as_bytes()));
    }

    if config.schema(RequestPart::Body).is_none() {
        return Ok(body);
    }

    let bytes = body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ValidationError::malformed(RequestPart::Body))?;
    let fields = if is_json(&parts.headers) {
        serde_json::from_slice::<Fields>(&bytes)
            .map_err(|_| ValidationError::malformed(RequestPart::Body))?
    } else {
        form_fields(&bytes)
    };
    input.insert(RequestPart::Body, fields);
    Ok(Body::from(bytes))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn form_fields(raw: &[u8]) -> Fields {
    url::form_urlencoded::parse(raw)
        .map(|(name, value)| (name.into_owned(), Value::String(value.into_owned())))
        .collect()
}

/// Input
///
/// Extractor for the input the pipeline decoded and validated. Routes without a schema get
/// an empty set.
#[derive(Debug, Clone, Default)]
pub struct Input(pub ValidatedInput);

impl<S> FromRequestParts<S> for Input
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Input(
            parts
                .extensions
                .get::<ValidatedInput>()
                .cloned()
                .unwrap_or_default(),
        ))
    }
}
