//! Per-route request pipeline.
//!
//! A route is described by a `RouteConfig` built from its method, path and a chain of guards.
//! Guards are plain `RouteConfig -> RouteConfig` functions that attach hooks to one of four
//! fixed stages and merge schemas into the route's request parts. `mount` installs the
//! finished configuration in front of the handler.

use axum::{
    Router,
    handler::Handler,
    middleware,
    routing::{MethodFilter, on},
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::AppState;
use crate::auth::ClientInfo;
use crate::error::Rejection;
use crate::session::Session;

pub mod guards;
mod runner;
pub mod schema;

pub use guards::{
    authenticate, check_token, guard_non_authenticated, ip_rate_limit, user_rate_limit, validate,
};
pub use runner::Input;
use schema::{Fields, RequestPart, Schema};

/// Stage
///
/// Execution points of the pipeline, in the order they run. Between `OnRequest` and
/// `PreValidation` the runner attaches an anonymous session if the request has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    OnRequest,
    PreValidation,
    SchemaValidate,
    PreHandler,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::OnRequest,
        Stage::PreValidation,
        Stage::SchemaValidate,
        Stage::PreHandler,
    ];
}

/// Decoded request input, per request part. Only parts that carry a schema are decoded.
#[derive(Debug, Clone, Default)]
pub struct ValidatedInput {
    parts: BTreeMap<RequestPart, Fields>,
}

impl ValidatedInput {
    pub(crate) fn insert(&mut self, part: RequestPart, fields: Fields) {
        self.parts.insert(part, fields);
    }

    pub fn fields(&self, part: RequestPart) -> Option<&Fields> {
        self.parts.get(&part)
    }

    pub fn get(&self, part: RequestPart, name: &str) -> Option<&Value> {
        self.parts.get(&part)?.get(name)
    }

    pub fn str(&self, part: RequestPart, name: &str) -> Option<&str> {
        self.get(part, name)?.as_str()
    }

    /// Integer field; path and form values arrive as numeric text.
    pub fn i64(&self, part: RequestPart, name: &str) -> Option<i64> {
        match self.get(part, name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

/// What a hook sees of the request it is guarding.
pub struct GuardContext<'a> {
    pub session: Option<&'a Session>,
    pub client: &'a ClientInfo,
    pub path: &'a str,
    pub input: &'a ValidatedInput,
}

impl GuardContext<'_> {
    /// The session's user, if the session is valid for this client.
    pub fn authenticated_user(&self) -> Option<crate::models::User> {
        self.session
            .and_then(|s| s.authenticated_user(&self.client.ip, &self.client.user_agent))
    }
}

pub type Hook = Arc<dyn Fn(&GuardContext<'_>) -> Result<(), Rejection> + Send + Sync>;

#[derive(Clone)]
pub struct StageHook {
    pub stage: Stage,
    pub name: &'static str,
    hook: Hook,
}

impl StageHook {
    pub fn run(&self, ctx: &GuardContext<'_>) -> Result<(), Rejection> {
        (self.hook)(ctx)
    }
}

impl fmt::Debug for StageHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageHook")
            .field("stage", &self.stage)
            .field("name", &self.name)
            .finish()
    }
}

/// RouteConfig
///
/// Everything the dispatcher needs for one route: accepted methods, path, a schema per
/// request part and the hooks of every stage in attach order.
#[derive(Clone, Debug)]
pub struct RouteConfig {
    methods: MethodFilter,
    path: String,
    schemas: BTreeMap<RequestPart, Schema>,
    hooks: Vec<StageHook>,
    csrf_protected: bool,
    return_to: Option<String>,
}

impl RouteConfig {
    pub fn new(methods: MethodFilter, path: &str) -> Self {
        Self {
            methods,
            path: path.to_string(),
            schemas: BTreeMap::new(),
            hooks: Vec::new(),
            csrf_protected: false,
            return_to: None,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(MethodFilter::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(MethodFilter::POST, path)
    }

    /// Applies a guard. Guards applied earlier run earlier within the same stage.
    pub fn with<G>(self, guard: G) -> Self
    where
        G: FnOnce(RouteConfig) -> RouteConfig,
    {
        guard(self)
    }

    /// Appends a hook to `stage`.
    pub fn hook<F>(mut self, stage: Stage, name: &'static str, hook: F) -> Self
    where
        F: Fn(&GuardContext<'_>) -> Result<(), Rejection> + Send + Sync + 'static,
    {
        self.hooks.push(StageHook {
            stage,
            name,
            hook: Arc::new(hook),
        });
        self
    }

    /// Accumulates `schema` into the schema of `part`.
    pub fn merge_schema(mut self, part: RequestPart, schema: Schema) -> Self {
        self.schemas.entry(part).or_default().merge(schema);
        self
    }

    /// Page a rejected form submission is redirected back to. Defaults to the request path,
    /// which only works for routes that also answer GET.
    pub fn return_to(mut self, path: &str) -> Self {
        self.return_to = Some(path.to_string());
        self
    }

    pub fn return_path(&self) -> Option<&str> {
        self.return_to.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn schema(&self, part: RequestPart) -> Option<&Schema> {
        self.schemas.get(&part)
    }

    pub fn schemas(&self) -> impl Iterator<Item = (RequestPart, &Schema)> {
        self.schemas.iter().map(|(part, schema)| (*part, schema))
    }

    pub fn is_csrf_protected(&self) -> bool {
        self.csrf_protected
    }

    pub(crate) fn mark_csrf_protected(mut self) -> Self {
        self.csrf_protected = true;
        self
    }

    pub fn hooks_for(&self, stage: Stage) -> impl Iterator<Item = &StageHook> {
        self.hooks.iter().filter(move |h| h.stage == stage)
    }

    /// Hook names in execution order, stage by stage.
    pub fn stage_plan(&self) -> Vec<(Stage, &'static str)> {
        Stage::ALL
            .iter()
            .flat_map(|stage| self.hooks_for(*stage).map(|h| (h.stage, h.name)))
            .collect()
    }

    /// mount
    ///
    /// Registers `handler` on `router` at this configuration's path and methods, with the
    /// pipeline runner as a route layer in front of it.
    pub fn mount<H, T>(self, router: Router<AppState>, app: &AppState, handler: H) -> Router<AppState>
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let methods = self.methods;
        let path = self.path.clone();
        let guard = runner::RouteGuard {
            app: app.clone(),
            config: Arc::new(self),
        };

        router.route(
            &path,
            on(methods, handler)
                .route_layer(middleware::from_fn_with_state(guard, runner::run_pipeline)),
        )
    }
}
