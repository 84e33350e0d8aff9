use axum::Router;

use crate::models::{Role, RoleSet};
use crate::pipeline::{RouteConfig, authenticate};
use crate::{AppState, handlers};

/// Admin Router Module
///
/// Staff-only pages. Role membership is exact: a logged-in user of any other role gets 401,
/// not a redirect.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    // GET /admin
    RouteConfig::get("/admin")
        .with(authenticate(RoleSet::of(&[Role::Admin, Role::Moderator])))
        .mount(Router::new(), state, handlers::admin)
}
