//! Admin endpoint: drain, decommission and status.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::drain::server::DrainService;
use crate::lifecycle::shutdown::Stopper;
use crate::lifecycle::state::Lifecycle;
use crate::node::membership::Membership;

/// Shared state of the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub drain: DrainService,
    pub lifecycle: Lifecycle,
    pub stopper: Stopper,
    pub membership: Membership,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/drain", post(drain))
        .route("/admin/decommission", post(decommission))
        .route("/admin/status", get(get_status))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
