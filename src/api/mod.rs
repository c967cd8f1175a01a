/// API routes and handlers
pub mod auth;
pub mod dashboard;
pub mod extract;
pub mod health;
pub mod invitations;
pub mod middleware;
pub mod notifications;
pub mod passes;
pub mod payments;
pub mod properties;

use crate::context::AppContext;
use axum::Router;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(health::routes())
        .merge(auth::routes())
        .merge(dashboard::routes())
        .merge(properties::routes())
        .merge(invitations::routes())
        .merge(passes::routes())
        .merge(payments::routes())
        .merge(notifications::routes())
}
