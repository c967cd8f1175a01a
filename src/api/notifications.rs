/// Chat link endpoint
use crate::{
    api::extract::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::{PortalError, PortalResult},
    notify::{self, ChatLink, ChatLinkRequest},
};
use axum::{routing::post, Json, Router};

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/notifications/whatsapp-link", post(whatsapp_link))
}

async fn whatsapp_link(
    _auth: AuthContext,
    ApiJson(req): ApiJson<ChatLinkRequest>,
) -> PortalResult<Json<ChatLink>> {
    if req.message.trim().is_empty() {
        return Err(PortalError::Validation("message is required".to_string()));
    }
    Ok(Json(notify::chat_link(&req.phone, &req.message)?))
}
