/// Gate pass endpoints
use crate::{
    account::Role,
    api::extract::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::{PortalError, PortalResult},
    gate_pass::{AccessCodeRequest, CreateGatePassRequest, GatePass, VerifyOutcome},
    notify::{self, ChatLink},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

/// Build gate pass routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/passes", get(list_passes).post(create_pass))
        .route("/api/passes/verify", post(verify_pass))
        .route("/api/passes/checkin", post(check_in))
        .route("/api/passes/checkout", post(check_out))
        .route("/api/passes/:id", get(get_pass))
        .route("/api/passes/:id/cancel", post(cancel_pass))
        .route("/api/passes/:id/share-link", post(share_link))
}

/// Optional override of the number the pass is shared with
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareLinkRequest {
    pub phone: Option<String>,
}

async fn create_pass(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateGatePassRequest>,
) -> PortalResult<(StatusCode, Json<GatePass>)> {
    let pass = ctx.gate_pass_manager.create(&auth.profile, req).await?;
    Ok((StatusCode::CREATED, Json(pass)))
}

async fn list_passes(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<Vec<GatePass>>> {
    Ok(Json(ctx.gate_pass_manager.list_for(&auth.profile).await?))
}

async fn get_pass(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PortalResult<Json<GatePass>> {
    Ok(Json(ctx.gate_pass_manager.get_for(&auth.profile, &id).await?))
}

async fn verify_pass(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<AccessCodeRequest>,
) -> PortalResult<Json<VerifyOutcome>> {
    auth.require_any(&[Role::Guard, Role::Landlord])?;
    Ok(Json(
        ctx.gate_pass_manager
            .verify(&auth.profile, &req.access_code)
            .await?,
    ))
}

async fn check_in(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<AccessCodeRequest>,
) -> PortalResult<Json<GatePass>> {
    auth.require_any(&[Role::Guard, Role::Landlord])?;
    Ok(Json(
        ctx.gate_pass_manager
            .check_in(&auth.profile, &req.access_code)
            .await?,
    ))
}

async fn check_out(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<AccessCodeRequest>,
) -> PortalResult<Json<GatePass>> {
    auth.require_any(&[Role::Guard, Role::Landlord])?;
    Ok(Json(
        ctx.gate_pass_manager
            .check_out(&auth.profile, &req.access_code)
            .await?,
    ))
}

async fn cancel_pass(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PortalResult<Json<GatePass>> {
    auth.require_any(&[Role::Tenant, Role::Landlord])?;
    Ok(Json(ctx.gate_pass_manager.cancel(&auth.profile, &id).await?))
}

/// Chat link sending the access code to the visitor
async fn share_link(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    body: Option<ApiJson<ShareLinkRequest>>,
) -> PortalResult<Json<ChatLink>> {
    auth.require_role(Role::Tenant)?;

    let pass = ctx.gate_pass_manager.get_for(&auth.profile, &id).await?;
    let req = body.map(|ApiJson(b)| b).unwrap_or_default();
    let phone = req
        .phone
        .or_else(|| pass.visitor_phone.clone())
        .ok_or_else(|| PortalError::Validation("Visitor phone number is required".to_string()))?;

    let property = ctx
        .property_manager
        .get_property(&auth.profile, &pass.property_id)
        .await?;

    let message = notify::gate_pass_message(&pass, &property.name);
    Ok(Json(notify::chat_link(&phone, &message)?))
}
