/// Invitation endpoints
use crate::{
    account::Role,
    api::extract::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::PortalResult,
    invitation::{Invitation, InvitationPreview, SendInvitationRequest},
    notify,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use validator::Validate;

/// Build invitation routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/invitations", get(list_invitations).post(send_invitation))
        .route("/api/invitations/:id/revoke", post(revoke_invitation))
        .route("/api/invitations/token/:token", get(preview_invitation))
}

/// Sent invitation with the link and text the landlord can share
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentInvitation {
    pub invitation: Invitation,
    pub signup_url: String,
    pub message: String,
    pub email_sent: bool,
}

async fn send_invitation(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<SendInvitationRequest>,
) -> PortalResult<(StatusCode, Json<SentInvitation>)> {
    auth.require_role(Role::Landlord)?;
    req.validate()?;

    let invitation = ctx.invitation_manager.send(&auth.profile.id, req).await?;
    let property = ctx
        .property_manager
        .get_property(&auth.profile, &invitation.property_id)
        .await?;

    let signup_url = ctx.signup_url(&invitation.token);
    let message = notify::invitation_message(invitation.role, &property.name, &signup_url);

    // The invitation stands even when delivery fails; the link can be shared by hand
    let email_sent = if ctx.mailer.is_configured() {
        match ctx
            .mailer
            .send_invitation_email(&invitation.email, invitation.role, &property.name, &signup_url)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(invitation_id = %invitation.id, error = %e, "failed to send invitation email");
                false
            }
        }
    } else {
        false
    };

    tracing::debug!(invitation_id = %invitation.id, email_sent, "invitation link issued");

    Ok((
        StatusCode::CREATED,
        Json(SentInvitation {
            invitation,
            signup_url,
            message,
            email_sent,
        }),
    ))
}

async fn list_invitations(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<Vec<Invitation>>> {
    auth.require_role(Role::Landlord)?;
    Ok(Json(
        ctx.invitation_manager
            .list_for_landlord(&auth.profile.id)
            .await?,
    ))
}

async fn revoke_invitation(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PortalResult<Json<Invitation>> {
    auth.require_role(Role::Landlord)?;
    Ok(Json(ctx.invitation_manager.revoke(&auth.profile.id, &id).await?))
}

/// Public lookup so the signup page can show who is inviting
async fn preview_invitation(
    State(ctx): State<AppContext>,
    Path(token): Path<String>,
) -> PortalResult<Json<InvitationPreview>> {
    Ok(Json(ctx.invitation_manager.preview(&token).await?))
}
