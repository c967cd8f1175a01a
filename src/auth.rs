/// Authentication extractors and utilities
use crate::{
    account::{Profile, Role, ValidatedSession},
    api::middleware::extract_session_token,
    context::AppContext,
    error::{PortalError, PortalResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

/// Authenticated context - extracts and validates session from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub profile: Profile,
    pub session: ValidatedSession,
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = PortalError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_session_token(&parts.headers)
            .ok_or_else(|| PortalError::Authentication("Missing session token".to_string()))?;

        let session = state.account_manager.validate_access_token(&token).await?;

        // A session can outlive a deleted profile until cleanup runs
        let profile = match state.account_manager.get_profile(&session.profile_id).await {
            Ok(profile) => profile,
            Err(PortalError::NotFound(_)) => {
                return Err(PortalError::Authentication("Profile no longer exists".to_string()))
            }
            Err(e) => return Err(e),
        };

        Ok(AuthContext { profile, session })
    }
}

impl AuthContext {
    pub fn require_role(&self, role: Role) -> PortalResult<()> {
        self.require_any(&[role])
    }

    pub fn require_any(&self, roles: &[Role]) -> PortalResult<()> {
        if roles.contains(&self.profile.role) {
            Ok(())
        } else {
            tracing::warn!(
                profile_id = %self.profile.id,
                role = self.profile.role.as_str(),
                "role not permitted"
            );
            Err(PortalError::Authorization(format!(
                "Requires {} role",
                roles
                    .iter()
                    .map(|r| r.as_str())
                    .collect::<Vec<_>>()
                    .join(" or ")
            )))
        }
    }
}
