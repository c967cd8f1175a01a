/// Background task implementations
use crate::{context::AppContext, error::PortalResult};

/// Cleanup expired sessions
pub async fn cleanup_expired_sessions(ctx: &AppContext) -> PortalResult<u64> {
    ctx.account_manager.cleanup_expired_sessions().await
}

/// Expire gate passes past `valid_until` and pending invitations past their TTL
pub async fn expire_overdue(ctx: &AppContext) -> PortalResult<u64> {
    let passes = ctx.gate_pass_manager.expire_overdue().await?;
    let invitations = ctx.invitation_manager.expire_stale().await?;
    Ok(passes + invitations)
}

/// Fail payment transactions stuck in `pending` or `processing`
pub async fn reconcile_payments(ctx: &AppContext) -> PortalResult<u64> {
    ctx.payment_manager.reconcile_stale().await
}

/// Health check - verify all systems are operational
pub async fn health_check(ctx: &AppContext) -> PortalResult<()> {
    // Check database connectivity
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;

    Ok(())
}
