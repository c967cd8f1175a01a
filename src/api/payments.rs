/// Payment settings, rent payment and provider callback endpoints
use crate::{
    account::Role,
    api::extract::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::PortalResult,
    payment::{
        callback::CallbackAck, InitiatePaymentRequest, PaymentSettingsView, PaymentStatusQuery,
        PaymentTransaction, UpdatePaymentSettingsRequest,
    },
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use validator::Validate;

/// Build payment routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/api/properties/:id/payment-settings",
            get(get_settings).put(update_settings),
        )
        .route("/api/payments", get(list_payments))
        .route("/api/payments/initiate", post(initiate_payment))
        .route("/api/payments/status", get(payment_status))
        .route("/api/payments/callback", post(payment_callback))
}

async fn get_settings(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(property_id): Path<String>,
) -> PortalResult<Json<Option<PaymentSettingsView>>> {
    auth.require_role(Role::Landlord)?;
    Ok(Json(
        ctx.payment_manager
            .get_settings(&auth.profile.id, &property_id)
            .await?,
    ))
}

async fn update_settings(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(property_id): Path<String>,
    ApiJson(req): ApiJson<UpdatePaymentSettingsRequest>,
) -> PortalResult<Json<PaymentSettingsView>> {
    auth.require_role(Role::Landlord)?;
    req.validate()?;

    Ok(Json(
        ctx.payment_manager
            .upsert_settings(&auth.profile.id, &property_id, req)
            .await?,
    ))
}

/// Start a push payment on the tenant's phone
///
/// Responds once the provider has accepted the request; the final status
/// arrives later through the callback.
async fn initiate_payment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<InitiatePaymentRequest>,
) -> PortalResult<(StatusCode, Json<PaymentTransaction>)> {
    auth.require_role(Role::Tenant)?;
    req.validate()?;

    let transaction = ctx.payment_manager.initiate(&auth.profile, req).await?;
    Ok((StatusCode::ACCEPTED, Json(transaction)))
}

async fn payment_status(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(query): Query<PaymentStatusQuery>,
) -> PortalResult<Json<PaymentTransaction>> {
    Ok(Json(
        ctx.payment_manager
            .get_status(&auth.profile, &query)
            .await?,
    ))
}

async fn list_payments(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<Vec<PaymentTransaction>>> {
    Ok(Json(ctx.payment_manager.list_for(&auth.profile).await?))
}

/// Provider callback
///
/// Takes the raw body so a payload that fails to parse is still
/// acknowledged; the provider retries anything else.
async fn payment_callback(State(ctx): State<AppContext>, body: Bytes) -> Json<CallbackAck> {
    Json(ctx.payment_manager.handle_callback(&body).await)
}
