/// Property, unit and tenant endpoints
use crate::{
    account::Role,
    api::extract::ApiJson,
    auth::AuthContext,
    context::AppContext,
    error::{PortalError, PortalResult},
    notify::{self, ChatLink},
    property::{
        AssignTenantRequest, CreatePropertyRequest, CreateUnitRequest, Property, TenantSummary,
        Unit, UnitWithTenant, UpdatePropertyRequest, UpdateUnitRequest,
    },
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use validator::Validate;

/// Build property routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/properties", get(list_properties).post(create_property))
        .route(
            "/api/properties/:id",
            get(get_property).put(update_property).delete(delete_property),
        )
        .route("/api/properties/:id/units", get(list_units).post(create_unit))
        .route("/api/units/:id", put(update_unit).delete(delete_unit))
        .route("/api/units/:id/tenant", post(assign_tenant).delete(vacate_unit))
        .route("/api/units/:id/reminder-link", post(reminder_link))
        .route("/api/tenants", get(list_tenants))
}

async fn list_properties(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<Vec<Property>>> {
    Ok(Json(ctx.property_manager.list_properties(&auth.profile).await?))
}

async fn create_property(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreatePropertyRequest>,
) -> PortalResult<(StatusCode, Json<Property>)> {
    auth.require_role(Role::Landlord)?;
    req.validate()?;

    let property = ctx
        .property_manager
        .create_property(&auth.profile.id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(property)))
}

async fn get_property(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PortalResult<Json<Property>> {
    Ok(Json(ctx.property_manager.get_property(&auth.profile, &id).await?))
}

async fn update_property(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdatePropertyRequest>,
) -> PortalResult<Json<Property>> {
    auth.require_role(Role::Landlord)?;
    req.validate()?;
    Ok(Json(
        ctx.property_manager
            .update_property(&auth.profile.id, &id, req)
            .await?,
    ))
}

async fn delete_property(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PortalResult<StatusCode> {
    auth.require_role(Role::Landlord)?;
    ctx.property_manager
        .delete_property(&auth.profile.id, &id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_units(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(property_id): Path<String>,
) -> PortalResult<Json<Vec<UnitWithTenant>>> {
    auth.require_role(Role::Landlord)?;
    Ok(Json(
        ctx.property_manager
            .list_units(&auth.profile.id, &property_id)
            .await?,
    ))
}

async fn create_unit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(property_id): Path<String>,
    ApiJson(req): ApiJson<CreateUnitRequest>,
) -> PortalResult<(StatusCode, Json<Unit>)> {
    auth.require_role(Role::Landlord)?;
    req.validate()?;

    let unit = ctx
        .property_manager
        .create_unit(&auth.profile.id, &property_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

async fn update_unit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateUnitRequest>,
) -> PortalResult<Json<Unit>> {
    auth.require_role(Role::Landlord)?;
    req.validate()?;
    Ok(Json(
        ctx.property_manager
            .update_unit(&auth.profile.id, &id, req)
            .await?,
    ))
}

async fn delete_unit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PortalResult<StatusCode> {
    auth.require_role(Role::Landlord)?;
    ctx.property_manager.delete_unit(&auth.profile.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_tenant(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AssignTenantRequest>,
) -> PortalResult<Json<Unit>> {
    auth.require_role(Role::Landlord)?;
    Ok(Json(
        ctx.property_manager
            .assign_tenant(&auth.profile.id, &id, &req.tenant_id)
            .await?,
    ))
}

async fn vacate_unit(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PortalResult<Json<Unit>> {
    auth.require_role(Role::Landlord)?;
    Ok(Json(ctx.property_manager.vacate_unit(&auth.profile.id, &id).await?))
}

/// Chat link reminding the occupant of the next rent due date
async fn reminder_link(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> PortalResult<Json<ChatLink>> {
    auth.require_role(Role::Landlord)?;

    let (unit, property) = ctx
        .property_manager
        .get_owned_unit(&auth.profile.id, &id)
        .await?;
    let tenant_id = unit
        .tenant_id
        .as_deref()
        .ok_or_else(|| PortalError::Validation("Unit has no tenant".to_string()))?;
    let tenant = ctx.account_manager.get_profile(tenant_id).await?;
    let phone = tenant
        .phone
        .as_deref()
        .ok_or_else(|| PortalError::Validation("Tenant has no phone number".to_string()))?;

    let message = notify::rent_reminder_message(
        &tenant.full_name,
        &unit.unit_number,
        &property.name,
        unit.rent_amount,
        unit.next_due_date(Utc::now().date_naive()),
    );

    Ok(Json(notify::chat_link(phone, &message)?))
}

async fn list_tenants(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<Vec<TenantSummary>>> {
    auth.require_role(Role::Landlord)?;
    Ok(Json(ctx.property_manager.list_tenants(&auth.profile.id).await?))
}
