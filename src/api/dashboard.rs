/// Role dashboards
///
/// Each portal's landing page is a single JSON summary assembled from the
/// caller's own properties, units, passes and payments.
use crate::{
    account::{Profile, Role},
    auth::AuthContext,
    context::AppContext,
    error::PortalResult,
    gate_pass::{GatePass, GatePassStatus},
    invitation::InvitationStatus,
    payment::{PaymentStatus, PaymentTransaction},
    property::{self, Property, Unit},
};
use axum::{extract::State, routing::get, Json, Router};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

const RECENT_PAYMENTS: usize = 5;

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/landlord/dashboard", get(landlord_dashboard))
        .route("/tenant/dashboard", get(tenant_dashboard))
        .route("/guard/dashboard", get(guard_dashboard))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LandlordDashboard {
    pub profile: Profile,
    pub property_count: usize,
    pub unit_count: i64,
    pub occupied_units: i64,
    pub vacant_units: i64,
    pub tenant_count: usize,
    pub pending_invitations: usize,
    /// Sum of rent across occupied units
    pub monthly_rent_roll: i64,
    pub collected_this_month: i64,
    pub recent_payments: Vec<PaymentTransaction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantUnit {
    #[serde(flatten)]
    pub unit: Unit,
    pub property_name: String,
    pub next_due_date: NaiveDate,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDashboard {
    pub profile: Profile,
    pub unit: Option<TenantUnit>,
    pub active_passes: Vec<GatePass>,
    pub recent_payments: Vec<PaymentTransaction>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardDashboard {
    pub profile: Profile,
    pub property: Option<Property>,
    /// Pending passes whose window opens within the next day
    pub expected_visitors: Vec<GatePass>,
    pub checked_in_visitors: Vec<GatePass>,
}

async fn landlord_dashboard(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<LandlordDashboard>> {
    auth.require_role(Role::Landlord)?;
    let profile = auth.profile;

    let properties = ctx.property_manager.list_properties(&profile).await?;
    let tenants = ctx.property_manager.list_tenants(&profile.id).await?;
    let invitations = ctx.invitation_manager.list_for_landlord(&profile.id).await?;
    let payments = ctx.payment_manager.list_for(&profile).await?;

    let unit_count: i64 = properties.iter().map(|p| p.unit_count).sum();
    let occupied_units = tenants.len() as i64;
    let now = Utc::now();

    Ok(Json(LandlordDashboard {
        property_count: properties.len(),
        unit_count,
        occupied_units,
        vacant_units: (unit_count - occupied_units).max(0),
        tenant_count: tenants.len(),
        pending_invitations: invitations
            .iter()
            .filter(|i| i.status == InvitationStatus::Pending)
            .count(),
        monthly_rent_roll: tenants.iter().map(|t| t.rent_amount).sum(),
        collected_this_month: payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed && same_month(p.created_at, now))
            .map(|p| p.amount)
            .sum(),
        recent_payments: payments
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .take(RECENT_PAYMENTS)
            .collect(),
        profile,
    }))
}

async fn tenant_dashboard(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<TenantDashboard>> {
    auth.require_role(Role::Tenant)?;
    let profile = auth.profile;

    let unit = match property::unit_for_tenant(&ctx.db, &profile.id).await? {
        Some(unit) => {
            let property = ctx
                .property_manager
                .get_property(&profile, &unit.property_id)
                .await?;
            Some(TenantUnit {
                next_due_date: unit.next_due_date(Utc::now().date_naive()),
                property_name: property.name,
                unit,
            })
        }
        None => None,
    };

    let active_passes = ctx
        .gate_pass_manager
        .list_for(&profile)
        .await?
        .into_iter()
        .filter(|p| matches!(p.status, GatePassStatus::Pending | GatePassStatus::CheckedIn))
        .collect();

    let mut recent_payments = ctx.payment_manager.list_for(&profile).await?;
    recent_payments.truncate(RECENT_PAYMENTS);

    Ok(Json(TenantDashboard {
        profile,
        unit,
        active_passes,
        recent_payments,
    }))
}

async fn guard_dashboard(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> PortalResult<Json<GuardDashboard>> {
    auth.require_role(Role::Guard)?;
    let profile = auth.profile;

    let property = match profile.property_id.as_deref() {
        Some(id) => Some(ctx.property_manager.get_property(&profile, id).await?),
        None => None,
    };

    let now = Utc::now();
    let horizon = now + Duration::hours(24);
    let (expected_visitors, checked_in_visitors): (Vec<GatePass>, Vec<GatePass>) = ctx
        .gate_pass_manager
        .list_for(&profile)
        .await?
        .into_iter()
        .filter(|p| match p.status {
            GatePassStatus::Pending => p.valid_from <= horizon && p.valid_until >= now,
            GatePassStatus::CheckedIn => true,
            _ => false,
        })
        .partition(|p| p.status == GatePassStatus::Pending);

    Ok(Json(GuardDashboard {
        profile,
        property,
        expected_visitors,
        checked_in_visitors,
    }))
}

fn same_month(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}
