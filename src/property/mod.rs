/// Properties, units and occupancy
///
/// A property belongs to exactly one landlord; ownership is equality on
/// `landlord_id`. A unit is occupied when its `tenant_id` is set, and a
/// tenant occupies at most one unit.

mod manager;

pub use manager::PropertyManager;

use crate::{
    account::Profile,
    error::{PortalError, PortalResult},
};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use validator::Validate;

pub(crate) const PROPERTY_COLUMNS: &str =
    "id, landlord_id, name, address, description, unit_count, created_at, updated_at";

pub(crate) const UNIT_COLUMNS: &str =
    "id, property_id, unit_number, tenant_id, rent_amount, due_day, created_at, updated_at";

/// Property record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub landlord_id: String,
    pub name: String,
    pub address: String,
    pub description: Option<String>,
    pub unit_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Property {
    pub(crate) fn from_row(row: &SqliteRow) -> PortalResult<Self> {
        Ok(Property {
            id: row.try_get("id")?,
            landlord_id: row.try_get("landlord_id")?,
            name: row.try_get("name")?,
            address: row.try_get("address")?,
            description: row.try_get("description")?,
            unit_count: row.try_get("unit_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Unit record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub id: String,
    pub property_id: String,
    pub unit_number: String,
    pub tenant_id: Option<String>,
    /// Monthly rent in whole shillings
    pub rent_amount: i64,
    /// Day of month rent falls due (1..=28)
    pub due_day: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    pub(crate) fn from_row(row: &SqliteRow) -> PortalResult<Self> {
        Ok(Unit {
            id: row.try_get("id")?,
            property_id: row.try_get("property_id")?,
            unit_number: row.try_get("unit_number")?,
            tenant_id: row.try_get("tenant_id")?,
            rent_amount: row.try_get("rent_amount")?,
            due_day: row.try_get("due_day")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    pub fn is_occupied(&self) -> bool {
        self.tenant_id.is_some()
    }

    /// First due date on or after `today`
    pub fn next_due_date(&self, today: NaiveDate) -> NaiveDate {
        next_due_date(today, self.due_day)
    }
}

/// Next occurrence of `due_day` on or after `today`
///
/// `due_day` is clamped to 1..=28 so it exists in every month.
pub fn next_due_date(today: NaiveDate, due_day: i64) -> NaiveDate {
    let day = due_day.clamp(1, 28) as u32;
    if today.day() <= day {
        return today.with_day(day).unwrap_or(today);
    }

    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(today)
}

/// Unit together with its occupant, as shown to the landlord
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitWithTenant {
    #[serde(flatten)]
    pub unit: Unit,
    pub tenant: Option<Profile>,
}

/// Tenant occupying a unit in one of the landlord's properties
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSummary {
    pub profile: Profile,
    pub unit_id: String,
    pub unit_number: String,
    pub rent_amount: i64,
    pub due_day: i64,
    pub property_id: String,
    pub property_name: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePropertyRequest {
    #[validate(length(min = 1, max = 200, message = "is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 500, message = "is required"))]
    pub address: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePropertyRequest {
    #[validate(length(min = 1, max = 200, message = "must not be empty"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 500, message = "must not be empty"))]
    pub address: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateUnitRequest {
    #[validate(length(min = 1, max = 50, message = "is required"))]
    pub unit_number: String,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub rent_amount: i64,
    #[validate(range(min = 1, max = 28, message = "must be between 1 and 28"))]
    pub due_day: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUnitRequest {
    #[validate(length(min = 1, max = 50, message = "must not be empty"))]
    pub unit_number: Option<String>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub rent_amount: Option<i64>,
    #[validate(range(min = 1, max = 28, message = "must be between 1 and 28"))]
    pub due_day: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignTenantRequest {
    pub tenant_id: String,
}

/// Load a property and check the caller owns it
///
/// Absent is 404, someone else's is 403.
pub async fn load_owned_property(
    db: &SqlitePool,
    property_id: &str,
    landlord_id: &str,
) -> PortalResult<Property> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM properties WHERE id = ?1",
        PROPERTY_COLUMNS
    ))
    .bind(property_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| PortalError::NotFound("Property not found".to_string()))?;

    let property = Property::from_row(&row)?;
    if property.landlord_id != landlord_id {
        return Err(PortalError::Authorization(
            "Property belongs to another landlord".to_string(),
        ));
    }

    Ok(property)
}

/// Unit currently occupied by a tenant, if any
pub async fn unit_for_tenant(db: &SqlitePool, tenant_id: &str) -> PortalResult<Option<Unit>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM units WHERE tenant_id = ?1 LIMIT 1",
        UNIT_COLUMNS
    ))
    .bind(tenant_id)
    .fetch_optional(db)
    .await?;

    row.as_ref().map(Unit::from_row).transpose()
}
