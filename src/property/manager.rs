/// Property and unit manager
use super::{
    load_owned_property, CreatePropertyRequest, CreateUnitRequest, Property, TenantSummary,
    UnitWithTenant, Unit, UpdatePropertyRequest, UpdateUnitRequest, PROPERTY_COLUMNS,
    UNIT_COLUMNS,
};
use crate::{
    account::{Profile, Role, PROFILE_COLUMNS},
    error::{is_unique_violation, PortalError, PortalResult},
};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Property manager
#[derive(Clone)]
pub struct PropertyManager {
    db: SqlitePool,
}

impl PropertyManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Create a property owned by the landlord
    pub async fn create_property(
        &self,
        landlord_id: &str,
        req: CreatePropertyRequest,
    ) -> PortalResult<Property> {
        let now = Utc::now();
        let property = Property {
            id: Uuid::new_v4().to_string(),
            landlord_id: landlord_id.to_string(),
            name: req.name.trim().to_string(),
            address: req.address.trim().to_string(),
            description: req.description.filter(|d| !d.trim().is_empty()),
            unit_count: 0,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            "INSERT INTO properties (id, landlord_id, name, address, description, unit_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
        )
        .bind(&property.id)
        .bind(&property.landlord_id)
        .bind(&property.name)
        .bind(&property.address)
        .bind(&property.description)
        .bind(now)
        .execute(&self.db)
        .await?;

        tracing::info!(property_id = %property.id, landlord_id, "property created");

        Ok(property)
    }

    /// Properties visible to the caller
    ///
    /// Landlords see what they own, tenants the property of their unit,
    /// guards the property they are stationed at.
    pub async fn list_properties(&self, profile: &Profile) -> PortalResult<Vec<Property>> {
        let rows = match profile.role {
            Role::Landlord => {
                sqlx::query(&format!(
                    "SELECT {} FROM properties WHERE landlord_id = ?1 ORDER BY created_at DESC",
                    PROPERTY_COLUMNS
                ))
                .bind(&profile.id)
                .fetch_all(&self.db)
                .await?
            }
            Role::Tenant => {
                sqlx::query(&format!(
                    "SELECT {} FROM properties WHERE id IN (SELECT property_id FROM units WHERE tenant_id = ?1)",
                    PROPERTY_COLUMNS
                ))
                .bind(&profile.id)
                .fetch_all(&self.db)
                .await?
            }
            Role::Guard => {
                sqlx::query(&format!(
                    "SELECT {} FROM properties WHERE id = ?1",
                    PROPERTY_COLUMNS
                ))
                .bind(&profile.property_id)
                .fetch_all(&self.db)
                .await?
            }
        };

        rows.iter().map(Property::from_row).collect()
    }

    /// Get a property the caller is allowed to see
    pub async fn get_property(&self, profile: &Profile, property_id: &str) -> PortalResult<Property> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM properties WHERE id = ?1",
            PROPERTY_COLUMNS
        ))
        .bind(property_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PortalError::NotFound("Property not found".to_string()))?;
        let property = Property::from_row(&row)?;

        let visible = match profile.role {
            Role::Landlord => property.landlord_id == profile.id,
            Role::Guard => profile.property_id.as_deref() == Some(property.id.as_str()),
            Role::Tenant => {
                let count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM units WHERE property_id = ?1 AND tenant_id = ?2",
                )
                .bind(&property.id)
                .bind(&profile.id)
                .fetch_one(&self.db)
                .await?;
                count > 0
            }
        };

        if !visible {
            return Err(PortalError::Authorization(
                "Not permitted to view this property".to_string(),
            ));
        }

        Ok(property)
    }

    pub async fn update_property(
        &self,
        landlord_id: &str,
        property_id: &str,
        req: UpdatePropertyRequest,
    ) -> PortalResult<Property> {
        let current = load_owned_property(&self.db, property_id, landlord_id).await?;

        let name = req.name.map(|n| n.trim().to_string()).unwrap_or(current.name);
        let address = req
            .address
            .map(|a| a.trim().to_string())
            .unwrap_or(current.address);
        let description = match req.description {
            Some(d) if d.trim().is_empty() => None,
            Some(d) => Some(d),
            None => current.description,
        };

        sqlx::query(
            "UPDATE properties SET name = ?1, address = ?2, description = ?3, updated_at = ?4 WHERE id = ?5",
        )
        .bind(&name)
        .bind(&address)
        .bind(&description)
        .bind(Utc::now())
        .bind(property_id)
        .execute(&self.db)
        .await?;

        load_owned_property(&self.db, property_id, landlord_id).await
    }

    /// Delete a property; units, passes and payments cascade
    pub async fn delete_property(&self, landlord_id: &str, property_id: &str) -> PortalResult<()> {
        load_owned_property(&self.db, property_id, landlord_id).await?;

        sqlx::query("DELETE FROM properties WHERE id = ?1")
            .bind(property_id)
            .execute(&self.db)
            .await?;

        tracing::info!(property_id, landlord_id, "property deleted");
        Ok(())
    }

    /// Create a unit and bump the property's unit count in one transaction
    pub async fn create_unit(
        &self,
        landlord_id: &str,
        property_id: &str,
        req: CreateUnitRequest,
    ) -> PortalResult<Unit> {
        load_owned_property(&self.db, property_id, landlord_id).await?;

        let now = Utc::now();
        let unit = Unit {
            id: Uuid::new_v4().to_string(),
            property_id: property_id.to_string(),
            unit_number: req.unit_number.trim().to_string(),
            tenant_id: None,
            rent_amount: req.rent_amount,
            due_day: req.due_day,
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO units (id, property_id, unit_number, tenant_id, rent_amount, due_day, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?6)",
        )
        .bind(&unit.id)
        .bind(&unit.property_id)
        .bind(&unit.unit_number)
        .bind(unit.rent_amount)
        .bind(unit.due_day)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortalError::Conflict(format!("Unit {} already exists", unit.unit_number))
            } else {
                PortalError::Database(e)
            }
        })?;

        sqlx::query("UPDATE properties SET unit_count = unit_count + 1, updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(property_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(unit)
    }

    /// Units of an owned property with their occupants
    pub async fn list_units(
        &self,
        landlord_id: &str,
        property_id: &str,
    ) -> PortalResult<Vec<UnitWithTenant>> {
        load_owned_property(&self.db, property_id, landlord_id).await?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM units WHERE property_id = ?1 ORDER BY unit_number",
            UNIT_COLUMNS
        ))
        .bind(property_id)
        .fetch_all(&self.db)
        .await?;

        let mut units = Vec::with_capacity(rows.len());
        for row in &rows {
            let unit = Unit::from_row(row)?;
            let tenant = match &unit.tenant_id {
                Some(tenant_id) => self.find_profile(tenant_id).await?,
                None => None,
            };
            units.push(UnitWithTenant { unit, tenant });
        }

        Ok(units)
    }

    /// Load a unit whose property the landlord owns
    pub async fn get_owned_unit(&self, landlord_id: &str, unit_id: &str) -> PortalResult<(Unit, Property)> {
        let unit = self.get_unit(unit_id).await?;
        let property = load_owned_property(&self.db, &unit.property_id, landlord_id).await?;
        Ok((unit, property))
    }

    pub async fn get_unit(&self, unit_id: &str) -> PortalResult<Unit> {
        let row = sqlx::query(&format!("SELECT {} FROM units WHERE id = ?1", UNIT_COLUMNS))
            .bind(unit_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PortalError::NotFound("Unit not found".to_string()))?;

        Unit::from_row(&row)
    }

    pub async fn update_unit(
        &self,
        landlord_id: &str,
        unit_id: &str,
        req: UpdateUnitRequest,
    ) -> PortalResult<Unit> {
        let (current, _) = self.get_owned_unit(landlord_id, unit_id).await?;

        let unit_number = req
            .unit_number
            .map(|n| n.trim().to_string())
            .unwrap_or(current.unit_number);

        sqlx::query(
            "UPDATE units SET unit_number = ?1, rent_amount = ?2, due_day = ?3, updated_at = ?4 WHERE id = ?5",
        )
        .bind(&unit_number)
        .bind(req.rent_amount.unwrap_or(current.rent_amount))
        .bind(req.due_day.unwrap_or(current.due_day))
        .bind(Utc::now())
        .bind(unit_id)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortalError::Conflict(format!("Unit {} already exists", unit_number))
            } else {
                PortalError::Database(e)
            }
        })?;

        self.get_unit(unit_id).await
    }

    /// Delete a unit and decrement the property's unit count in one transaction
    pub async fn delete_unit(&self, landlord_id: &str, unit_id: &str) -> PortalResult<()> {
        let (unit, _) = self.get_owned_unit(landlord_id, unit_id).await?;

        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM units WHERE id = ?1")
            .bind(unit_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE properties SET unit_count = MAX(unit_count - 1, 0), updated_at = ?1 WHERE id = ?2",
        )
        .bind(Utc::now())
        .bind(&unit.property_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Put a tenant into a vacant unit
    ///
    /// The unit must be vacant and the tenant must not already occupy
    /// another unit.
    pub async fn assign_tenant(
        &self,
        landlord_id: &str,
        unit_id: &str,
        tenant_id: &str,
    ) -> PortalResult<Unit> {
        self.get_owned_unit(landlord_id, unit_id).await?;

        let tenant = self
            .find_profile(tenant_id)
            .await?
            .ok_or_else(|| PortalError::NotFound("Tenant not found".to_string()))?;
        if tenant.role != Role::Tenant {
            return Err(PortalError::Validation("Profile is not a tenant".to_string()));
        }

        let mut tx = self.db.begin().await?;

        let occupied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM units WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(&mut *tx)
            .await?;
        if occupied > 0 {
            return Err(PortalError::Conflict(
                "Tenant already occupies a unit".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE units SET tenant_id = ?1, updated_at = ?2 WHERE id = ?3 AND tenant_id IS NULL",
        )
        .bind(tenant_id)
        .bind(Utc::now())
        .bind(unit_id)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(PortalError::Conflict("Unit is already occupied".to_string()));
        }

        tx.commit().await?;

        tracing::info!(unit_id, tenant_id, "tenant assigned to unit");
        self.get_unit(unit_id).await
    }

    /// Remove the occupant of a unit
    pub async fn vacate_unit(&self, landlord_id: &str, unit_id: &str) -> PortalResult<Unit> {
        let (unit, _) = self.get_owned_unit(landlord_id, unit_id).await?;
        if !unit.is_occupied() {
            return Err(PortalError::Validation("Unit is already vacant".to_string()));
        }

        sqlx::query("UPDATE units SET tenant_id = NULL, updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now())
            .bind(unit_id)
            .execute(&self.db)
            .await?;

        tracing::info!(unit_id, "unit vacated");
        self.get_unit(unit_id).await
    }

    /// Tenants occupying units in the landlord's properties
    pub async fn list_tenants(&self, landlord_id: &str) -> PortalResult<Vec<TenantSummary>> {
        let rows = sqlx::query(
            "SELECT u.id AS unit_id, u.unit_number, u.rent_amount, u.due_day, u.tenant_id,
                    p.id AS property_id, p.name AS property_name
             FROM units u JOIN properties p ON p.id = u.property_id
             WHERE p.landlord_id = ?1 AND u.tenant_id IS NOT NULL
             ORDER BY p.name, u.unit_number",
        )
        .bind(landlord_id)
        .fetch_all(&self.db)
        .await?;

        let mut tenants = Vec::with_capacity(rows.len());
        for row in rows {
            let tenant_id: String = row.try_get("tenant_id")?;
            let Some(profile) = self.find_profile(&tenant_id).await? else {
                continue;
            };
            tenants.push(TenantSummary {
                profile,
                unit_id: row.try_get("unit_id")?,
                unit_number: row.try_get("unit_number")?,
                rent_amount: row.try_get("rent_amount")?,
                due_day: row.try_get("due_day")?,
                property_id: row.try_get("property_id")?,
                property_name: row.try_get("property_name")?,
            });
        }

        Ok(tenants)
    }

    async fn find_profile(&self, id: &str) -> PortalResult<Option<Profile>> {
        let row = sqlx::query(&format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(Profile::from_row).transpose()
    }
}
