/// Gate pass manager
use super::{
    code::{generate_access_code, normalize_code},
    qr::{render_data_url, QrPayload},
    CreateGatePassRequest, GatePass, GatePassStatus, VerifyOutcome, GATE_PASS_COLUMNS,
};
use crate::{
    account::{Profile, Role},
    error::{is_unique_violation, PortalError, PortalResult},
    metrics,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;
use validator::Validate;

const MAX_CODE_ATTEMPTS: usize = 10;

/// Gate pass manager
#[derive(Clone)]
pub struct GatePassManager {
    db: SqlitePool,
}

impl GatePassManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Issue a pass for a visitor
    ///
    /// The tenant must occupy a unit at the property. The access code is
    /// inserted directly and regenerated when it collides with an existing
    /// one.
    pub async fn create(&self, tenant: &Profile, req: CreateGatePassRequest) -> PortalResult<GatePass> {
        if tenant.role != Role::Tenant {
            return Err(PortalError::Authorization(
                "Only tenants can create gate passes".to_string(),
            ));
        }

        req.validate()?;

        let visitor_name = req
            .visitor_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| PortalError::Validation("visitorName is required".to_string()))?;
        let valid_until = req
            .valid_until
            .ok_or_else(|| PortalError::Validation("validUntil is required".to_string()))?;
        let property_id = req
            .property_id
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| PortalError::Validation("propertyId is required".to_string()))?;

        let now = Utc::now();
        let valid_from = match req.valid_from {
            Some(from) => {
                if valid_until <= from {
                    return Err(PortalError::Validation(
                        "validUntil must be after validFrom".to_string(),
                    ));
                }
                from
            }
            None => now,
        };

        let occupies: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM units WHERE property_id = ?1 AND tenant_id = ?2",
        )
        .bind(&property_id)
        .bind(&tenant.id)
        .fetch_one(&self.db)
        .await?;
        if occupies == 0 {
            return Err(PortalError::Authorization(
                "You do not occupy a unit at this property".to_string(),
            ));
        }

        let visitor_phone = req.visitor_phone.filter(|p| !p.trim().is_empty());
        let purpose = req.purpose.filter(|p| !p.trim().is_empty());
        let id = Uuid::new_v4().to_string();

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let access_code = generate_access_code();
            let qr_code = render_data_url(&QrPayload {
                code: &access_code,
                property_id: &property_id,
                visitor: &visitor_name,
            })?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO gate_passes (id, tenant_id, property_id, visitor_name, visitor_phone, purpose,
                                         access_code, qr_code, valid_from, valid_until, status, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 'pending', ?11)
                "#,
            )
            .bind(&id)
            .bind(&tenant.id)
            .bind(&property_id)
            .bind(&visitor_name)
            .bind(&visitor_phone)
            .bind(&purpose)
            .bind(&access_code)
            .bind(&qr_code)
            .bind(valid_from)
            .bind(valid_until)
            .bind(now)
            .execute(&self.db)
            .await;

            match inserted {
                Ok(_) => {
                    tracing::info!(pass_id = %id, property_id = %property_id, "gate pass created");
                    metrics::record_gate_pass_event("created");
                    return self.get(&id).await;
                }
                Err(e) if is_unique_violation(&e) => {
                    tracing::debug!(attempt, "access code collision, regenerating");
                }
                Err(e) => return Err(PortalError::Database(e)),
            }
        }

        Err(PortalError::Internal(
            "Could not allocate a unique access code".to_string(),
        ))
    }

    pub async fn get(&self, id: &str) -> PortalResult<GatePass> {
        let row = sqlx::query(&format!("SELECT {} FROM gate_passes WHERE id = ?1", GATE_PASS_COLUMNS))
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| PortalError::NotFound("Gate pass not found".to_string()))?;

        GatePass::from_row(&row)
    }

    /// Look up by access code (trimmed, case-insensitive)
    pub async fn find_by_code(&self, code: &str) -> PortalResult<GatePass> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM gate_passes WHERE access_code = ?1",
            GATE_PASS_COLUMNS
        ))
        .bind(normalize_code(code))
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PortalError::NotFound("Gate pass not found".to_string()))?;

        GatePass::from_row(&row)
    }

    /// Passes visible to the caller
    pub async fn list_for(&self, profile: &Profile) -> PortalResult<Vec<GatePass>> {
        let rows = match profile.role {
            Role::Tenant => {
                sqlx::query(&format!(
                    "SELECT {} FROM gate_passes WHERE tenant_id = ?1 ORDER BY created_at DESC",
                    GATE_PASS_COLUMNS
                ))
                .bind(&profile.id)
                .fetch_all(&self.db)
                .await?
            }
            Role::Landlord => {
                sqlx::query(&format!(
                    "SELECT {} FROM gate_passes WHERE property_id IN (SELECT id FROM properties WHERE landlord_id = ?1)
                     ORDER BY created_at DESC",
                    GATE_PASS_COLUMNS
                ))
                .bind(&profile.id)
                .fetch_all(&self.db)
                .await?
            }
            Role::Guard => {
                sqlx::query(&format!(
                    "SELECT {} FROM gate_passes WHERE property_id = ?1 ORDER BY valid_from DESC",
                    GATE_PASS_COLUMNS
                ))
                .bind(&profile.property_id)
                .fetch_all(&self.db)
                .await?
            }
        };

        rows.iter().map(GatePass::from_row).collect()
    }

    /// Get a pass the caller is allowed to see
    pub async fn get_for(&self, profile: &Profile, id: &str) -> PortalResult<GatePass> {
        let pass = self.get(id).await?;
        let visible = match profile.role {
            Role::Tenant => pass.tenant_id == profile.id,
            Role::Guard | Role::Landlord => self.may_operate_gate(profile, &pass).await?,
        };
        if !visible {
            return Err(PortalError::Authorization(
                "Not permitted to view this gate pass".to_string(),
            ));
        }
        Ok(pass)
    }

    /// Check a pass at the gate
    ///
    /// A pass past its window is persisted as `expired` before answering.
    /// A pass not yet in its window is reported invalid and left untouched.
    pub async fn verify(&self, actor: &Profile, code: &str) -> PortalResult<VerifyOutcome> {
        let pass = self.find_by_code(code).await?;
        self.authorize_gate(actor, &pass).await?;
        metrics::record_gate_pass_event("verified");

        let invalid = |reason: &str, pass: GatePass| VerifyOutcome {
            valid: false,
            reason: Some(reason.to_string()),
            pass,
        };

        match pass.status {
            GatePassStatus::Cancelled => return Ok(invalid("Pass has been cancelled", pass)),
            GatePassStatus::CheckedOut => return Ok(invalid("Pass has already been used", pass)),
            GatePassStatus::Expired => return Ok(invalid("Pass has expired", pass)),
            GatePassStatus::Pending | GatePassStatus::CheckedIn => {}
        }

        let now = Utc::now();
        if now < pass.valid_from {
            return Ok(invalid("Pass is not yet valid", pass));
        }
        if now > pass.valid_until {
            let expired = self.expire(&pass).await?;
            return Ok(invalid("Pass has expired", expired));
        }

        Ok(VerifyOutcome {
            valid: true,
            reason: None,
            pass,
        })
    }

    /// Admit the visitor
    pub async fn check_in(&self, actor: &Profile, code: &str) -> PortalResult<GatePass> {
        let pass = self.find_by_code(code).await?;
        self.authorize_gate(actor, &pass).await?;

        match pass.status {
            GatePassStatus::Pending => {}
            GatePassStatus::CheckedIn => {
                return Err(PortalError::Validation("Visitor is already checked in".to_string()))
            }
            other => {
                return Err(PortalError::Validation(format!(
                    "Pass is {} and cannot be checked in",
                    other.as_str()
                )))
            }
        }

        let now = Utc::now();
        if now < pass.valid_from {
            return Err(PortalError::Validation("Pass is not yet valid".to_string()));
        }
        if now > pass.valid_until {
            self.expire(&pass).await?;
            return Err(PortalError::Validation("Pass has expired".to_string()));
        }

        let updated = self
            .transition(&pass, GatePassStatus::CheckedIn, Some(&actor.id), now)
            .await?;
        tracing::info!(pass_id = %pass.id, actor = %actor.id, "visitor checked in");
        Ok(updated)
    }

    /// Record the visitor leaving
    pub async fn check_out(&self, actor: &Profile, code: &str) -> PortalResult<GatePass> {
        let pass = self.find_by_code(code).await?;
        self.authorize_gate(actor, &pass).await?;

        if pass.status != GatePassStatus::CheckedIn {
            return Err(PortalError::Validation(format!(
                "Visitor is not checked in (pass is {})",
                pass.status.as_str()
            )));
        }

        let updated = self
            .transition(&pass, GatePassStatus::CheckedOut, Some(&actor.id), Utc::now())
            .await?;
        tracing::info!(pass_id = %pass.id, actor = %actor.id, "visitor checked out");
        Ok(updated)
    }

    /// Cancel a pass that has not been used
    pub async fn cancel(&self, actor: &Profile, id: &str) -> PortalResult<GatePass> {
        let pass = self.get(id).await?;

        let allowed = match actor.role {
            Role::Tenant => pass.tenant_id == actor.id,
            Role::Landlord => self.owns_property(&actor.id, &pass.property_id).await?,
            Role::Guard => false,
        };
        if !allowed {
            return Err(PortalError::Authorization(
                "Not permitted to cancel this gate pass".to_string(),
            ));
        }

        if pass.status != GatePassStatus::Pending {
            return Err(PortalError::Validation(format!(
                "Only pending passes can be cancelled (pass is {})",
                pass.status.as_str()
            )));
        }

        self.transition(&pass, GatePassStatus::Cancelled, None, Utc::now())
            .await
    }

    /// Mark every live pass past its window as expired
    ///
    /// Called periodically by the job scheduler.
    pub async fn expire_overdue(&self) -> PortalResult<u64> {
        let result = sqlx::query(
            "UPDATE gate_passes SET status = 'expired'
             WHERE status IN ('pending', 'checked_in') AND valid_until < ?1",
        )
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::info!(passes_expired = expired, "Expired overdue gate passes");
        }
        Ok(expired)
    }

    /// Expire a pass read earlier
    ///
    /// Losing the race to the sweep or another verify still leaves the pass
    /// expired, so that counts as success.
    async fn expire(&self, pass: &GatePass) -> PortalResult<GatePass> {
        match self
            .transition(pass, GatePassStatus::Expired, None, Utc::now())
            .await
        {
            Err(err @ PortalError::Conflict(_)) => {
                let current = self.get(&pass.id).await?;
                if current.status == GatePassStatus::Expired {
                    Ok(current)
                } else {
                    Err(err)
                }
            }
            other => other,
        }
    }

    /// Apply a status change as a compare-and-set on the current status
    async fn transition(
        &self,
        pass: &GatePass,
        next: GatePassStatus,
        actor_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> PortalResult<GatePass> {
        if !pass.status.can_transition_to(next) {
            return Err(PortalError::Validation(format!(
                "Cannot move pass from {} to {}",
                pass.status.as_str(),
                next.as_str()
            )));
        }

        let query = match next {
            GatePassStatus::CheckedIn => sqlx::query(
                "UPDATE gate_passes SET status = ?1, checked_in_at = ?2, checked_in_by = ?3
                 WHERE id = ?4 AND status = ?5",
            )
            .bind(next.as_str())
            .bind(at)
            .bind(actor_id),
            GatePassStatus::CheckedOut => sqlx::query(
                "UPDATE gate_passes SET status = ?1, checked_out_at = ?2, checked_out_by = ?3
                 WHERE id = ?4 AND status = ?5",
            )
            .bind(next.as_str())
            .bind(at)
            .bind(actor_id),
            _ => sqlx::query(
                "UPDATE gate_passes SET status = ?1
                 WHERE id = ?2 AND status = ?3",
            )
            .bind(next.as_str()),
        };

        let result = query
            .bind(&pass.id)
            .bind(pass.status.as_str())
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PortalError::Conflict(
                "Gate pass was modified concurrently, retry".to_string(),
            ));
        }

        metrics::record_gate_pass_event(next.as_str());
        self.get(&pass.id).await
    }

    /// Guard stationed at the property, or the landlord who owns it
    async fn may_operate_gate(&self, actor: &Profile, pass: &GatePass) -> PortalResult<bool> {
        match actor.role {
            Role::Guard => Ok(actor.property_id.as_deref() == Some(pass.property_id.as_str())),
            Role::Landlord => self.owns_property(&actor.id, &pass.property_id).await,
            Role::Tenant => Ok(false),
        }
    }

    async fn authorize_gate(&self, actor: &Profile, pass: &GatePass) -> PortalResult<()> {
        if self.may_operate_gate(actor, pass).await? {
            Ok(())
        } else {
            Err(PortalError::Authorization(
                "Not permitted to operate the gate at this property".to_string(),
            ))
        }
    }

    async fn owns_property(&self, landlord_id: &str, property_id: &str) -> PortalResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM properties WHERE id = ?1 AND landlord_id = ?2")
                .bind(property_id)
                .bind(landlord_id)
                .fetch_one(&self.db)
                .await?;
        Ok(count > 0)
    }
}
