/// Invitation Management System
///
/// Landlords invite tenants (optionally into a specific unit) and guards
/// by email. The invitee signs up with the token, which sets their role
/// and assignment in the same transaction that creates the profile.
use crate::{
    account::Role,
    error::{is_unique_violation, PortalError, PortalResult},
    property::load_owned_property,
};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;
use validator::Validate;

const INVITATION_COLUMNS: &str = "id, email, role, property_id, unit_id, token, status, invited_by, created_at, expires_at, accepted_at";

/// Invitation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Revoked,
    Expired,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "pending",
            InvitationStatus::Accepted => "accepted",
            InvitationStatus::Revoked => "revoked",
            InvitationStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s {
            "pending" => Ok(InvitationStatus::Pending),
            "accepted" => Ok(InvitationStatus::Accepted),
            "revoked" => Ok(InvitationStatus::Revoked),
            "expired" => Ok(InvitationStatus::Expired),
            _ => Err(PortalError::Internal(format!("Unknown invitation status: {}", s))),
        }
    }
}

/// Invitation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: String,
    pub email: String,
    pub role: Role,
    pub property_id: String,
    pub unit_id: Option<String>,
    pub token: String,
    pub status: InvitationStatus,
    pub invited_by: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

impl Invitation {
    fn from_row(row: &SqliteRow) -> PortalResult<Self> {
        let role: String = row.try_get("role")?;
        let status: String = row.try_get("status")?;
        Ok(Invitation {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            role: Role::from_str(&role)?,
            property_id: row.try_get("property_id")?,
            unit_id: row.try_get("unit_id")?,
            token: row.try_get("token")?,
            status: InvitationStatus::from_str(&status)?,
            invited_by: row.try_get("invited_by")?,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
            accepted_at: row.try_get("accepted_at")?,
        })
    }

    /// Pending and not past its expiry
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && now <= self.expires_at
    }
}

/// Public view of an invitation, shown on the signup page
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationPreview {
    pub email: String,
    pub role: Role,
    pub property_name: String,
    pub unit_number: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Send invitation request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendInvitationRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    pub role: Role,
    pub property_id: String,
    pub unit_id: Option<String>,
}

/// Invitation manager
#[derive(Clone)]
pub struct InvitationManager {
    db: SqlitePool,
    ttl: Duration,
}

impl InvitationManager {
    pub fn new(db: SqlitePool, ttl_days: i64) -> Self {
        Self {
            db,
            ttl: Duration::days(ttl_days),
        }
    }

    /// Generate a new invitation token (32 random bytes, hex)
    pub fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Create an invitation
    ///
    /// Rejected with a conflict when a profile already uses the email or a
    /// pending invitation exists for the same email and property.
    pub async fn send(&self, landlord_id: &str, req: SendInvitationRequest) -> PortalResult<Invitation> {
        if req.role == Role::Landlord {
            return Err(PortalError::Validation(
                "Only tenants and guards can be invited".to_string(),
            ));
        }

        load_owned_property(&self.db, &req.property_id, landlord_id).await?;

        let email = req.email.trim().to_lowercase();

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM profiles WHERE email = ?1 COLLATE NOCASE")
                .bind(&email)
                .fetch_one(&self.db)
                .await?;
        if existing > 0 {
            return Err(PortalError::Conflict(
                "A user with this email already exists".to_string(),
            ));
        }

        // Guards are stationed at a property, never a unit
        let unit_id = match req.role {
            Role::Tenant => req.unit_id.filter(|u| !u.is_empty()),
            _ => None,
        };
        if let Some(unit_id) = &unit_id {
            let row = sqlx::query("SELECT property_id, tenant_id FROM units WHERE id = ?1")
                .bind(unit_id)
                .fetch_optional(&self.db)
                .await?
                .ok_or_else(|| PortalError::NotFound("Unit not found".to_string()))?;
            let unit_property: String = row.try_get("property_id")?;
            let tenant_id: Option<String> = row.try_get("tenant_id")?;
            if unit_property != req.property_id {
                return Err(PortalError::Validation(
                    "Unit does not belong to this property".to_string(),
                ));
            }
            if tenant_id.is_some() {
                return Err(PortalError::Conflict("Unit is already occupied".to_string()));
            }
        }

        let now = Utc::now();
        let invitation = Invitation {
            id: Uuid::new_v4().to_string(),
            email,
            role: req.role,
            property_id: req.property_id,
            unit_id,
            token: Self::generate_token(),
            status: InvitationStatus::Pending,
            invited_by: landlord_id.to_string(),
            created_at: now,
            expires_at: now + self.ttl,
            accepted_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO invitations (id, email, role, property_id, unit_id, token, status, invited_by, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9)
            "#,
        )
        .bind(&invitation.id)
        .bind(&invitation.email)
        .bind(invitation.role.as_str())
        .bind(&invitation.property_id)
        .bind(&invitation.unit_id)
        .bind(&invitation.token)
        .bind(&invitation.invited_by)
        .bind(invitation.created_at)
        .bind(invitation.expires_at)
        .execute(&self.db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortalError::Conflict(
                    "A pending invitation already exists for this email".to_string(),
                )
            } else {
                PortalError::Database(e)
            }
        })?;

        tracing::info!(
            invitation_id = %invitation.id,
            property_id = %invitation.property_id,
            role = invitation.role.as_str(),
            "invitation created"
        );

        Ok(invitation)
    }

    /// List invitations sent by a landlord
    pub async fn list_for_landlord(&self, landlord_id: &str) -> PortalResult<Vec<Invitation>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM invitations WHERE invited_by = ?1 ORDER BY created_at DESC",
            INVITATION_COLUMNS
        ))
        .bind(landlord_id)
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Invitation::from_row).collect()
    }

    /// Revoke a pending invitation
    pub async fn revoke(&self, landlord_id: &str, invitation_id: &str) -> PortalResult<Invitation> {
        let invitation = self.get(invitation_id).await?;
        if invitation.invited_by != landlord_id {
            return Err(PortalError::Authorization(
                "Invitation was sent by another landlord".to_string(),
            ));
        }

        let result = sqlx::query(
            "UPDATE invitations SET status = 'revoked' WHERE id = ?1 AND status = 'pending'",
        )
        .bind(invitation_id)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PortalError::Conflict(format!(
                "Invitation is already {}",
                invitation.status.as_str()
            )));
        }

        self.get(invitation_id).await
    }

    pub async fn get(&self, invitation_id: &str) -> PortalResult<Invitation> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invitations WHERE id = ?1",
            INVITATION_COLUMNS
        ))
        .bind(invitation_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PortalError::NotFound("Invitation not found".to_string()))?;

        Invitation::from_row(&row)
    }

    /// Look up an invitation that can still be accepted
    pub async fn find_usable(&self, token: &str) -> PortalResult<Invitation> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM invitations WHERE token = ?1",
            INVITATION_COLUMNS
        ))
        .bind(token.trim())
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PortalError::NotFound("Invitation not found".to_string()))?;

        let invitation = Invitation::from_row(&row)?;
        if !invitation.is_usable(Utc::now()) {
            return Err(PortalError::Validation(
                "Invitation has expired or is no longer valid".to_string(),
            ));
        }

        Ok(invitation)
    }

    /// Public preview for the signup page
    pub async fn preview(&self, token: &str) -> PortalResult<InvitationPreview> {
        let invitation = self.find_usable(token).await?;

        let property_name: String = sqlx::query_scalar("SELECT name FROM properties WHERE id = ?1")
            .bind(&invitation.property_id)
            .fetch_one(&self.db)
            .await?;
        let unit_number: Option<String> = match &invitation.unit_id {
            Some(unit_id) => {
                sqlx::query_scalar("SELECT unit_number FROM units WHERE id = ?1")
                    .bind(unit_id)
                    .fetch_optional(&self.db)
                    .await?
            }
            None => None,
        };

        Ok(InvitationPreview {
            email: invitation.email,
            role: invitation.role,
            property_name,
            unit_number,
            expires_at: invitation.expires_at,
        })
    }

    /// Mark pending invitations past their expiry as expired
    pub async fn expire_stale(&self) -> PortalResult<u64> {
        let result = sqlx::query(
            "UPDATE invitations SET status = 'expired' WHERE status = 'pending' AND expires_at < ?1",
        )
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Accept an invitation for a freshly inserted profile
///
/// Runs inside the signup transaction: the invitation is compare-and-set
/// from `pending`, then the unit (tenant) or property (guard) is assigned.
pub async fn accept_in(
    tx: &mut Transaction<'_, Sqlite>,
    invitation: &Invitation,
    profile_id: &str,
) -> PortalResult<()> {
    let now = Utc::now();

    let result = sqlx::query(
        "UPDATE invitations SET status = 'accepted', accepted_at = ?1
         WHERE id = ?2 AND status = 'pending' AND expires_at >= ?1",
    )
    .bind(now)
    .bind(&invitation.id)
    .execute(&mut **tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(PortalError::Conflict(
            "Invitation has already been used or has expired".to_string(),
        ));
    }

    match invitation.role {
        Role::Tenant => {
            if let Some(unit_id) = &invitation.unit_id {
                let result = sqlx::query(
                    "UPDATE units SET tenant_id = ?1, updated_at = ?2 WHERE id = ?3 AND tenant_id IS NULL",
                )
                .bind(profile_id)
                .bind(now)
                .bind(unit_id)
                .execute(&mut **tx)
                .await?;
                if result.rows_affected() == 0 {
                    return Err(PortalError::Conflict(
                        "Invited unit is no longer vacant".to_string(),
                    ));
                }
            }
        }
        Role::Guard => {
            sqlx::query("UPDATE profiles SET property_id = ?1 WHERE id = ?2")
                .bind(&invitation.property_id)
                .bind(profile_id)
                .execute(&mut **tx)
                .await?;
        }
        Role::Landlord => {
            return Err(PortalError::Validation(
                "Landlords cannot be invited".to_string(),
            ));
        }
    }

    tracing::info!(invitation_id = %invitation.id, profile_id, "invitation accepted");

    Ok(())
}
