/// Account management system
///
/// Handles profile creation (directly or through an invitation), login,
/// sessions and the role every authorization decision hangs off.

mod manager;

pub use manager::AccountManager;

use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use validator::Validate;

pub(crate) const PROFILE_COLUMNS: &str =
    "id, email, password_hash, role, full_name, phone, property_id, created_at";

/// Portal role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Landlord,
    Tenant,
    Guard,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Landlord => "landlord",
            Role::Tenant => "tenant",
            Role::Guard => "guard",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s.to_lowercase().as_str() {
            "landlord" => Ok(Role::Landlord),
            "tenant" => Ok(Role::Tenant),
            "guard" => Ok(Role::Guard),
            _ => Err(PortalError::Validation(format!("Invalid role: {}", s))),
        }
    }

    /// Path prefix of this role's portal
    pub fn portal_prefix(&self) -> &'static str {
        match self {
            Role::Landlord => "/landlord",
            Role::Tenant => "/tenant",
            Role::Guard => "/guard",
        }
    }

    /// Landing page of this role's portal
    pub fn dashboard_path(&self) -> String {
        format!("{}/dashboard", self.portal_prefix())
    }
}

/// Profile record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub full_name: String,
    pub phone: Option<String>,
    /// Property a guard is stationed at
    pub property_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub(crate) fn from_row(row: &SqliteRow) -> PortalResult<Self> {
        let role: String = row.try_get("role")?;
        Ok(Profile {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            role: Role::from_str(&role)?,
            full_name: row.try_get("full_name")?,
            phone: row.try_get("phone")?,
            property_id: row.try_get("property_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Signup request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, max = 128, message = "must be 8 to 128 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 120, message = "is required"))]
    pub full_name: String,
    pub phone: Option<String>,
    /// Token from an invitation link; without one the profile is a landlord
    pub invite_token: Option<String>,
}

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Profile update request
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 120, message = "must not be empty"))]
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

/// Session response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub profile: Profile,
    /// Where the client should land after login
    pub redirect_to: String,
}

/// Newly issued session token
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Validated session from bearer token or cookie
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub profile_id: String,
    pub session_id: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip_and_paths() {
        for role in [Role::Landlord, Role::Tenant, Role::Guard] {
            assert_eq!(Role::from_str(role.as_str()).unwrap(), role);
        }
        assert_eq!(Role::from_str("GUARD").unwrap(), Role::Guard);
        assert!(Role::from_str("admin").is_err());
        assert_eq!(Role::Tenant.dashboard_path(), "/tenant/dashboard");
    }

    #[test]
    fn test_signup_request_validation() {
        let req = SignupRequest {
            email: "not-an-email".to_string(),
            password: "short".to_string(),
            full_name: "".to_string(),
            phone: None,
            invite_token: None,
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(fields.contains_key("full_name"));
    }

    #[test]
    fn test_profile_hides_password_hash() {
        let profile = Profile {
            id: "p1".to_string(),
            email: "a@b.co".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            role: Role::Landlord,
            full_name: "Ann".to_string(),
            phone: None,
            property_id: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("argon2"));
        assert!(json.contains("\"role\":\"landlord\""));
    }
}
