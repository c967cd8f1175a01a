/// Visitor gate passes
///
/// A tenant issues a pass for a visitor; a guard at the property (or the
/// owning landlord) verifies it at the gate, checks the visitor in and
/// later out. Every status change goes through [`GatePassStatus::can_transition_to`]
/// and is applied as a compare-and-set on the stored status.

pub mod code;
mod manager;
pub mod qr;

pub use manager::GatePassManager;

use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use validator::Validate;

pub(crate) const GATE_PASS_COLUMNS: &str = "id, tenant_id, property_id, visitor_name, visitor_phone, purpose, access_code, qr_code, valid_from, valid_until, status, checked_in_at, checked_in_by, checked_out_at, checked_out_by, created_at";

/// Gate pass status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatePassStatus {
    Pending,
    CheckedIn,
    CheckedOut,
    Cancelled,
    Expired,
}

impl GatePassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatePassStatus::Pending => "pending",
            GatePassStatus::CheckedIn => "checked_in",
            GatePassStatus::CheckedOut => "checked_out",
            GatePassStatus::Cancelled => "cancelled",
            GatePassStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s {
            "pending" => Ok(GatePassStatus::Pending),
            "checked_in" => Ok(GatePassStatus::CheckedIn),
            "checked_out" => Ok(GatePassStatus::CheckedOut),
            "cancelled" => Ok(GatePassStatus::Cancelled),
            "expired" => Ok(GatePassStatus::Expired),
            _ => Err(PortalError::Internal(format!("Unknown gate pass status: {}", s))),
        }
    }

    /// Allowed transitions
    ///
    /// ```text
    /// pending    -> checked_in | cancelled | expired
    /// checked_in -> checked_out | expired
    /// ```
    /// Everything else is terminal.
    pub fn can_transition_to(self, next: GatePassStatus) -> bool {
        use GatePassStatus::*;
        matches!(
            (self, next),
            (Pending, CheckedIn)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (CheckedIn, CheckedOut)
                | (CheckedIn, Expired)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GatePassStatus::CheckedOut | GatePassStatus::Cancelled | GatePassStatus::Expired
        )
    }
}

/// Gate pass record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatePass {
    pub id: String,
    pub tenant_id: String,
    pub property_id: String,
    pub visitor_name: String,
    pub visitor_phone: Option<String>,
    pub purpose: Option<String>,
    pub access_code: String,
    /// `data:image/svg+xml;base64,...`
    pub qr_code: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub status: GatePassStatus,
    pub checked_in_at: Option<DateTime<Utc>>,
    pub checked_in_by: Option<String>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub checked_out_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GatePass {
    pub(crate) fn from_row(row: &SqliteRow) -> PortalResult<Self> {
        let status: String = row.try_get("status")?;
        Ok(GatePass {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            property_id: row.try_get("property_id")?,
            visitor_name: row.try_get("visitor_name")?,
            visitor_phone: row.try_get("visitor_phone")?,
            purpose: row.try_get("purpose")?,
            access_code: row.try_get("access_code")?,
            qr_code: row.try_get("qr_code")?,
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
            status: GatePassStatus::from_str(&status)?,
            checked_in_at: row.try_get("checked_in_at")?,
            checked_in_by: row.try_get("checked_in_by")?,
            checked_out_at: row.try_get("checked_out_at")?,
            checked_out_by: row.try_get("checked_out_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Create gate pass request
///
/// Required fields are optional here so a missing one is reported as a
/// validation error rather than a body rejection.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGatePassRequest {
    #[validate(length(max = 100, message = "must be at most 100 characters"))]
    pub visitor_name: Option<String>,
    #[validate(length(max = 20, message = "must be at most 20 characters"))]
    pub visitor_phone: Option<String>,
    #[validate(length(max = 200, message = "must be at most 200 characters"))]
    pub purpose: Option<String>,
    pub property_id: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// Body of verify / check-in / check-out
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCodeRequest {
    pub access_code: String,
}

/// Result of verifying a pass at the gate
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub pass: GatePass,
}

#[cfg(test)]
mod tests {
    use super::*;
    use GatePassStatus::*;

    #[test]
    fn test_transition_table() {
        assert!(Pending.can_transition_to(CheckedIn));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Expired));
        assert!(CheckedIn.can_transition_to(CheckedOut));
        assert!(CheckedIn.can_transition_to(Expired));

        assert!(!Pending.can_transition_to(CheckedOut));
        assert!(!CheckedIn.can_transition_to(Cancelled));
        assert!(!CheckedIn.can_transition_to(CheckedIn));
        for terminal in [CheckedOut, Cancelled, Expired] {
            assert!(terminal.is_terminal());
            for next in [Pending, CheckedIn, CheckedOut, Cancelled, Expired] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&CheckedIn).unwrap(), "\"checked_in\"");
        assert_eq!(GatePassStatus::from_str("checked_out").unwrap(), CheckedOut);
    }
}
