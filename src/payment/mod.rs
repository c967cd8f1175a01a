/// Mobile-money rent payments
///
/// Initiation is a saga: the transaction row is written `pending` before
/// the provider is called, moved to `processing` when the provider accepts
/// the push, and compensated to `failed` when it does not. The provider's
/// asynchronous callback settles the row as `completed` or `failed`.

pub mod callback;
mod manager;
pub mod provider;

pub use manager::PaymentManager;
pub use provider::{DarajaClient, PushPaymentProvider};

use crate::error::{PortalError, PortalResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row};
use validator::Validate;

pub(crate) const TRANSACTION_COLUMNS: &str = "id, property_id, unit_id, tenant_id, amount, phone, status, checkout_request_id, merchant_request_id, result_code, result_desc, mpesa_receipt, transaction_date, error_message, created_at, updated_at";

/// Payment transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(PortalError::Internal(format!("Unknown payment status: {}", s))),
        }
    }

    /// Allowed transitions
    ///
    /// ```text
    /// pending    -> processing | completed | failed
    /// processing -> completed | failed
    /// ```
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Completed | PaymentStatus::Failed)
    }
}

/// Payment transaction record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTransaction {
    pub id: String,
    pub property_id: String,
    pub unit_id: Option<String>,
    pub tenant_id: String,
    pub amount: i64,
    pub phone: String,
    pub status: PaymentStatus,
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub result_code: Option<i64>,
    pub result_desc: Option<String>,
    pub mpesa_receipt: Option<String>,
    pub transaction_date: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentTransaction {
    pub(crate) fn from_row(row: &SqliteRow) -> PortalResult<Self> {
        let status: String = row.try_get("status")?;
        Ok(PaymentTransaction {
            id: row.try_get("id")?,
            property_id: row.try_get("property_id")?,
            unit_id: row.try_get("unit_id")?,
            tenant_id: row.try_get("tenant_id")?,
            amount: row.try_get("amount")?,
            phone: row.try_get("phone")?,
            status: PaymentStatus::from_str(&status)?,
            checkout_request_id: row.try_get("checkout_request_id")?,
            merchant_request_id: row.try_get("merchant_request_id")?,
            result_code: row.try_get("result_code")?,
            result_desc: row.try_get("result_desc")?,
            mpesa_receipt: row.try_get("mpesa_receipt")?,
            transaction_date: row.try_get("transaction_date")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Provider environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderEnvironment {
    Sandbox,
    Production,
}

impl ProviderEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEnvironment::Sandbox => "sandbox",
            ProviderEnvironment::Production => "production",
        }
    }

    pub fn from_str(s: &str) -> PortalResult<Self> {
        match s {
            "sandbox" => Ok(ProviderEnvironment::Sandbox),
            "production" => Ok(ProviderEnvironment::Production),
            _ => Err(PortalError::Validation(format!("Invalid environment: {}", s))),
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            ProviderEnvironment::Sandbox => "https://sandbox.safaricom.co.ke",
            ProviderEnvironment::Production => "https://api.safaricom.co.ke",
        }
    }
}

/// Per-property provider credentials
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    pub property_id: String,
    pub enabled: bool,
    pub environment: ProviderEnvironment,
    pub shortcode: String,
    pub passkey: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub transaction_type: String,
    pub updated_at: DateTime<Utc>,
}

impl PaymentSettings {
    pub(crate) fn from_row(row: &SqliteRow) -> PortalResult<Self> {
        let environment: String = row.try_get("environment")?;
        Ok(PaymentSettings {
            property_id: row.try_get("property_id")?,
            enabled: row.try_get("enabled")?,
            environment: ProviderEnvironment::from_str(&environment)?,
            shortcode: row.try_get("shortcode")?,
            passkey: row.try_get("passkey")?,
            consumer_key: row.try_get("consumer_key")?,
            consumer_secret: row.try_get("consumer_secret")?,
            transaction_type: row.try_get("transaction_type")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Response shape; secrets never leave the server
    pub fn view(&self) -> PaymentSettingsView {
        PaymentSettingsView {
            property_id: self.property_id.clone(),
            enabled: self.enabled,
            environment: self.environment,
            shortcode: self.shortcode.clone(),
            transaction_type: self.transaction_type.clone(),
            credentials_configured: !self.consumer_key.is_empty()
                && !self.consumer_secret.is_empty()
                && !self.passkey.is_empty(),
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSettingsView {
    pub property_id: String,
    pub enabled: bool,
    pub environment: ProviderEnvironment,
    pub shortcode: String,
    pub transaction_type: String,
    pub credentials_configured: bool,
    pub updated_at: DateTime<Utc>,
}

/// Upsert payment settings request
///
/// Omitted secrets keep their stored values.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentSettingsRequest {
    pub enabled: bool,
    pub environment: ProviderEnvironment,
    #[validate(length(min = 5, max = 10, message = "must be 5 to 10 digits"))]
    pub shortcode: String,
    pub passkey: Option<String>,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub transaction_type: Option<String>,
}

/// Initiate payment request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    pub unit_id: String,
    #[validate(range(min = 1, max = 250000, message = "must be between 1 and 250000"))]
    pub amount: i64,
    pub phone: String,
}

/// Polling query: by transaction id or provider checkout id
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusQuery {
    pub id: Option<String>,
    pub checkout_request_id: Option<String>,
}
