/// Payment manager
use super::{
    callback::{parse_callback, CallbackAck, CallbackResult},
    provider::{PushPaymentProvider, PushRequest},
    InitiatePaymentRequest, PaymentSettings, PaymentSettingsView, PaymentStatus,
    PaymentStatusQuery, PaymentTransaction, UpdatePaymentSettingsRequest, TRANSACTION_COLUMNS,
};
use crate::{
    account::{Profile, Role},
    config::PaymentConfig,
    error::{PortalError, PortalResult},
    metrics,
    notify::normalize_msisdn,
    property::load_owned_property,
};
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const SETTINGS_COLUMNS: &str = "property_id, enabled, environment, shortcode, passkey, consumer_key, consumer_secret, transaction_type, updated_at";

/// What a callback did to the stored transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Applied(PaymentStatus),
    UnknownTransaction,
    AlreadySettled,
}

/// Payment manager
#[derive(Clone)]
pub struct PaymentManager {
    db: SqlitePool,
    provider: Arc<dyn PushPaymentProvider>,
    config: PaymentConfig,
}

impl PaymentManager {
    pub fn new(db: SqlitePool, provider: Arc<dyn PushPaymentProvider>, config: PaymentConfig) -> Self {
        Self { db, provider, config }
    }

    async fn load_settings(&self, property_id: &str) -> PortalResult<Option<PaymentSettings>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_settings WHERE property_id = ?1",
            SETTINGS_COLUMNS
        ))
        .bind(property_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(PaymentSettings::from_row).transpose()
    }

    /// Settings of an owned property, secrets stripped
    pub async fn get_settings(
        &self,
        landlord_id: &str,
        property_id: &str,
    ) -> PortalResult<Option<PaymentSettingsView>> {
        load_owned_property(&self.db, property_id, landlord_id).await?;
        Ok(self.load_settings(property_id).await?.map(|s| s.view()))
    }

    /// Create or replace an owned property's settings
    ///
    /// Secrets left out of the request keep their stored values. Enabling
    /// requires every credential to be present.
    pub async fn upsert_settings(
        &self,
        landlord_id: &str,
        property_id: &str,
        req: UpdatePaymentSettingsRequest,
    ) -> PortalResult<PaymentSettingsView> {
        load_owned_property(&self.db, property_id, landlord_id).await?;

        if !req.shortcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(PortalError::Validation("shortcode must be numeric".to_string()));
        }

        let existing = self.load_settings(property_id).await?;
        let keep = |new: Option<String>, old: Option<&str>| -> String {
            new.filter(|v| !v.trim().is_empty())
                .map(|v| v.trim().to_string())
                .or_else(|| old.map(str::to_string))
                .unwrap_or_default()
        };
        let passkey = keep(req.passkey, existing.as_ref().map(|s| s.passkey.as_str()));
        let consumer_key = keep(req.consumer_key, existing.as_ref().map(|s| s.consumer_key.as_str()));
        let consumer_secret = keep(
            req.consumer_secret,
            existing.as_ref().map(|s| s.consumer_secret.as_str()),
        );
        let transaction_type = keep(
            req.transaction_type,
            existing.as_ref().map(|s| s.transaction_type.as_str()),
        );
        let transaction_type = if transaction_type.is_empty() {
            "CustomerPayBillOnline".to_string()
        } else {
            transaction_type
        };

        if req.enabled && (passkey.is_empty() || consumer_key.is_empty() || consumer_secret.is_empty()) {
            return Err(PortalError::Validation(
                "passkey, consumerKey and consumerSecret are required to enable payments".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO payment_settings (property_id, enabled, environment, shortcode, passkey, consumer_key, consumer_secret, transaction_type, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(property_id) DO UPDATE SET
                enabled = excluded.enabled,
                environment = excluded.environment,
                shortcode = excluded.shortcode,
                passkey = excluded.passkey,
                consumer_key = excluded.consumer_key,
                consumer_secret = excluded.consumer_secret,
                transaction_type = excluded.transaction_type,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(property_id)
        .bind(req.enabled)
        .bind(req.environment.as_str())
        .bind(req.shortcode.trim())
        .bind(&passkey)
        .bind(&consumer_key)
        .bind(&consumer_secret)
        .bind(&transaction_type)
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        tracing::info!(property_id, enabled = req.enabled, "payment settings updated");

        self.load_settings(property_id)
            .await?
            .map(|s| s.view())
            .ok_or_else(|| PortalError::Internal("Payment settings vanished after upsert".to_string()))
    }

    /// Start a rent payment for the tenant's unit
    ///
    /// The row is written `pending` first; a provider failure is recorded on
    /// the row as `failed` before the error is returned.
    pub async fn initiate(
        &self,
        tenant: &Profile,
        req: InitiatePaymentRequest,
    ) -> PortalResult<PaymentTransaction> {
        if tenant.role != Role::Tenant {
            return Err(PortalError::Authorization(
                "Only tenants can initiate payments".to_string(),
            ));
        }

        let phone = normalize_msisdn(&req.phone)?;

        let unit = sqlx::query_as::<_, (String, String, Option<String>)>(
            "SELECT property_id, unit_number, tenant_id FROM units WHERE id = ?1",
        )
        .bind(&req.unit_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PortalError::NotFound("Unit not found".to_string()))?;
        let (property_id, unit_number, occupant) = unit;
        if occupant.as_deref() != Some(tenant.id.as_str()) {
            return Err(PortalError::Authorization(
                "You do not occupy this unit".to_string(),
            ));
        }

        let settings = self
            .load_settings(&property_id)
            .await?
            .filter(|s| s.enabled)
            .ok_or_else(|| {
                PortalError::Validation("Payments are not enabled for this property".to_string())
            })?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO payment_transactions (id, property_id, unit_id, tenant_id, amount, phone, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)
            "#,
        )
        .bind(&id)
        .bind(&property_id)
        .bind(&req.unit_id)
        .bind(&tenant.id)
        .bind(req.amount)
        .bind(&phone)
        .bind(now)
        .execute(&self.db)
        .await?;
        metrics::record_payment_status(PaymentStatus::Pending.as_str());

        let push = PushRequest {
            amount: req.amount,
            phone,
            account_reference: unit_number.clone(),
            description: format!("Rent for unit {}", unit_number),
            callback_url: self.config.callback_url.clone(),
        };

        match self.provider.initiate_push(&settings, &push).await {
            Ok(accepted) => {
                let result = sqlx::query(
                    "UPDATE payment_transactions
                     SET status = 'processing', checkout_request_id = ?1, merchant_request_id = ?2, updated_at = ?3
                     WHERE id = ?4 AND status = 'pending'",
                )
                .bind(&accepted.checkout_request_id)
                .bind(&accepted.merchant_request_id)
                .bind(Utc::now())
                .bind(&id)
                .execute(&self.db)
                .await?;
                if result.rows_affected() == 1 {
                    metrics::record_payment_status(PaymentStatus::Processing.as_str());
                }

                tracing::info!(
                    transaction_id = %id,
                    checkout_request_id = %accepted.checkout_request_id,
                    "payment push accepted"
                );
                self.get(&id).await
            }
            Err(e) => {
                let message = match &e {
                    PortalError::Provider(msg) => msg.clone(),
                    other => other.to_string(),
                };
                tracing::warn!(transaction_id = %id, error = %message, "payment push failed");

                sqlx::query(
                    "UPDATE payment_transactions SET status = 'failed', error_message = ?1, updated_at = ?2
                     WHERE id = ?3 AND status = 'pending'",
                )
                .bind(&message)
                .bind(Utc::now())
                .bind(&id)
                .execute(&self.db)
                .await?;
                metrics::record_payment_status(PaymentStatus::Failed.as_str());

                Err(PortalError::Provider(message))
            }
        }
    }

    /// Handle a provider callback
    ///
    /// Always returns the acceptance acknowledgement; failures are logged.
    pub async fn handle_callback(&self, body: &[u8]) -> CallbackAck {
        let result = match parse_callback(body) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed payment callback");
                metrics::record_payment_callback("malformed");
                return CallbackAck::accepted();
            }
        };

        match self.apply_callback(&result).await {
            Ok(CallbackOutcome::Applied(status)) => {
                metrics::record_payment_callback("applied");
                tracing::info!(
                    checkout_request_id = %result.checkout_request_id,
                    status = status.as_str(),
                    "payment callback applied"
                );
            }
            Ok(CallbackOutcome::UnknownTransaction) => {
                metrics::record_payment_callback("unknown_transaction");
                tracing::warn!(
                    checkout_request_id = %result.checkout_request_id,
                    "payment callback for unknown transaction"
                );
            }
            Ok(CallbackOutcome::AlreadySettled) => {
                metrics::record_payment_callback("already_settled");
                tracing::info!(
                    checkout_request_id = %result.checkout_request_id,
                    "payment callback for settled transaction ignored"
                );
            }
            Err(e) => {
                metrics::record_payment_callback("error");
                tracing::error!(
                    checkout_request_id = %result.checkout_request_id,
                    error = %e,
                    "failed to apply payment callback"
                );
            }
        }

        CallbackAck::accepted()
    }

    /// Settle a transaction from a parsed callback
    pub async fn apply_callback(&self, result: &CallbackResult) -> PortalResult<CallbackOutcome> {
        let Some(transaction) = self.find_by_checkout_id(&result.checkout_request_id).await? else {
            return Ok(CallbackOutcome::UnknownTransaction);
        };

        let next = if result.is_success() {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        };
        if !transaction.status.can_transition_to(next) {
            return Ok(CallbackOutcome::AlreadySettled);
        }

        let updated = sqlx::query(
            r#"
            UPDATE payment_transactions
            SET status = ?1, result_code = ?2, result_desc = ?3, mpesa_receipt = ?4,
                transaction_date = ?5, merchant_request_id = COALESCE(merchant_request_id, ?6),
                updated_at = ?7
            WHERE id = ?8 AND status = ?9
            "#,
        )
        .bind(next.as_str())
        .bind(result.result_code)
        .bind(&result.result_desc)
        .bind(&result.receipt)
        .bind(&result.transaction_date)
        .bind(&result.merchant_request_id)
        .bind(Utc::now())
        .bind(&transaction.id)
        .bind(transaction.status.as_str())
        .execute(&self.db)
        .await?;

        if updated.rows_affected() == 0 {
            return Ok(CallbackOutcome::AlreadySettled);
        }

        metrics::record_payment_status(next.as_str());
        Ok(CallbackOutcome::Applied(next))
    }

    pub async fn get(&self, id: &str) -> PortalResult<PaymentTransaction> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_transactions WHERE id = ?1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| PortalError::NotFound("Transaction not found".to_string()))?;

        PaymentTransaction::from_row(&row)
    }

    async fn find_by_checkout_id(&self, checkout_request_id: &str) -> PortalResult<Option<PaymentTransaction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM payment_transactions WHERE checkout_request_id = ?1",
            TRANSACTION_COLUMNS
        ))
        .bind(checkout_request_id)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(PaymentTransaction::from_row).transpose()
    }

    /// Current stored status, for polling clients
    pub async fn get_status(
        &self,
        profile: &Profile,
        query: &PaymentStatusQuery,
    ) -> PortalResult<PaymentTransaction> {
        let transaction = match (&query.id, &query.checkout_request_id) {
            (Some(id), _) => self.get(id).await?,
            (None, Some(checkout_request_id)) => self
                .find_by_checkout_id(checkout_request_id)
                .await?
                .ok_or_else(|| PortalError::NotFound("Transaction not found".to_string()))?,
            (None, None) => {
                return Err(PortalError::Validation(
                    "id or checkoutRequestId is required".to_string(),
                ))
            }
        };

        let visible = match profile.role {
            Role::Tenant => transaction.tenant_id == profile.id,
            Role::Landlord => {
                match load_owned_property(&self.db, &transaction.property_id, &profile.id).await {
                    Ok(_) => true,
                    Err(PortalError::Authorization(_) | PortalError::NotFound(_)) => false,
                    Err(e) => return Err(e),
                }
            }
            Role::Guard => false,
        };
        if !visible {
            return Err(PortalError::Authorization(
                "Not permitted to view this transaction".to_string(),
            ));
        }

        Ok(transaction)
    }

    /// Transactions visible to the caller, newest first
    pub async fn list_for(&self, profile: &Profile) -> PortalResult<Vec<PaymentTransaction>> {
        let sql = match profile.role {
            Role::Tenant => format!(
                "SELECT {} FROM payment_transactions WHERE tenant_id = ?1 ORDER BY created_at DESC",
                TRANSACTION_COLUMNS
            ),
            Role::Landlord => format!(
                "SELECT {} FROM payment_transactions
                 WHERE property_id IN (SELECT id FROM properties WHERE landlord_id = ?1)
                 ORDER BY created_at DESC",
                TRANSACTION_COLUMNS
            ),
            Role::Guard => {
                return Err(PortalError::Authorization(
                    "Guards cannot view payments".to_string(),
                ))
            }
        };

        let rows = sqlx::query(&sql).bind(&profile.id).fetch_all(&self.db).await?;
        rows.iter().map(PaymentTransaction::from_row).collect()
    }

    /// Fail transactions the provider never settled
    ///
    /// Called periodically by the job scheduler.
    pub async fn reconcile_stale(&self) -> PortalResult<u64> {
        let now = Utc::now();
        let pending_cutoff = now - Duration::minutes(self.config.pending_timeout_minutes);
        let processing_cutoff = now - Duration::hours(self.config.processing_timeout_hours);

        let pending = sqlx::query(
            "UPDATE payment_transactions
             SET status = 'failed', error_message = 'Timed out before reaching the provider', updated_at = ?1
             WHERE status = 'pending' AND created_at < ?2",
        )
        .bind(now)
        .bind(pending_cutoff)
        .execute(&self.db)
        .await?
        .rows_affected();

        let processing = sqlx::query(
            "UPDATE payment_transactions
             SET status = 'failed', error_message = 'No confirmation received from the provider', updated_at = ?1
             WHERE status = 'processing' AND updated_at < ?2",
        )
        .bind(now)
        .bind(processing_cutoff)
        .execute(&self.db)
        .await?
        .rows_affected();

        let total = pending + processing;
        if total > 0 {
            tracing::info!(pending, processing, "Failed stale payment transactions");
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ServerConfig,
        db::memory_pool,
        payment::ProviderEnvironment,
        test_support::{seed_payment_settings, seed_profile, seed_property, seed_unit, FakeProvider},
    };

    struct Fixture {
        db: SqlitePool,
        tenant: Profile,
        landlord: Profile,
        unit_id: String,
        property_id: String,
    }

    async fn fixture(enabled: bool) -> Fixture {
        let db = memory_pool().await;
        let landlord = seed_profile(&db, "ll@example.com", Role::Landlord).await;
        let tenant = seed_profile(&db, "t@example.com", Role::Tenant).await;
        let property = seed_property(&db, &landlord.id, "Palm Villas").await;
        let unit = seed_unit(&db, &property.id, "4B", Some(&tenant.id)).await;
        seed_payment_settings(&db, &property.id, enabled).await;

        Fixture {
            db,
            tenant,
            landlord,
            unit_id: unit.id,
            property_id: property.id,
        }
    }

    fn manager(db: &SqlitePool, provider: FakeProvider) -> PaymentManager {
        PaymentManager::new(
            db.clone(),
            Arc::new(provider),
            ServerConfig::for_tests().payments,
        )
    }

    fn initiate_request(unit_id: &str) -> InitiatePaymentRequest {
        InitiatePaymentRequest {
            unit_id: unit_id.to_string(),
            amount: 15000,
            phone: "0712345678".to_string(),
        }
    }

    fn callback_body(checkout_request_id: &str, result_code: i64) -> String {
        serde_json::json!({
            "Body": {"stkCallback": {
                "MerchantRequestID": "mr-1",
                "CheckoutRequestID": checkout_request_id,
                "ResultCode": result_code,
                "ResultDesc": if result_code == 0 { "Success" } else { "Request cancelled by user" },
                "CallbackMetadata": {"Item": [
                    {"Name": "Amount", "Value": 15000},
                    {"Name": "MpesaReceiptNumber", "Value": "QAB12CD34E"},
                    {"Name": "TransactionDate", "Value": 20240405101500u64}
                ]}
            }}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_initiate_moves_to_processing() {
        let f = fixture(true).await;
        let payments = manager(&f.db, FakeProvider::accepting());

        let tx = payments.initiate(&f.tenant, initiate_request(&f.unit_id)).await.unwrap();
        assert_eq!(tx.status, PaymentStatus::Processing);
        assert_eq!(tx.phone, "254712345678");
        assert!(tx.checkout_request_id.is_some());
        assert!(tx.merchant_request_id.is_some());
    }

    #[tokio::test]
    async fn test_provider_failure_records_failed_row() {
        let f = fixture(true).await;
        let payments = manager(&f.db, FakeProvider::failing("Invalid Access Token"));

        let err = payments
            .initiate(&f.tenant, initiate_request(&f.unit_id))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Provider(_)));

        let (status, message): (String, Option<String>) =
            sqlx::query_as("SELECT status, error_message FROM payment_transactions")
                .fetch_one(&f.db)
                .await
                .unwrap();
        assert_eq!(status, "failed");
        assert_eq!(message.as_deref(), Some("Invalid Access Token"));
    }

    #[tokio::test]
    async fn test_initiate_requires_enabled_settings_and_occupancy() {
        let f = fixture(false).await;
        let provider = Arc::new(FakeProvider::accepting());
        let payments = PaymentManager::new(f.db.clone(), provider.clone(), ServerConfig::for_tests().payments);

        let err = payments
            .initiate(&f.tenant, initiate_request(&f.unit_id))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));

        let stranger = seed_profile(&f.db, "s@example.com", Role::Tenant).await;
        let err = payments
            .initiate(&stranger, initiate_request(&f.unit_id))
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Authorization(_)));

        let mut bad_phone = initiate_request(&f.unit_id);
        bad_phone.phone = "12345".to_string();
        let err = payments.initiate(&f.tenant, bad_phone).await.unwrap_err();
        assert!(matches!(err, PortalError::Validation(_)));

        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_callback_completes_transaction() {
        let f = fixture(true).await;
        let payments = manager(&f.db, FakeProvider::accepting());
        let tx = payments.initiate(&f.tenant, initiate_request(&f.unit_id)).await.unwrap();
        let checkout = tx.checkout_request_id.clone().unwrap();

        let ack = payments.handle_callback(callback_body(&checkout, 0).as_bytes()).await;
        assert_eq!(ack, CallbackAck::accepted());

        let settled = payments.get(&tx.id).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Completed);
        assert_eq!(settled.mpesa_receipt.as_deref(), Some("QAB12CD34E"));
        assert_eq!(settled.result_code, Some(0));

        // Late failure callback does not reopen a completed payment
        let outcome = payments
            .apply_callback(&parse_callback(callback_body(&checkout, 1032).as_bytes()).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, CallbackOutcome::AlreadySettled);
        assert_eq!(payments.get(&tx.id).await.unwrap().status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_callback_failure_code() {
        let f = fixture(true).await;
        let payments = manager(&f.db, FakeProvider::accepting());
        let tx = payments.initiate(&f.tenant, initiate_request(&f.unit_id)).await.unwrap();

        payments
            .handle_callback(callback_body(tx.checkout_request_id.as_deref().unwrap(), 1032).as_bytes())
            .await;

        let settled = payments.get(&tx.id).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Failed);
        assert_eq!(settled.result_code, Some(1032));
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_callback_is_acknowledged() {
        let f = fixture(true).await;
        let payments = manager(&f.db, FakeProvider::accepting());

        let ack = payments.handle_callback(callback_body("ws_CO_missing", 0).as_bytes()).await;
        assert_eq!(ack, CallbackAck::accepted());
        let ack = payments.handle_callback(b"{broken").await;
        assert_eq!(ack, CallbackAck::accepted());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM payment_transactions")
            .fetch_one(&f.db)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_status_and_list_are_scoped() {
        let f = fixture(true).await;
        let payments = manager(&f.db, FakeProvider::accepting());
        let tx = payments.initiate(&f.tenant, initiate_request(&f.unit_id)).await.unwrap();

        let by_checkout = payments
            .get_status(
                &f.landlord,
                &PaymentStatusQuery {
                    id: None,
                    checkout_request_id: tx.checkout_request_id.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_checkout.id, tx.id);

        let other = seed_profile(&f.db, "other@example.com", Role::Landlord).await;
        let err = payments
            .get_status(
                &other,
                &PaymentStatusQuery {
                    id: Some(tx.id.clone()),
                    checkout_request_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Authorization(_)));

        assert_eq!(payments.list_for(&f.tenant).await.unwrap().len(), 1);
        assert_eq!(payments.list_for(&f.landlord).await.unwrap().len(), 1);
        assert!(payments.list_for(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_propagates_database_errors() {
        let f = fixture(true).await;
        let payments = manager(&f.db, FakeProvider::accepting());
        let tx = payments.initiate(&f.tenant, initiate_request(&f.unit_id)).await.unwrap();

        sqlx::query("ALTER TABLE properties RENAME TO properties_archived")
            .execute(&f.db)
            .await
            .unwrap();

        let err = payments
            .get_status(
                &f.landlord,
                &PaymentStatusQuery {
                    id: Some(tx.id.clone()),
                    checkout_request_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Database(_)));
    }

    #[tokio::test]
    async fn test_reconcile_stale_transactions() {
        let f = fixture(true).await;
        let payments = manager(&f.db, FakeProvider::accepting());
        let old = Utc::now() - Duration::hours(30);

        for (id, status) in [("stale-pending", "pending"), ("stale-processing", "processing")] {
            sqlx::query(
                "INSERT INTO payment_transactions (id, property_id, unit_id, tenant_id, amount, phone, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 100, '254712345678', ?5, ?6, ?6)",
            )
            .bind(id)
            .bind(&f.property_id)
            .bind(&f.unit_id)
            .bind(&f.tenant.id)
            .bind(status)
            .bind(old)
            .execute(&f.db)
            .await
            .unwrap();
        }
        let fresh = payments.initiate(&f.tenant, initiate_request(&f.unit_id)).await.unwrap();

        assert_eq!(payments.reconcile_stale().await.unwrap(), 2);
        assert_eq!(payments.get("stale-pending").await.unwrap().status, PaymentStatus::Failed);
        assert_eq!(payments.get(&fresh.id).await.unwrap().status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn test_settings_hide_secrets_and_keep_them_on_update() {
        let f = fixture(false).await;
        let payments = manager(&f.db, FakeProvider::accepting());

        let view = payments
            .upsert_settings(
                &f.landlord.id,
                &f.property_id,
                UpdatePaymentSettingsRequest {
                    enabled: true,
                    environment: ProviderEnvironment::Production,
                    shortcode: "600000".to_string(),
                    passkey: None,
                    consumer_key: None,
                    consumer_secret: None,
                    transaction_type: None,
                },
            )
            .await
            .unwrap();
        assert!(view.enabled);
        assert!(view.credentials_configured);
        assert_eq!(view.environment, ProviderEnvironment::Production);

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("secret"));

        let err = payments
            .get_settings("someone-else", &f.property_id)
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Authorization(_)));
    }
}
