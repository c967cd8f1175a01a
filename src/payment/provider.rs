/// Payment provider client
///
/// The STK push ("lipa na M-Pesa online") flow: fetch an OAuth token with
/// the property's consumer credentials, then ask the provider to prompt the
/// payer's phone. The outcome arrives later on the callback URL.
use super::PaymentSettings;
use crate::error::{PortalError, PortalResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A push request for one transaction
#[derive(Debug, Clone)]
pub struct PushRequest {
    pub amount: i64,
    /// MSISDN, `2547XXXXXXXX`
    pub phone: String,
    pub account_reference: String,
    pub description: String,
    pub callback_url: String,
}

/// Provider identifiers for an accepted push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushAccepted {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub customer_message: Option<String>,
}

/// Mobile-money push provider
#[async_trait]
pub trait PushPaymentProvider: Send + Sync {
    /// Ask the provider to prompt the payer; errors carry the provider message
    async fn initiate_push(
        &self,
        settings: &PaymentSettings,
        request: &PushRequest,
    ) -> PortalResult<PushAccepted>;
}

/// Safaricom Daraja client
#[derive(Clone)]
pub struct DarajaClient {
    http_client: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushBody<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'a str,
    amount: i64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    callback_url: &'a str,
    account_reference: &'a str,
    transaction_desc: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
    response_code: Option<String>,
    response_description: Option<String>,
    customer_message: Option<String>,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

impl DarajaClient {
    pub fn new(timeout_secs: u64) -> PortalResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("estate-portal/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PortalError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http_client })
    }

    async fn access_token(&self, settings: &PaymentSettings) -> PortalResult<String> {
        let url = format!(
            "{}/oauth/v1/generate?grant_type=client_credentials",
            settings.environment.base_url()
        );

        let response = self
            .http_client
            .get(&url)
            .basic_auth(&settings.consumer_key, Some(&settings.consumer_secret))
            .send()
            .await
            .map_err(|e| PortalError::Provider(format!("OAuth request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PortalError::Provider(format!(
                "OAuth request rejected with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PortalError::Provider(format!("Invalid OAuth response: {}", e)))?;

        Ok(token.access_token)
    }
}

#[async_trait]
impl PushPaymentProvider for DarajaClient {
    async fn initiate_push(
        &self,
        settings: &PaymentSettings,
        request: &PushRequest,
    ) -> PortalResult<PushAccepted> {
        let token = self.access_token(settings).await?;
        let timestamp = provider_timestamp(Utc::now());

        let body = StkPushBody {
            business_short_code: &settings.shortcode,
            password: push_password(&settings.shortcode, &settings.passkey, &timestamp),
            timestamp,
            transaction_type: &settings.transaction_type,
            amount: request.amount,
            party_a: &request.phone,
            party_b: &settings.shortcode,
            phone_number: &request.phone,
            callback_url: &request.callback_url,
            account_reference: &request.account_reference,
            transaction_desc: &request.description,
        };

        let url = format!(
            "{}/mpesa/stkpush/v1/processrequest",
            settings.environment.base_url()
        );
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| PortalError::Provider(format!("STK push request failed: {}", e)))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PortalError::Provider(format!("STK push response unreadable: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ProviderErrorBody>(&bytes)
                .ok()
                .and_then(|b| b.error_message)
                .unwrap_or_else(|| format!("status {}", status));
            return Err(PortalError::Provider(format!("STK push rejected: {}", message)));
        }

        let parsed: StkPushResponse = serde_json::from_slice(&bytes)
            .map_err(|e| PortalError::Provider(format!("Invalid STK push response: {}", e)))?;

        if parsed.response_code.as_deref() != Some("0") {
            return Err(PortalError::Provider(
                parsed
                    .response_description
                    .unwrap_or_else(|| "STK push was not accepted".to_string()),
            ));
        }

        match (parsed.merchant_request_id, parsed.checkout_request_id) {
            (Some(merchant_request_id), Some(checkout_request_id)) => Ok(PushAccepted {
                merchant_request_id,
                checkout_request_id,
                customer_message: parsed.customer_message,
            }),
            _ => Err(PortalError::Provider(
                "STK push response missing request identifiers".to_string(),
            )),
        }
    }
}

/// `YYYYMMDDHHMMSS` in East Africa Time (UTC+3)
pub fn provider_timestamp(now: DateTime<Utc>) -> String {
    (now + chrono::Duration::hours(3))
        .format("%Y%m%d%H%M%S")
        .to_string()
}

/// `base64(shortcode + passkey + timestamp)`
pub fn push_password(shortcode: &str, passkey: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", shortcode, passkey, timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_provider_timestamp_is_eat() {
        let now = Utc.with_ymd_and_hms(2024, 3, 31, 22, 15, 9).unwrap();
        assert_eq!(provider_timestamp(now), "20240401011509");
    }

    #[test]
    fn test_push_password() {
        let password = push_password("174379", "passkey", "20240401011509");
        let decoded = String::from_utf8(STANDARD.decode(password).unwrap()).unwrap();
        assert_eq!(decoded, "174379passkey20240401011509");
    }

    #[test]
    fn test_push_body_field_names() {
        let body = StkPushBody {
            business_short_code: "174379",
            password: "pw".to_string(),
            timestamp: "20240401011509".to_string(),
            transaction_type: "CustomerPayBillOnline",
            amount: 100,
            party_a: "254712345678",
            party_b: "174379",
            phone_number: "254712345678",
            callback_url: "https://example.com/cb",
            account_reference: "A1",
            transaction_desc: "Rent",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["BusinessShortCode"], "174379");
        assert_eq!(json["CallBackURL"], "https://example.com/cb");
        assert_eq!(json["PartyA"], "254712345678");
        assert_eq!(json["TransactionDesc"], "Rent");
    }
}
