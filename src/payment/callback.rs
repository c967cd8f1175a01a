/// Provider callback payloads
///
/// ```json
/// {"Body":{"stkCallback":{"MerchantRequestID":"..","CheckoutRequestID":"..",
///   "ResultCode":0,"ResultDesc":"..","CallbackMetadata":{"Item":[
///   {"Name":"MpesaReceiptNumber","Value":"NLJ7RT61SV"}, ...]}}}}
/// ```
use crate::error::{PortalError, PortalResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What we always answer, so the provider stops retrying
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CallbackAck {
    #[serde(rename = "ResultCode")]
    pub result_code: i64,
    #[serde(rename = "ResultDesc")]
    pub result_desc: String,
}

impl CallbackAck {
    pub fn accepted() -> Self {
        Self {
            result_code: 0,
            result_desc: "Accepted".to_string(),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Body")]
    body: EnvelopeBody,
}

#[derive(Deserialize)]
struct EnvelopeBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Deserialize)]
struct StkCallback {
    #[serde(rename = "MerchantRequestID")]
    merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    result_code: Value,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    items: Vec<MetadataItem>,
}

#[derive(Deserialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value")]
    value: Option<Value>,
}

/// Parsed callback
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackResult {
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: String,
    pub result_code: i64,
    pub result_desc: Option<String>,
    pub receipt: Option<String>,
    pub amount: Option<f64>,
    pub transaction_date: Option<String>,
    pub phone: Option<String>,
}

impl CallbackResult {
    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }
}

/// Parse a raw callback body
pub fn parse_callback(body: &[u8]) -> PortalResult<CallbackResult> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| PortalError::Validation(format!("Malformed callback: {}", e)))?;
    let cb = envelope.body.stk_callback;

    let result_code = match &cb.result_code {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| PortalError::Validation("Callback ResultCode is not an integer".to_string()))?;

    let items = cb.callback_metadata.map(|m| m.items).unwrap_or_default();
    let item = |name: &str| {
        items
            .iter()
            .find(|i| i.name == name)
            .and_then(|i| i.value.as_ref())
    };

    Ok(CallbackResult {
        merchant_request_id: cb.merchant_request_id,
        checkout_request_id: cb.checkout_request_id,
        result_code,
        result_desc: cb.result_desc,
        receipt: item("MpesaReceiptNumber").map(value_to_string),
        amount: item("Amount").and_then(Value::as_f64),
        transaction_date: item("TransactionDate").map(value_to_string),
        phone: item("PhoneNumber").map(value_to_string),
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUCCESS: &str = r#"{
        "Body": {"stkCallback": {
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_191220191020363925",
            "ResultCode": 0,
            "ResultDesc": "The service request is processed successfully.",
            "CallbackMetadata": {"Item": [
                {"Name": "Amount", "Value": 1.00},
                {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                {"Name": "Balance"},
                {"Name": "TransactionDate", "Value": 20191219102115},
                {"Name": "PhoneNumber", "Value": 254708374149}
            ]}
        }}
    }"#;

    #[test]
    fn test_parse_success_callback() {
        let result = parse_callback(SUCCESS.as_bytes()).unwrap();
        assert!(result.is_success());
        assert_eq!(result.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(result.receipt.as_deref(), Some("NLJ7RT61SV"));
        assert_eq!(result.transaction_date.as_deref(), Some("20191219102115"));
        assert_eq!(result.phone.as_deref(), Some("254708374149"));
        assert_eq!(result.amount, Some(1.0));
    }

    #[test]
    fn test_parse_cancelled_callback() {
        let body = r#"{"Body":{"stkCallback":{"MerchantRequestID":"m","CheckoutRequestID":"c",
            "ResultCode":1032,"ResultDesc":"Request cancelled by user"}}}"#;
        let result = parse_callback(body.as_bytes()).unwrap();
        assert!(!result.is_success());
        assert_eq!(result.result_code, 1032);
        assert!(result.receipt.is_none());
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_callback(b"not json").is_err());
        assert!(parse_callback(br#"{"Body":{}}"#).is_err());
    }

    #[test]
    fn test_ack_shape() {
        let json = serde_json::to_string(&CallbackAck::accepted()).unwrap();
        assert_eq!(json, r#"{"ResultCode":0,"ResultDesc":"Accepted"}"#);
    }
}
