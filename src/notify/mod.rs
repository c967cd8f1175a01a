/// Pre-filled chat links
///
/// Nothing is sent from the server: the client opens the link and the
/// sender confirms the message in their own chat app.

pub mod phone;

pub use phone::normalize_msisdn;

use crate::{
    account::Role,
    error::PortalResult,
    gate_pass::GatePass,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

const CHAT_BASE_URL: &str = "https://wa.me";

/// Generic link request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLinkRequest {
    pub phone: String,
    pub message: String,
}

/// Link plus the message it carries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatLink {
    pub phone: String,
    pub message: String,
    pub url: String,
}

/// Build `https://wa.me/<msisdn>?text=<message>`
pub fn chat_link(phone: &str, message: &str) -> PortalResult<ChatLink> {
    let msisdn = normalize_msisdn(phone)?;
    let url = format!(
        "{}/{}?text={}",
        CHAT_BASE_URL,
        msisdn,
        urlencoding::encode(message)
    );

    Ok(ChatLink {
        phone: msisdn,
        message: message.to_string(),
        url,
    })
}

/// Message sent to a visitor with their access code
pub fn gate_pass_message(pass: &GatePass, property_name: &str) -> String {
    format!(
        "Hello {}, you have been issued a gate pass for {}.\nAccess code: {}\nValid until: {}\nShow this code to the guard at the gate.",
        pass.visitor_name,
        property_name,
        pass.access_code,
        format_eat(pass.valid_until)
    )
}

/// Rent reminder from a landlord to a tenant
pub fn rent_reminder_message(
    tenant_name: &str,
    unit_number: &str,
    property_name: &str,
    amount: i64,
    due_date: NaiveDate,
) -> String {
    format!(
        "Hello {}, this is a friendly reminder that rent of {} for unit {} at {} is due on {}. Thank you.",
        tenant_name,
        format_kes(amount),
        unit_number,
        property_name,
        due_date.format("%d %b %Y")
    )
}

/// Invitation text with the signup link
pub fn invitation_message(role: Role, property_name: &str, signup_url: &str) -> String {
    format!(
        "You have been invited to join {} as a {} on Estate Portal. Create your account here: {}",
        property_name,
        role.as_str(),
        signup_url
    )
}

/// `KES 15,000`
pub fn format_kes(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("KES -{}", grouped)
    } else {
        format!("KES {}", grouped)
    }
}

/// Display time in East Africa Time
pub fn format_eat(at: DateTime<Utc>) -> String {
    (at + chrono::Duration::hours(3))
        .format("%d %b %Y %H:%M EAT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_chat_link_encodes_message() {
        let link = chat_link("0712 345 678", "Code: AB2C3D & welcome").unwrap();
        assert_eq!(link.phone, "254712345678");
        assert_eq!(
            link.url,
            "https://wa.me/254712345678?text=Code%3A%20AB2C3D%20%26%20welcome"
        );
    }

    #[test]
    fn test_chat_link_rejects_bad_phone() {
        assert!(chat_link("12", "hi").is_err());
    }

    #[test]
    fn test_format_kes() {
        assert_eq!(format_kes(0), "KES 0");
        assert_eq!(format_kes(950), "KES 950");
        assert_eq!(format_kes(15000), "KES 15,000");
        assert_eq!(format_kes(1234567), "KES 1,234,567");
    }

    #[test]
    fn test_rent_reminder_message() {
        let due = NaiveDate::from_ymd_opt(2024, 5, 5).unwrap();
        let message = rent_reminder_message("Otieno", "4B", "Palm Villas", 18500, due);
        assert!(message.contains("KES 18,500"));
        assert!(message.contains("unit 4B at Palm Villas"));
        assert!(message.contains("05 May 2024"));
    }

    #[test]
    fn test_format_eat() {
        let at = Utc.with_ymd_and_hms(2024, 5, 5, 21, 30, 0).unwrap();
        assert_eq!(format_eat(at), "06 May 2024 00:30 EAT");
    }
}
