/// Kenyan phone number normalisation
use crate::error::{PortalError, PortalResult};

/// Normalise to the MSISDN form the providers expect (`2547XXXXXXXX` or
/// `2541XXXXXXXX`)
///
/// Accepts `07…`, `01…`, `+254…`, `254…` and bare `7…`/`1…`, ignoring
/// spaces, dashes and parentheses.
pub fn normalize_msisdn(input: &str) -> PortalResult<String> {
    let digits: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
        .collect();

    let subscriber = if let Some(rest) = digits.strip_prefix("+254") {
        rest
    } else if let Some(rest) = digits.strip_prefix("254") {
        rest
    } else if let Some(rest) = digits.strip_prefix('0') {
        rest
    } else {
        digits.as_str()
    };

    let valid = subscriber.len() == 9
        && subscriber.chars().all(|c| c.is_ascii_digit())
        && (subscriber.starts_with('7') || subscriber.starts_with('1'));

    if !valid {
        return Err(PortalError::Validation(format!(
            "Invalid phone number: {}",
            input.trim()
        )));
    }

    Ok(format!("254{}", subscriber))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_forms() {
        for input in [
            "0712345678",
            "+254712345678",
            "254712345678",
            "712345678",
            "0712 345 678",
            "+254 (712) 345-678",
        ] {
            assert_eq!(normalize_msisdn(input).unwrap(), "254712345678", "{}", input);
        }
        assert_eq!(normalize_msisdn("0110123456").unwrap(), "254110123456");
    }

    #[test]
    fn test_rejected_forms() {
        for input in ["", "12345", "0812345678", "+255712345678", "07123456789", "07abc45678"] {
            assert!(normalize_msisdn(input).is_err(), "{}", input);
        }
    }
}
