/// Access code generation
use rand::{rngs::OsRng, Rng};

/// Uppercase letters and digits without 0/O/1/I
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const CODE_LENGTH: usize = 6;

/// Draw a fresh access code from the OS CSPRNG
pub fn generate_access_code() -> String {
    let mut rng = OsRng;
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Canonical form used for lookups
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_use_unambiguous_alphabet() {
        for _ in 0..500 {
            let code = generate_access_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)), "bad code {}", code);
            assert!(!code.contains(['0', 'O', '1', 'I']));
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  abc234 "), "ABC234");
    }
}
