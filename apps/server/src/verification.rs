use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Government id numbers are exactly this many digits.
pub const ID_NUMBER_DIGITS: usize = 12;

#[derive(Debug, Clone)]
pub struct VerificationOutcome {
    pub verified: bool,
    pub reason: Option<String>,
}

/// External verification collaborator: one call per id number, returning
/// verified/unverified plus an error reason. The core trusts the answer.
#[async_trait]
pub trait VerificationProvider: Send + Sync {
    async fn verify(&self, id_number: &str) -> anyhow::Result<VerificationOutcome>;
}

/// Format-only verifier standing in for a real KYC vendor integration.
/// TODO: replace with the UIDAI-approved vendor client once credentials land.
pub struct FormatCheckVerifier;

#[async_trait]
impl VerificationProvider for FormatCheckVerifier {
    async fn verify(&self, id_number: &str) -> anyhow::Result<VerificationOutcome> {
        if normalize_id_number(id_number).len() != ID_NUMBER_DIGITS {
            return Ok(VerificationOutcome {
                verified: false,
                reason: Some("invalid id number format".into()),
            });
        }
        Ok(VerificationOutcome {
            verified: true,
            reason: None,
        })
    }
}

/// Strip everything but digits, so "1234 5678 9012" and "1234-5678-9012"
/// hash identically.
pub fn normalize_id_number(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Only this hash is ever persisted; the raw number never touches the store.
pub fn hash_id_number(id_number: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id_number.as_bytes());
    hex::encode(hasher.finalize())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_id_number("1234 5678 9012"), "123456789012");
        assert_eq!(normalize_id_number("1234-5678-9012"), "123456789012");
        assert_eq!(normalize_id_number("abc"), "");
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = hash_id_number("123456789012");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_id_number("123456789012"), hash_id_number("123456789012"));
        assert_ne!(hash_id_number("123456789012"), hash_id_number("123456789013"));
    }

    #[tokio::test]
    async fn test_format_verifier_accepts_twelve_digits() {
        let outcome = FormatCheckVerifier.verify("123456789012").await.unwrap();
        assert!(outcome.verified);
        assert!(outcome.reason.is_none());
    }

    #[tokio::test]
    async fn test_format_verifier_rejects_short_numbers() {
        let outcome = FormatCheckVerifier.verify("12345").await.unwrap();
        assert!(!outcome.verified);
        assert!(outcome.reason.is_some());
    }
}
