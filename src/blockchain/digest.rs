use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of hex characters in a digest
pub const DIGEST_HEX_LEN: usize = 64;

/// Computes the digest of a block's fields
///
/// The preimage is the compact JSON array
/// `[index, timestamp, payload, proof, previous_hash]`. Object keys inside the
/// payload come out sorted because serde_json's default map is ordered, so two
/// logically equal payloads always encode to the same bytes.
///
/// # Returns
///
/// The SHA-256 of the preimage as a lowercase hexadecimal string
pub fn digest(
    index: u64,
    timestamp: &DateTime<Utc>,
    payload: &[Value],
    proof: u64,
    previous_hash: &str,
) -> String {
    let preimage = serde_json::json!([index, timestamp, payload, proof, previous_hash]);

    let mut hasher = Sha256::new();
    hasher.update(preimage.to_string().as_bytes());

    hex::encode(hasher.finalize())
}

/// Checks whether a digest starts with `difficulty` zero hex characters
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    let difficulty = difficulty as usize;
    hash.len() >= difficulty && hash.bytes().take(difficulty).all(|b| b == b'0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_digest_is_deterministic() {
        let payload = vec![json!("x"), json!({"b": 2, "a": 1})];
        let first = digest(1, &fixed_time(), &payload, 42, "abc");
        let second = digest(1, &fixed_time(), &payload, 42, "abc");

        assert_eq!(first, second);
        assert_eq!(first.len(), DIGEST_HEX_LEN);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_digest_ignores_object_key_order() {
        let left: Value = serde_json::from_str(r#"{"a": 1, "b": [1, 2]}"#).unwrap();
        let right: Value = serde_json::from_str(r#"{"b": [1, 2], "a": 1}"#).unwrap();

        assert_eq!(
            digest(3, &fixed_time(), &[left], 0, "0"),
            digest(3, &fixed_time(), &[right], 0, "0"),
        );
    }

    #[test]
    fn test_digest_changes_with_every_field() {
        let payload = vec![json!("x")];
        let base = digest(1, &fixed_time(), &payload, 7, "prev");
        let later = fixed_time() + chrono::Duration::milliseconds(1);

        assert_ne!(base, digest(2, &fixed_time(), &payload, 7, "prev"));
        assert_ne!(base, digest(1, &later, &payload, 7, "prev"));
        assert_ne!(base, digest(1, &fixed_time(), &[json!("y")], 7, "prev"));
        assert_ne!(base, digest(1, &fixed_time(), &payload, 8, "prev"));
        assert_ne!(base, digest(1, &fixed_time(), &payload, 7, "other"));
    }

    #[test]
    fn test_digest_matches_canonical_preimage() {
        let payload = vec![json!({"k": "v", "a": null})];
        let expected = {
            let preimage =
                r#"[5,"2024-05-01T12:00:00Z",[{"a":null,"k":"v"}],9,"prev"]"#;
            hex::encode(Sha256::digest(preimage.as_bytes()))
        };

        assert_eq!(digest(5, &fixed_time(), &payload, 9, "prev"), expected);
    }

    #[test]
    fn test_acceptance_rate_follows_difficulty() {
        let payload = vec![json!("sample")];
        let trials = 20_000;
        let accepted = (0..trials)
            .map(|_| digest(1, &fixed_time(), &payload, rand::random::<u64>(), "prev"))
            .filter(|hash| meets_difficulty(hash, 1))
            .count();

        // Expect 1/16 of random proofs to pass at difficulty 1.
        let rate = accepted as f64 / trials as f64;
        assert!((rate - 1.0 / 16.0).abs() < 0.01, "rate was {}", rate);
    }

    #[test]
    fn test_meets_difficulty() {
        assert!(meets_difficulty("00ab", 2));
        assert!(meets_difficulty("000b", 2));
        assert!(!meets_difficulty("0a0b", 2));
        assert!(meets_difficulty("abcd", 0));
        assert!(!meets_difficulty("00", 3));
    }
}
