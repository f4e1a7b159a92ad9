//! SHA-256 content fingerprints.

use sha2::{Digest, Sha256};

/// Hex digest over an unambiguous encoding of `fields`.
///
/// Each field is fed as `<byte length>:<bytes>` so that `["ab", "c"]` and
/// `["a", "bc"]` never hash the same.
pub fn fingerprint_fields(fields: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_fields_hash_like_empty_input() {
        assert_eq!(
            fingerprint_fields(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = fingerprint_fields(&["calm piano melody", "40", "calm_piano"]);
        let b = fingerprint_fields(&["calm piano melody", "40", "calm_piano"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_respects_field_boundaries() {
        assert_ne!(
            fingerprint_fields(&["ab", "c"]),
            fingerprint_fields(&["a", "bc"])
        );
    }

    #[test]
    fn fingerprint_matches_manual_encoding() {
        let expected = format!("{:x}", Sha256::digest(b"2:ab1:c"));
        assert_eq!(fingerprint_fields(&["ab", "c"]), expected);
    }
}
