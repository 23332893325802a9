//! Verification of shared-secret webhooks.
//!
//! Vendors without signed payloads authenticate with a secret header, compared in
//! constant time.

/// Compare a presented shared secret with the configured one
pub fn verify_shared_secret(presented: Option<&str>, expected: &str) -> bool {
    presented.is_some_and(|value| constant_time_eq(value.as_bytes(), expected.as_bytes()))
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_secret() {
        assert!(verify_shared_secret(Some("s3cret"), "s3cret"));
        assert!(!verify_shared_secret(Some("s3cre"), "s3cret"));
        assert!(!verify_shared_secret(Some("S3CRET"), "s3cret"));
        assert!(!verify_shared_secret(None, "s3cret"));
    }
}
