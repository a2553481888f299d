// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GitHub-style HMAC-SHA256 signature verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header consulted when the subscription does not name one.
pub const DEFAULT_SIGNATURE_HEADER: &str = "X-Hub-Signature-256";

/// Verify an HMAC-SHA256 signature over `body`.
///
/// The header value is a hex digest, optionally prefixed with `sha256=`
/// (case-insensitive). Comparison happens in constant time via
/// [`Mac::verify_slice`]; malformed hex and length mismatches are
/// mismatches, not errors.
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let hex_digest = strip_sha256_prefix(header_value);

    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn strip_sha256_prefix(value: &str) -> &str {
    if value.len() >= 7 && value[..7].eq_ignore_ascii_case("sha256=") {
        &value[7..]
    } else {
        value
    }
}

/// Hex-encode the HMAC-SHA256 of `body` under `secret` (for tests and the
/// setup tooling that signs sample deliveries).
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"ref":"refs/heads/main"}"#;
        let sig = sign("abc", body);
        assert!(verify_signature("abc", body, &format!("sha256={sig}")));
    }

    #[test]
    fn prefix_is_optional_and_case_insensitive() {
        let body = b"payload";
        let sig = sign("key", body);
        assert!(verify_signature("key", body, &sig));
        assert!(verify_signature("key", body, &format!("SHA256={sig}")));
        assert!(verify_signature("key", body, &format!("Sha256={sig}")));
    }

    #[test]
    fn tampered_body_fails() {
        let sig = sign("abc", b"original");
        assert!(!verify_signature("abc", b"tampered", &format!("sha256={sig}")));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = sign("abc", b"body");
        assert!(!verify_signature("xyz", b"body", &format!("sha256={sig}")));
    }

    #[test]
    fn malformed_hex_fails() {
        assert!(!verify_signature("abc", b"body", "sha256=not-hex-at-all"));
    }

    #[test]
    fn truncated_digest_fails() {
        let sig = sign("abc", b"body");
        assert!(!verify_signature("abc", b"body", &format!("sha256={}", &sig[..32])));
    }

    #[test]
    fn uppercase_hex_digest_verifies() {
        let body = b"body";
        let sig = sign("abc", body).to_uppercase();
        assert!(verify_signature("abc", body, &format!("sha256={sig}")));
    }
}
