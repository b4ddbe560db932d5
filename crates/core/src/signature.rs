//! Webhook HMAC-SHA256 signing and verification.
//!
//! External workers sign callback bodies with a shared secret and send the
//! result as `X-Signature-256: sha256=<hex>`. Verification is optional: it
//! only happens when both the header and a configured secret are present.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Header carrying the callback signature.
pub const SIGNATURE_HEADER: &str = "x-signature-256";

/// Scheme prefix in front of the hex digest.
pub const SIGNATURE_PREFIX: &str = "sha256=";

type HmacSha256 = Hmac<Sha256>;

/// Outcome of checking an inbound callback signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    /// Header present, secret configured, digest matches.
    Verified,
    /// No signature header; the callback is accepted unsigned.
    Unsigned,
    /// Header present but no secret configured. Accepted, caller should warn.
    NoSecretConfigured,
    /// Header present and secret configured, digest mismatch.
    Invalid,
}

impl SignatureCheck {
    /// Whether the request may proceed.
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Invalid)
    }
}

/// Compute the `sha256=<hex>` signature of `body` under `secret`.
pub fn compute_signature(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify a `sha256=<hex>` header value against `body` in constant time.
///
/// Malformed header values (missing prefix, odd length, non-hex) never
/// verify.
pub fn verify_signature(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(digest_hex) = header_value.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Some(expected) = hex::decode(digest_hex) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Apply the fail-open signature policy to one inbound request.
pub fn check_signature(
    secret: Option<&str>,
    body: &[u8],
    header_value: Option<&str>,
) -> SignatureCheck {
    match (header_value, secret) {
        (None, _) => SignatureCheck::Unsigned,
        (Some(_), None) => SignatureCheck::NoSecretConfigured,
        (Some(value), Some(secret)) => {
            if verify_signature(secret, body, value) {
                SignatureCheck::Verified
            } else {
                SignatureCheck::Invalid
            }
        }
    }
}

// ---------------------------------------------------------------------------
// hex helpers (no extra dep)
// ---------------------------------------------------------------------------

mod hex {
    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Decode a hex string (either case). Returns `None` on odd length or
    /// any non-hex character.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        s.as_bytes()
            .chunks(2)
            .map(|pair| {
                let hi = (pair[0] as char).to_digit(16)?;
                let lo = (pair[1] as char).to_digit(16)?;
                Some((hi * 16 + lo) as u8)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"job_id":"abc","status":"completed"}"#;

    #[test]
    fn computed_signature_has_prefix_and_sha256_length() {
        let sig = compute_signature("secret", BODY);
        assert!(sig.starts_with(SIGNATURE_PREFIX));
        assert_eq!(sig.len(), SIGNATURE_PREFIX.len() + 64);
    }

    #[test]
    fn signature_round_trips() {
        let sig = compute_signature("secret", BODY);
        assert!(verify_signature("secret", BODY, &sig));
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let sig = compute_signature("secret", BODY);
        let upper = format!("{SIGNATURE_PREFIX}{}", sig[SIGNATURE_PREFIX.len()..].to_uppercase());
        assert!(verify_signature("secret", BODY, &upper));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let sig = compute_signature("secret", BODY);
        assert!(!verify_signature("other", BODY, &sig));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let sig = compute_signature("secret", BODY);
        assert!(!verify_signature("secret", b"{}", &sig));
    }

    #[test]
    fn missing_prefix_is_rejected() {
        let sig = compute_signature("secret", BODY);
        let bare = &sig[SIGNATURE_PREFIX.len()..];
        assert!(!verify_signature("secret", BODY, bare));
    }

    #[test]
    fn non_hex_digest_is_rejected() {
        assert!(!verify_signature("secret", BODY, "sha256=zz"));
        assert!(!verify_signature("secret", BODY, "sha256=abc"));
    }

    #[test]
    fn policy_is_fail_open_without_secret() {
        let check = check_signature(None, BODY, Some("sha256=00"));
        assert_eq!(check, SignatureCheck::NoSecretConfigured);
        assert!(check.is_accepted());
    }

    #[test]
    fn policy_accepts_unsigned_requests() {
        assert_eq!(check_signature(Some("secret"), BODY, None), SignatureCheck::Unsigned);
    }

    #[test]
    fn policy_rejects_mismatch() {
        let check = check_signature(Some("secret"), BODY, Some("sha256=00"));
        assert_eq!(check, SignatureCheck::Invalid);
        assert!(!check.is_accepted());
    }

    #[test]
    fn policy_verifies_matching_signature() {
        let sig = compute_signature("secret", BODY);
        assert_eq!(
            check_signature(Some("secret"), BODY, Some(&sig)),
            SignatureCheck::Verified
        );
    }
}
