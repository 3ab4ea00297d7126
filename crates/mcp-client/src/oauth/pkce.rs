//! PKCE (RFC 7636) verifier/challenge generation for the client side of the
//! OAuth 2.1 authorization-code flow (spec.md §4.I).
//!
//! Grounded on the teacher's `server/oauth/pkce.rs` S256 verification math
//! (`BASE64URL(SHA256(code_verifier))`), inverted here to the generate side
//! a client needs rather than the verify side a server needs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// A verifier/challenge pair generated fresh for one authorization attempt.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub code_verifier: String,
    pub code_challenge: String,
}

impl Pkce {
    /// Generate a verifier from 32 bytes of randomness (two UUIDv4s' worth),
    /// base64url-encoded without padding. 32 raw bytes encode to exactly 43
    /// characters, the RFC 7636 floor (spec.md §8: "`code_verifier` length
    /// within 43..128 URL-safe characters").
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = Vec::with_capacity(32);
        bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        bytes.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
        let code_verifier = URL_SAFE_NO_PAD.encode(&bytes);
        let code_challenge = Self::challenge_for(&code_verifier);
        Self { code_verifier, code_challenge }
    }

    /// Derive the S256 challenge for a given verifier.
    #[must_use]
    pub fn challenge_for(code_verifier: &str) -> String {
        let hash = Sha256::digest(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_verifier_is_within_rfc_length_bounds() {
        let pkce = Pkce::generate();
        assert!(pkce.code_verifier.len() >= 43 && pkce.code_verifier.len() <= 128);
    }

    #[test]
    fn challenge_matches_known_test_vector() {
        // RFC 7636 Appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        let challenge = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";
        assert_eq!(Pkce::challenge_for(verifier), challenge);
    }

    #[test]
    fn generated_challenge_matches_its_own_verifier() {
        let pkce = Pkce::generate();
        assert_eq!(Pkce::challenge_for(&pkce.code_verifier), pkce.code_challenge);
    }
}
