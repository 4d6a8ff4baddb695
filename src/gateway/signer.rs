//! HMAC signing of token payloads.
//!
//! Issued tokens are attribute strings with a trailing `&s=<signature>`
//! field. The signature is HMAC-SHA256 over everything before that field,
//! keyed with the configured signature secret.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_FIELD: &str = "&s=";

/// Signs and verifies token payloads.
pub struct Signer {
    secret: Vec<u8>,
}

impl Signer {
    /// Create a signer from raw secret bytes.
    pub fn from_secret(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(Error::Config("signature secret is empty".to_string()));
        }
        Ok(Self { secret })
    }

    /// Create a signer from a secret file. Surrounding whitespace is
    /// stripped.
    pub fn from_secret_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_secret(raw.trim().as_bytes().to_vec())
    }

    /// Create a signer with a random ephemeral secret. Tokens signed with
    /// it die with the process.
    #[must_use]
    pub fn ephemeral() -> Self {
        let mut secret = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self { secret }
    }

    fn mac_for(&self, payload: &str) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| Error::Internal(format!("HMAC init: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Sign a payload, returning `payload&s=<base64 signature>`.
    pub fn sign(&self, payload: &str) -> Result<String> {
        if payload.contains(SIGNATURE_FIELD) {
            return Err(Error::InvalidToken(
                "payload already carries a signature field".to_string(),
            ));
        }
        let sig = self.mac_for(payload)?;
        Ok(format!("{payload}{SIGNATURE_FIELD}{}", URL_SAFE_NO_PAD.encode(sig)))
    }

    /// Verify a signed string and return the payload without its signature
    /// field. The comparison is constant-time.
    pub fn verify<'a>(&self, signed: &'a str) -> Result<&'a str> {
        let idx = signed
            .rfind(SIGNATURE_FIELD)
            .ok_or_else(|| Error::InvalidToken("token carries no signature".to_string()))?;
        let (payload, sig_field) = signed.split_at(idx);
        let presented = URL_SAFE_NO_PAD
            .decode(&sig_field[SIGNATURE_FIELD.len()..])
            .map_err(|e| Error::InvalidToken(format!("undecodable signature: {e}")))?;
        let expected = self.mac_for(payload)?;
        if bool::from(expected.as_slice().ct_eq(presented.as_slice())) {
            Ok(payload)
        } else {
            Err(Error::InvalidToken("signature mismatch".to_string()))
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_round_trip() {
        let signer = Signer::from_secret(b"topsecret".to_vec()).unwrap();
        let signed = signer.sign("u=alice&t=kerberos&e=123").unwrap();
        assert!(signed.starts_with("u=alice&t=kerberos&e=123&s="));
        assert_eq!(signer.verify(&signed).unwrap(), "u=alice&t=kerberos&e=123");
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signer = Signer::from_secret(b"topsecret".to_vec()).unwrap();
        let signed = signer.sign("u=alice&t=kerberos&e=123").unwrap();
        let tampered = signed.replace("alice", "mallory");
        assert!(signer.verify(&tampered).is_err());
    }

    #[test]
    fn test_wrong_key_rejected() {
        let signer = Signer::from_secret(b"key-one".to_vec()).unwrap();
        let other = Signer::from_secret(b"key-two".to_vec()).unwrap();
        let signed = signer.sign("u=alice&e=9").unwrap();
        assert!(other.verify(&signed).is_err());
    }

    #[test]
    fn test_missing_signature_field() {
        let signer = Signer::ephemeral();
        assert!(signer.verify("u=alice&t=kerberos&e=123").is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(Signer::from_secret(Vec::new()).is_err());
    }

    #[test]
    fn test_secret_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sig.key");
        std::fs::write(&path, "hunter2\n").unwrap();
        let from_file = Signer::from_secret_file(&path).unwrap();
        let from_bytes = Signer::from_secret(b"hunter2".to_vec()).unwrap();
        let signed = from_file.sign("u=bob&e=1").unwrap();
        assert!(from_bytes.verify(&signed).is_ok());
    }
}
