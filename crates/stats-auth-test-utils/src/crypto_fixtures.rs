//! ES256 cryptographic fixtures for testing
//!
//! Provides P-256 keypairs whose private half signs test tokens and whose
//! public half is a SubjectPublicKeyInfo PEM, the format the directory stores.
//! ring cannot derive an ECDSA key from a seed, so each fixture is fresh.

use base64::engine::general_purpose;
use base64::Engine;
use jsonwebtoken::EncodingKey;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use thiserror::Error;

/// Test fixture error type
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// DER prefix of a P-256 SubjectPublicKeyInfo, up to the uncompressed point.
///
/// ```text
/// SEQUENCE {
///   SEQUENCE { OID id-ecPublicKey, OID prime256v1 }
///   BIT STRING (66 bytes, 0 unused bits)
/// }
/// ```
const P256_SPKI_PREFIX: [u8; 26] = [
    0x30, 0x59, 0x30, 0x13, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x08, 0x2a,
    0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07, 0x03, 0x42, 0x00,
];

/// A P-256 signing key for tests.
#[derive(Clone)]
pub struct TestSigningKey {
    /// PKCS#8 DER private key.
    pub private_key_pkcs8: Vec<u8>,

    /// SPKI PEM public key, as stored in `health_authority_key.public_key`.
    pub public_key_pem: String,
}

impl TestSigningKey {
    /// Generate a fresh P-256 keypair.
    pub fn generate() -> Result<Self, FixtureError> {
        let rng = SystemRandom::new();

        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|e| FixtureError::Crypto(format!("Failed to generate test keypair: {:?}", e)))?;

        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| FixtureError::Crypto(format!("Failed to parse test keypair: {:?}", e)))?;

        let public_key_pem = spki_pem(key_pair.public_key().as_ref());

        Ok(Self {
            private_key_pkcs8: pkcs8.as_ref().to_vec(),
            public_key_pem,
        })
    }

    /// Key for `jsonwebtoken::encode` with `Algorithm::ES256`.
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_ec_der(&self.private_key_pkcs8)
    }
}

/// Wrap an uncompressed P-256 point in an SPKI PEM.
fn spki_pem(uncompressed_point: &[u8]) -> String {
    let mut der = P256_SPKI_PREFIX.to_vec();
    der.extend_from_slice(uncompressed_point);

    let b64 = general_purpose::STANDARD.encode(der);
    let body = b64
        .as_bytes()
        .chunks(64)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\n");

    format!("-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n", body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::DecodingKey;

    #[test]
    fn test_generated_keys_differ() {
        let key1 = TestSigningKey::generate().unwrap();
        let key2 = TestSigningKey::generate().unwrap();

        assert_ne!(key1.public_key_pem, key2.public_key_pem);
    }

    #[test]
    fn test_public_key_pem_is_spki() {
        let key = TestSigningKey::generate().unwrap();

        assert!(key.public_key_pem.starts_with("-----BEGIN PUBLIC KEY-----\n"));
        // 91-byte DER always starts with the same base64 prefix
        assert!(key
            .public_key_pem
            .contains("MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE"));
        assert!(DecodingKey::from_ec_pem(key.public_key_pem.as_bytes()).is_ok());
    }
}
