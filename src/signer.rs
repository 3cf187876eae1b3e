//! Signing capability: the external collaborator that turns canonical block
//! bytes into a signature. The core never reads private key material; it
//! only asks the capability to sign and to state its public identity.

use std::sync::Arc;

use anyhow::Context;
use ed25519_dalek::{Signer as DalekSigner, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::block::errors::{PtbError, PtbResult};
use crate::types::{Address, Signature, ID_LENGTH};

/// Shared, immutable signing capability. Safe to use from multiple blocks
/// concurrently: the key material is read-only.
pub trait SigningCapability: Send + Sync {
    fn sign(&self, bytes: &[u8]) -> PtbResult<Signature>;

    /// The address this capability signs for.
    fn public_identity(&self) -> Address;
}

/// Derive the ledger address from a verifying key: sha-256 over the
/// 32-byte public key.
pub fn address_of(key: &VerifyingKey) -> Address {
    let hash = Sha256::digest(key.as_bytes());
    let mut out = [0u8; ID_LENGTH];
    out.copy_from_slice(&hash);
    Address::new(out)
}

/// Ed25519 signing capability backed by an in-memory keypair.
pub struct Ed25519Signer {
    key: Arc<SigningKey>,
    address: Address,
}

impl Ed25519Signer {
    pub fn from_seed(seed: [u8; 32]) -> PtbResult<Self> {
        if seed.iter().all(|&b| b == 0) {
            return Err(PtbError::signing("all-zero key rejected"));
        }
        let key = SigningKey::from_bytes(&seed);
        let address = address_of(&key.verifying_key());
        Ok(Self { key: Arc::new(key), address })
    }

    pub fn from_keypair_bytes(bytes: &[u8; 64]) -> PtbResult<Self> {
        let key = SigningKey::from_keypair_bytes(bytes)
            .map_err(|e| PtbError::signing(format!("invalid keypair bytes: {e}")))?;
        let address = address_of(&key.verifying_key());
        Ok(Self { key: Arc::new(key), address })
    }

    /// Load a key from a file holding either raw bytes (32-byte seed or
    /// 64-byte keypair) or a JSON byte array of the same lengths.
    pub fn from_file(path: &str) -> PtbResult<Self> {
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read keypair file: {path}"))?;

        let bytes = match raw.len() {
            32 | 64 => raw,
            _ => {
                // JSON format
                let json: Vec<u8> = serde_json::from_slice(&raw)
                    .context("Failed to parse keypair JSON")?;
                json
            }
        };
        if bytes.iter().all(|&b| b == 0) {
            return Err(PtbError::signing("all-zero key rejected"));
        }
        match bytes.len() {
            32 => {
                let mut seed = [0u8; 32];
                seed.copy_from_slice(&bytes);
                Self::from_seed(seed)
            }
            64 => {
                let mut pair = [0u8; 64];
                pair.copy_from_slice(&bytes);
                Self::from_keypair_bytes(&pair)
            }
            n => Err(PtbError::signing(format!(
                "keypair must be 32 or 64 bytes, got {n}"
            ))),
        }
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl SigningCapability for Ed25519Signer {
    fn sign(&self, bytes: &[u8]) -> PtbResult<Signature> {
        let signature = self.key.sign(bytes);
        Ok(Signature(signature.to_bytes()))
    }

    fn public_identity(&self) -> Address {
        self.address
    }
}

impl Clone for Ed25519Signer {
    fn clone(&self) -> Self {
        Self { key: Arc::clone(&self.key), address: self.address }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;

    #[test]
    fn signature_verifies_under_public_key() {
        let signer = Ed25519Signer::from_seed([7; 32]).unwrap();
        let message = b"canonical block bytes";
        let sig = signer.sign(message).unwrap();

        let dalek_sig = ed25519_dalek::Signature::from_bytes(sig.as_bytes());
        signer.verifying_key().verify(message, &dalek_sig).unwrap();
    }

    #[test]
    fn identity_is_stable() {
        let a = Ed25519Signer::from_seed([7; 32]).unwrap();
        let b = Ed25519Signer::from_seed([7; 32]).unwrap();
        assert_eq!(a.public_identity(), b.public_identity());

        let c = Ed25519Signer::from_seed([8; 32]).unwrap();
        assert_ne!(a.public_identity(), c.public_identity());
    }

    #[test]
    fn all_zero_seed_rejected() {
        assert!(matches!(
            Ed25519Signer::from_seed([0; 32]),
            Err(PtbError::Signing(_))
        ));
    }
}
