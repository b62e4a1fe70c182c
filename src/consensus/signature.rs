use ed25519_dalek::{Signature as DalekSignature, Signer as DalekSigner, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::hashing::Digest32;
use crate::types::Address;

/// signature components as carried in a response
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl Signature {
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self { r, s }
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Signature(0x{}..)", hex::encode(&self.r[..4]))
    }
}

/// checks that a claimed signer produced a signature over a digest
pub trait SignatureVerifier: Send + Sync {
    /// false on any mismatch or malformed input, never an error
    fn verify(&self, digest: &Digest32, signature: &Signature, signer: &Address) -> bool;
}

/// ed25519 verification where the signer address is the verifying key
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, digest: &Digest32, signature: &Signature, signer: &Address) -> bool {
        let key = match VerifyingKey::from_bytes(signer.as_bytes()) {
            Ok(key) => key,
            Err(_) => return false,
        };
        let signature = DalekSignature::from_bytes(&signature.to_bytes());
        key.verify(digest, &signature).is_ok()
    }
}

/// signing side, used by signer nodes and test fixtures
pub struct ResponseSigner {
    signing_key: SigningKey,
}

impl ResponseSigner {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    pub fn address(&self) -> Address {
        Address::new(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(&self, digest: &Digest32) -> Signature {
        let signature = self.signing_key.sign(digest);
        Signature::from_bytes(&signature.to_bytes())
    }
}
