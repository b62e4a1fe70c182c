use std::collections::BTreeSet;
use std::sync::RwLock;

use crate::types::Address;

/// role registry of addresses allowed to attest loan terms
pub trait SignerRegistry: Send + Sync {
    fn is_authorized_signer(&self, address: &Address) -> bool;

    fn signer_count(&self) -> usize;
}

/// in-memory signer role set
#[derive(Debug, Default)]
pub struct SignerSet {
    signers: RwLock<BTreeSet<Address>>,
}

impl SignerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            signers: RwLock::new(addresses.into_iter().collect()),
        }
    }

    /// returns false if already present
    pub fn add_signer(&self, address: Address) -> bool {
        self.signers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address)
    }

    /// returns false if not present
    pub fn remove_signer(&self, address: &Address) -> bool {
        self.signers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(address)
    }
}

impl SignerRegistry for SignerSet {
    fn is_authorized_signer(&self, address: &Address) -> bool {
        self.signers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(address)
    }

    fn signer_count(&self) -> usize {
        self.signers.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}
