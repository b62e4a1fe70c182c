pub mod engine;
pub mod hashing;
pub mod request;
pub mod signature;
pub mod signers;
pub mod tolerance;

pub use engine::{BorrowerHistory, ConsensusEngine};
pub use hashing::{CanonicalHasher, Digest32};
pub use request::{LoanRequest, LoanResponse, ResponseTerms};
pub use signature::{Ed25519Verifier, ResponseSigner, Signature, SignatureVerifier};
pub use signers::{SignerRegistry, SignerSet};
pub use tolerance::ToleranceAggregator;
