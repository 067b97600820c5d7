//! Credential verification: signature and structural checks.
//!
//! The space state machine consumes verification through the
//! [`CredentialVerifier`] capability so deployments can layer additional
//! checks (revocation lists, device chains) on top of the signature check.

use async_trait::async_trait;

use crate::credential::{Assertion, Credential};

/// Outcome of verifying a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Pass,
    Fail {
        /// Human-readable reasons, in the order they were found.
        errors: Vec<String>,
    },
}

impl VerificationResult {
    /// Check if verification passed.
    pub fn is_pass(&self) -> bool {
        matches!(self, VerificationResult::Pass)
    }

    fn from_errors(errors: Vec<String>) -> Self {
        if errors.is_empty() {
            VerificationResult::Pass
        } else {
            VerificationResult::Fail { errors }
        }
    }
}

/// Capability that decides whether a credential is well formed and signed.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, credential: &Credential) -> VerificationResult;
}

/// Default verifier: Ed25519 signature by the issuer plus structural checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureVerifier;

#[async_trait]
impl CredentialVerifier for SignatureVerifier {
    async fn verify(&self, credential: &Credential) -> VerificationResult {
        verify_credential(credential)
    }
}

/// Verify a credential without any context.
///
/// This performs:
/// - Signature verification against the issuer key
/// - Content id check (when an id is attached)
/// - Issuance date sanity
/// - Type URL presence for unknown assertions
pub fn verify_credential(credential: &Credential) -> VerificationResult {
    let mut errors = Vec::new();

    // 1. Signature
    if credential
        .issuer
        .verify(&credential.signing_message(), &credential.signature)
        .is_err()
    {
        errors.push(format!(
            "invalid signature from issuer {}",
            credential.issuer
        ));
    }

    // 2. Content id
    if let Some(id) = &credential.id {
        let computed = credential.compute_id();
        if *id != computed {
            errors.push(format!("id mismatch: claimed {}, computed {}", id, computed));
        }
    }

    // 3. Issuance date
    if credential.issuance_date < 0 {
        errors.push("negative issuance date".to_string());
    }

    // 4. Unknown assertions still need a type
    if let Assertion::Unknown { type_url, .. } = &credential.assertion {
        if type_url.is_empty() {
            errors.push("empty assertion type".to_string());
        }
    }

    VerificationResult::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::CredentialBuilder;
    use crate::crypto::{Keypair, Signature};
    use crate::types::CredentialId;

    fn make_genesis(keypair: &Keypair) -> Credential {
        CredentialBuilder::new(
            keypair.public_key(),
            keypair.public_key(),
            Assertion::SpaceGenesis {
                space_key: keypair.public_key(),
            },
        )
        .issuance_date(1_736_870_400_000)
        .sign(keypair)
    }

    #[test]
    fn test_valid_credential_passes() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        assert!(verify_credential(&make_genesis(&keypair)).is_pass());
    }

    #[test]
    fn test_tampered_signature_fails() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let mut credential = make_genesis(&keypair).without_id();
        credential.signature = Signature::ZERO;

        match verify_credential(&credential) {
            VerificationResult::Fail { errors } => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].contains("invalid signature"));
            }
            VerificationResult::Pass => panic!("zero signature should fail"),
        }
    }

    #[test]
    fn test_wrong_issuer_fails() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let other = Keypair::from_seed(&[0x43; 32]);
        let mut credential = make_genesis(&keypair).without_id();
        credential.issuer = other.public_key();

        assert!(!verify_credential(&credential).is_pass());
    }

    #[test]
    fn test_forged_id_fails() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let mut credential = make_genesis(&keypair);
        credential.id = Some(CredentialId::from_bytes([0xee; 32]));

        match verify_credential(&credential) {
            VerificationResult::Fail { errors } => {
                assert!(errors.iter().any(|e| e.contains("id mismatch")));
            }
            VerificationResult::Pass => panic!("forged id should fail"),
        }
    }

    #[test]
    fn test_empty_unknown_type_fails() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let credential = CredentialBuilder::new(
            keypair.public_key(),
            keypair.public_key(),
            Assertion::Unknown {
                type_url: String::new(),
                value: bytes::Bytes::new(),
            },
        )
        .sign(&keypair);

        assert!(!verify_credential(&credential).is_pass());
    }

    #[tokio::test]
    async fn test_signature_verifier_capability() {
        let keypair = Keypair::from_seed(&[0x44; 32]);
        let verifier: &dyn CredentialVerifier = &SignatureVerifier;
        assert_eq!(
            verifier.verify(&make_genesis(&keypair)).await,
            VerificationResult::Pass
        );
    }
}
