//! Identifier newtypes.

use crate::crypto::fixed_bytes;

/// Content address of a credential: Blake3 over its canonical bytes.
///
/// The id field itself is excluded from the hashed bytes, so attaching or
/// dropping it never changes the id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CredentialId(pub [u8; 32]);

fixed_bytes!(CredentialId, 32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_id_hex() {
        let id = CredentialId::from_bytes([0x42; 32]);
        let recovered = CredentialId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
        assert!(CredentialId::from_hex("42").is_err());
    }

    #[test]
    fn test_credential_id_display() {
        let id = CredentialId::from_bytes([0xab; 32]);
        assert_eq!(format!("{}", id), "abababababababab");
        assert!(format!("{:?}", id).starts_with("CredentialId("));
    }
}
