//! Signature checking is a capability handed to the ledger. Key issuance and
//! signing live with whoever holds the keys.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::Address;

pub trait SignatureVerifier: Send + Sync {
    /// True when `signature` over `message` was produced by the key behind
    /// `signer`. Never errors: malformed input simply fails to verify.
    fn verify(&self, signer: &Address, message: &[u8], signature: &[u8]) -> bool;
}

/// Addresses are the hex encoding of an ed25519 verifying key.
#[derive(Clone, Copy, Debug, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, signer: &Address, message: &[u8], signature: &[u8]) -> bool {
        let Some(key) = public_key(signer) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        key.verify(message, &signature).is_ok()
    }
}

pub fn address_of(key: &VerifyingKey) -> Address {
    Address::new(hex::encode(key.as_bytes()))
}

fn public_key(address: &Address) -> Option<VerifyingKey> {
    let bytes: [u8; 32] = hex::decode(address.as_str()).ok()?.try_into().ok()?;
    VerifyingKey::from_bytes(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::account;
    use ed25519_dalek::Signer;

    #[test]
    fn verifies_own_signature() {
        let alice = account(1);
        let sig = alice.key.sign(b"hello").to_bytes();
        assert!(Ed25519Verifier.verify(&alice.address, b"hello", &sig));
        assert!(!Ed25519Verifier.verify(&alice.address, b"hullo", &sig));
    }

    #[test]
    fn rejects_signature_from_other_key() {
        let alice = account(1);
        let bob = account(2);
        let sig = bob.key.sign(b"hello").to_bytes();
        assert!(!Ed25519Verifier.verify(&alice.address, b"hello", &sig));
    }

    #[test]
    fn malformed_inputs_fail_closed() {
        let alice = account(1);
        let sig = alice.key.sign(b"hello").to_bytes();
        assert!(!Ed25519Verifier.verify(&Address::system(), b"hello", &sig));
        assert!(!Ed25519Verifier.verify(&Address::from("zz"), b"hello", &sig));
        assert!(!Ed25519Verifier.verify(&alice.address, b"hello", &sig[..10]));
        assert!(!Ed25519Verifier.verify(&alice.address, b"hello", &[]));
    }

    #[test]
    fn address_round_trips_to_key() {
        let alice = account(7);
        assert_eq!(alice.address.as_str().len(), crate::constants::HASH_HEX_SIZE);
        let key = public_key(&alice.address).unwrap();
        assert_eq!(key, alice.key.verifying_key());
    }
}
