//! Stark-curve ECDSA over the Poseidon digest of an ordered field message.

use rand::RngCore;
use starknet_crypto::{get_public_key, poseidon_hash_many, rfc6979_generate_k};
use thiserror::Error;

use crate::types::{Address, Felt};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("secret key must be non-zero")]
    InvalidSecret,
    #[error("failed to sign message: {0}")]
    Sign(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: Felt,
    pub s: Felt,
}

pub fn message_hash(message: &[Felt]) -> Felt {
    poseidon_hash_many(message)
}

/// `true` when `signature` was produced over `message` by the key whose
/// public x-coordinate is `signer`. Malformed inputs simply fail to verify.
pub fn verify(signer: Address, message: &[Felt], signature: &Signature) -> bool {
    let hash = message_hash(message);
    starknet_crypto::verify(&signer, &hash, &signature.r, &signature.s).unwrap_or(false)
}

#[derive(Clone)]
pub struct Keypair {
    secret: Felt,
    public: Address,
}

impl Keypair {
    pub fn from_secret(secret: Felt) -> Result<Self, SignatureError> {
        if secret == Felt::ZERO {
            return Err(SignatureError::InvalidSecret);
        }
        Ok(Self {
            secret,
            public: get_public_key(&secret),
        })
    }

    /// Draws a secret from 31 random bytes, which always lies below the
    /// curve order.
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes[1..]);
            let secret = Felt::from_bytes_be(&bytes);
            if let Ok(keypair) = Self::from_secret(secret) {
                return keypair;
            }
        }
    }

    pub fn address(&self) -> Address {
        self.public
    }

    pub fn sign(&self, message: &[Felt]) -> Result<Signature, SignatureError> {
        let hash = message_hash(message);
        let k = rfc6979_generate_k(&hash, &self.secret, None);
        let signature = starknet_crypto::sign(&self.secret, &hash, &k)
            .map_err(|err| SignatureError::Sign(format!("{err:?}")))?;
        Ok(Signature {
            r: signature.r,
            s: signature.s,
        })
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &format_args!("{:#x}", self.public))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn signs_and_verifies() {
        let mut rng = StdRng::seed_from_u64(7);
        let keypair = Keypair::random(&mut rng);
        let message = [Felt::from(1u8), Felt::from(2u8), Felt::from(3u8)];
        let signature = keypair.sign(&message).unwrap();
        assert!(verify(keypair.address(), &message, &signature));
    }

    #[test]
    fn rejects_tampered_message_and_wrong_signer() {
        let mut rng = StdRng::seed_from_u64(11);
        let alice = Keypair::random(&mut rng);
        let bob = Keypair::random(&mut rng);
        let message = [Felt::from(10u8), Felt::from(20u8)];
        let signature = alice.sign(&message).unwrap();
        assert!(!verify(alice.address(), &[Felt::from(10u8), Felt::from(21u8)], &signature));
        assert!(!verify(bob.address(), &message, &signature));
    }

    #[test]
    fn zero_secret_is_rejected() {
        assert_eq!(
            Keypair::from_secret(Felt::ZERO).unwrap_err(),
            SignatureError::InvalidSecret
        );
    }
}
