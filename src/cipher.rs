//! A commutative cipher over the Ristretto prime order group.
//!
//! A key is a random non-zero scalar `k`. Encryption multiplies a group element by `k`,
//! decryption multiplies by `k⁻¹`. Since scalar multiplication commutes, layers of different
//! keys can be added and removed in any order:
//!
//! ```text
//! D_b(D_a(E_b(E_a(P)))) = D_a(D_b(E_b(E_a(P)))) = P
//! ```
//!
//! Secrets are mapped to group elements by hashing them into the group, so that the discrete
//! logarithms between the encodings of different secrets are unknown.

use curve25519_dalek::{
    ristretto::{CompressedRistretto, RistrettoPoint},
    scalar::Scalar,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{data_types::Secret, utils::RngCompat};

const SECRET_ENCODING_CONTEXT: &str = "lovepair 2024-06 secret encoding";

/// The error raised when a received ciphertext is not a valid group element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("ciphertext is not a canonical Ristretto encoding")]
pub struct InvalidCiphertext;

/// A group element, as sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext(pub [u8; 32]);

impl Ciphertext {
    /// Decompresses the ciphertext into a group element.
    pub fn to_point(&self) -> Result<RistrettoPoint, InvalidCiphertext> {
        CompressedRistretto(self.0)
            .decompress()
            .ok_or(InvalidCiphertext)
    }
}

impl From<RistrettoPoint> for Ciphertext {
    fn from(point: RistrettoPoint) -> Self {
        Ciphertext(point.compress().to_bytes())
    }
}

/// The key of one party, only ever known to that party.
pub struct CipherKey {
    key: Scalar,
    inverse: Scalar,
}

impl CipherKey {
    /// Samples a fresh key.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut rng = RngCompat(rng);
        loop {
            let key = Scalar::random(&mut rng);
            if key != Scalar::ZERO {
                return CipherKey {
                    key,
                    inverse: key.invert(),
                };
            }
        }
    }

    /// Adds this key's layer to the element.
    pub fn encrypt(&self, point: &RistrettoPoint) -> RistrettoPoint {
        self.key * point
    }

    /// Removes this key's layer from the element.
    pub fn decrypt(&self, point: &RistrettoPoint) -> RistrettoPoint {
        self.inverse * point
    }
}

impl std::fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Hashes a secret into the group.
pub fn encode_secret(secret: Secret) -> RistrettoPoint {
    let mut hasher = blake3::Hasher::new_derive_key(SECRET_ENCODING_CONTEXT);
    hasher.update(&[secret.value()]);
    let mut bytes = [0; 64];
    hasher.finalize_xof().fill(&mut bytes);
    RistrettoPoint::from_uniform_bytes(&bytes)
}

/// Finds the secret encoded by a fully decrypted element, `None` if it encodes none.
pub fn decode_secret(point: &RistrettoPoint) -> Option<Secret> {
    Secret::ALL
        .into_iter()
        .find(|secret| encode_secret(*secret) == *point)
}
