//! Oblivious transfer of one of two secrets, built from the commutative cipher.
//!
//! The sender encrypts both of its secrets under its key `a` and sends them. The chooser picks the
//! one matching its choice and adds its own layer `b`. The sender removes `a` without learning
//! which secret it is looking at, and the chooser finally removes `b`:
//!
//! ```text
//! Sender                                Chooser
//! E_a(S_f), E_a(S_l)        ──────▶
//!                           ◀──────     E_b(E_a(S_c))
//! D_a(E_b(E_a(S_c)))        ──────▶
//!                                       S_c = D_b(E_b(S_c))
//! ```

use crate::{
    cipher::{CipherKey, Ciphertext, InvalidCiphertext, decode_secret, encode_secret},
    data_types::{Choice, FRIENDSHIP_TAG, LOVE_TAG, Mask, Secret},
};

/// Errors that can occur during the oblivious transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A received ciphertext is not a valid group element.
    #[error(transparent)]
    InvalidCiphertext(#[from] InvalidCiphertext),
    /// The decrypted value does not encode any secret.
    #[error("the decrypted value does not encode a secret")]
    UnknownSecret,
    /// The decrypted secret belongs to the branch that was not selected.
    #[error("expected a secret tagged {expected:#b}, found {found:#b}")]
    WrongBranch {
        /// The tag of the selected branch.
        expected: u8,
        /// The tag of the decrypted secret.
        found: u8,
    },
}

/// The two secrets held by the sender, one per possible choice of the chooser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretPair {
    /// Retrieved by a chooser who picked friendship.
    pub friendship: Secret,
    /// Retrieved by a chooser who picked love.
    pub love: Secret,
}

/// Both secrets encrypted under the sender's key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptedPair {
    /// The encrypted friendship secret.
    pub friendship: Ciphertext,
    /// The encrypted love secret.
    pub love: Ciphertext,
}

impl EncryptedPair {
    /// The ciphertext associated with the given choice.
    pub fn get(&self, choice: Choice) -> Ciphertext {
        match choice {
            Choice::Friendship => self.friendship,
            Choice::Love => self.love,
        }
    }
}

/// Builds the sender's secrets, pre-masked with the sender's own mask.
///
/// The friendship secret always carries a masked `0`, so it never depends on the sender's choice.
pub fn prepare(own_mask: &Mask, own_choice: Choice) -> SecretPair {
    SecretPair {
        friendship: Secret::new(Choice::Friendship, own_mask.bit()),
        love: Secret::new(Choice::Love, own_choice.is_love() ^ own_mask.bit()),
    }
}

/// Encrypts both secrets under the sender's key.
pub fn encrypt_secrets(secrets: &SecretPair, key: &CipherKey) -> EncryptedPair {
    EncryptedPair {
        friendship: key.encrypt(&encode_secret(secrets.friendship)).into(),
        love: key.encrypt(&encode_secret(secrets.love)).into(),
    }
}

/// Picks the ciphertext matching the chooser's choice and adds the chooser's layer.
pub fn select(
    pair: &EncryptedPair,
    own_choice: Choice,
    key: &CipherKey,
) -> Result<Ciphertext, Error> {
    let selected = pair.get(own_choice).to_point()?;
    Ok(key.encrypt(&selected).into())
}

/// Removes the sender's layer from the decrypt request, without interpreting the result.
pub fn blind_decrypt(request: &Ciphertext, key: &CipherKey) -> Result<Ciphertext, Error> {
    let point = request.to_point()?;
    Ok(key.decrypt(&point).into())
}

/// Removes the chooser's layer and checks that the recovered secret is the selected one.
pub fn finalize(
    result: &Ciphertext,
    own_choice: Choice,
    key: &CipherKey,
) -> Result<Secret, Error> {
    let point = key.decrypt(&result.to_point()?);
    let secret = decode_secret(&point).ok_or(Error::UnknownSecret)?;
    let expected = match own_choice {
        Choice::Friendship => FRIENDSHIP_TAG,
        Choice::Love => LOVE_TAG,
    };
    if secret.tag() != expected {
        return Err(Error::WrongBranch {
            expected,
            found: secret.tag(),
        });
    }
    Ok(secret)
}
