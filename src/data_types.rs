//! Data types shared by both roles of the protocol.

use std::{fmt, str::FromStr};

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// The number of random bytes backing a [`Mask`].
pub const MASK_LEN: usize = 16;

/// The private input of a party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Choice {
    /// The negative option.
    Friendship,
    /// The affirmative option.
    Love,
}

impl Choice {
    /// Returns `true` for [`Choice::Love`].
    pub fn is_love(self) -> bool {
        self == Choice::Love
    }

    /// Maps an output bit back to the input vocabulary, `1` meaning love.
    pub fn from_bit(bit: bool) -> Self {
        if bit { Choice::Love } else { Choice::Friendship }
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Choice::Friendship => f.write_str("friendship"),
            Choice::Love => f.write_str("love"),
        }
    }
}

/// Returned when parsing an unknown [`Choice`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected 'friendship' or 'love', found '{0}'")]
pub struct ParseChoiceError(String);

impl FromStr for Choice {
    type Err = ParseChoiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "friendship" | "f" => Ok(Choice::Friendship),
            "love" | "l" => Ok(Choice::Love),
            _ => Err(ParseChoiceError(s.to_string())),
        }
    }
}

/// The role played by a party, fixed for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// Holds both secrets of the oblivious transfer (the host).
    Sender,
    /// Retrieves exactly one secret of the oblivious transfer (the joiner).
    Chooser,
}

impl Role {
    /// The role of the other party.
    pub fn peer(self) -> Self {
        match self {
            Role::Sender => Role::Chooser,
            Role::Chooser => Role::Sender,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Chooser => f.write_str("chooser"),
        }
    }
}

/// A secret random mask bit together with the random bytes it was derived from.
///
/// The bytes are what gets committed to and later revealed, the bit is the low bit of the first
/// byte.
#[derive(Clone, PartialEq, Eq)]
pub struct Mask([u8; MASK_LEN]);

impl Mask {
    /// Draws a fresh mask from a cryptographically secure RNG.
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut bytes = [0; MASK_LEN];
        rng.fill_bytes(&mut bytes);
        Mask(bytes)
    }

    /// Rebuilds a mask from revealed bytes, `None` if the length does not match.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Mask)
    }

    /// The raw bytes backing the mask.
    pub fn as_bytes(&self) -> &[u8; MASK_LEN] {
        &self.0
    }

    /// The mask bit.
    pub fn bit(&self) -> bool {
        self.0[0] & 1 == 1
    }
}

impl fmt::Debug for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Mask(..)")
    }
}

/// A blake3 digest of the bytes backing a [`Mask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; 32]);

impl Commitment {
    /// Commits to the given bytes.
    ///
    /// This is not a general-purpose commitment scheme, the input value is assumed to have high
    /// entropy (which is the case for the random bytes of a [`Mask`]).
    pub fn to(value: &[u8]) -> Self {
        Commitment(blake3::hash(value).into())
    }

    /// Checks whether the value is the preimage of this commitment.
    pub fn opens_to(&self, value: &[u8]) -> bool {
        blake3::hash(value) == blake3::Hash::from_bytes(self.0)
    }
}

/// Category tag of the secret associated with [`Choice::Friendship`].
pub const FRIENDSHIP_TAG: u8 = 0b10;
/// Category tag of the secret associated with [`Choice::Love`].
pub const LOVE_TAG: u8 = 0b100;

/// A secret of the oblivious transfer: a category tag plus a (masked) payload bit.
///
/// Tag and payload occupy disjoint bits, so the only valid values are 2, 3, 4 and 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Secret(u8);

impl Secret {
    /// All valid secrets.
    pub const ALL: [Secret; 4] = [Secret(2), Secret(3), Secret(4), Secret(5)];

    /// Builds the secret for the given branch.
    pub fn new(branch: Choice, payload: bool) -> Self {
        let tag = match branch {
            Choice::Friendship => FRIENDSHIP_TAG,
            Choice::Love => LOVE_TAG,
        };
        Secret(tag | payload as u8)
    }

    /// Parses an encoded value, `None` unless it is one of 2, 3, 4 or 5.
    pub fn from_value(value: u8) -> Option<Self> {
        matches!(value, 2..=5).then_some(Secret(value))
    }

    /// The encoded value.
    pub fn value(self) -> u8 {
        self.0
    }

    /// The category tag.
    pub fn tag(self) -> u8 {
        self.0 & !1
    }

    /// The branch identified by the category tag.
    pub fn branch(self) -> Choice {
        if self.tag() == LOVE_TAG {
            Choice::Love
        } else {
            Choice::Friendship
        }
    }

    /// The payload bit.
    pub fn payload(self) -> bool {
        self.0 & 1 == 1
    }
}
