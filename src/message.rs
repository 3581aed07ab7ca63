//! The typed messages exchanged by the two parties.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    cipher::Ciphertext,
    data_types::{Commitment, Role},
};

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msg {
    /// The commitment to the sending party's mask, sent once by each party.
    MaskCommitment(Commitment),
    /// Both encrypted secrets of the sender.
    EncryptedSecrets {
        /// The secret retrieved by a chooser who picked friendship.
        friendship: Ciphertext,
        /// The secret retrieved by a chooser who picked love.
        love: Ciphertext,
    },
    /// The selected secret, re-encrypted under the chooser's key.
    DecryptRequest(Ciphertext),
    /// The decrypt request with the sender's layer removed.
    DecryptResult(Ciphertext),
    /// The chooser's payload bit, masked with the chooser's mask.
    MaskedOutput(u8),
}

/// The discriminator of a [`Msg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    /// See [`Msg::MaskCommitment`].
    MaskCommitment,
    /// See [`Msg::EncryptedSecrets`].
    EncryptedSecrets,
    /// See [`Msg::DecryptRequest`].
    DecryptRequest,
    /// See [`Msg::DecryptResult`].
    DecryptResult,
    /// See [`Msg::MaskedOutput`].
    MaskedOutput,
}

impl MsgKind {
    /// The role allowed to send messages of this kind, `None` if both are.
    pub fn sent_by(self) -> Option<Role> {
        match self {
            MsgKind::MaskCommitment => None,
            MsgKind::EncryptedSecrets | MsgKind::DecryptResult => Some(Role::Sender),
            MsgKind::DecryptRequest | MsgKind::MaskedOutput => Some(Role::Chooser),
        }
    }
}

impl fmt::Display for MsgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MsgKind::MaskCommitment => "maskCommitment",
            MsgKind::EncryptedSecrets => "encryptedSecrets",
            MsgKind::DecryptRequest => "decryptRequest",
            MsgKind::DecryptResult => "decryptResult",
            MsgKind::MaskedOutput => "maskedOutput",
        };
        f.write_str(name)
    }
}

impl Msg {
    /// The discriminator of this message.
    pub fn kind(&self) -> MsgKind {
        match self {
            Msg::MaskCommitment(_) => MsgKind::MaskCommitment,
            Msg::EncryptedSecrets { .. } => MsgKind::EncryptedSecrets,
            Msg::DecryptRequest(_) => MsgKind::DecryptRequest,
            Msg::DecryptResult(_) => MsgKind::DecryptResult,
            Msg::MaskedOutput(_) => MsgKind::MaskedOutput,
        }
    }
}

/// A message tagged with the role of its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// The role of the party that sent the message.
    pub from: Role,
    /// The message itself.
    pub msg: Msg,
}

/// Why a well-formed envelope was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// The envelope claims to come from a role other than the peer.
    #[error("expected a message from the {expected}, but it claims to be from the {found}")]
    WrongSender {
        /// The role of the peer.
        expected: Role,
        /// The role in the envelope.
        found: Role,
    },
    /// The message is out of order or a duplicate.
    #[error("expected a {expected} message, found {found}")]
    UnexpectedKind {
        /// The kind the current state waits for.
        expected: MsgKind,
        /// The kind that was received.
        found: MsgKind,
    },
    /// The message kind may not be sent by the peer's role.
    #[error("the {from} may not send {kind} messages")]
    ForbiddenKind {
        /// The role in the envelope.
        from: Role,
        /// The received kind.
        kind: MsgKind,
    },
    /// A masked output that is not a single bit.
    #[error("masked output must be 0 or 1, found {0}")]
    InvalidBit(u8),
}

impl Envelope {
    /// Checks that the envelope is the message of the given kind sent by the peer.
    pub fn validate(&self, peer: Role, expected: MsgKind) -> Result<(), SchemaError> {
        if self.from != peer {
            return Err(SchemaError::WrongSender {
                expected: peer,
                found: self.from,
            });
        }
        let kind = self.msg.kind();
        if kind.sent_by().is_some_and(|role| role != self.from) {
            return Err(SchemaError::ForbiddenKind {
                from: self.from,
                kind,
            });
        }
        if kind != expected {
            return Err(SchemaError::UnexpectedKind {
                expected,
                found: kind,
            });
        }
        if let Msg::MaskedOutput(bit) = self.msg
            && bit > 1
        {
            return Err(SchemaError::InvalidBit(bit));
        }
        Ok(())
    }
}
