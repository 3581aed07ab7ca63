//! The per-role state machines that run a full session over a [`Channel`].
//!
//! # Protocol Workflow
//!
//! 1. Both parties commit to a random mask and exchange the commitments.
//! 2. The sender sends both of its (masked) secrets, encrypted under its key.
//! 3. The chooser re-encrypts the secret matching its choice and sends it back.
//! 4. The sender removes its own layer and returns the result.
//! 5. The chooser decrypts its secret, masks the payload bit and sends it to the sender.
//! 6. Both masks are revealed through a [`FairReveal`] service and each party computes the
//!    outcome on its own.
//!
//! Every state transition sends or receives at most one message. Messages that arrive out of
//! order abort the session, there are no retries and no resumption.

use futures::future::try_join;
use rand::{CryptoRng, RngCore};
use tracing::{Level, debug, instrument, warn};

use crate::{
    channel::{self, Channel, ChannelOpts, MsgChannel, SimpleChannel},
    cipher::{CipherKey, Ciphertext},
    commitment::{self, commit, exchange_commitments, reveal},
    data_types::{Choice, Commitment, Mask, Role},
    message::{Msg, MsgKind},
    ost::{self, EncryptedPair, blind_decrypt, encrypt_secrets, finalize, prepare, select},
    reconcile::{masked_output, reconcile_chooser, reconcile_sender},
    reveal::{FairReveal, TrustedRevealer},
};

/// A custom error type for a protocol session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent, received or validated.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The masks could not be exchanged or revealed, or a revealed mask did not match its
    /// commitment.
    #[error("mask commitment failed: {0}")]
    Commitment(#[from] commitment::Error),
    /// The oblivious transfer failed, for example because the decrypted secret was not the
    /// selected one.
    #[error("oblivious transfer failed: {0}")]
    Transfer(#[from] ost::Error),
}

/// Options for a single session.
#[derive(Debug, Clone, Copy)]
pub struct SessionOpts {
    /// How many messages that cannot be deserialized are dropped before the session fails.
    pub max_malformed_msgs: usize,
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            max_malformed_msgs: 4,
        }
    }
}

/// The states of the sender (host) role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderState {
    /// Nothing has been sent yet.
    Init,
    /// Both mask commitments are known.
    CommitmentsExchanged {
        /// The chooser's commitment.
        peer_commitment: Commitment,
    },
    /// The encrypted secrets have been sent.
    SecretsSent {
        /// The chooser's commitment.
        peer_commitment: Commitment,
    },
    /// Waiting for the chooser's re-encrypted selection.
    AwaitingDecryptRequest {
        /// The chooser's commitment.
        peer_commitment: Commitment,
    },
    /// The sender's layer has been removed and sent back.
    DecryptResultSent {
        /// The chooser's commitment.
        peer_commitment: Commitment,
    },
    /// Waiting for the chooser's masked output bit.
    AwaitingMaskedOutput {
        /// The chooser's commitment.
        peer_commitment: Commitment,
    },
    /// Waiting for the chooser's mask to be revealed.
    AwaitingReveal {
        /// The chooser's commitment.
        peer_commitment: Commitment,
        /// The bit sent by the chooser.
        masked_output: bool,
    },
    /// The session is over.
    Resolved(Choice),
}

impl SenderState {
    fn name(&self) -> &'static str {
        match self {
            SenderState::Init => "Init",
            SenderState::CommitmentsExchanged { .. } => "CommitmentsExchanged",
            SenderState::SecretsSent { .. } => "SecretsSent",
            SenderState::AwaitingDecryptRequest { .. } => "AwaitingDecryptRequest",
            SenderState::DecryptResultSent { .. } => "DecryptResultSent",
            SenderState::AwaitingMaskedOutput { .. } => "AwaitingMaskedOutput",
            SenderState::AwaitingReveal { .. } => "AwaitingReveal",
            SenderState::Resolved(_) => "Resolved",
        }
    }
}

/// The states of the chooser (joiner) role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChooserState {
    /// Nothing has been sent yet.
    Init,
    /// Both mask commitments are known.
    CommitmentsExchanged {
        /// The sender's commitment.
        peer_commitment: Commitment,
    },
    /// Waiting for the sender's encrypted secrets.
    AwaitingSecretPair {
        /// The sender's commitment.
        peer_commitment: Commitment,
    },
    /// The re-encrypted selection has been sent.
    DecryptRequestSent {
        /// The sender's commitment.
        peer_commitment: Commitment,
    },
    /// Waiting for the sender to remove its layer.
    AwaitingDecryptResult {
        /// The sender's commitment.
        peer_commitment: Commitment,
    },
    /// The masked output bit has been sent.
    MaskedOutputSent {
        /// The sender's commitment.
        peer_commitment: Commitment,
        /// The bit that was sent.
        masked_output: bool,
    },
    /// Waiting for the sender's mask to be revealed.
    AwaitingReveal {
        /// The sender's commitment.
        peer_commitment: Commitment,
        /// The bit that was sent.
        masked_output: bool,
    },
    /// The session is over.
    Resolved(Choice),
}

impl ChooserState {
    fn name(&self) -> &'static str {
        match self {
            ChooserState::Init => "Init",
            ChooserState::CommitmentsExchanged { .. } => "CommitmentsExchanged",
            ChooserState::AwaitingSecretPair { .. } => "AwaitingSecretPair",
            ChooserState::DecryptRequestSent { .. } => "DecryptRequestSent",
            ChooserState::AwaitingDecryptResult { .. } => "AwaitingDecryptResult",
            ChooserState::MaskedOutputSent { .. } => "MaskedOutputSent",
            ChooserState::AwaitingReveal { .. } => "AwaitingReveal",
            ChooserState::Resolved(_) => "Resolved",
        }
    }
}

/// The local state of the sender for a single protocol run.
#[derive(Debug)]
pub struct SenderSession {
    choice: Choice,
    mask: Mask,
    commitment: Commitment,
    key: CipherKey,
    state: SenderState,
}

impl SenderSession {
    /// Starts a session with fresh randomness.
    pub fn new<R: RngCore + CryptoRng>(choice: Choice, rng: &mut R) -> Self {
        let (mask, commitment) = commit(rng);
        Self {
            choice,
            mask,
            commitment,
            key: CipherKey::random(rng),
            state: SenderState::Init,
        }
    }

    /// The current state.
    pub fn state(&self) -> &SenderState {
        &self.state
    }

    /// The outcome, once resolved.
    pub fn outcome(&self) -> Option<Choice> {
        match self.state {
            SenderState::Resolved(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Performs a single state transition. Does nothing once resolved.
    ///
    /// The session is consumed, any error aborts it.
    pub async fn step<C: Channel, F: FairReveal>(
        mut self,
        channel: &mut MsgChannel<C>,
        service: &F,
    ) -> Result<Self, Error> {
        let next = match self.state {
            SenderState::Init => {
                let peer_commitment = exchange_commitments(channel, self.commitment).await?;
                SenderState::CommitmentsExchanged { peer_commitment }
            }
            SenderState::CommitmentsExchanged { peer_commitment } => {
                let secrets = prepare(&self.mask, self.choice);
                let EncryptedPair { friendship, love } = encrypt_secrets(&secrets, &self.key);
                channel
                    .send(Msg::EncryptedSecrets { friendship, love })
                    .await?;
                SenderState::SecretsSent { peer_commitment }
            }
            SenderState::SecretsSent { peer_commitment } => {
                SenderState::AwaitingDecryptRequest { peer_commitment }
            }
            SenderState::AwaitingDecryptRequest { peer_commitment } => {
                let request = recv_ciphertext(channel, MsgKind::DecryptRequest).await?;
                let result = blind_decrypt(&request, &self.key)?;
                channel.send(Msg::DecryptResult(result)).await?;
                SenderState::DecryptResultSent { peer_commitment }
            }
            SenderState::DecryptResultSent { peer_commitment } => {
                SenderState::AwaitingMaskedOutput { peer_commitment }
            }
            SenderState::AwaitingMaskedOutput { peer_commitment } => {
                let masked_output = match channel.recv(MsgKind::MaskedOutput).await? {
                    Msg::MaskedOutput(bit) => bit == 1,
                    other => {
                        let err = channel::Error::unexpected(MsgKind::MaskedOutput, &other);
                        return Err(err.into());
                    }
                };
                SenderState::AwaitingReveal {
                    peer_commitment,
                    masked_output,
                }
            }
            SenderState::AwaitingReveal {
                peer_commitment,
                masked_output,
            } => {
                let peer_mask = reveal(service, &self.mask, peer_commitment).await?;
                let result = reconcile_sender(masked_output, &self.mask, &peer_mask, self.choice);
                if result.cheating_detected {
                    warn!(
                        "Chooser did not follow the protocol, possibly malicious. \
                         Refusing to acknowledge a love result."
                    );
                }
                SenderState::Resolved(result.outcome)
            }
            SenderState::Resolved(outcome) => SenderState::Resolved(outcome),
        };
        debug!(from = self.state.name(), to = next.name(), "sender transition");
        self.state = next;
        Ok(self)
    }

    /// Runs the session to completion.
    pub async fn run<C: Channel, F: FairReveal>(
        mut self,
        channel: &mut MsgChannel<C>,
        service: &F,
    ) -> Result<Choice, Error> {
        loop {
            if let SenderState::Resolved(outcome) = self.state {
                return Ok(outcome);
            }
            self = self.step(channel, service).await?;
        }
    }
}

/// The local state of the chooser for a single protocol run.
#[derive(Debug)]
pub struct ChooserSession {
    choice: Choice,
    mask: Mask,
    commitment: Commitment,
    key: CipherKey,
    state: ChooserState,
}

impl ChooserSession {
    /// Starts a session with fresh randomness.
    pub fn new<R: RngCore + CryptoRng>(choice: Choice, rng: &mut R) -> Self {
        let (mask, commitment) = commit(rng);
        Self {
            choice,
            mask,
            commitment,
            key: CipherKey::random(rng),
            state: ChooserState::Init,
        }
    }

    /// The current state.
    pub fn state(&self) -> &ChooserState {
        &self.state
    }

    /// The outcome, once resolved.
    pub fn outcome(&self) -> Option<Choice> {
        match self.state {
            ChooserState::Resolved(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Performs a single state transition. Does nothing once resolved.
    ///
    /// The session is consumed, any error aborts it.
    pub async fn step<C: Channel, F: FairReveal>(
        mut self,
        channel: &mut MsgChannel<C>,
        service: &F,
    ) -> Result<Self, Error> {
        let next = match self.state {
            ChooserState::Init => {
                let peer_commitment = exchange_commitments(channel, self.commitment).await?;
                ChooserState::CommitmentsExchanged { peer_commitment }
            }
            ChooserState::CommitmentsExchanged { peer_commitment } => {
                ChooserState::AwaitingSecretPair { peer_commitment }
            }
            ChooserState::AwaitingSecretPair { peer_commitment } => {
                let pair = match channel.recv(MsgKind::EncryptedSecrets).await? {
                    Msg::EncryptedSecrets { friendship, love } => {
                        EncryptedPair { friendship, love }
                    }
                    other => {
                        return Err(
                            channel::Error::unexpected(MsgKind::EncryptedSecrets, &other).into(),
                        );
                    }
                };
                let request = select(&pair, self.choice, &self.key)?;
                channel.send(Msg::DecryptRequest(request)).await?;
                ChooserState::DecryptRequestSent { peer_commitment }
            }
            ChooserState::DecryptRequestSent { peer_commitment } => {
                ChooserState::AwaitingDecryptResult { peer_commitment }
            }
            ChooserState::AwaitingDecryptResult { peer_commitment } => {
                let result = recv_ciphertext(channel, MsgKind::DecryptResult).await?;
                let secret = finalize(&result, self.choice, &self.key)?;
                let masked_output = masked_output(secret, &self.mask);
                channel.send(Msg::MaskedOutput(masked_output as u8)).await?;
                ChooserState::MaskedOutputSent {
                    peer_commitment,
                    masked_output,
                }
            }
            ChooserState::MaskedOutputSent {
                peer_commitment,
                masked_output,
            } => ChooserState::AwaitingReveal {
                peer_commitment,
                masked_output,
            },
            ChooserState::AwaitingReveal {
                peer_commitment,
                masked_output,
            } => {
                let peer_mask = reveal(service, &self.mask, peer_commitment).await?;
                ChooserState::Resolved(reconcile_chooser(masked_output, &self.mask, &peer_mask))
            }
            ChooserState::Resolved(outcome) => ChooserState::Resolved(outcome),
        };
        debug!(from = self.state.name(), to = next.name(), "chooser transition");
        self.state = next;
        Ok(self)
    }

    /// Runs the session to completion.
    pub async fn run<C: Channel, F: FairReveal>(
        mut self,
        channel: &mut MsgChannel<C>,
        service: &F,
    ) -> Result<Choice, Error> {
        loop {
            if let ChooserState::Resolved(outcome) = self.state {
                return Ok(outcome);
            }
            self = self.step(channel, service).await?;
        }
    }
}

async fn recv_ciphertext<C: Channel>(
    channel: &mut MsgChannel<C>,
    kind: MsgKind,
) -> Result<Ciphertext, Error> {
    match channel.recv(kind).await? {
        Msg::DecryptRequest(ciphertext) | Msg::DecryptResult(ciphertext) => Ok(ciphertext),
        other => Err(channel::Error::unexpected(kind, &other).into()),
    }
}

/// Executes the protocol as the sender (host) and returns the outcome.
#[instrument(level = Level::DEBUG, skip_all, err)]
pub async fn run_sender<C: Channel, F: FairReveal>(
    channel: C,
    service: &F,
    choice: Choice,
    opts: SessionOpts,
) -> Result<Choice, Error> {
    let mut channel = MsgChannel::new(channel, Role::Sender, opts.max_malformed_msgs);
    let session = SenderSession::new(choice, &mut rand::rng());
    session.run(&mut channel, service).await
}

/// Executes the protocol as the chooser (joiner) and returns the outcome.
#[instrument(level = Level::DEBUG, skip_all, err)]
pub async fn run_chooser<C: Channel, F: FairReveal>(
    channel: C,
    service: &F,
    choice: Choice,
    opts: SessionOpts,
) -> Result<Choice, Error> {
    let mut channel = MsgChannel::new(channel, Role::Chooser, opts.max_malformed_msgs);
    let session = ChooserSession::new(choice, &mut rand::rng());
    session.run(&mut channel, service).await
}

/// Simulates a session between two local parties and returns the sender's and the chooser's
/// outcome.
pub async fn simulate(
    sender_choice: Choice,
    chooser_choice: Choice,
    channel_opts: ChannelOpts,
    opts: SessionOpts,
) -> Result<(Choice, Choice), Error> {
    let (sender_channel, chooser_channel) = SimpleChannel::pair(channel_opts);
    let service = TrustedRevealer::new(2);
    try_join(
        run_sender(sender_channel, &service, sender_choice, opts),
        run_chooser(chooser_channel, &service, chooser_choice, opts),
    )
    .await
}
