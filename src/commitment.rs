//! Exchange of commitments to the parties' random masks, and their later fair reveal.

use rand::{CryptoRng, RngCore};

use crate::{
    channel::{self, Channel, MsgChannel},
    data_types::{Commitment, MASK_LEN, Mask},
    message::{Msg, MsgKind},
    reveal::{self, FairReveal, Resolver},
};

/// Errors that can occur while exchanging or revealing masks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// The reveal service failed.
    #[error("reveal failed: {0}")]
    Reveal(#[from] reveal::Error),
    /// The reveal service resolved nothing for the peer's commitment.
    #[error("no preimage was resolved for the peer's commitment")]
    MissingPreimage,
    /// The revealed preimage does not hash to the peer's commitment.
    #[error("the revealed mask does not match the peer's commitment")]
    BindingFailure,
    /// The revealed preimage has the wrong length.
    #[error("the revealed mask has {0} bytes instead of {len}", len = MASK_LEN)]
    InvalidMaskLength(usize),
}

/// Generates a fresh mask and the commitment to it.
pub fn commit<R: RngCore + CryptoRng>(rng: &mut R) -> (Mask, Commitment) {
    let mask = Mask::random(rng);
    let commitment = Commitment::to(mask.as_bytes());
    (mask, commitment)
}

/// Sends the own commitment and returns the peer's.
pub async fn exchange_commitments<C: Channel>(
    channel: &mut MsgChannel<C>,
    local: Commitment,
) -> Result<Commitment, Error> {
    channel.send(Msg::MaskCommitment(local)).await?;
    match channel.recv(MsgKind::MaskCommitment).await? {
        Msg::MaskCommitment(peer) => Ok(peer),
        other => Err(channel::Error::unexpected(MsgKind::MaskCommitment, &other).into()),
    }
}

/// Reveals the own mask through the fair reveal service and returns the peer's mask.
///
/// Fails if the resolved preimage does not open the peer's commitment.
pub async fn reveal<F: FairReveal>(
    service: &F,
    local: &Mask,
    peer_commitment: Commitment,
) -> Result<Mask, Error> {
    let mut resolver = service.create_resolver(local.as_bytes());
    resolver.add(peer_commitment);
    let preimages = resolver.resolve().await?;
    let preimage = preimages
        .preimage(&peer_commitment)
        .ok_or(Error::MissingPreimage)?;
    if !peer_commitment.opens_to(preimage) {
        return Err(Error::BindingFailure);
    }
    Mask::from_bytes(preimage).ok_or(Error::InvalidMaskLength(preimage.len()))
}
