//! Recovery of the output bit from the transferred secret and both revealed masks.
//!
//! The chooser's payload bit is `real_bit ^ sender_mask`. The chooser hides it under its own mask
//! before sending it, so neither party learns anything until both masks are revealed:
//!
//! ```text
//! masked_output = real_bit ^ sender_mask ^ chooser_mask
//! real_bit      = masked_output ^ sender_mask ^ chooser_mask
//! ```

use subtle::{Choice as CtChoice, ConditionallySelectable};

use crate::data_types::{Choice, Mask, Secret};

/// The result of reconciling the output on the sender's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderOutcome {
    /// The (possibly forced) outcome.
    pub outcome: Choice,
    /// Whether the chooser deviated from the protocol. Must never be disclosed to the chooser.
    pub cheating_detected: bool,
}

/// Masks the chooser's payload bit with the chooser's own mask.
pub fn masked_output(secret: Secret, own_mask: &Mask) -> bool {
    secret.payload() ^ own_mask.bit()
}

/// Computes the outcome on the chooser's side once the sender's mask is revealed.
pub fn reconcile_chooser(masked_output: bool, own_mask: &Mask, peer_mask: &Mask) -> Choice {
    Choice::from_bit(masked_output ^ own_mask.bit() ^ peer_mask.bit())
}

/// Computes the outcome on the sender's side once the chooser's mask is revealed.
///
/// A love result is impossible if the sender picked friendship, because the friendship secret
/// never encodes the sender's choice. If it happens anyway the chooser cheated, and the result is
/// forced to friendship. The selection does not branch on the detection.
pub fn reconcile_sender(
    masked_output: bool,
    own_mask: &Mask,
    peer_mask: &Mask,
    own_choice: Choice,
) -> SenderOutcome {
    let raw = CtChoice::from((masked_output ^ own_mask.bit() ^ peer_mask.bit()) as u8);
    let friendship = CtChoice::from(!own_choice.is_love() as u8);
    let cheated = raw & friendship;
    let output = u8::conditional_select(&raw.unwrap_u8(), &0, cheated);
    SenderOutcome {
        outcome: Choice::from_bit(output == 1),
        cheating_detected: bool::from(cheated),
    }
}
