//! Two parties privately learn whether both of them picked the affirmative option.
//!
//! Each party holds a single private [`Choice`](data_types::Choice). At the end of a session both
//! learn [`Choice::Love`](data_types::Choice::Love) if and only if both picked it, and nothing
//! else about the other party's input.
//!
//! ## Main Components
//!
//! * [`commitment`]: Both parties commit to a random mask before anything else is exchanged and
//!   later reveal it through a [`reveal::FairReveal`] service.
//! * [`ost`]: A two-message oblivious transfer built from the commutative [`cipher`], which lets
//!   the chooser retrieve one of the sender's two secrets.
//! * [`reconcile`]: Recovers the output bit from the transferred secret and both masks, and
//!   silently corrects outputs that are impossible for an honest chooser.
//! * [`protocol`]: The state machines of the sender (host) and chooser (joiner) roles.
//! * [`channel`]: Communication abstractions for exchanging [`message`]s between the parties.
//!
//! ## Example
//!
//! ```ignore
//! use lovepair::{
//!     channel::{ChannelOpts, SimpleChannel},
//!     data_types::Choice,
//!     protocol::{SessionOpts, run_chooser, run_sender},
//!     reveal::TrustedRevealer,
//! };
//!
//! # async fn example() -> Result<(), lovepair::protocol::Error> {
//! let (host, joiner) = SimpleChannel::pair(ChannelOpts::default());
//! let service = TrustedRevealer::new(2);
//! let (a, b) = futures::future::try_join(
//!     run_sender(host, &service, Choice::Love, SessionOpts::default()),
//!     run_chooser(joiner, &service, Choice::Love, SessionOpts::default()),
//! )
//! .await?;
//! assert_eq!(a, Choice::Love);
//! assert_eq!(b, Choice::Love);
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Properties
//!
//! The protocol tolerates a chooser that deviates from it: a chooser that tries to obtain a love
//! result the sender never agreed to is detected by the sender, whose outcome is then forced to
//! friendship without telling the chooser. Confidentiality and integrity of the channel itself are
//! out of scope.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod cipher;
pub mod commitment;
pub mod data_types;
pub mod message;
pub mod ost;
pub mod protocol;
pub mod reconcile;
pub mod reveal;

mod utils;
