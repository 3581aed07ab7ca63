//! Fair reveal of committed values.
//!
//! A fair reveal service only hands out the preimages of commitments once every party has
//! supplied its own preimage, so that no party can abort after learning the other party's value
//! without having revealed its own.

use std::{collections::HashMap, future::Future, sync::Arc};

use tokio::sync::watch;
use tracing::{Level, debug, instrument};

use crate::data_types::Commitment;

/// Errors that can occur while resolving commitments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No party submitted a preimage for the commitment.
    #[error("no preimage was submitted for commitment {0:?}")]
    UnknownCommitment(Commitment),
    /// The service shut down before all parties submitted their preimage.
    #[error("the reveal service was closed")]
    Closed,
}

/// The resolved preimages, indexed by commitment.
#[derive(Debug, Clone, Default)]
pub struct Preimages(HashMap<Commitment, Vec<u8>>);

impl Preimages {
    /// Records the preimage of a commitment.
    pub fn insert(&mut self, commitment: Commitment, preimage: Vec<u8>) {
        self.0.insert(commitment, preimage);
    }

    /// Returns the preimage resolved for the commitment.
    pub fn preimage(&self, commitment: &Commitment) -> Option<&[u8]> {
        self.0.get(commitment).map(Vec::as_slice)
    }
}

/// A service that reveals committed values to all parties at once.
pub trait FairReveal {
    /// The per-party handle used to resolve commitments.
    type Resolver: Resolver;

    /// Creates a resolver that will submit `own_preimage` when resolving.
    fn create_resolver(&self, own_preimage: &[u8]) -> Self::Resolver;
}

/// The per-party side of a [`FairReveal`] service.
pub trait Resolver {
    /// Registers a commitment of another party whose preimage should be resolved.
    fn add(&mut self, commitment: Commitment);

    /// Submits the own preimage and waits until the preimages of all added commitments are known.
    fn resolve(self) -> impl Future<Output = Result<Preimages, Error>> + Send;
}

/// A trusted in-process reveal service for a fixed number of parties.
///
/// Every party submits its preimage when calling [`Resolver::resolve`], which only completes
/// once all parties have submitted. Submissions are grouped into rounds of `parties` in the
/// order they arrive, so the service can be reused for consecutive sessions. Sessions running
/// concurrently need separate services.
#[derive(Debug, Clone)]
pub struct TrustedRevealer {
    parties: usize,
    rounds: Arc<watch::Sender<Rounds>>,
}

#[derive(Debug, Default)]
struct Rounds {
    current: u64,
    pending: Vec<Vec<u8>>,
    completed: HashMap<u64, CompletedRound>,
}

#[derive(Debug)]
struct CompletedRound {
    preimages: Vec<Vec<u8>>,
    unread: usize,
}

impl TrustedRevealer {
    /// Creates a service for the given number of parties.
    pub fn new(parties: usize) -> Self {
        let (rounds, _) = watch::channel(Rounds::default());
        Self {
            parties,
            rounds: Arc::new(rounds),
        }
    }
}

impl FairReveal for TrustedRevealer {
    type Resolver = TrustedResolver;

    fn create_resolver(&self, own_preimage: &[u8]) -> TrustedResolver {
        TrustedResolver {
            parties: self.parties,
            rounds: Arc::clone(&self.rounds),
            own_preimage: own_preimage.to_vec(),
            commitments: vec![],
        }
    }
}

/// The [`Resolver`] of a [`TrustedRevealer`].
#[derive(Debug)]
pub struct TrustedResolver {
    parties: usize,
    rounds: Arc<watch::Sender<Rounds>>,
    own_preimage: Vec<u8>,
    commitments: Vec<Commitment>,
}

impl Resolver for TrustedResolver {
    fn add(&mut self, commitment: Commitment) {
        self.commitments.push(commitment);
    }

    #[instrument(level = Level::DEBUG, skip_all, err)]
    async fn resolve(self) -> Result<Preimages, Error> {
        let TrustedResolver {
            parties,
            rounds,
            own_preimage,
            commitments,
        } = self;
        let mut rx = rounds.subscribe();
        let mut round = 0;
        rounds.send_modify(|rounds| {
            round = rounds.current;
            rounds.pending.push(own_preimage);
            if rounds.pending.len() >= parties {
                let preimages = std::mem::take(&mut rounds.pending);
                let unread = preimages.len();
                rounds.completed.insert(round, CompletedRound { preimages, unread });
                rounds.current += 1;
            }
        });
        rx.wait_for(|rounds| rounds.completed.contains_key(&round))
            .await
            .map_err(|_| Error::Closed)?;

        let mut submitted = None;
        rounds.send_modify(|rounds| {
            if let Some(done) = rounds.completed.get_mut(&round) {
                submitted = Some(done.preimages.clone());
                done.unread -= 1;
                if done.unread == 0 {
                    rounds.completed.remove(&round);
                }
            }
        });
        let submitted = submitted.ok_or(Error::Closed)?;
        debug!(parties, round, "all parties submitted their preimage");

        let by_commitment: HashMap<Commitment, Vec<u8>> = submitted
            .into_iter()
            .map(|preimage| (Commitment::to(&preimage), preimage))
            .collect();
        let mut preimages = Preimages::default();
        for commitment in commitments {
            let preimage = by_commitment
                .get(&commitment)
                .ok_or(Error::UnknownCommitment(commitment))?;
            preimages.insert(commitment, preimage.clone());
        }
        Ok(preimages)
    }
}
