use std::collections::HashSet;

use futures::future::try_join;
use lovepair::{
    channel::{self, ChannelOpts, ErrorKind, MsgChannel, SimpleChannel},
    cipher::{CipherKey, Ciphertext, decode_secret},
    commitment::{self, commit, exchange_commitments, reveal},
    data_types::{Choice, Commitment, Role},
    message::{Msg, MsgKind, SchemaError},
    ost::{self, EncryptedPair, blind_decrypt, encrypt_secrets, finalize, prepare, select},
    protocol::{Error, SessionOpts, run_chooser, run_sender, simulate},
    reveal::{self as fair_reveal, FairReveal, Preimages, Resolver, TrustedRevealer},
};

const CHOICES: [Choice; 2] = [Choice::Friendship, Choice::Love];

fn channels() -> (MsgChannel<SimpleChannel>, MsgChannel<SimpleChannel>) {
    let (a, b) = SimpleChannel::pair(ChannelOpts::default());
    (
        MsgChannel::new(a, Role::Sender, 0),
        MsgChannel::new(b, Role::Chooser, 0),
    )
}

#[tokio::test]
async fn honest_sessions_agree_on_the_outcome() -> Result<(), Error> {
    for sender in CHOICES {
        for chooser in CHOICES {
            for _ in 0..4 {
                let expected = if sender == Choice::Love && chooser == Choice::Love {
                    Choice::Love
                } else {
                    Choice::Friendship
                };
                let (host, joiner) = SimpleChannel::pair(ChannelOpts::default());
                let service = TrustedRevealer::new(2);
                let outcomes = try_join(
                    run_sender(host, &service, sender, SessionOpts::default()),
                    run_chooser(joiner, &service, chooser, SessionOpts::default()),
                )
                .await?;
                assert_eq!(outcomes, (expected, expected), "{sender} vs {chooser}");
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn consecutive_sessions_share_one_reveal_service() -> Result<(), Error> {
    let service = TrustedRevealer::new(2);
    for (sender, chooser) in [
        (Choice::Love, Choice::Love),
        (Choice::Love, Choice::Friendship),
        (Choice::Love, Choice::Love),
    ] {
        let (host, joiner) = SimpleChannel::pair(ChannelOpts::default());
        let outcomes = try_join(
            run_sender(host, &service, sender, SessionOpts::default()),
            run_chooser(joiner, &service, chooser, SessionOpts::default()),
        )
        .await?;
        let expected = Choice::from_bit(sender.is_love() && chooser.is_love());
        assert_eq!(outcomes, (expected, expected));
    }

    let mut rng = rand::rng();
    let (mask, _) = commit(&mut rng);
    let (_, peer_commitment) = commit(&mut rng);
    let lone = reveal(&service, &mask, peer_commitment);
    let res = tokio::time::timeout(std::time::Duration::from_millis(50), lone).await;
    assert!(res.is_err(), "a lone party must wait for its peer");
    Ok(())
}

#[tokio::test]
async fn end_to_end_scenarios() -> Result<(), Error> {
    let opts = SessionOpts::default();
    let run = |a, b| simulate(a, b, ChannelOpts::default(), opts);
    assert_eq!(run(Choice::Love, Choice::Love).await?.0, Choice::Love);
    assert_eq!(run(Choice::Love, Choice::Friendship).await?.0, Choice::Friendship);
    assert_eq!(run(Choice::Friendship, Choice::Love).await?.0, Choice::Friendship);
    assert_eq!(
        run(Choice::Friendship, Choice::Friendship).await?.0,
        Choice::Friendship
    );
    Ok(())
}

/// Counts how often a fixed bit of the chooser's decrypt request is set.
fn sample_requests(
    pair: &EncryptedPair,
    choice: Choice,
    runs: usize,
) -> (usize, HashSet<[u8; 32]>) {
    let mut rng = rand::rng();
    let mut ones = 0;
    let mut seen = HashSet::new();
    for _ in 0..runs {
        let chooser_key = CipherKey::random(&mut rng);
        let request = select(pair, choice, &chooser_key).unwrap();
        assert_ne!(request, pair.friendship);
        assert_ne!(request, pair.love);
        ones += (request.0[11] & 1) as usize;
        seen.insert(request.0);
    }
    (ones, seen)
}

#[test]
fn sender_transcript_is_independent_of_the_selection() {
    let mut rng = rand::rng();
    let sender_key = CipherKey::random(&mut rng);
    let (mask, _) = commit(&mut rng);
    let pair = encrypt_secrets(&prepare(&mask, Choice::Love), &sender_key);

    let runs = 300;
    let (ones_friendship, seen_friendship) = sample_requests(&pair, Choice::Friendship, runs);
    let (ones_love, seen_love) = sample_requests(&pair, Choice::Love, runs);

    // fresh chooser keys make every request a fresh, uniformly distributed group element
    assert_eq!(seen_friendship.len(), runs);
    assert_eq!(seen_love.len(), runs);
    assert!(seen_friendship.is_disjoint(&seen_love));
    for ones in [ones_friendship, ones_love] {
        assert!((90..=210).contains(&ones), "biased request bit: {ones}/{runs}");
    }
}

#[test]
fn chooser_cannot_open_the_unselected_secret() {
    let mut rng = rand::rng();
    let sender_key = CipherKey::random(&mut rng);
    let chooser_key = CipherKey::random(&mut rng);
    let (mask, _) = commit(&mut rng);
    let secrets = prepare(&mask, Choice::Love);
    let pair = encrypt_secrets(&secrets, &sender_key);

    for choice in CHOICES {
        let request = select(&pair, choice, &chooser_key).unwrap();
        let result = blind_decrypt(&request, &sender_key).unwrap();
        let selected = finalize(&result, choice, &chooser_key).unwrap();
        assert_eq!(
            selected,
            match choice {
                Choice::Friendship => secrets.friendship,
                Choice::Love => secrets.love,
            }
        );

        let other = match choice {
            Choice::Friendship => Choice::Love,
            Choice::Love => Choice::Friendship,
        };
        // without the sender's help the other ciphertext stays under the sender's layer
        let unselected = pair.get(other);
        assert_eq!(decode_secret(&unselected.to_point().unwrap()), None);
        assert_eq!(
            finalize(&unselected, other, &chooser_key),
            Err(ost::Error::UnknownSecret)
        );
    }
}

#[test]
fn secrets_round_trip_for_all_values_and_keys() {
    let mut rng = rand::rng();
    for _ in 0..16 {
        for choice in CHOICES {
            let sender_key = CipherKey::random(&mut rng);
            let chooser_key = CipherKey::random(&mut rng);
            let (mask, _) = commit(&mut rng);
            for sender_choice in CHOICES {
                let secrets = prepare(&mask, sender_choice);
                let pair = encrypt_secrets(&secrets, &sender_key);
                let request = select(&pair, choice, &chooser_key).unwrap();
                let result = blind_decrypt(&request, &sender_key).unwrap();
                let secret = finalize(&result, choice, &chooser_key).unwrap();
                let expected = match choice {
                    Choice::Friendship => secrets.friendship,
                    Choice::Love => secrets.love,
                };
                assert_eq!(secret, expected);
                assert!((2..=5).contains(&secret.value()));
            }
        }
    }
}

/// A reveal service that flips one bit of every preimage it resolves.
struct TamperingRevealer(TrustedRevealer);

struct TamperingResolver {
    inner: <TrustedRevealer as FairReveal>::Resolver,
    commitments: Vec<Commitment>,
}

impl FairReveal for TamperingRevealer {
    type Resolver = TamperingResolver;

    fn create_resolver(&self, own_preimage: &[u8]) -> TamperingResolver {
        TamperingResolver {
            inner: self.0.create_resolver(own_preimage),
            commitments: vec![],
        }
    }
}

impl Resolver for TamperingResolver {
    fn add(&mut self, commitment: Commitment) {
        self.inner.add(commitment);
        self.commitments.push(commitment);
    }

    async fn resolve(self) -> Result<Preimages, fair_reveal::Error> {
        let mut preimages = self.inner.resolve().await?;
        for commitment in self.commitments {
            if let Some(preimage) = preimages.preimage(&commitment) {
                let mut tampered = preimage.to_vec();
                tampered[0] ^= 1;
                preimages.insert(commitment, tampered);
            }
        }
        Ok(preimages)
    }
}

#[tokio::test]
async fn tampered_reveal_aborts_both_parties() {
    let (host, joiner) = SimpleChannel::pair(ChannelOpts::default());
    let service = TamperingRevealer(TrustedRevealer::new(2));
    let (sender, chooser) = tokio::join!(
        run_sender(host, &service, Choice::Love, SessionOpts::default()),
        run_chooser(joiner, &service, Choice::Love, SessionOpts::default()),
    );
    for result in [sender, chooser] {
        assert!(matches!(
            result,
            Err(Error::Commitment(commitment::Error::BindingFailure))
        ));
    }
}

/// A chooser that follows the protocol except for the masked output bit it sends.
async fn tampering_chooser(
    mut channel: MsgChannel<SimpleChannel>,
    service: &TrustedRevealer,
    choice: Choice,
    masked_output: u8,
) -> Result<(), Error> {
    let mut rng = rand::rng();
    let (mask, commitment) = commit(&mut rng);
    let key = CipherKey::random(&mut rng);
    let peer_commitment = exchange_commitments(&mut channel, commitment).await?;
    let Msg::EncryptedSecrets { friendship, love } =
        channel.recv(MsgKind::EncryptedSecrets).await?
    else {
        unreachable!()
    };
    let request = select(&EncryptedPair { friendship, love }, choice, &key)?;
    channel.send(Msg::DecryptRequest(request)).await?;
    let Msg::DecryptResult(result) = channel.recv(MsgKind::DecryptResult).await? else {
        unreachable!()
    };
    finalize(&result, choice, &key)?;
    channel.send(Msg::MaskedOutput(masked_output)).await?;
    reveal(service, &mask, peer_commitment).await?;
    Ok(())
}

#[tokio::test]
async fn cheating_chooser_cannot_force_love() -> Result<(), Error> {
    for chooser_choice in CHOICES {
        for masked_output in [0, 1] {
            for _ in 0..8 {
                let (host, joiner) = SimpleChannel::pair(ChannelOpts::default());
                let joiner = MsgChannel::new(joiner, Role::Chooser, 0);
                let service = TrustedRevealer::new(2);
                let (outcome, ()) = try_join(
                    run_sender(host, &service, Choice::Friendship, SessionOpts::default()),
                    tampering_chooser(joiner, &service, chooser_choice, masked_output),
                )
                .await?;
                assert_eq!(outcome, Choice::Friendship);
            }
        }
    }
    Ok(())
}

#[tokio::test]
async fn rejects_out_of_order_messages() {
    let (mut sender, mut chooser) = channels();
    let (_, commitment) = commit(&mut rand::rng());
    chooser.send(Msg::MaskCommitment(commitment)).await.unwrap();
    chooser.send(Msg::MaskedOutput(1)).await.unwrap();

    exchange_commitments(&mut sender, commitment).await.unwrap();
    let err = sender.recv(MsgKind::DecryptRequest).await.unwrap_err();
    assert!(matches!(
        err.reason,
        ErrorKind::Schema(SchemaError::UnexpectedKind {
            expected: MsgKind::DecryptRequest,
            found: MsgKind::MaskedOutput
        })
    ));
}

#[tokio::test]
async fn duplicate_commitment_aborts_the_sender() {
    let (host, joiner) = SimpleChannel::pair(ChannelOpts::default());
    let mut joiner = MsgChannel::new(joiner, Role::Chooser, 0);
    let service = TrustedRevealer::new(2);
    let (_, commitment) = commit(&mut rand::rng());

    let duplicate = async {
        joiner.send(Msg::MaskCommitment(commitment)).await?;
        joiner.send(Msg::MaskCommitment(commitment)).await?;
        joiner.recv(MsgKind::MaskCommitment).await?;
        joiner.recv(MsgKind::EncryptedSecrets).await?;
        Ok::<_, channel::Error>(())
    };
    let (sender, chooser) = tokio::join!(
        run_sender(host, &service, Choice::Love, SessionOpts::default()),
        duplicate
    );
    assert!(chooser.is_ok());
    let err = match sender {
        Err(Error::Channel(err)) => err,
        other => panic!("expected a channel error, got {other:?}"),
    };
    assert!(matches!(
        err.reason,
        ErrorKind::Schema(SchemaError::UnexpectedKind {
            expected: MsgKind::DecryptRequest,
            found: MsgKind::MaskCommitment
        })
    ));
}

#[tokio::test]
async fn rejects_invalid_decrypt_request() {
    let (host, joiner) = SimpleChannel::pair(ChannelOpts::default());
    let mut joiner = MsgChannel::new(joiner, Role::Chooser, 0);
    let service = TrustedRevealer::new(2);
    let (_, commitment) = commit(&mut rand::rng());

    let garbage = async {
        exchange_commitments(&mut joiner, commitment).await?;
        joiner.recv(MsgKind::EncryptedSecrets).await?;
        joiner.send(Msg::DecryptRequest(Ciphertext([0xff; 32]))).await?;
        Ok::<_, commitment::Error>(())
    };
    let (sender, chooser) = tokio::join!(
        run_sender(host, &service, Choice::Love, SessionOpts::default()),
        garbage
    );
    assert!(chooser.is_ok());
    assert!(matches!(
        sender,
        Err(Error::Transfer(ost::Error::InvalidCiphertext(_)))
    ));
}
