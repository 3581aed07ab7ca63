//! A communication channel used to send/receive messages to/from the other party.

use std::{fmt, future::Future, time::Duration};

use tokio::{
    sync::mpsc::{Receiver, Sender, channel, error::SendError},
    time::timeout,
};
use tracing::{trace, warn};

use crate::{
    data_types::Role,
    message::{Envelope, Msg, MsgKind, SchemaError},
    utils::{deserialize, serialize},
};

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug, thiserror::Error)]
#[error("channel error while {phase}: {reason}")]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

impl Error {
    /// A message of the wrong kind, as seen by code that already dispatched on the expected kind.
    pub(crate) fn unexpected(expected: MsgKind, found: &Msg) -> Self {
        Error {
            phase: format!("receiving {expected}"),
            reason: ErrorKind::Schema(SchemaError::UnexpectedKind {
                expected,
                found: found.kind(),
            }),
        }
    }
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    #[error("receive failed: {0}")]
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    #[error("send failed: {0}")]
    SendError(String),
    /// The message could not be serialized (before sending it out).
    #[error("serialization failed: {0}")]
    SerdeError(String),
    /// Too many messages that could not be deserialized were received.
    #[error("dropped {0} malformed messages")]
    TooManyMalformed(usize),
    /// A well-formed message that is not allowed at this point of the protocol.
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A communication channel used to send/receive messages to/from the other party.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the other party.
    fn send_bytes(
        &mut self,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a message from the other party.
    fn recv_bytes(&mut self) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// A wrapper around [`Channel`] that (de-)serializes and validates protocol messages.
#[derive(Debug)]
pub struct MsgChannel<C: Channel> {
    inner: C,
    role: Role,
    max_malformed: usize,
    malformed: usize,
}

impl<C: Channel> MsgChannel<C> {
    /// Wraps a byte channel for the party playing `role`.
    ///
    /// Up to `max_malformed` messages that cannot be deserialized are dropped before receiving
    /// fails.
    pub fn new(inner: C, role: Role, max_malformed: usize) -> Self {
        Self {
            inner,
            role,
            max_malformed,
            malformed: 0,
        }
    }

    /// Returns the wrapped byte channel.
    pub fn into_inner(self) -> C {
        self.inner
    }

    /// Serializes and sends a message to the other party.
    pub async fn send(&mut self, msg: Msg) -> Result<(), Error> {
        let phase = msg.kind();
        let envelope = Envelope {
            from: self.role,
            msg,
        };
        let bytes = serialize(&envelope).map_err(|e| Error {
            phase: format!("sending {phase}"),
            reason: ErrorKind::SerdeError(format!("{e:?}")),
        })?;
        trace!(%phase, len = bytes.len(), "sending message");
        self.inner.send_bytes(bytes).await.map_err(|e| Error {
            phase: format!("sending {phase}"),
            reason: ErrorKind::SendError(format!("{e:?}")),
        })
    }

    /// Receives the next message, which must be of the given kind and sent by the other party.
    ///
    /// Bytes that do not deserialize are dropped, anything else that does not match is fatal.
    pub async fn recv(&mut self, expected: MsgKind) -> Result<Msg, Error> {
        loop {
            let bytes = self.inner.recv_bytes().await.map_err(|e| Error {
                phase: format!("receiving {expected}"),
                reason: ErrorKind::RecvError(format!("{e:?}")),
            })?;
            let envelope: Envelope = match deserialize(&bytes) {
                Ok(envelope) => envelope,
                Err(e) => {
                    self.malformed += 1;
                    warn!(%expected, dropped = self.malformed, "dropping malformed message: {e}");
                    if self.malformed > self.max_malformed {
                        return Err(Error {
                            phase: format!("receiving {expected}"),
                            reason: ErrorKind::TooManyMalformed(self.malformed),
                        });
                    }
                    continue;
                }
            };
            envelope
                .validate(self.role.peer(), expected)
                .map_err(|e| Error {
                    phase: format!("receiving {expected}"),
                    reason: e.into(),
                })?;
            trace!(%expected, "received message");
            return Ok(envelope.msg);
        }
    }
}

/// Options for a [`SimpleChannel`].
#[derive(Debug, Clone, Copy)]
pub struct ChannelOpts {
    /// How long to wait for a message before giving up.
    pub recv_timeout: Duration,
    /// How many messages may be buffered per direction.
    pub buffer_capacity: usize,
}

impl Default for ChannelOpts {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_secs(10 * 60),
            buffer_capacity: 16,
        }
    }
}

/// A simple in-memory channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Sender<Vec<u8>>,
    r: Receiver<Vec<u8>>,
    recv_timeout: Duration,
}

impl SimpleChannel {
    /// Creates two connected channel endpoints.
    pub fn pair(opts: ChannelOpts) -> (Self, Self) {
        let (send_a_to_b, recv_a_to_b) = channel(opts.buffer_capacity);
        let (send_b_to_a, recv_b_to_a) = channel(opts.buffer_capacity);
        let a = SimpleChannel {
            s: send_a_to_b,
            r: recv_b_to_a,
            recv_timeout: opts.recv_timeout,
        };
        let b = SimpleChannel {
            s: send_b_to_a,
            r: recv_a_to_b,
            recv_timeout: opts.recv_timeout,
        };
        (a, b)
    }
}

#[derive(Debug)]
/// The error raised by `recv` calls of a [`SimpleChannel`].
pub enum AsyncRecvError {
    /// The channel has been closed.
    Closed,
    /// No message was received before the timeout.
    TimeoutElapsed,
}

impl Channel for SimpleChannel {
    type SendError = SendError<Vec<u8>>;
    type RecvError = AsyncRecvError;

    async fn send_bytes(&mut self, msg: Vec<u8>) -> Result<(), SendError<Vec<u8>>> {
        self.s.send(msg).await
    }

    async fn recv_bytes(&mut self) -> Result<Vec<u8>, AsyncRecvError> {
        match timeout(self.recv_timeout, self.r.recv()).await {
            Ok(Some(bytes)) => Ok(bytes),
            Ok(None) => Err(AsyncRecvError::Closed),
            Err(_) => Err(AsyncRecvError::TimeoutElapsed),
        }
    }
}
