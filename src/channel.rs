//! The ordered peer-to-peer channel between the two parties and the
//! contract of the relay that mediates it.
//!
//! Every protocol message is serialized with `bincode` and addressed by
//! `(session, topic, src, dst, seq)`. Topics are human-readable labels
//! (e.g. `"garbled gates"`) used for diagnostics and typed decoding; the
//! sequence numbers establish the actual ordering. A [`Connection`] keeps
//! independent, monotonically increasing send and receive counters, so a
//! party's n-th receive of a topic always pairs with the peer's n-th send.
//!
//! The relay itself is an external service; this module only defines the
//! [`Relay`] trait it must satisfy (mirroring its `NewSession` / `Inbox` /
//! `Outbox` interface) and an in-memory implementation used by tests and
//! the local demo runner.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::trace;

/// The maximum payload size the relay accepts for a single message.
pub const MAX_PAYLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Soft timeout for a single send or receive call.
pub const CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Hard timeout for a full exchange round (e.g. the OT subprotocol).
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(240);

/// The two roles of the protocol, fixing the party ids on the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// The party that garbles the circuit; party id 1.
    Garbler,
    /// The party that evaluates the garbled circuit; party id 2.
    Evaluator,
}

impl Party {
    /// The party id used as message source.
    pub fn id(&self) -> u32 {
        match self {
            Party::Garbler => 1,
            Party::Evaluator => 2,
        }
    }

    /// The peer's party id.
    pub fn peer_id(&self) -> u32 {
        match self {
            Party::Garbler => 2,
            Party::Evaluator => 1,
        }
    }
}

/// Errors related to sending, receiving or (de-)serializing messages.
#[derive(Debug, Error)]
pub enum Error {
    /// The relay reported an error or could not be reached.
    #[error("relay: {0}")]
    Relay(String),
    /// No matching message arrived within the deadline.
    #[error("no message for topic \"{topic}\" within the deadline")]
    Timeout {
        /// The topic that was being sent or received.
        topic: String,
    },
    /// The relay delivered a message of a different topic at this sequence
    /// number; the peers disagree about the protocol flow.
    #[error("expected topic \"{expected}\" at seq {seq}, peer sent \"{actual}\"")]
    TopicMismatch {
        /// The topic this party expected.
        expected: String,
        /// The topic the peer actually sent.
        actual: String,
        /// The receive sequence number at which they diverged.
        seq: u64,
    },
    /// The relay delivered a message with an unexpected sequence number.
    #[error("expected message with seq {expected}, relay delivered seq {actual}")]
    SeqMismatch {
        /// The expected sequence number.
        expected: u64,
        /// The delivered sequence number.
        actual: u64,
    },
    /// The relay response did not contain exactly the requested messages.
    #[error("relay returned {actual} messages, expected {expected}")]
    BadResponse {
        /// Requested message count.
        expected: usize,
        /// Delivered message count.
        actual: usize,
    },
    /// A message could not be serialized before sending.
    #[error("could not serialize message for topic \"{topic}\": {reason}")]
    Serialize {
        /// The topic of the message.
        topic: String,
        /// The underlying serialization failure.
        reason: String,
    },
    /// A received payload could not be deserialized.
    #[error("could not deserialize message for topic \"{topic}\": {reason}")]
    Deserialize {
        /// The topic of the message.
        topic: String,
        /// The underlying deserialization failure.
        reason: String,
    },
    /// The serialized payload exceeds the relay's message size limit.
    #[error("payload of {size} bytes exceeds the {MAX_PAYLOAD_BYTES} byte relay limit")]
    PayloadTooLarge {
        /// The size of the rejected payload.
        size: usize,
    },
}

/// A message stored and forwarded by the relay. The payload is opaque to
/// the relay; a message with an empty payload acts as an `Outbox` stub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The session the message belongs to.
    pub session: String,
    /// The human-readable topic label.
    pub topic: String,
    /// The sending party's id.
    pub src: u32,
    /// The receiving party's id.
    pub dst: u32,
    /// The 1-based sequence number within `(session, src, dst)`.
    pub seq: u64,
    /// The bincode-serialized message content.
    pub payload: Vec<u8>,
}

/// The message contract of the external relay service.
///
/// The relay guarantees FIFO delivery per `(session, src, dst)` and blocks
/// `outbox` until each requested message is present, up to a timeout.
pub trait Relay {
    /// The transport error raised by the relay client.
    type Error: fmt::Debug;

    /// Creates a fresh session and returns its id.
    #[allow(async_fn_in_trait)]
    async fn new_session(&self) -> Result<String, Self::Error>;

    /// Delivers outgoing messages to the relay.
    #[allow(async_fn_in_trait)]
    async fn inbox(&self, messages: Vec<Message>) -> Result<(), Self::Error>;

    /// Blocks until a message matching each stub's `(session, src, dst,
    /// seq)` has been delivered and returns them in stub order.
    #[allow(async_fn_in_trait)]
    async fn outbox(&self, stubs: Vec<Message>) -> Result<Vec<Message>, Self::Error>;

    /// Releases the relay connection.
    #[allow(async_fn_in_trait)]
    async fn close(&self) -> Result<(), Self::Error>;
}

/// An ordered connection to the peer, scoped to a single session.
///
/// The party-id pair is fixed at construction; the send and receive
/// counters advance independently of each other.
#[derive(Debug)]
pub struct Connection<R: Relay> {
    relay: R,
    session: String,
    local: u32,
    peer: u32,
    nsend: AtomicU64,
    nrecv: AtomicU64,
}

impl<R: Relay> Connection<R> {
    /// Opens a connection for the given role, creating a fresh relay
    /// session unless one is supplied.
    pub async fn open(relay: R, party: Party, session: Option<String>) -> Result<Self, Error> {
        let session = match session {
            Some(session) => session,
            None => relay
                .new_session()
                .await
                .map_err(|e| Error::Relay(format!("{e:?}")))?,
        };
        Ok(Self {
            relay,
            session,
            local: party.id(),
            peer: party.peer_id(),
            nsend: AtomicU64::new(0),
            nrecv: AtomicU64::new(0),
        })
    }

    /// The id of the relay session this connection is scoped to.
    pub fn session(&self) -> &str {
        &self.session
    }

    /// Serializes `msg` and delivers it to the peer under the given topic.
    pub async fn send<T: Serialize>(&self, topic: &str, msg: &T) -> Result<(), Error> {
        let payload = bincode::serialize(msg).map_err(|e| Error::Serialize {
            topic: topic.to_string(),
            reason: format!("{e}"),
        })?;
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
            });
        }
        let seq = self.nsend.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(topic, seq, size = payload.len(), "sending message");
        let message = Message {
            session: self.session.clone(),
            topic: topic.to_string(),
            src: self.local,
            dst: self.peer,
            seq,
            payload,
        };
        tokio::time::timeout(CALL_TIMEOUT, self.relay.inbox(vec![message]))
            .await
            .map_err(|_| Error::Timeout {
                topic: topic.to_string(),
            })?
            .map_err(|e| Error::Relay(format!("{e:?}")))
    }

    /// Awaits the peer's next message and deserializes it, checking that
    /// its topic matches the expected one.
    pub async fn recv<T: DeserializeOwned>(&self, topic: &str) -> Result<T, Error> {
        let seq = self.nrecv.fetch_add(1, Ordering::SeqCst) + 1;
        let stub = Message {
            session: self.session.clone(),
            topic: topic.to_string(),
            src: self.peer,
            dst: self.local,
            seq,
            payload: Vec::new(),
        };
        let mut delivered = tokio::time::timeout(CALL_TIMEOUT, self.relay.outbox(vec![stub]))
            .await
            .map_err(|_| Error::Timeout {
                topic: topic.to_string(),
            })?
            .map_err(|e| Error::Relay(format!("{e:?}")))?;
        if delivered.len() != 1 {
            return Err(Error::BadResponse {
                expected: 1,
                actual: delivered.len(),
            });
        }
        let message = delivered.pop().ok_or(Error::BadResponse {
            expected: 1,
            actual: 0,
        })?;
        if message.seq != seq {
            return Err(Error::SeqMismatch {
                expected: seq,
                actual: message.seq,
            });
        }
        if message.topic != topic {
            return Err(Error::TopicMismatch {
                expected: topic.to_string(),
                actual: message.topic,
                seq,
            });
        }
        trace!(topic, seq, size = message.payload.len(), "received message");
        bincode::deserialize(&message.payload).map_err(|e| Error::Deserialize {
            topic: topic.to_string(),
            reason: format!("{e}"),
        })
    }

    /// Closes the underlying relay connection.
    pub async fn close(self) -> Result<(), Error> {
        self.relay
            .close()
            .await
            .map_err(|e| Error::Relay(format!("{e:?}")))
    }
}

/// The error raised by the [`InMemoryRelay`].
#[derive(Debug, Error)]
pub enum InMemoryRelayError {
    /// No matching message was delivered before the relay-side deadline.
    #[error("no message for (session {session}, topic \"{topic}\", {src}->{dst}, seq {seq})")]
    Timeout {
        /// Session id of the missing message.
        session: String,
        /// Topic of the missing message.
        topic: String,
        /// Source party id.
        src: u32,
        /// Destination party id.
        dst: u32,
        /// Sequence number.
        seq: u64,
    },
    /// A delivered payload exceeded the relay's size limit.
    #[error("payload of {size} bytes exceeds the {MAX_PAYLOAD_BYTES} byte relay limit")]
    PayloadTooLarge {
        /// The size of the rejected payload.
        size: usize,
    },
}

#[derive(Debug, Default)]
struct InMemoryRelayState {
    queues: Mutex<HashMap<(String, u32, u32, u64), Message>>,
    notify: Notify,
}

/// A process-local relay, FIFO per `(session, src, dst)`.
///
/// Both parties of a test or demo session hold clones of the same relay.
/// `outbox` matches on `(session, src, dst, seq)` and returns whatever
/// topic the peer sent at that sequence number, leaving topic-mismatch
/// detection to the [`Connection`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryRelay {
    state: Arc<InMemoryRelayState>,
}

impl InMemoryRelay {
    /// Creates an empty relay.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Relay for InMemoryRelay {
    type Error = InMemoryRelayError;

    async fn new_session(&self) -> Result<String, Self::Error> {
        Ok(format!("{:032x}", rand::random::<u128>()))
    }

    async fn inbox(&self, messages: Vec<Message>) -> Result<(), Self::Error> {
        for message in messages {
            if message.payload.len() > MAX_PAYLOAD_BYTES {
                return Err(InMemoryRelayError::PayloadTooLarge {
                    size: message.payload.len(),
                });
            }
            let key = (
                message.session.clone(),
                message.src,
                message.dst,
                message.seq,
            );
            self.state
                .queues
                .lock()
                .expect("relay lock poisoned")
                .insert(key, message);
        }
        self.state.notify.notify_waiters();
        Ok(())
    }

    async fn outbox(&self, stubs: Vec<Message>) -> Result<Vec<Message>, Self::Error> {
        let mut delivered = Vec::with_capacity(stubs.len());
        for stub in stubs {
            let key = (stub.session.clone(), stub.src, stub.dst, stub.seq);
            let deadline = tokio::time::Instant::now() + EXCHANGE_TIMEOUT;
            let message = loop {
                let notified = self.state.notify.notified();
                let found = self
                    .state
                    .queues
                    .lock()
                    .expect("relay lock poisoned")
                    .remove(&key);
                if let Some(message) = found {
                    break message;
                }
                if tokio::time::timeout_at(deadline, notified).await.is_err() {
                    return Err(InMemoryRelayError::Timeout {
                        session: stub.session,
                        topic: stub.topic,
                        src: stub.src,
                        dst: stub.dst,
                        seq: stub.seq,
                    });
                }
            };
            delivered.push(message);
        }
        Ok(delivered)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}
