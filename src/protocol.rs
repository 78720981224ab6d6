//! The two-party protocol drivers: garbler and evaluator orchestration.
//!
//! Each role is factored into a pure session state machine (no I/O) and a
//! thin async driver that performs exactly one labelled channel operation
//! per transition. The garbler steps through G1..G7: garble locally, send
//! the ephemeral key, the gate table and its own input labels, answer the
//! evaluator's OT query, and decode the returned result labels. The
//! evaluator mirrors this with E1..E7, evaluating the gates between the
//! oblivious transfer and the result exchange.
//!
//! Before either role starts, the peers exchange the bit widths of their
//! arguments, so that a compiler-backed [`CircuitSource`] can specialize
//! the circuit for the actual input sizes. The high-level
//! [`run_garbler`] / [`run_evaluator`] entry points perform this exchange,
//! load the circuit once per session, run the role driver and decode the
//! result byte layout, closing the relay connection on every exit path.

use num_bigint::BigUint;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    channel::{self, Connection, Party, Relay, EXCHANGE_TIMEOUT},
    circuit::{self, Circuit, CircuitError, CircuitSource},
    data_types::{GarbledGate, Label, Wire},
    garble::{self, Garbling},
    ot,
};

const TOPIC_INPUT_SIZES: &str = "input sizes";
const TOPIC_KEY: &str = "ephemeral key";
const TOPIC_GATES: &str = "garbled gates";
const TOPIC_INPUTS: &str = "inputs";
const TOPIC_OT_QUERY: &str = "ot query";
const TOPIC_RESULT_LABELS: &str = "result labels";
const TOPIC_RESULT: &str = "result";

/// The evaluator's request for the oblivious transfer of its input-wire
/// labels: the wire range `offset..offset + count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtQuery {
    /// The first wire to transfer; must equal the garbler's input width.
    pub offset: usize,
    /// The number of wires to transfer; must equal the evaluator's input
    /// width.
    pub count: usize,
}

impl std::fmt::Display for OtQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}..{}]", self.offset, self.offset + self.count)
    }
}

/// Violations of the two-party protocol flow.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The circuit does not describe a two-party computation.
    #[error("invalid circuit for 2-party MPC: {0} parties")]
    PartyCountMismatch(usize),
    /// The evaluator asked for a different wire range than the circuit
    /// assigns to its inputs.
    #[error("peer can't OT wires {actual}, expected {expected}")]
    OtQueryMismatch {
        /// The wire range the circuit assigns to the evaluator's inputs.
        expected: OtQuery,
        /// The query the evaluator actually sent.
        actual: OtQuery,
    },
    /// The garbler sent a different number of input labels than its
    /// declared input width.
    #[error("expected {expected} garbler input labels, got {actual}")]
    InputCountMismatch {
        /// The garbler's declared input width.
        expected: usize,
        /// The number of labels received.
        actual: usize,
    },
    /// The evaluator returned a different number of result labels than the
    /// circuit has output wires.
    #[error("expected {expected} result labels, got {actual}")]
    ResultLabelCountMismatch {
        /// The circuit's output width.
        expected: usize,
        /// The number of labels received.
        actual: usize,
    },
    /// A result label matches neither label of its output wire; the
    /// evaluation was corrupted in transit.
    #[error("result label for output wire {0} matches neither wire label")]
    InvalidResultLabel(Wire),
    /// A session transition was attempted out of order.
    #[error("protocol step \"{actual}\" out of order, expected \"{expected}\"")]
    OutOfOrder {
        /// The step the session was in.
        expected: &'static str,
        /// The step that was attempted.
        actual: &'static str,
    },
}

/// A fatal error of a two-party session.
#[derive(Debug, Error)]
pub enum Error {
    /// A message could not be exchanged over the relay.
    #[error("channel: {0}")]
    Channel(#[from] channel::Error),
    /// The circuit could not be loaded or is malformed.
    #[error("circuit: {0}")]
    Circuit(#[from] CircuitError),
    /// Garbling or evaluation of the gate tables failed.
    #[error("garbling: {0}")]
    Garble(#[from] garble::Error),
    /// The oblivious transfer of input labels failed.
    #[error("oblivious transfer: {0}")]
    Ot(#[from] ot::Error),
    /// The peers disagree about the protocol flow.
    #[error("protocol: {0}")]
    Protocol(#[from] ProtocolError),
    /// The circuit program itself signalled a runtime error through the
    /// leading discriminator byte.
    #[error("circuit runtime error {code:#04x} from {path}")]
    CircuitRuntime {
        /// The error code reported by the circuit program.
        code: u8,
        /// The path of the circuit that raised it.
        path: String,
    },
    /// The result bytes start with an unknown discriminator.
    #[error("result has unknown discriminator byte {0:#04x}")]
    BadDiscriminator(u8),
    /// The result byte string is empty.
    #[error("result is empty")]
    EmptyResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GarblerStep {
    SendKey,
    SendGates,
    SendInputs,
    NeedOtQuery,
    SendOtLabels,
    NeedResultLabels,
    SendResult,
    Done,
}

impl GarblerStep {
    fn name(&self) -> &'static str {
        match self {
            GarblerStep::SendKey => "send ephemeral key",
            GarblerStep::SendGates => "send garbled gates",
            GarblerStep::SendInputs => "send inputs",
            GarblerStep::NeedOtQuery => "receive ot query",
            GarblerStep::SendOtLabels => "transfer input labels",
            GarblerStep::NeedResultLabels => "receive result labels",
            GarblerStep::SendResult => "send result",
            GarblerStep::Done => "done",
        }
    }
}

/// The garbler's session state machine. Transitions are pure; all channel
/// I/O happens in [`garbler`].
pub(crate) struct GarblerSession<'a> {
    circuit: &'a Circuit,
    step: GarblerStep,
    key: [u8; 32],
    garbling: Garbling,
    input: BigUint,
    result: Option<BigUint>,
}

impl<'a> GarblerSession<'a> {
    /// Garbles the circuit and prepares the session (G1, local part).
    pub(crate) fn new<R: Rng + CryptoRng>(
        circuit: &'a Circuit,
        input: &BigUint,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let mut key = [0u8; 32];
        rng.fill(&mut key[..]);
        let garbling = garble::garble(circuit, rng, &key)?;
        Ok(Self {
            circuit,
            step: GarblerStep::SendKey,
            key,
            garbling,
            input: input.clone(),
            result: None,
        })
    }

    fn advance(&mut self, from: GarblerStep, to: GarblerStep) -> Result<(), ProtocolError> {
        if self.step != from {
            return Err(ProtocolError::OutOfOrder {
                expected: self.step.name(),
                actual: from.name(),
            });
        }
        self.step = to;
        Ok(())
    }

    /// G1: the ephemeral key to send.
    pub(crate) fn ephemeral_key(&mut self) -> Result<[u8; 32], ProtocolError> {
        self.advance(GarblerStep::SendKey, GarblerStep::SendGates)?;
        Ok(self.key)
    }

    /// G2: the gate table to send.
    pub(crate) fn gates(&mut self) -> Result<&[GarbledGate], ProtocolError> {
        self.advance(GarblerStep::SendGates, GarblerStep::SendInputs)?;
        Ok(&self.garbling.gates)
    }

    /// G3: the labels of the garbler's own input bits.
    pub(crate) fn input_labels(&mut self) -> Result<Vec<Label>, ProtocolError> {
        self.advance(GarblerStep::SendInputs, GarblerStep::NeedOtQuery)?;
        let width = self.circuit.inputs[0].bits;
        Ok((0..width)
            .map(|i| self.garbling.wires[i].select(self.garbling.delta, self.input.bit(i as u64)))
            .collect())
    }

    /// G4: validates the evaluator's OT query against the circuit widths.
    pub(crate) fn on_ot_query(&mut self, query: OtQuery) -> Result<(), ProtocolError> {
        self.advance(GarblerStep::NeedOtQuery, GarblerStep::SendOtLabels)?;
        let expected = OtQuery {
            offset: self.circuit.inputs[0].bits,
            count: self.circuit.inputs[1].bits,
        };
        if query != expected {
            return Err(ProtocolError::OtQueryMismatch {
                expected,
                actual: query,
            });
        }
        Ok(())
    }

    /// G5: the label pairs of the evaluator's input wires, to be handed to
    /// the oblivious transfer sender.
    pub(crate) fn ot_pairs(&mut self) -> Result<Vec<(Label, Label)>, ProtocolError> {
        self.advance(GarblerStep::SendOtLabels, GarblerStep::NeedResultLabels)?;
        let offset = self.circuit.inputs[0].bits;
        let count = self.circuit.inputs[1].bits;
        Ok(self.garbling.wires[offset..offset + count]
            .iter()
            .map(|zero| (*zero, *zero ^ self.garbling.delta))
            .collect())
    }

    /// G6/G7: decodes the evaluator's result labels into the output
    /// integer.
    pub(crate) fn on_result_labels(&mut self, labels: Vec<Label>) -> Result<(), ProtocolError> {
        self.advance(GarblerStep::NeedResultLabels, GarblerStep::SendResult)?;
        let out_bits = self.circuit.output_bits();
        if labels.len() != out_bits {
            return Err(ProtocolError::ResultLabelCountMismatch {
                expected: out_bits,
                actual: labels.len(),
            });
        }
        let first_out = self.circuit.num_wires - out_bits;
        let mut result = BigUint::default();
        for (i, label) in labels.into_iter().enumerate() {
            let wire = first_out + i;
            let bit = self.garbling.wires[wire]
                .bit_from(self.garbling.delta, label)
                .ok_or(ProtocolError::InvalidResultLabel(wire as Wire))?;
            result.set_bit(i as u64, bit);
        }
        self.result = Some(result);
        Ok(())
    }

    /// G7: the plaintext result integer to send back.
    pub(crate) fn result(&mut self) -> Result<BigUint, ProtocolError> {
        self.advance(GarblerStep::SendResult, GarblerStep::Done)?;
        self.result.take().ok_or(ProtocolError::OutOfOrder {
            expected: GarblerStep::SendResult.name(),
            actual: GarblerStep::Done.name(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvaluatorStep {
    NeedKey,
    NeedGates,
    NeedInputs,
    NeedOt,
    Eval,
    NeedResult,
    Done,
}

impl EvaluatorStep {
    fn name(&self) -> &'static str {
        match self {
            EvaluatorStep::NeedKey => "receive ephemeral key",
            EvaluatorStep::NeedGates => "receive garbled gates",
            EvaluatorStep::NeedInputs => "receive inputs",
            EvaluatorStep::NeedOt => "transfer input labels",
            EvaluatorStep::Eval => "evaluate gates",
            EvaluatorStep::NeedResult => "receive result",
            EvaluatorStep::Done => "done",
        }
    }
}

/// The evaluator's session state machine. Transitions are pure; all
/// channel I/O happens in [`evaluator`].
pub(crate) struct EvaluatorSession<'a> {
    circuit: &'a Circuit,
    step: EvaluatorStep,
    key: [u8; 32],
    gates: Vec<GarbledGate>,
    wires: Vec<Label>,
    input: BigUint,
}

impl<'a> EvaluatorSession<'a> {
    /// Prepares the session with the evaluator's own input bits.
    pub(crate) fn new(circuit: &'a Circuit, input: &BigUint) -> Self {
        Self {
            circuit,
            step: EvaluatorStep::NeedKey,
            key: [0; 32],
            gates: Vec::new(),
            wires: vec![Label::ZERO; circuit.num_wires],
            input: input.clone(),
        }
    }

    fn advance(&mut self, from: EvaluatorStep, to: EvaluatorStep) -> Result<(), ProtocolError> {
        if self.step != from {
            return Err(ProtocolError::OutOfOrder {
                expected: self.step.name(),
                actual: from.name(),
            });
        }
        self.step = to;
        Ok(())
    }

    /// E1: accepts the ephemeral key.
    pub(crate) fn on_key(&mut self, key: [u8; 32]) -> Result<(), ProtocolError> {
        self.advance(EvaluatorStep::NeedKey, EvaluatorStep::NeedGates)?;
        self.key = key;
        Ok(())
    }

    /// E2: accepts the gate table after checking its shape against the
    /// circuit.
    pub(crate) fn on_gates(&mut self, gates: Vec<GarbledGate>) -> Result<(), Error> {
        self.advance(EvaluatorStep::NeedGates, EvaluatorStep::NeedInputs)?;
        garble::check_table(self.circuit, &gates)?;
        self.gates = gates;
        Ok(())
    }

    /// E3: places the garbler's input labels into the leading wire slots;
    /// the remaining slots stay padded with the zero label.
    pub(crate) fn on_inputs(&mut self, labels: Vec<Label>) -> Result<(), ProtocolError> {
        self.advance(EvaluatorStep::NeedInputs, EvaluatorStep::NeedOt)?;
        let expected = self.circuit.inputs[0].bits;
        if labels.len() != expected {
            return Err(ProtocolError::InputCountMismatch {
                expected,
                actual: labels.len(),
            });
        }
        self.wires[..expected].copy_from_slice(&labels);
        Ok(())
    }

    /// E4/E5: the OT query for the evaluator's input wires and the
    /// selection bits derived from its input.
    pub(crate) fn ot_request(&self) -> Result<(OtQuery, Vec<bool>), ProtocolError> {
        if self.step != EvaluatorStep::NeedOt {
            return Err(ProtocolError::OutOfOrder {
                expected: self.step.name(),
                actual: EvaluatorStep::NeedOt.name(),
            });
        }
        let query = OtQuery {
            offset: self.circuit.inputs[0].bits,
            count: self.circuit.inputs[1].bits,
        };
        let choices = (0..query.count).map(|i| self.input.bit(i as u64)).collect();
        Ok((query, choices))
    }

    /// E5: places the labels received through OT into this party's input
    /// wire slots.
    pub(crate) fn on_ot_labels(&mut self, labels: Vec<Label>) -> Result<(), ProtocolError> {
        self.advance(EvaluatorStep::NeedOt, EvaluatorStep::Eval)?;
        let offset = self.circuit.inputs[0].bits;
        let count = self.circuit.inputs[1].bits;
        if labels.len() != count {
            return Err(ProtocolError::InputCountMismatch {
                expected: count,
                actual: labels.len(),
            });
        }
        self.wires[offset..offset + count].copy_from_slice(&labels);
        Ok(())
    }

    /// Evaluates all gates and returns the trailing output-wire labels
    /// (E6).
    pub(crate) fn evaluate(&mut self) -> Result<Vec<Label>, Error> {
        self.advance(EvaluatorStep::Eval, EvaluatorStep::NeedResult)?;
        garble::evaluate(self.circuit, &self.key, &mut self.wires, &self.gates)?;
        let first_out = self.circuit.num_wires - self.circuit.output_bits();
        Ok(self.wires[first_out..].to_vec())
    }

    /// E7: accepts the decoded result integer.
    pub(crate) fn on_result(&mut self, result: BigUint) -> Result<BigUint, ProtocolError> {
        self.advance(EvaluatorStep::NeedResult, EvaluatorStep::Done)?;
        Ok(result)
    }
}

async fn ot_exchange<T>(
    fut: impl std::future::Future<Output = Result<T, ot::Error>>,
) -> Result<T, Error> {
    match tokio::time::timeout(EXCHANGE_TIMEOUT, fut).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::Channel(channel::Error::Timeout {
            topic: "oblivious transfer".into(),
        })),
    }
}

/// Runs the garbler's side of the protocol (steps G1..G7) over an already
/// opened connection and returns the output fields.
pub async fn garbler<R: Relay, RNG: Rng + CryptoRng>(
    conn: &Connection<R>,
    circuit: &Circuit,
    input: &BigUint,
    rng: &mut RNG,
) -> Result<Vec<BigUint>, Error> {
    if circuit.inputs.len() != 2 {
        return Err(ProtocolError::PartyCountMismatch(circuit.inputs.len()).into());
    }
    debug!("garbling circuit");
    let mut session = GarblerSession::new(circuit, input, rng)?;

    debug!("sending garbled circuit");
    conn.send(TOPIC_KEY, &session.ephemeral_key()?).await?;
    let gates = session.gates()?;
    conn.send(TOPIC_GATES, &gates).await?;
    conn.send(TOPIC_INPUTS, &session.input_labels()?).await?;

    let query: OtQuery = conn.recv(TOPIC_OT_QUERY).await?;
    session.on_ot_query(query)?;
    debug!(offset = query.offset, count = query.count, "transferring input labels");
    let pairs = session.ot_pairs()?;
    ot_exchange(ot::send(conn, &pairs, rng)).await?;

    let labels: Vec<Label> = conn.recv(TOPIC_RESULT_LABELS).await?;
    session.on_result_labels(labels)?;
    let result = session.result()?;
    conn.send(TOPIC_RESULT, &result.to_bytes_be()).await?;
    debug!("session complete");
    Ok(circuit.split_outputs(&result))
}

/// Runs the evaluator's side of the protocol (steps E1..E7) over an
/// already opened connection and returns the output fields.
pub async fn evaluator<R: Relay, RNG: Rng + CryptoRng>(
    conn: &Connection<R>,
    circuit: &Circuit,
    input: &BigUint,
    rng: &mut RNG,
) -> Result<Vec<BigUint>, Error> {
    if circuit.inputs.len() != 2 {
        return Err(ProtocolError::PartyCountMismatch(circuit.inputs.len()).into());
    }
    let mut session = EvaluatorSession::new(circuit, input);

    debug!("waiting for garbled circuit");
    let key: [u8; 32] = conn.recv(TOPIC_KEY).await?;
    session.on_key(key)?;
    let gates: Vec<GarbledGate> = conn.recv(TOPIC_GATES).await?;
    session.on_gates(gates)?;
    let inputs: Vec<Label> = conn.recv(TOPIC_INPUTS).await?;
    session.on_inputs(inputs)?;

    let (query, choices) = session.ot_request()?;
    debug!(offset = query.offset, count = query.count, "querying our input labels");
    conn.send(TOPIC_OT_QUERY, &query).await?;
    let labels = ot_exchange(ot::receive(conn, &choices, rng)).await?;
    session.on_ot_labels(labels)?;

    debug!("evaluating circuit");
    let result_labels = session.evaluate()?;
    conn.send(TOPIC_RESULT_LABELS, &result_labels).await?;

    let result_bytes: Vec<u8> = conn.recv(TOPIC_RESULT).await?;
    let result = session.on_result(BigUint::from_bytes_be(&result_bytes))?;
    debug!("session complete");
    Ok(circuit.split_outputs(&result))
}

/// Splits the concatenated result bytes at the leading discriminator:
/// `0x01` marks a normal result, `0x00` an in-circuit runtime error whose
/// code follows in the next byte.
fn decode_result(bytes: &[u8], path: &str) -> Result<Vec<u8>, Error> {
    match bytes {
        [0x01, payload @ ..] => Ok(payload.to_vec()),
        [0x00, rest @ ..] => Err(Error::CircuitRuntime {
            code: rest.first().copied().unwrap_or(0),
            path: path.to_string(),
        }),
        [discriminator, ..] => Err(Error::BadDiscriminator(*discriminator)),
        [] => Err(Error::EmptyResult),
    }
}

async fn exchange_input_sizes<R: Relay>(
    conn: &Connection<R>,
    args: &[String],
) -> Result<(Vec<usize>, Vec<usize>), Error> {
    let my_sizes = circuit::input_sizes(args)?;
    conn.send(TOPIC_INPUT_SIZES, &my_sizes).await?;
    let peer_sizes: Vec<usize> = conn.recv(TOPIC_INPUT_SIZES).await?;
    debug!(?my_sizes, ?peer_sizes, "exchanged input sizes");
    Ok((my_sizes, peer_sizes))
}

async fn garbler_session<R: Relay, S: CircuitSource + ?Sized, RNG: Rng + CryptoRng>(
    conn: &Connection<R>,
    source: &S,
    args: &[String],
    rng: &mut RNG,
) -> Result<Vec<u8>, Error> {
    let (my_sizes, peer_sizes) = exchange_input_sizes(conn, args).await?;
    let circuit = source.load(&[my_sizes.clone(), peer_sizes])?;
    if circuit.inputs.len() != 2 {
        return Err(ProtocolError::PartyCountMismatch(circuit.inputs.len()).into());
    }
    let input = circuit::pack_inputs(args, &my_sizes)?;
    let fields = garbler(conn, &circuit, &input, rng).await?;
    decode_result(&circuit.outputs_to_bytes(&fields), &source.path())
}

async fn evaluator_session<R: Relay, S: CircuitSource + ?Sized, RNG: Rng + CryptoRng>(
    conn: &Connection<R>,
    source: &S,
    args: &[String],
    rng: &mut RNG,
) -> Result<Vec<u8>, Error> {
    let (my_sizes, peer_sizes) = exchange_input_sizes(conn, args).await?;
    let circuit = source.load(&[peer_sizes, my_sizes.clone()])?;
    if circuit.inputs.len() != 2 {
        return Err(ProtocolError::PartyCountMismatch(circuit.inputs.len()).into());
    }
    let input = circuit::pack_inputs(args, &my_sizes)?;
    let fields = evaluator(conn, &circuit, &input, rng).await?;
    decode_result(&circuit.outputs_to_bytes(&fields), &source.path())
}

async fn close_connection<R: Relay>(conn: Connection<R>) {
    if let Err(e) = conn.close().await {
        warn!("closing relay connection failed: {e}");
    }
}

/// Runs a complete garbler session: opens a connection (creating a relay
/// session unless one is supplied), exchanges input sizes, loads the
/// circuit, runs G1..G7 and returns the decoded result bytes. The
/// connection is closed on every exit path.
pub async fn run_garbler<R: Relay, S: CircuitSource + ?Sized, RNG: Rng + CryptoRng>(
    relay: R,
    session_id: Option<String>,
    source: &S,
    args: &[String],
    rng: &mut RNG,
) -> Result<Vec<u8>, Error> {
    let conn = Connection::open(relay, Party::Garbler, session_id).await?;
    let result = garbler_session(&conn, source, args, rng).await;
    close_connection(conn).await;
    result
}

/// Runs a complete evaluator session, mirroring [`run_garbler`].
pub async fn run_evaluator<R: Relay, S: CircuitSource + ?Sized, RNG: Rng + CryptoRng>(
    relay: R,
    session_id: Option<String>,
    source: &S,
    args: &[String],
    rng: &mut RNG,
) -> Result<Vec<u8>, Error> {
    let conn = Connection::open(relay, Party::Evaluator, session_id).await?;
    let result = evaluator_session(&conn, source, args, rng).await;
    close_connection(conn).await;
    result
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    #[test]
    fn decode_result_discriminators() {
        assert_eq!(decode_result(&[0x01, 0xab], "c").unwrap(), vec![0xab]);
        assert!(matches!(
            decode_result(&[0x00, 0x2a], "c"),
            Err(Error::CircuitRuntime { code: 0x2a, .. })
        ));
        assert!(matches!(
            decode_result(&[0x7f], "c"),
            Err(Error::BadDiscriminator(0x7f))
        ));
        assert!(matches!(decode_result(&[], "c"), Err(Error::EmptyResult)));
    }

    #[test]
    fn garbler_session_enforces_step_order() {
        let circuit = crate::circuit::Circuit {
            num_wires: 3,
            gates: vec![crate::circuit::Gate {
                op: crate::circuit::Op::Xor,
                a: 0,
                b: Some(1),
                out: 2,
            }],
            inputs: vec![
                crate::circuit::InputGroup {
                    name: "garbler".into(),
                    bits: 1,
                },
                crate::circuit::InputGroup {
                    name: "evaluator".into(),
                    bits: 1,
                },
            ],
            outputs: vec![crate::circuit::OutputField {
                name: "out".into(),
                bits: 1,
            }],
        };
        let mut rng = ChaCha20Rng::seed_from_u64(31);
        let mut session = GarblerSession::new(&circuit, &BigUint::default(), &mut rng).unwrap();
        // G2 before G1 is rejected
        assert!(matches!(
            session.gates(),
            Err(ProtocolError::OutOfOrder { .. })
        ));
        session.ephemeral_key().unwrap();
        session.gates().unwrap();
    }
}
