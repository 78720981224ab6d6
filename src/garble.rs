//! The cryptographic core: turning a circuit into encrypted gate tables and
//! evaluating those tables one row per gate.
//!
//! XOR gates are free: the zero-labels of the input wires XOR to the
//! zero-label of the output wire, so no rows are transmitted. INV gates are
//! free as well (the output zero-label is the input one-label and the
//! evaluator copies the label unchanged). AND and OR gates are garbled with
//! row reduction: the row selected by permutation bits (0, 0) encrypts to
//! the canonical zero and is omitted, leaving three encrypted rows per gate.

use aes::{
    cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit},
    Aes128,
};
use rand::{CryptoRng, Rng};
use thiserror::Error;

use crate::{
    circuit::{Circuit, CircuitError, Gate, Op},
    data_types::{Delta, GarbledGate, Label, Wire},
};

/// Errors raised while garbling or evaluating encrypted gates.
#[derive(Debug, Error)]
pub enum Error {
    /// The evaluator received a table whose gate count does not match the
    /// circuit.
    #[error("expected {expected} garbled gates, got {actual}")]
    GateCountMismatch {
        /// Gates in the circuit.
        expected: usize,
        /// Gates in the received table.
        actual: usize,
    },
    /// A gate carries the wrong number of encrypted rows for its kind.
    #[error("gate {gate} carries {actual} rows, expected {expected}")]
    RowCountMismatch {
        /// The offending gate.
        gate: usize,
        /// Rows required by the gate kind.
        expected: usize,
        /// Rows received.
        actual: usize,
    },
    /// The integrity tag of a decrypted row did not verify; the gate table
    /// or the ephemeral key was corrupted in transit.
    #[error("gate {0} failed its integrity check")]
    CorruptGate(usize),
    /// The circuit itself is malformed.
    #[error(transparent)]
    Circuit(#[from] CircuitError),
}

/// A garbled circuit, held by the garbler.
///
/// Created once at the start of a session and immutable thereafter. Only
/// `gates` ever leaves the garbler's process; `wires` (the per-wire
/// zero-labels) and `delta` stay private.
#[derive(Debug)]
pub(crate) struct Garbling {
    /// The encrypted rows of every gate, in circuit order.
    pub(crate) gates: Vec<GarbledGate>,
    /// The zero-label of every wire.
    pub(crate) wires: Vec<Label>,
    /// The global free-XOR offset.
    pub(crate) delta: Delta,
}

/// The AES instance acting as the random oracle for gate rows, keyed from
/// the 32-byte ephemeral session key.
pub(crate) fn row_cipher(key: &[u8; 32]) -> Aes128 {
    let digest = blake3::hash(key);
    Aes128::new(GenericArray::from_slice(&digest.as_bytes()[..16]))
}

/// The linear map σ used to break the symmetry between the two input
/// labels before hashing.
fn sigma(x: u128) -> u128 {
    let xl = x >> 64;
    let xr = x << 64;
    (xl ^ (xl << 64)) ^ xr
}

/// Hash of a gate row, `π(x) ^ x` over the σ-combined input labels and a
/// tweak binding gate index, row index and output block.
fn gate_hash(cipher: &Aes128, a: Label, b: Label, gate: usize, row: u8, blk: u8) -> Label {
    let base = sigma(a.0) ^ sigma(sigma(b.0));
    let tweak = ((4 * gate as u128 + row as u128) << 8) | blk as u128;
    let x = base ^ tweak;
    let mut block = GenericArray::clone_from_slice(&x.to_le_bytes());
    cipher.encrypt_block(&mut block);
    let encrypted: [u8; 16] = block.into();
    Label(u128::from_le_bytes(encrypted) ^ x)
}

fn second_input(gate: &Gate, g: usize) -> Result<Wire, Error> {
    gate.b.ok_or(Error::Circuit(CircuitError::InvalidWire {
        gate: g,
        wire: gate.a,
    }))
}

/// The number of encrypted rows a gate of the given kind carries.
pub(crate) fn rows_for_op(op: Op) -> usize {
    match op {
        Op::Xor | Op::Inv => 0,
        Op::And | Op::Or => 3,
    }
}

/// Checks that a received gate table matches the circuit's shape.
pub(crate) fn check_table(circuit: &Circuit, gates: &[GarbledGate]) -> Result<(), Error> {
    if gates.len() != circuit.gates.len() {
        return Err(Error::GateCountMismatch {
            expected: circuit.gates.len(),
            actual: gates.len(),
        });
    }
    for (g, (gate, garbled)) in circuit.gates.iter().zip(gates).enumerate() {
        let expected = rows_for_op(gate.op);
        if garbled.0.len() != expected {
            return Err(Error::RowCountMismatch {
                gate: g,
                expected,
                actual: garbled.0.len(),
            });
        }
    }
    Ok(())
}

/// Garbles the circuit under the given ephemeral key.
///
/// Draws the global offset and all input-wire zero-labels from `rng`, then
/// visits the gates in topological order: XOR and INV outputs are derived
/// for free, AND and OR gates get a row-reduced encrypted table sorted by
/// the permutation-bit index of their input labels.
pub(crate) fn garble<R: Rng + CryptoRng>(
    circuit: &Circuit,
    rng: &mut R,
    key: &[u8; 32],
) -> Result<Garbling, Error> {
    circuit.validate()?;
    let order = circuit.assign_levels()?;
    let cipher = row_cipher(key);
    let delta = Delta::random(rng);

    let mut wires = vec![Label::ZERO; circuit.num_wires];
    for wire in wires.iter_mut().take(circuit.input_bits()) {
        *wire = rng.gen();
    }

    let mut gates = vec![GarbledGate(Vec::new()); circuit.gates.len()];
    for g in order {
        let gate = circuit.gates[g];
        let a0 = wires[gate.a as usize];
        match gate.op {
            Op::Xor => {
                let b0 = wires[second_input(&gate, g)? as usize];
                wires[gate.out as usize] = a0 ^ b0;
            }
            Op::Inv => {
                wires[gate.out as usize] = a0 ^ delta;
            }
            Op::And | Op::Or => {
                let b0 = wires[second_input(&gate, g)? as usize];
                let alpha = a0.pmt();
                let beta = b0.pmt();

                // The row at permutation index 0 is the reduced row: pick
                // the output zero-label so that its ciphertext is the
                // canonical zero and the row need not be sent.
                let la = a0.select(delta, alpha);
                let lb = b0.select(delta, beta);
                let z = gate.op.eval(alpha, beta);
                let out0 = gate_hash(&cipher, la, lb, g, 0, 0).select(delta, z);
                wires[gate.out as usize] = out0;

                let mut rows = Vec::with_capacity(3);
                for idx in 1u8..4 {
                    let x = alpha ^ (idx >> 1 == 1);
                    let y = beta ^ (idx & 1 == 1);
                    let la = a0.select(delta, x);
                    let lb = b0.select(delta, y);
                    let lz = out0.select(delta, gate.op.eval(x, y));
                    rows.push([
                        gate_hash(&cipher, la, lb, g, idx, 0) ^ lz,
                        gate_hash(&cipher, la, lb, g, idx, 1),
                    ]);
                }
                gates[g] = GarbledGate(rows);
            }
        }
    }

    Ok(Garbling {
        gates,
        wires,
        delta,
    })
}

/// Evaluates the garbled gates, filling every non-input wire slot.
///
/// `wires` must hold the active labels of all input wires; gates are
/// visited in topological order and each AND/OR gate decrypts exactly the
/// row selected by the permutation bits of its input labels. The selected
/// row's integrity tag is verified before the output label is accepted.
pub(crate) fn evaluate(
    circuit: &Circuit,
    key: &[u8; 32],
    wires: &mut [Label],
    gates: &[GarbledGate],
) -> Result<(), Error> {
    circuit.validate()?;
    check_table(circuit, gates)?;
    let order = circuit.assign_levels()?;
    let cipher = row_cipher(key);
    for g in order {
        let gate = circuit.gates[g];
        let la = wires[gate.a as usize];
        let out = match gate.op {
            Op::Xor => la ^ wires[second_input(&gate, g)? as usize],
            Op::Inv => la,
            Op::And | Op::Or => {
                let lb = wires[second_input(&gate, g)? as usize];
                let idx = ((la.pmt() as u8) << 1) | lb.pmt() as u8;
                if idx == 0 {
                    gate_hash(&cipher, la, lb, g, 0, 0)
                } else {
                    let row = gates[g].0[idx as usize - 1];
                    if row[1] != gate_hash(&cipher, la, lb, g, idx, 1) {
                        return Err(Error::CorruptGate(g));
                    }
                    row[0] ^ gate_hash(&cipher, la, lb, g, idx, 0)
                }
            }
        };
        wires[gate.out as usize] = out;
    }
    Ok(())
}
