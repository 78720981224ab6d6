//! The boolean circuit representation consumed by the garbling and
//! evaluation engines, together with circuit loading and the parsing of
//! party inputs and outputs.
//!
//! A circuit is an ordered collection of gates over wires `0..num_wires`.
//! The first wires belong to the input groups of the two parties, the
//! trailing wires carry the outputs, and every wire in between is produced
//! by exactly one gate. Gates are scheduled level by level so that a gate
//! only ever reads wires produced at earlier levels.

use std::{fs, path::PathBuf};

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data_types::Wire;

/// Errors raised while loading, validating or interpreting a circuit.
#[derive(Debug, Error)]
pub enum CircuitError {
    /// The circuit file could not be read.
    #[error("could not read circuit file: {0}")]
    Io(#[from] std::io::Error),
    /// The circuit file could not be decoded.
    #[error("could not decode circuit file: {0}")]
    Decode(String),
    /// The file extension matches neither `.circ` nor `.mpcl`.
    #[error("unknown circuit file type: {path}")]
    UnknownFileType {
        /// The offending path.
        path: String,
    },
    /// An `.mpcl` source file requires the external compiler toolchain.
    #[error("{path} must be compiled to a .circ file by the mpcl toolchain")]
    CompilerUnavailable {
        /// The offending path.
        path: String,
    },
    /// A gate references a wire outside `0..num_wires`.
    #[error("gate {gate} references wire {wire} outside the circuit")]
    InvalidWire {
        /// The index of the offending gate.
        gate: usize,
        /// The out-of-range wire.
        wire: Wire,
    },
    /// A gate writes an input wire or a wire already written by another gate.
    #[error("wire {wire} is written more than once")]
    DuplicateProducer {
        /// The wire with multiple producers.
        wire: Wire,
    },
    /// A non-input wire is read but produced by no gate.
    #[error("wire {wire} is read but never written")]
    MissingProducer {
        /// The wire without a producer.
        wire: Wire,
    },
    /// The gate count does not cover all non-input wires.
    #[error("expected {expected} gates to produce all non-input wires, got {actual}")]
    GateCountMismatch {
        /// Non-input wires that must be produced.
        expected: usize,
        /// Gates present in the circuit.
        actual: usize,
    },
    /// The gates contain a dependency cycle.
    #[error("gate {gate} is part of a dependency cycle")]
    Cycle {
        /// A gate on the cycle.
        gate: usize,
    },
    /// The circuit declares no output bits.
    #[error("circuit declares no outputs")]
    EmptyOutputs,
    /// The declared input or output widths do not fit the wire count.
    #[error("input and output widths do not fit into {num_wires} wires")]
    WidthOverflow {
        /// The circuit's wire count.
        num_wires: usize,
    },
    /// The circuit's input group widths do not match the announced sizes.
    #[error("circuit expects input widths {expected:?}, but sizes sum to {actual:?}")]
    InputWidthMismatch {
        /// Widths declared by the circuit's input groups.
        expected: Vec<usize>,
        /// Widths derived from the exchanged argument sizes.
        actual: Vec<usize>,
    },
    /// An input argument could not be parsed as an integer.
    #[error("invalid input argument: {arg}")]
    BadArgument {
        /// The argument that failed to parse.
        arg: String,
    },
    /// A decimal input argument exceeds its announced bit width.
    #[error("input argument {arg} does not fit into {bits} bits")]
    ArgumentTooWide {
        /// The offending argument.
        arg: String,
        /// Its announced width.
        bits: usize,
    },
}

/// The logical operation computed by a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Op {
    /// Exclusive or of the two input wires; free under free-XOR.
    Xor,
    /// Conjunction of the two input wires.
    And,
    /// Disjunction of the two input wires.
    Or,
    /// Negation of the single input wire; free under free-XOR.
    Inv,
}

impl Op {
    /// Computes the gate's plaintext truth table; `y` is ignored for INV.
    pub fn eval(&self, x: bool, y: bool) -> bool {
        match self {
            Op::Xor => x ^ y,
            Op::And => x & y,
            Op::Or => x | y,
            Op::Inv => !x,
        }
    }
}

/// A single gate: an operation, one or two input wires and an output wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gate {
    /// The operation computed by the gate.
    pub op: Op,
    /// The first input wire.
    pub a: Wire,
    /// The second input wire; `None` for INV gates.
    pub b: Option<Wire>,
    /// The wire the gate writes.
    pub out: Wire,
}

/// The input wires contributed by one party, as a declared bit width.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputGroup {
    /// A diagnostic name for the group (e.g. the party role).
    pub name: String,
    /// The number of input bits contributed by the party.
    pub bits: usize,
}

/// One typed field of the circuit output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputField {
    /// A diagnostic name for the field.
    pub name: String,
    /// The field's width in bits.
    pub bits: usize,
}

/// A boolean circuit over two parties' inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Circuit {
    /// The total number of wires, inputs and outputs included.
    pub num_wires: usize,
    /// The gates of the circuit, each producing exactly one wire.
    pub gates: Vec<Gate>,
    /// The input groups; the first belongs to the garbler, the second to
    /// the evaluator.
    pub inputs: Vec<InputGroup>,
    /// The typed output fields, mapped onto the trailing wires.
    pub outputs: Vec<OutputField>,
}

impl Circuit {
    /// The summed width of all input groups. Input wires occupy
    /// `0..input_bits()`.
    pub fn input_bits(&self) -> usize {
        self.inputs.iter().map(|g| g.bits).sum()
    }

    /// The summed width of all output fields. Output wires occupy
    /// `num_wires - output_bits()..num_wires`.
    pub fn output_bits(&self) -> usize {
        self.outputs.iter().map(|o| o.bits).sum()
    }

    /// The declared widths of the input groups.
    pub fn input_widths(&self) -> Vec<usize> {
        self.inputs.iter().map(|g| g.bits).collect()
    }

    /// Checks the structural invariants of the wire layout.
    ///
    /// Inputs occupy the leading wires, every other wire is produced by
    /// exactly one gate, all referenced wires are in range and at least
    /// one output bit is declared.
    pub fn validate(&self) -> Result<(), CircuitError> {
        let inputs = self.input_bits();
        if self.outputs.is_empty() || self.output_bits() == 0 {
            return Err(CircuitError::EmptyOutputs);
        }
        if inputs + self.output_bits() > self.num_wires {
            return Err(CircuitError::WidthOverflow {
                num_wires: self.num_wires,
            });
        }
        let expected = self.num_wires - inputs;
        if self.gates.len() != expected {
            return Err(CircuitError::GateCountMismatch {
                expected,
                actual: self.gates.len(),
            });
        }
        let mut produced = vec![false; self.num_wires];
        for (g, gate) in self.gates.iter().enumerate() {
            for wire in [Some(gate.a), gate.b, Some(gate.out)].into_iter().flatten() {
                if wire as usize >= self.num_wires {
                    return Err(CircuitError::InvalidWire { gate: g, wire });
                }
            }
            if matches!(gate.op, Op::Inv) != gate.b.is_none() {
                return Err(CircuitError::InvalidWire {
                    gate: g,
                    wire: gate.b.unwrap_or(gate.a),
                });
            }
            let out = gate.out as usize;
            if out < inputs || produced[out] {
                return Err(CircuitError::DuplicateProducer { wire: gate.out });
            }
            produced[out] = true;
        }
        Ok(())
    }

    /// Assigns each gate a topological level such that gates at level `k`
    /// only read wires produced at levels `< k` (input wires sit at level
    /// 0), and returns the gate indices ordered by level.
    ///
    /// Both the garbler and the evaluator visit gates in this order, so
    /// every non-input wire is written before it is read.
    pub fn assign_levels(&self) -> Result<Vec<usize>, CircuitError> {
        let inputs = self.input_bits();
        let mut producer = vec![usize::MAX; self.num_wires];
        for (g, gate) in self.gates.iter().enumerate() {
            producer[gate.out as usize] = g;
        }
        let deps = |g: usize| {
            let gate = self.gates[g];
            [Some(gate.a), gate.b]
                .into_iter()
                .flatten()
                .filter(move |&w| w as usize >= inputs)
        };

        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            InProgress,
            Done,
        }
        enum Visit {
            Enter(usize),
            Exit(usize),
        }
        let mut state = vec![State::Unvisited; self.gates.len()];
        let mut level = vec![0u32; self.gates.len()];
        let mut stack = Vec::new();
        for start in 0..self.gates.len() {
            if state[start] != State::Unvisited {
                continue;
            }
            stack.push(Visit::Enter(start));
            while let Some(visit) = stack.pop() {
                match visit {
                    Visit::Enter(g) => {
                        match state[g] {
                            State::Done => continue,
                            State::InProgress => return Err(CircuitError::Cycle { gate: g }),
                            State::Unvisited => {}
                        }
                        state[g] = State::InProgress;
                        stack.push(Visit::Exit(g));
                        for wire in deps(g) {
                            let dep = producer[wire as usize];
                            if dep == usize::MAX {
                                return Err(CircuitError::MissingProducer { wire });
                            }
                            if state[dep] != State::Done {
                                stack.push(Visit::Enter(dep));
                            }
                        }
                    }
                    Visit::Exit(g) => {
                        let max_dep = deps(g)
                            .map(|wire| level[producer[wire as usize]] + 1)
                            .max()
                            .unwrap_or(0);
                        level[g] = max_dep;
                        state[g] = State::Done;
                    }
                }
            }
        }

        let mut order: Vec<usize> = (0..self.gates.len()).collect();
        order.sort_by_key(|&g| (level[g], g));
        Ok(order)
    }

    /// Splits the output integer into the declared output fields, lowest
    /// bits first.
    pub fn split_outputs(&self, result: &BigUint) -> Vec<BigUint> {
        let mut fields = Vec::with_capacity(self.outputs.len());
        let mut offset = 0usize;
        for out in &self.outputs {
            let mask = (BigUint::from(1u8) << out.bits) - 1u8;
            fields.push((result >> offset) & &mask);
            offset += out.bits;
        }
        fields
    }

    /// Encodes the output fields as big-endian bytes of their declared
    /// widths, concatenated in field order.
    pub fn outputs_to_bytes(&self, fields: &[BigUint]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (out, field) in self.outputs.iter().zip(fields) {
            let width = (out.bits + 7) / 8;
            let raw = field.to_bytes_be();
            bytes.extend(std::iter::repeat(0u8).take(width.saturating_sub(raw.len())));
            bytes.extend_from_slice(&raw[raw.len().saturating_sub(width)..]);
        }
        bytes
    }
}

/// A source the two-party drivers can load their circuit from.
///
/// The `input_sizes` are the per-argument bit widths both parties announced
/// during the input-size exchange (garbler first). A source backed by the
/// external compiler would specialize the circuit for them; a precompiled
/// source checks that its widths agree.
pub trait CircuitSource {
    /// Loads and validates the circuit for the announced input sizes.
    fn load(&self, input_sizes: &[Vec<usize>; 2]) -> Result<Circuit, CircuitError>;

    /// A diagnostic path or name for error messages.
    fn path(&self) -> String;
}

/// A circuit stored in a precompiled `.circ` file.
#[derive(Debug, Clone)]
pub struct CircuitFile {
    path: PathBuf,
}

impl CircuitFile {
    /// Creates a source for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CircuitSource for CircuitFile {
    fn load(&self, input_sizes: &[Vec<usize>; 2]) -> Result<Circuit, CircuitError> {
        let path = self.path();
        match self.path.extension().and_then(|e| e.to_str()) {
            Some("circ") => {
                let bytes = fs::read(&self.path)?;
                let circuit: Circuit = bincode::deserialize(&bytes)
                    .map_err(|e| CircuitError::Decode(format!("{e}")))?;
                circuit.validate()?;
                check_input_sizes(&circuit, input_sizes)?;
                Ok(circuit)
            }
            Some("mpcl") => Err(CircuitError::CompilerUnavailable { path }),
            _ => Err(CircuitError::UnknownFileType { path }),
        }
    }

    fn path(&self) -> String {
        self.path.display().to_string()
    }
}

/// An already constructed circuit, mostly useful in tests and demos.
impl CircuitSource for Circuit {
    fn load(&self, input_sizes: &[Vec<usize>; 2]) -> Result<Circuit, CircuitError> {
        self.validate()?;
        check_input_sizes(self, input_sizes)?;
        Ok(self.clone())
    }

    fn path(&self) -> String {
        "<in-memory circuit>".into()
    }
}

fn check_input_sizes(
    circuit: &Circuit,
    input_sizes: &[Vec<usize>; 2],
) -> Result<(), CircuitError> {
    let actual: Vec<usize> = input_sizes.iter().map(|s| s.iter().sum()).collect();
    let expected = circuit.input_widths();
    if expected != actual {
        return Err(CircuitError::InputWidthMismatch { expected, actual });
    }
    Ok(())
}

/// Parses a single input argument: `0x`-prefixed hexadecimal or decimal.
pub fn parse_arg(arg: &str) -> Result<BigUint, CircuitError> {
    let bad = || CircuitError::BadArgument {
        arg: arg.to_string(),
    };
    if let Some(digits) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        BigUint::parse_bytes(digits.as_bytes(), 16).ok_or_else(bad)
    } else {
        BigUint::parse_bytes(arg.as_bytes(), 10).ok_or_else(bad)
    }
}

/// The bit widths of the given input arguments.
///
/// Hexadecimal arguments contribute four bits per digit (preserving leading
/// zeros), decimal arguments the bit length of their value. Both parties
/// exchange these sizes before the session so that the circuit can be
/// specialized for them.
pub fn input_sizes(args: &[String]) -> Result<Vec<usize>, CircuitError> {
    args.iter()
        .map(|arg| {
            if let Some(digits) = arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
                parse_arg(arg)?;
                Ok(digits.len() * 4)
            } else {
                let value = parse_arg(arg)?;
                Ok((value.bits() as usize).max(1))
            }
        })
        .collect()
}

/// Packs the parsed arguments into a single input integer, first argument
/// in the lowest bits, each at its announced width.
pub fn pack_inputs(args: &[String], sizes: &[usize]) -> Result<BigUint, CircuitError> {
    let mut packed = BigUint::default();
    let mut offset = 0usize;
    for (arg, &bits) in args.iter().zip(sizes) {
        let value = parse_arg(arg)?;
        if value.bits() as usize > bits {
            return Err(CircuitError::ArgumentTooWide {
                arg: arg.clone(),
                bits,
            });
        }
        packed |= value << offset;
        offset += bits;
    }
    Ok(packed)
}
