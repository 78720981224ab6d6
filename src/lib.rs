//! Two-party secure computation engine based on garbled circuits.
//!
//! One party (the *garbler*) encrypts a boolean circuit and its own inputs;
//! the other (the *evaluator*) obtains labels for its inputs through
//! oblivious transfer, evaluates the encrypted gates and returns the result
//! labels, which the garbler decodes into the plaintext output shared with
//! both parties. Neither party learns anything about the other's inputs
//! beyond the circuit output. The adversary model is semi-honest.
//!
//! Communication runs through an external relay that stores and forwards
//! sequence-numbered, topic-tagged messages; see [`channel`] for the
//! message contract and [`protocol`] for the per-role drivers.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod channel;
pub mod circuit;
pub mod protocol;

mod data_types;
mod garble;
mod ot;

pub use data_types::{Delta, GarbledGate, Label, Wire};
