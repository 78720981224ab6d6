//! Data types shared between the garbling, evaluation and transfer parts of
//! the engine.

use std::ops::BitXor;

use rand::{
    distributions::{Distribution, Standard},
    CryptoRng, Rng,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// The index of a particular wire in a circuit.
pub type Wire = u32;

/// A label for a particular wire in the circuit.
///
/// A label is an opaque 128-bit value. Its least significant bit is the
/// *permutation bit*, used to select a row of a garbled gate without
/// revealing which logical input combination it belongs to.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Label(pub(crate) u128);

impl Label {
    /// The all-zero label, used to pad wire slots that have not been
    /// assigned yet.
    pub const ZERO: Label = Label(0);

    /// The permutation bit of the label.
    pub fn pmt(&self) -> bool {
        self.0 & 1 == 1
    }

    /// The label standing for `bit` on a wire with zero-label `self`.
    ///
    /// Selects between `self` and `self ^ delta` in constant time.
    pub fn select(&self, delta: Delta, bit: bool) -> Label {
        // bit = 0: mask = 0000...0000, bit = 1: mask = 1111...1111
        let mask = (-(bit as i128)) as u128;
        Label(self.0 ^ (mask & delta.0))
    }

    /// The bit that `candidate` stands for on a wire with zero-label `self`,
    /// or `None` if `candidate` matches neither `self` nor `self ^ delta`.
    pub fn bit_from(&self, delta: Delta, candidate: Label) -> Option<bool> {
        let is_zero = candidate.0.ct_eq(&self.0);
        let is_one = candidate.0.ct_eq(&(self.0 ^ delta.0));
        if bool::from(is_zero) {
            Some(false)
        } else if bool::from(is_one) {
            Some(true)
        } else {
            None
        }
    }
}

impl BitXor for Label {
    type Output = Self;

    fn bitxor(self, rhs: Self) -> Self::Output {
        Label(self.0 ^ rhs.0)
    }
}

impl BitXor<Delta> for Label {
    type Output = Self;

    fn bitxor(self, rhs: Delta) -> Self::Output {
        Label(self.0 ^ rhs.0)
    }
}

impl PartialEq for Label {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Label {}

impl Distribution<Label> for Standard {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Label {
        Label(rng.gen())
    }
}

/// The global free-XOR offset of a garbled circuit.
///
/// For every wire the two labels differ by this offset. Its low bit is
/// always 1, so the permutation bits of a label pair always differ. The
/// offset is known only to the garbler and never leaves its process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delta(pub(crate) u128);

impl Delta {
    /// Draws a fresh offset with the low bit set.
    pub(crate) fn random<R: Rng + CryptoRng>(rng: &mut R) -> Delta {
        Delta(rng.gen::<u128>() | 1)
    }
}

/// The encrypted rows of a single garbled gate.
///
/// XOR and INV gates are free and carry no rows. AND and OR gates carry
/// three rows under row reduction; each row holds the masked output label
/// and an integrity tag that decrypts to the all-zero block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarbledGate(pub Vec<[Label; 2]>);
