//! Chou-Orlandi oblivious transfer (cf. <https://eprint.iacr.org/2015/267>)
//! over the NIST P-256 curve.
//!
//! One batch transfers the evaluator's input-wire labels: the sender offers
//! a pair of labels per wire, the receiver learns exactly the label
//! selected by its input bit, and neither side learns anything else. A
//! single setup point is reused across the batch; the receiver's blinded
//! points travel in one message and the ciphertext pairs in one reply.
//!
//! Key derivation hashes the index of the transfer into the shared curve
//! point, so that equal points at different indices yield unrelated masks.

use p256::{
    elliptic_curve::{
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Field, Group,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar,
};
use rand::{CryptoRng, Rng};
use subtle::{Choice, ConditionallySelectable};
use thiserror::Error;

use crate::{
    channel::{self, Connection, Relay},
    data_types::Label,
};

const TOPIC_SETUP: &str = "ot setup";
const TOPIC_CHOICES: &str = "ot choices";
const TOPIC_CIPHERTEXTS: &str = "ot ciphertexts";

/// Errors occurring during the oblivious transfer of input labels.
#[derive(Debug, Error)]
pub enum Error {
    /// A message could not be sent or received.
    #[error(transparent)]
    Channel(#[from] channel::Error),
    /// A received byte string is not a valid point on the curve.
    #[error("received point is not on the curve")]
    InvalidPoint,
    /// A received point is the identity element.
    #[error("received point is the identity")]
    IdentityPoint,
    /// The peer's batch size does not match this party's.
    #[error("peer transferred {actual} values, expected {expected}")]
    CountMismatch {
        /// The batch size this party expected.
        expected: usize,
        /// The batch size the peer sent.
        actual: usize,
    },
}

fn encode_point(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Decodes a compressed SEC1 point, rejecting encodings that are not on
/// the curve as well as the identity.
fn decode_point(bytes: &[u8]) -> Result<ProjectivePoint, Error> {
    let encoded = EncodedPoint::from_bytes(bytes).map_err(|_| Error::InvalidPoint)?;
    let affine =
        Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or(Error::InvalidPoint)?;
    let point = ProjectivePoint::from(affine);
    if bool::from(point.is_identity()) {
        return Err(Error::IdentityPoint);
    }
    Ok(point)
}

/// Derives a 128-bit mask from a curve point and the transfer index.
fn hash_point(point: &ProjectivePoint, tweak: u128) -> Label {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&tweak.to_be_bytes());
    hasher.update(point.to_affine().to_encoded_point(true).as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest.as_bytes()[..16]);
    Label(u128::from_le_bytes(bytes))
}

/// Runs the sender side of a transfer batch.
///
/// For each pair `(m0, m1)` the receiver learns exactly one message,
/// without the sender learning which.
pub(crate) async fn send<R: Relay, RNG: Rng + CryptoRng>(
    conn: &Connection<R>,
    pairs: &[(Label, Label)],
    rng: &mut RNG,
) -> Result<(), Error> {
    let a = Scalar::random(&mut *rng);
    let big_a = ProjectivePoint::GENERATOR * a;
    let a_squared = big_a * a;
    conn.send(TOPIC_SETUP, &encode_point(&big_a)).await?;

    let choices: Vec<Vec<u8>> = conn.recv(TOPIC_CHOICES).await?;
    if choices.len() != pairs.len() {
        return Err(Error::CountMismatch {
            expected: pairs.len(),
            actual: choices.len(),
        });
    }

    let mut ciphertexts = Vec::with_capacity(pairs.len());
    for (i, (bytes, (m0, m1))) in choices.iter().zip(pairs).enumerate() {
        let blinded = decode_point(bytes)?;
        let shared = blinded * a;
        // for choice bit 1 the receiver's key point is offset by A, so the
        // matching mask comes from aB - a²G
        let mask0 = hash_point(&shared, i as u128);
        let mask1 = hash_point(&(shared - a_squared), i as u128);
        ciphertexts.push((mask0 ^ *m0, mask1 ^ *m1));
    }
    conn.send(TOPIC_CIPHERTEXTS, &ciphertexts).await?;
    Ok(())
}

/// Runs the receiver side of a transfer batch, returning the message
/// selected by each choice bit.
pub(crate) async fn receive<R: Relay, RNG: Rng + CryptoRng>(
    conn: &Connection<R>,
    choices: &[bool],
    rng: &mut RNG,
) -> Result<Vec<Label>, Error> {
    let setup: Vec<u8> = conn.recv(TOPIC_SETUP).await?;
    let big_a = decode_point(&setup)?;

    let mut points = Vec::with_capacity(choices.len());
    let mut keys = Vec::with_capacity(choices.len());
    for (i, &c) in choices.iter().enumerate() {
        let b = Scalar::random(&mut *rng);
        let base = ProjectivePoint::GENERATOR * b;
        let blinded =
            ProjectivePoint::conditional_select(&base, &(base + big_a), Choice::from(c as u8));
        points.push(encode_point(&blinded));
        keys.push(hash_point(&(big_a * b), i as u128));
    }
    conn.send(TOPIC_CHOICES, &points).await?;

    let ciphertexts: Vec<(Label, Label)> = conn.recv(TOPIC_CIPHERTEXTS).await?;
    if ciphertexts.len() != choices.len() {
        return Err(Error::CountMismatch {
            expected: choices.len(),
            actual: ciphertexts.len(),
        });
    }
    Ok(choices
        .iter()
        .zip(keys)
        .zip(ciphertexts)
        .map(|((&c, key), (e0, e1))| {
            // select e0 or e1 without branching on the choice bit
            let mask = (-(c as i128)) as u128;
            Label(e0.0 ^ (mask & (e0.0 ^ e1.0))) ^ key
        })
        .collect())
}
