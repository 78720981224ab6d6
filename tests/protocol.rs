use std::sync::Arc;

use num_bigint::BigUint;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use duotune::{
    channel::{Connection, InMemoryRelay, InMemoryRelayError, Message, Party, Relay},
    circuit::{Circuit, Gate, InputGroup, Op, OutputField},
    protocol::{evaluator, garbler, run_evaluator, run_garbler, Error, OtQuery, ProtocolError},
    GarbledGate, Label,
};

fn two_party(
    gates: Vec<Gate>,
    num_wires: usize,
    in_g: usize,
    in_e: usize,
    out_bits: usize,
) -> Circuit {
    Circuit {
        num_wires,
        gates,
        inputs: vec![
            InputGroup {
                name: "garbler".into(),
                bits: in_g,
            },
            InputGroup {
                name: "evaluator".into(),
                bits: in_e,
            },
        ],
        outputs: vec![OutputField {
            name: "out".into(),
            bits: out_bits,
        }],
    }
}

fn eval_directly(circuit: &Circuit, input_g: &BigUint, input_e: &BigUint) -> BigUint {
    let in_g = circuit.inputs[0].bits;
    let in_e = circuit.inputs[1].bits;
    let mut wires = vec![false; circuit.num_wires];
    for (i, wire) in wires.iter_mut().take(in_g).enumerate() {
        *wire = input_g.bit(i as u64);
    }
    for i in 0..in_e {
        wires[in_g + i] = input_e.bit(i as u64);
    }
    for g in circuit.assign_levels().unwrap() {
        let gate = circuit.gates[g];
        let a = wires[gate.a as usize];
        let b = gate.b.map(|w| wires[w as usize]).unwrap_or(false);
        wires[gate.out as usize] = gate.op.eval(a, b);
    }
    let first_out = circuit.num_wires - circuit.output_bits();
    let mut out = BigUint::default();
    for (i, w) in (first_out..circuit.num_wires).enumerate() {
        out.set_bit(i as u64, wires[w]);
    }
    out
}

async fn connections(relay: InMemoryRelay) -> (Connection<InMemoryRelay>, Connection<InMemoryRelay>) {
    let g = Connection::open(relay.clone(), Party::Garbler, Some("test".into()))
        .await
        .unwrap();
    let e = Connection::open(relay, Party::Evaluator, Some("test".into()))
        .await
        .unwrap();
    (g, e)
}

type SessionResult = Result<Vec<BigUint>, Error>;

async fn run_session(
    circuit: &Circuit,
    input_g: &BigUint,
    input_e: &BigUint,
    seeds: (u64, u64),
) -> (SessionResult, SessionResult) {
    let (g_conn, e_conn) = connections(InMemoryRelay::new()).await;
    let g_circ = circuit.clone();
    let g_input = input_g.clone();
    let g = tokio::spawn(async move {
        let mut rng = ChaCha20Rng::seed_from_u64(seeds.0);
        garbler(&g_conn, &g_circ, &g_input, &mut rng).await
    });
    let e_circ = circuit.clone();
    let e_input = input_e.clone();
    let e = tokio::spawn(async move {
        let mut rng = ChaCha20Rng::seed_from_u64(seeds.1);
        evaluator(&e_conn, &e_circ, &e_input, &mut rng).await
    });
    (g.await.unwrap(), e.await.unwrap())
}

#[tokio::test]
async fn xor_only_circuit_round_trips() {
    let circuit = two_party(
        vec![Gate {
            op: Op::Xor,
            a: 0,
            b: Some(1),
            out: 2,
        }],
        3,
        1,
        1,
        1,
    );
    for x in 0u64..2 {
        for y in 0u64..2 {
            let (g, e) = run_session(&circuit, &x.into(), &y.into(), (1, 2)).await;
            let g = g.unwrap();
            let e = e.unwrap();
            assert_eq!(g, e);
            assert_eq!(g, vec![BigUint::from(x ^ y)], "{x} ^ {y}");
        }
    }
}

#[tokio::test]
async fn mixed_gates_match_direct_evaluation() {
    // 3 garbler bits, 2 evaluator bits, all four gate kinds, outputs
    // spread over 3 bits
    let circuit = two_party(
        vec![
            Gate {
                op: Op::Xor,
                a: 0,
                b: Some(3),
                out: 5,
            },
            Gate {
                op: Op::And,
                a: 1,
                b: Some(4),
                out: 6,
            },
            Gate {
                op: Op::Inv,
                a: 2,
                b: None,
                out: 7,
            },
            Gate {
                op: Op::Or,
                a: 5,
                b: Some(6),
                out: 8,
            },
            Gate {
                op: Op::And,
                a: 7,
                b: Some(8),
                out: 9,
            },
            Gate {
                op: Op::Xor,
                a: 8,
                b: Some(7),
                out: 10,
            },
            Gate {
                op: Op::Or,
                a: 9,
                b: Some(3),
                out: 11,
            },
        ],
        12,
        3,
        2,
        3,
    );
    for x in 0u64..8 {
        for y in 0u64..4 {
            let input_g = BigUint::from(x);
            let input_e = BigUint::from(y);
            let expected = circuit.split_outputs(&eval_directly(&circuit, &input_g, &input_e));
            let (g, e) = run_session(&circuit, &input_g, &input_e, (3, 4)).await;
            let g = g.unwrap();
            assert_eq!(g, e.unwrap(), "inputs {x}/{y}");
            assert_eq!(g, expected, "inputs {x}/{y}");
        }
    }
}

#[tokio::test]
async fn swapped_inputs_give_a_different_reproducible_result() {
    // out = x & !y is not symmetric in the two parties' inputs
    let circuit = two_party(
        vec![
            Gate {
                op: Op::Inv,
                a: 1,
                b: None,
                out: 2,
            },
            Gate {
                op: Op::And,
                a: 0,
                b: Some(2),
                out: 3,
            },
        ],
        4,
        1,
        1,
        1,
    );
    let one = BigUint::from(1u8);
    let zero = BigUint::default();

    let (g1, _) = run_session(&circuit, &one, &zero, (5, 6)).await;
    let (g2, _) = run_session(&circuit, &one, &zero, (7, 8)).await;
    // the computed result only depends on the inputs, not on the label
    // randomness
    assert_eq!(g1.unwrap(), g2.unwrap());

    let (swapped, _) = run_session(&circuit, &zero, &one, (5, 6)).await;
    assert_eq!(swapped.unwrap(), vec![BigUint::default()]);
    let (original, _) = run_session(&circuit, &one, &zero, (5, 6)).await;
    assert_eq!(original.unwrap(), vec![BigUint::from(1u8)]);
}

/// A relay that flips payload bits of one topic's messages in transit.
#[derive(Clone)]
struct BitFlippingRelay {
    inner: InMemoryRelay,
    topic: &'static str,
    offsets: Arc<Vec<usize>>,
}

impl Relay for BitFlippingRelay {
    type Error = InMemoryRelayError;

    async fn new_session(&self) -> Result<String, Self::Error> {
        self.inner.new_session().await
    }

    async fn inbox(&self, mut messages: Vec<Message>) -> Result<(), Self::Error> {
        for message in &mut messages {
            if message.topic == self.topic {
                for &offset in self.offsets.iter() {
                    message.payload[offset] ^= 1;
                }
            }
        }
        self.inner.inbox(messages).await
    }

    async fn outbox(&self, stubs: Vec<Message>) -> Result<Vec<Message>, Self::Error> {
        self.inner.outbox(stubs).await
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.inner.close().await
    }
}

fn and_chain(n: usize) -> Circuit {
    let mut gates = vec![Gate {
        op: Op::And,
        a: 0,
        b: Some(1),
        out: 2,
    }];
    for i in 1..n {
        gates.push(Gate {
            op: Op::And,
            a: (1 + i) as u32,
            b: Some(1),
            out: (2 + i) as u32,
        });
    }
    two_party(gates, n + 2, 1, 1, 1)
}

#[tokio::test]
async fn corrupted_gate_payload_fails_the_session() {
    let circuit = and_chain(32);
    // bincode layout of Vec<GarbledGate>: 8-byte vec length, then per gate
    // an 8-byte row count followed by 3 rows of 2 labels (16 bytes each);
    // flip a bit in every row's integrity tag
    let offsets: Vec<usize> = (0..32)
        .flat_map(|gate| (0..3).map(move |row| 8 + gate * 104 + 8 + row * 32 + 16))
        .collect();
    let relay = BitFlippingRelay {
        inner: InMemoryRelay::new(),
        topic: "garbled gates",
        offsets: Arc::new(offsets),
    };
    let g_conn = Connection::open(relay.clone(), Party::Garbler, Some("s3".into()))
        .await
        .unwrap();
    let e_conn = Connection::open(relay, Party::Evaluator, Some("s3".into()))
        .await
        .unwrap();

    let g_circ = circuit.clone();
    let g = tokio::spawn(async move {
        let mut rng = ChaCha20Rng::seed_from_u64(9);
        garbler(&g_conn, &g_circ, &BigUint::from(1u8), &mut rng).await
    });
    let e_circ = circuit.clone();
    let e = tokio::spawn(async move {
        let mut rng = ChaCha20Rng::seed_from_u64(10);
        evaluator(&e_conn, &e_circ, &BigUint::from(1u8), &mut rng).await
    });

    let evaluator_result = e.await.unwrap();
    assert!(
        matches!(evaluator_result, Err(Error::Garble(_))),
        "corrupted rows must fail the integrity check, got {evaluator_result:?}"
    );
    // the garbler is left waiting for result labels that never come
    g.abort();
}

#[tokio::test]
async fn wrong_ot_query_aborts_the_garbler() {
    let circuit = and_chain(1);
    let (g_conn, e_conn) = connections(InMemoryRelay::new()).await;

    let g_circ = circuit.clone();
    let g = tokio::spawn(async move {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        garbler(&g_conn, &g_circ, &BigUint::from(1u8), &mut rng).await
    });
    // a peer that announces one more OT wire than the circuit assigns it
    let e = tokio::spawn(async move {
        let _key: [u8; 32] = e_conn.recv("ephemeral key").await.unwrap();
        let _gates: Vec<GarbledGate> = e_conn.recv("garbled gates").await.unwrap();
        let _inputs: Vec<Label> = e_conn.recv("inputs").await.unwrap();
        e_conn
            .send("ot query", &OtQuery {
                offset: 1,
                count: 2,
            })
            .await
            .unwrap();
    });

    let garbler_result = g.await.unwrap();
    assert!(matches!(
        garbler_result,
        Err(Error::Protocol(ProtocolError::OtQueryMismatch { .. }))
    ));
    e.await.unwrap();
}

/// Builds a circuit following the result byte convention: an 8-bit status
/// field (the discriminator) followed by an 8-bit payload. The successful
/// variant computes `x ^ y`, the failing variant reports error code 42.
fn discriminator_circuit(ok: bool) -> Circuit {
    let (zero, one) = (16u32, 17u32);
    let mut gates = vec![
        Gate {
            op: Op::Xor,
            a: 0,
            b: Some(0),
            out: zero,
        },
        Gate {
            op: Op::Inv,
            a: zero,
            b: None,
            out: one,
        },
    ];
    // status: 0x01 on success, 0x00 on failure
    gates.push(Gate {
        op: Op::Xor,
        a: zero,
        b: Some(if ok { one } else { zero }),
        out: 18,
    });
    for i in 1..8u32 {
        gates.push(Gate {
            op: Op::Xor,
            a: zero,
            b: Some(zero),
            out: 18 + i,
        });
    }
    for i in 0..8u32 {
        let bit = if ok {
            None
        } else {
            Some((42u8 >> i) & 1 == 1)
        };
        gates.push(match bit {
            // payload = x ^ y
            None => Gate {
                op: Op::Xor,
                a: i,
                b: Some(8 + i),
                out: 26 + i,
            },
            // payload = constant error code
            Some(bit) => Gate {
                op: Op::Xor,
                a: zero,
                b: Some(if bit { one } else { zero }),
                out: 26 + i,
            },
        });
    }
    Circuit {
        num_wires: 34,
        gates,
        inputs: vec![
            InputGroup {
                name: "garbler".into(),
                bits: 8,
            },
            InputGroup {
                name: "evaluator".into(),
                bits: 8,
            },
        ],
        outputs: vec![
            OutputField {
                name: "status".into(),
                bits: 8,
            },
            OutputField {
                name: "value".into(),
                bits: 8,
            },
        ],
    }
}

type RunResult = Result<Vec<u8>, Error>;

async fn run_full_session(
    circuit: Circuit,
    args_g: Vec<String>,
    args_e: Vec<String>,
) -> (RunResult, RunResult) {
    let relay = InMemoryRelay::new();
    let session = relay.new_session().await.unwrap();

    let g = {
        let relay = relay.clone();
        let session = session.clone();
        let circuit = circuit.clone();
        tokio::spawn(async move {
            let mut rng = ChaCha20Rng::seed_from_u64(21);
            run_garbler(relay, Some(session), &circuit, &args_g, &mut rng).await
        })
    };
    let e = tokio::spawn(async move {
        let mut rng = ChaCha20Rng::seed_from_u64(22);
        run_evaluator(relay, Some(session), &circuit, &args_e, &mut rng).await
    });
    (g.await.unwrap(), e.await.unwrap())
}

#[tokio::test]
async fn full_session_strips_the_discriminator() {
    let (g, e) = run_full_session(
        discriminator_circuit(true),
        vec!["0x5a".into()],
        vec!["0xa5".into()],
    )
    .await;
    let g = g.unwrap();
    assert_eq!(g, e.unwrap());
    assert_eq!(g, vec![0xff]);
}

#[tokio::test]
async fn circuit_runtime_error_is_surfaced() {
    let (g, e) = run_full_session(
        discriminator_circuit(false),
        vec!["0x5a".into()],
        vec!["0xa5".into()],
    )
    .await;
    assert!(matches!(g, Err(Error::CircuitRuntime { code: 42, .. })));
    assert!(matches!(e, Err(Error::CircuitRuntime { code: 42, .. })));
}

#[tokio::test]
async fn announced_size_mismatch_fails_both_parties() {
    // the evaluator announces 16 input bits for a circuit that assigns it 8
    let (g, e) = run_full_session(
        discriminator_circuit(true),
        vec!["0x5a".into()],
        vec!["0x1122".into()],
    )
    .await;
    assert!(matches!(g, Err(Error::Circuit(_))), "got {g:?}");
    assert!(matches!(e, Err(Error::Circuit(_))), "got {e:?}");
}
