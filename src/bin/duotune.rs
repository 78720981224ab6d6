//! Local two-party demo runner: executes a garbler and an evaluator over
//! the in-memory relay against a precompiled `.circ` file and prints the
//! hex-encoded result. The relay service used in production deployments is
//! external; this binary exists to exercise a full session end to end.

use std::path::PathBuf;

use anyhow::ensure;
use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use duotune::{
    channel::{InMemoryRelay, Relay},
    circuit::CircuitFile,
    protocol::{run_evaluator, run_garbler},
};

#[derive(Debug, Parser)]
#[command(name = "duotune", version, about = "Two-party garbled-circuit demo runner")]
struct Cli {
    /// Path to the precompiled circuit (`.circ`).
    #[arg(long)]
    circuit: PathBuf,
    /// Comma-separated garbler inputs, `0x`-prefixed hex or decimal.
    #[arg(long, value_delimiter = ',', required = true)]
    garbler: Vec<String>,
    /// Comma-separated evaluator inputs, `0x`-prefixed hex or decimal.
    #[arg(long, value_delimiter = ',', required = true)]
    evaluator: Vec<String>,
    /// Session id; a fresh one is created if omitted.
    #[arg(long)]
    session: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let relay = InMemoryRelay::new();
    let session = match cli.session {
        Some(session) => session,
        None => relay.new_session().await?,
    };

    let garbler_task = {
        let relay = relay.clone();
        let session = session.clone();
        let source = CircuitFile::new(&cli.circuit);
        let args = cli.garbler.clone();
        tokio::spawn(async move {
            let mut rng = ChaCha20Rng::from_entropy();
            run_garbler(relay, Some(session), &source, &args, &mut rng).await
        })
    };
    let evaluator_task = {
        let source = CircuitFile::new(&cli.circuit);
        let args = cli.evaluator.clone();
        tokio::spawn(async move {
            let mut rng = ChaCha20Rng::from_entropy();
            run_evaluator(relay, Some(session), &source, &args, &mut rng).await
        })
    };

    let garbler_result = garbler_task.await??;
    let evaluator_result = evaluator_task.await??;
    ensure!(
        garbler_result == evaluator_result,
        "parties disagree on the result"
    );
    println!("{}", hex::encode(&garbler_result));
    Ok(())
}
