//! jutsu-engine - hand-sign recognition and run-proof verification
//!
//! Offline front end: verify submitted results, classify single detector
//! frames, replay recorded sessions, or drive the engine over stdin.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{debug, info, warn};

use jutsu_engine::config::EngineConfig;
use jutsu_engine::ipc;
use jutsu_engine::pipeline::{
    normalize_hands, KnnClassifier, OwnedFrame, RawDetection, ReferenceDataset,
};
use jutsu_engine::proof::{
    ProofChain, RejectReason, Rejection, RunResult, RunVerifier, Verdict, VerifierOutput,
};
use jutsu_engine::state::EngineState;

#[derive(Parser, Debug)]
#[command(name = "jutsu-engine", about = "Hand-sign run engine and proof verifier")]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a submitted run result (JSON) and print the verdict
    Verify {
        result: PathBuf,

        /// Verification time (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<String>,
    },

    /// Classify one detector frame (JSON) against a reference dataset
    Classify {
        /// Reference dataset (CSV: label + 126 features)
        #[arg(long)]
        dataset: PathBuf,

        detection: PathBuf,
    },

    /// Replay recorded frames (JSON lines) as a competitive run
    Replay {
        #[arg(long)]
        dataset: PathBuf,

        #[arg(long)]
        jutsu: String,

        /// Run mode declared in the proof
        #[arg(long)]
        mode: Option<String>,

        frames: PathBuf,
    },

    /// Read s-expression messages from stdin, answer on stdout
    Repl {
        #[arg(long)]
        dataset: PathBuf,
    },
}

/// One recorded frame of a replay file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplayFrame {
    timestamp_ms: f64,
    #[serde(default)]
    detection: RawDetection,
    #[serde(default)]
    frame: Option<OwnedFrame>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jutsu_engine=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!("jutsu-engine v{} starting", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Verify { result, now } => run_verify(&config, &result, now.as_deref()),
        Command::Classify { dataset, detection } => run_classify(&config, &dataset, &detection),
        Command::Replay {
            dataset,
            jutsu,
            mode,
            frames,
        } => run_replay(config, &dataset, &jutsu, mode, &frames),
        Command::Repl { dataset } => run_repl(config, &dataset),
    }
}

fn load_dataset(path: &Path) -> anyhow::Result<Arc<ReferenceDataset>> {
    let dataset = ReferenceDataset::from_path(path)
        .with_context(|| format!("loading dataset {}", path.display()))?;
    if dataset.is_empty() {
        warn!("Dataset {} has no samples; every frame will be neutral", path.display());
    }
    Ok(Arc::new(dataset))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_verify(config: &EngineConfig, path: &Path, now: Option<&str>) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading result {}", path.display()))?;
    let now = match now {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --now timestamp {s}"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };
    let catalog = config.catalog()?;
    let verifier = RunVerifier::new(config.verifier.clone());

    let output: VerifierOutput = match RunResult::from_json(&raw) {
        Ok(result) => {
            let digest_ok = match result.proof.as_ref() {
                Some(proof) => match proof.chain_digest.as_deref() {
                    Some(claimed) => ProofChain::digest_events(&proof.events).matches_hex(claimed),
                    None => true,
                },
                None => true,
            };
            if digest_ok {
                verifier.verify(&result, &catalog, now).to_output()
            } else {
                Verdict::Rejected(Rejection::new(
                    RejectReason::ProofHashMismatch,
                    "chain digest does not match events",
                ))
                .to_output()
            }
        }
        Err(e) => {
            debug!("result is not a JSON object: {}", e);
            Verdict::Rejected(Rejection::new(
                RejectReason::MissingProof,
                format!("unreadable result: {e}"),
            ))
            .to_output()
        }
    };
    info!(
        "{}: {}",
        path.display(),
        output.reason.as_deref().unwrap_or("accepted")
    );
    print_json(&output)
}

fn run_classify(config: &EngineConfig, dataset: &Path, detection: &Path) -> anyhow::Result<()> {
    let classifier = KnnClassifier::new(load_dataset(dataset)?, config.classifier.clone());
    let raw = std::fs::read_to_string(detection)
        .with_context(|| format!("reading detection {}", detection.display()))?;
    let hands = RawDetection::from_json(&raw)
        .context("parsing detector output")?
        .into_hands();

    let result = classifier.classify(&normalize_hands(&hands));
    print_json(&serde_json::json!({
        "label": result.label,
        "confidence": result.confidence,
        "nearestDistance": if result.nearest_distance.is_finite() {
            Some(result.nearest_distance)
        } else {
            None
        },
        "hands": hands.len(),
    }))
}

fn run_replay(
    mut config: EngineConfig,
    dataset: &Path,
    jutsu: &str,
    mode: Option<String>,
    frames: &Path,
) -> anyhow::Result<()> {
    if let Some(mode) = mode {
        config.run.mode = mode;
    }
    let mut state = EngineState::new(config, load_dataset(dataset)?)?;

    let file = std::fs::File::open(frames)
        .with_context(|| format!("opening frames {}", frames.display()))?;
    let mut token = None;
    let mut last_ms = 0.0;
    for (lineno, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: ReplayFrame = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", frames.display(), lineno + 1))?;

        if token.is_none() {
            token = Some(state.start_run(jutsu, frame.timestamp_ms, Utc::now())?);
        }
        let hands = frame.detection.into_hands();
        state.process_tick(
            frame.timestamp_ms,
            &hands,
            frame.frame.as_ref().map(OwnedFrame::as_sample),
        );
        last_ms = frame.timestamp_ms;
    }

    let Some(token) = token else {
        bail!("{} contains no frames", frames.display());
    };
    if let Some(run) = &state.run {
        let (landed, total) = run.progress();
        warn!("Replay ended before completion ({}/{} signs)", landed, total);
        state.finish_run(last_ms);
    }
    state.drain_submissions(Utc::now());

    match state.submissions.status(&token).and_then(|s| s.to_output()) {
        Some(output) => print_json(&output),
        None => bail!("run {token} was not settled"),
    }
}

fn run_repl(config: EngineConfig, dataset: &Path) -> anyhow::Result<()> {
    let mut state = EngineState::new(config, load_dataset(dataset)?)?;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = ipc::handle_message(&mut state, &line) {
            writeln!(stdout, "{}", response)?;
            stdout.flush()?;
        }
    }
    info!("stdin closed, exiting");
    Ok(())
}
