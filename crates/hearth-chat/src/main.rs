//! Hearth chat: terminal front-end for the conversation core.
//!
//! Usage:
//!   cargo run -p hearth-chat -- [--seed N] [--config PATH] [--corpus PATH] [--no-delay] [--json]
//!
//! Reads one message per line from stdin and prints each reply after its typing delay. A new
//! message supersedes a reply that has not been printed yet. `/quit` exits.

use hearth_core::{AlertChannel, ConcernAlert, ConcernTag, HearthConfig, Pipeline, TypingPacer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Default)]
struct Args {
    seed: Option<u64>,
    config: Option<PathBuf>,
    corpus: Option<PathBuf>,
    no_delay: bool,
    json: bool,
    help: bool,
}

fn parse_args() -> Args {
    let mut parsed = Args::default();
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        match a.as_str() {
            "--seed" => parsed.seed = args.next().and_then(|s| s.parse().ok()),
            "--config" => parsed.config = args.next().map(PathBuf::from),
            "--corpus" => parsed.corpus = args.next().map(PathBuf::from),
            "--no-delay" => parsed.no_delay = true,
            "--json" => parsed.json = true,
            "--help" | "-h" => parsed.help = true,
            other => eprintln!("Ignoring unknown argument: {}", other),
        }
    }
    parsed
}

fn print_usage() {
    eprintln!("Hearth: supportive conversation agent (terminal)");
    eprintln!("  --seed N         Reproducible template selection");
    eprintln!("  --config PATH    TOML configuration file (else HEARTH_CONFIG / env)");
    eprintln!("  --corpus PATH    TOML template corpus layered over the built-in one");
    eprintln!("  --no-delay       Print replies immediately");
    eprintln!("  --json           Print one JSON turn report per line (no pacing)");
    eprintln!();
    eprintln!("Type /quit to leave.");
}

/// Resource text shown the first time a concern is surfaced.
fn render_alert(alert: &ConcernAlert) -> String {
    match alert.tag {
        ConcernTag::Crisis | ConcernTag::TentativeHarm => {
            "[support] If you are in danger or thinking about ending your life, call or text 988 \
             (Suicide & Crisis Lifeline, US) or your local emergency number."
                .to_string()
        }
        ConcernTag::SubstanceUse => {
            "[support] SAMHSA National Helpline: 1-800-662-4357 (free, confidential, 24/7). \
             You can also book a session with a counselor."
                .to_string()
        }
        ConcernTag::EatingDisorder => {
            "[support] Eating-disorder support is available; consider booking a session with a \
             specialist counselor."
                .to_string()
        }
        _ => format!(
            "[support] It may help to talk this through with a licensed professional ({}). \
             You can book a session any time.",
            alert.label
        ),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args();
    if args.help {
        print_usage();
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => HearthConfig::load_from_path(path)?,
        None => HearthConfig::load()?,
    };
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    if args.corpus.is_some() {
        config.corpus_path = args.corpus.clone();
    }

    let (alerts, mut alert_rx) = AlertChannel::new();
    let pipeline = Pipeline::new(config)?.with_alert_sink(Arc::new(alerts));
    let mut session = pipeline.new_session();
    info!(session = session.id(), "Hearth chat started");

    let alert_task = tokio::spawn(async move {
        while let Some(alert) = alert_rx.recv().await {
            println!("{}", render_alert(&alert));
        }
    });

    let pacer = TypingPacer::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    if !args.json {
        println!("Hearth: Hi, I'm here to listen. (type /quit to leave)");
    }

    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }
        pacer.cancel();

        if args.json {
            let report = pipeline.process_turn(text, &mut session);
            println!("{}", serde_json::to_string(&report)?);
            continue;
        }

        let mut reply = pipeline.process_utterance(text, &mut session);
        if args.no_delay {
            reply.delay_ms = 0;
        }
        pacer.schedule(reply, |r| println!("Hearth: {}", r.text));
    }

    // Let a reply still being "typed" land before exiting.
    while pacer.is_pending() {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    drop(pipeline);
    let _ = alert_task.await;
    info!("Hearth chat ended");
    Ok(())
}
