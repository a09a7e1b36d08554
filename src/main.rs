use std::io;

use anyhow::{Context, Result};
use log::info;
use afterlife_triage::triage::engine::TriageEngine;
use afterlife_triage::triage::store::FileStore;
use afterlife_triage::triage::{self, SessionOutcome, TriageConfig};

fn main() -> Result<()> {
    // Initialize logging. Control verbosity with RUST_LOG env var:
    //   RUST_LOG=info   cargo run            # transitions
    //   RUST_LOG=debug  cargo run            # + skip resolution, guidance seed
    //   RUST_LOG=trace  cargo run            # + persisted progress payloads
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config = TriageConfig::from_args(&args);

    let graph = config.load_graph().context(
        "Usage: afterlife-triage [state-dir] [graph.json]\n\
         \n\
         Example:\n  afterlife-triage ./.afterlife ./my-questions.json\n\
         \n\
         Logging: set RUST_LOG=debug or RUST_LOG=trace for verbose output",
    )?;

    println!("\n========================================");
    println!("     AFTERLIFE - WHAT HAPPENS NEXT");
    println!("========================================");
    println!("A few questions so we can tailor our guidance.");
    println!("Progress is saved in: {}", config.state_dir.display());

    let store = FileStore::new(&config.state_dir);
    let mut engine = TriageEngine::new(graph, store, config.session_key.clone());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let outcome = triage::run_session(&mut engine, stdin.lock(), &mut stdout)?;

    match outcome {
        SessionOutcome::Completed(answers) => {
            let seed =
                triage::show_guidance(&mut stdout, &answers).context("failed to print guidance")?;
            info!("Guidance conversation ready ({} seed messages)", seed.len());
        }
        SessionOutcome::Exited => println!("\nYou have left the questionnaire."),
        SessionOutcome::Paused => println!("\nTake your time. Run again to continue."),
    }

    Ok(())
}
