//! fitvoice - Entry Point
//!
//! Interactive REPL: type what you would say mid-workout and see the spoken
//! response plus the actions the workout app would execute.

use clap::Parser;
use fitvoice::conversation::{SessionContext, TurnInput};
use fitvoice::core::error::Result;
use fitvoice::llm::client::{LlmClient, ReasoningBackend};
use fitvoice::memory::store::{FileStore, KeyValueStore, MemoryStore};
use fitvoice::{Engine, EngineConfig, VoiceSession};

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

/// Voice command console for workout logging
#[derive(Parser, Debug)]
#[command(name = "fitvoice")]
#[command(about = "Type transcripts as if spoken mid-workout")]
struct Args {
    /// TOML file overriding engine defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for profile and history JSON (in-memory when omitted)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// User whose profile is loaded
    #[arg(long, default_value = "default")]
    user: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fitvoice=debug")))
        .init();

    tracing::info!("fitvoice starting...");

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    // Backend is optional - local rules cover its absence
    let backend: Option<Arc<dyn ReasoningBackend>> = match LlmClient::from_env() {
        Ok(client) => Some(Arc::new(client)),
        Err(_) => {
            tracing::warn!("LLM_API_KEY not set - classifying with local rules only");
            None
        }
    };

    let store: Arc<dyn KeyValueStore> = match &args.data_dir {
        Some(dir) => Arc::new(FileStore::new(dir.clone())),
        None => Arc::new(MemoryStore::new()),
    };

    let rt = Runtime::new()?;
    let engine = Arc::new(Engine::new(config, backend)?);
    let mut session = rt.block_on(VoiceSession::start(engine, store, args.user.clone()));

    println!("\n=== FITVOICE ===");
    println!("Say what you did, e.g. \"bench press eight reps at one eighty five\"");
    println!();
    println!("Commands:");
    println!("  :exercise <name> - Set the exercise the app has on screen");
    println!("  :confidence <x>  - Recognizer confidence for the next line");
    println!("  :profile         - Show the learned profile");
    println!("  quit / q         - Exit");
    println!();

    let mut context = SessionContext::default();
    let mut confidence: Option<f32> = None;

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if input == "quit" || input == "q" {
            break;
        }

        if let Some(name) = input.strip_prefix(":exercise") {
            let name = name.trim();
            context.current_exercise_name = (!name.is_empty()).then(|| name.to_string());
            println!("Current exercise: {}", context.current_exercise_name.as_deref().unwrap_or("none"));
            continue;
        }

        if let Some(value) = input.strip_prefix(":confidence") {
            match value.trim().parse::<f32>() {
                Ok(value) => confidence = Some(value),
                Err(_) => println!("Usage: :confidence <0.0-1.0>"),
            }
            continue;
        }

        if input == ":profile" {
            let profile = rt.block_on(session.profile());
            println!("{}", serde_json::to_string_pretty(&profile)?);
            continue;
        }

        let mut turn = TurnInput::new(input).with_context(context.clone());
        if let Some(value) = confidence.take() {
            turn = turn.with_confidence(value);
        }

        let outcome = rt.block_on(session.handle_turn(turn));
        context = outcome.next_context.clone();

        println!();
        println!("  \"{}\" ({:?})", outcome.output.response_text, outcome.output.emotion);
        if let Some(intent) = &outcome.intent {
            println!(
                "  Intent: {} ({:.0}%, {:?})",
                intent.label.as_str(),
                intent.confidence * 100.0,
                intent.source
            );
        }
        if let Some(flow) = &outcome.active_flow {
            println!("  Flow: {} at {:?}", flow.kind.as_str(), flow.step);
        }
        if !outcome.output.suggested_replies.is_empty() {
            println!("  Try: {}", outcome.output.suggested_replies.join(" | "));
        }
        for action in &outcome.output.actions {
            println!("  Action: {}", serde_json::to_string(action)?);
        }
        println!();
    }

    rt.block_on(session.shutdown());
    println!("\nGoodbye!");
    Ok(())
}
