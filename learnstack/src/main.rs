//! Recursive learning-stack tutor.
//!
//! `learnstack chat` runs an interactive tutoring session in the terminal;
//! `learnstack reconcile` replays a saved model response through the
//! reconciler offline.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use learnstack::chat::{ChatOptions, run_chat};
use learnstack::core::reconcile::{reconcile_json, reconcile_markdown};
use learnstack::core::types::Protocol;
use learnstack::exit_codes;
use learnstack::io::config::{DEFAULT_CONFIG_FILE, LearnstackConfig, load_config, write_config};
use learnstack::io::prompt::PromptComposer;
use learnstack::io::service::GeminiService;
use learnstack::logging;
use learnstack::render::render_stack;
use learnstack::session::Session;

#[derive(Parser)]
#[command(
    name = "learnstack",
    version,
    about = "Recursive learning-stack tutor"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `learnstack.toml` if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        /// Config path.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Start an interactive tutoring session.
    Chat {
        /// What you want to learn.
        #[arg(long)]
        goal: String,
        /// State protocol (`markdown` or `json`); overrides the config file.
        #[arg(long)]
        protocol: Option<Protocol>,
        /// API key; defaults to the variable named by `service.api_key_env`.
        #[arg(long)]
        api_key: Option<String>,
        /// File with source material sent along with every turn.
        #[arg(long)]
        context: Option<PathBuf>,
        /// Config path.
        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Do not send the opening message automatically.
        #[arg(long)]
        no_kickoff: bool,
    },
    /// Print what the reconciler extracts from a saved model response.
    Reconcile {
        #[arg(long, default_value = "markdown")]
        protocol: Protocol,
        /// File containing the raw response text.
        file: PathBuf,
    },
}

fn main() {
    logging::init(logging::CLI_DEFAULT);
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Chat {
            goal,
            protocol,
            api_key,
            context,
            config,
            no_kickoff,
        } => cmd_chat(ChatArgs {
            goal,
            protocol,
            api_key,
            context,
            config,
            kickoff: !no_kickoff,
        }),
        Command::Reconcile { protocol, file } => cmd_reconcile(protocol, &file),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists (use --force to overwrite)", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &LearnstackConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

struct ChatArgs {
    goal: String,
    protocol: Option<Protocol>,
    api_key: Option<String>,
    context: Option<PathBuf>,
    config: PathBuf,
    kickoff: bool,
}

fn cmd_chat(args: ChatArgs) -> Result<i32> {
    let cfg = load_config(&args.config)?;
    let goal = args.goal.trim();
    if goal.is_empty() {
        anyhow::bail!("--goal must be non-empty");
    }
    let Some(api_key) = cfg.resolve_api_key(args.api_key.as_deref()) else {
        eprintln!(
            "missing API key: pass --api-key or set {}",
            cfg.service.api_key_env
        );
        return Ok(exit_codes::MISSING_CREDENTIAL);
    };
    let protocol = args.protocol.unwrap_or(cfg.protocol);

    let mut session = Session::new(goal, api_key, protocol)
        .with_composer(PromptComposer::new(cfg.source_context_limit_chars));
    if let Some(path) = &args.context {
        let source =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        session = session.with_source_context(source);
    }

    info!(%protocol, model = %cfg.service.model, "starting chat");
    let service = GeminiService::new(&cfg.service);
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_chat(
        &mut session,
        &service,
        stdin.lock(),
        &mut stdout,
        &ChatOptions {
            kickoff: args.kickoff,
            gate_close_delay: cfg.gate_close_delay(),
        },
    )?;
    stdout.flush()?;
    Ok(exit_codes::OK)
}

fn cmd_reconcile(protocol: Protocol, path: &Path) -> Result<i32> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    println!("{}", reconcile_report(protocol, &raw));
    Ok(exit_codes::OK)
}

/// Human-readable summary of what one response would do to the state.
fn reconcile_report(protocol: Protocol, raw: &str) -> String {
    let mut buf = String::new();
    match protocol {
        Protocol::Markdown => {
            let outcome = reconcile_markdown(raw);
            match &outcome.document {
                Some(document) => buf.push_str(&format!("state: replaced\n\n{document}\n")),
                None => buf.push_str("state: unchanged (no markdown block)\n"),
            }
            buf.push_str(&format!("\ncommentary:\n{}", outcome.commentary));
        }
        Protocol::Json => {
            let outcome = reconcile_json(raw, &[]);
            if let Some(action) = outcome.action {
                buf.push_str(&format!("action: {action:?}\n"));
            }
            match (&outcome.stack, &outcome.failure) {
                (Some(stack), _) => {
                    buf.push_str(&format!("state: replaced\n\n{}\n", render_stack(stack)));
                }
                (None, Some(failure)) => {
                    buf.push_str(&format!("state: unchanged ({failure})\n"));
                }
                (None, None) => buf.push_str("state: unchanged\n"),
            }
            buf.push_str(&format!("\ncommentary:\n{}", outcome.commentary));
            for note in &outcome.notes {
                buf.push_str(&format!("\nnote: {note}"));
            }
        }
    }
    buf
}
