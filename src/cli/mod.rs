//! Command-line interface parsing and handling
//!
//! This module parses arguments, wires the process-wide collaborators and
//! dispatches to the provider menu, a direct chat, or a subcommand.

pub mod interrupt;
pub mod menu;
pub mod provider_list;

use std::error::Error;
use std::io;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::interrupt::InterruptHub;
use crate::cli::menu::Shell;
use crate::cli::provider_list::list_providers;
use crate::core::app::{AppContext, CliOverrides, Settings};
use crate::core::builtin_providers::load_builtin_providers;
use crate::core::config::Config;
use crate::core::providers::Credentials;
use crate::ui::prompt::StdinSource;
use crate::ui::terminal::TerminalRenderer;

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "A terminal chat client for OpenAI, Groq and Gemini")]
#[command(
    long_about = "Parley streams conversations from OpenAI, Groq and Gemini through one \
terminal interface. Pick a provider from the menu, pick a model, and chat; replies \
appear as they are generated.\n\n\
Environment Variables:\n\
  OPENAI_API_KEY                 OpenAI API key\n\
  GROQ_API_KEY or XAI_API_KEY    Groq API key\n\
  GEMINI_API_KEY                 Gemini API key\n\
  USE_SQLITE=1                   Also store transcripts in SQLite\n\
  RUST_LOG                       Diagnostic log filter (default: warn)\n\n\
Controls:\n\
  exit / quit / :q / bye         End the current chat\n\
  Ctrl+C                         Leave the current chat, or quit at the menu"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Provider to chat with directly, skipping the menu
    #[arg(short = 'p', long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Model id to use as-is instead of picking from the catalog
    #[arg(short = 'm', long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Directory for the per-provider JSONL transcripts
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Also write transcripts to the SQLite store
    #[arg(long)]
    pub sqlite: bool,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure_tls: bool,

    /// Config file to read instead of the platform default
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List providers, their key status and model catalogs
    Providers,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            log_dir: self.log_dir.clone(),
            use_sqlite: self.sqlite,
            insecure_tls: self.insecure_tls,
        }
    }
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

// Diagnostics go to stderr so they never interleave with streamed text.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    match args.command {
        Some(Commands::Providers) => {
            let providers = load_builtin_providers();
            let credentials = Credentials::from_env(&providers);
            list_providers(&providers, &credentials, &mut io::stdout())?;
            Ok(())
        }
        Some(Commands::Chat) | None => {
            let config = Config::load(args.config.as_deref())?;
            let settings = Settings::from_env(&config, &args.overrides());
            let ctx = AppContext::from_settings(settings)?;
            let interrupts = InterruptHub::install();
            let mut renderer = TerminalRenderer::stdout();
            let mut input = StdinSource::stdin();

            let mut shell = Shell::new(
                &ctx,
                &interrupts,
                &mut renderer,
                &mut input,
                io::stdout(),
            )
            .with_model_override(args.model.clone());

            match args.provider.as_deref() {
                Some(provider) => shell.run_provider(provider).await?,
                None => shell.run().await?,
            }
            Ok(())
        }
    }
}
