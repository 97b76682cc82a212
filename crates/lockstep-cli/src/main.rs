//! Lockstep CLI - runs the barrier-synchronized stream join.

use anyhow::Result;
use clap::{Parser, Subcommand};
use lockstep_core::config::{LogFormat, MonitoringConfig};
use lockstep_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Process exit status for each failure class.
///
/// Signal exits use the shell convention of 128 plus the signal number.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Command completed
    Success = 0,
    /// Configuration error (invalid config file, bad sizing)
    ConfigError = 1,
    /// Input error (unreadable or malformed record files)
    InputError = 2,
    /// An evaluator stopped on a pipeline error
    PipelineError = 3,
    /// Demo output did not match the expected data set
    VerificationError = 4,
    /// Anything not classified above
    RuntimeError = 10,
    /// Stopped by SIGINT or SIGTERM
    SignalInterrupt = 130,
}

impl ExitCode {
    /// Convert an error to an exit code, preferring the typed core error.
    fn from_error(error: &anyhow::Error) -> Self {
        if let Some(core) = error.downcast_ref::<lockstep_core::Error>() {
            return match core {
                lockstep_core::Error::Config(_) => ExitCode::ConfigError,
                lockstep_core::Error::Pipeline(_) | lockstep_core::Error::Buffer(_) => {
                    ExitCode::PipelineError
                }
                lockstep_core::Error::Io(_) | lockstep_core::Error::Serialization(_) => {
                    ExitCode::InputError
                }
                lockstep_core::Error::Worker(_) => ExitCode::RuntimeError,
            };
        }
        if error.downcast_ref::<commands::Interrupted>().is_some() {
            return ExitCode::SignalInterrupt;
        }

        let error_str = error.to_string().to_lowercase();

        if error_str.contains("config") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else if error_str.contains("mismatch") {
            ExitCode::VerificationError
        } else if error_str.contains("line") || error_str.contains("read") {
            ExitCode::InputError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;

#[derive(Parser)]
#[command(name = "lockstep")]
#[command(about = "Barrier-synchronized stream join CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the generated three-letter data set and verify the output
    Demo {
        /// Value added to the primary stream and subtracted via the secondary
        #[arg(long, default_value_t = -10, allow_hyphen_values = true)]
        offset: i64,
    },

    /// Join two JSON-lines record files
    Join {
        /// Primary stream, one {"key", "value"} object per line
        #[arg(long)]
        primary: PathBuf,

        /// Secondary stream, one {"key", "value"} object per line
        #[arg(long)]
        secondary: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print pipeline metrics to stderr when done
        #[arg(long)]
        metrics: bool,
    },

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() {
    let exit_code = run_cli().await;
    std::process::exit(exit_code as i32);
}

/// Parse arguments, set up logging, and run the chosen command.
async fn run_cli() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match execute_command(cli).await {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            ExitCode::from_error(&e)
        }
    }
}

/// Install the tracing subscriber.
///
/// Level and format come from the config file when it parses. `-v` flags
/// override the level and `RUST_LOG` overrides both.
fn init_logging(cli: &Cli) {
    let monitoring: MonitoringConfig = cli
        .config
        .as_deref()
        .and_then(|path| std::fs::read_to_string(path).ok())
        .and_then(|content| toml::from_str::<Config>(&content).ok())
        .map(|config| config.monitoring)
        .unwrap_or_default();

    let directive = match cli.verbose {
        0 => monitoring.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    // stderr keeps stdout free for joined records
    let registry = tracing_subscriber::registry().with(filter);
    match monitoring.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Execute the CLI command.
async fn execute_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Demo { offset } => {
            let config = load_config(&cli.config)?;
            commands::demo::run(config, offset).await?;
        }

        Commands::Join {
            primary,
            secondary,
            output,
            metrics,
        } => {
            let config = load_config(&cli.config)?;
            commands::join::run(config, &primary, &secondary, output.as_deref(), metrics).await?;
        }

        Commands::Validate => {
            let path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from("config.toml"));
            Config::from_file(&path)?;
            println!("Configuration is valid");
        }
    }

    Ok(())
}

/// Load the config file when given, otherwise fall back to defaults.
fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}
