use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codexplain::cli::commands::explain::ExplainOptions;

/// Parse provider name from string
fn parse_provider(s: &str) -> Result<String, String> {
    let name = s.to_lowercase();
    if codexplain::config::KNOWN_PROVIDERS.contains(&name.as_str()) {
        Ok(name)
    } else {
        Err(format!(
            "Invalid provider '{}'. Valid values: {}",
            s,
            codexplain::config::KNOWN_PROVIDERS.join(", ")
        ))
    }
}

#[derive(Parser)]
#[command(name = "codexplain")]
#[command(
    version,
    about = "Explain source code with LLMs, with provider failover and result caching"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    verbose: bool,

    #[arg(long, short, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Explain a source file or every matching file in a directory
    Explain {
        #[arg(long, short, help = "Input file or directory")]
        input: PathBuf,
        #[arg(long, short, help = "Programming language")]
        language: String,
        #[arg(
            long,
            short,
            help = "Markdown report file, or output directory for directory input"
        )]
        output: Option<PathBuf>,
        #[arg(long, default_value = "*", help = "File pattern for directory input")]
        pattern: String,
        #[arg(long, value_parser = parse_provider, help = "Use only this provider (gemini, ollama)")]
        provider: Option<String>,
        #[arg(long = "no-metrics", help = "Don't show performance metrics")]
        no_metrics: bool,
    },

    /// List configured providers and their availability
    Providers,

    /// Manage the result cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache statistics
    Stats,
    /// Remove every cached explanation
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(
            short = 'f',
            long,
            default_value = "toml",
            help = "Output format: toml, json"
        )]
        format: String,
    },
    /// Show configuration file paths
    Path,
}

/// Print a short crash report before handing off to the default hook
fn install_panic_hook() {
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());

        eprintln!();
        eprintln!("{} {}", style("codexplain crashed:").red().bold(), message);
        if let Some(at) = info.location() {
            eprintln!("{}", style(format!("  at {}:{}", at.file(), at.line())).dim());
        }

        // RUST_BACKTRACE handling lives in the default hook
        previous(info);
    }));
}

fn main() -> ExitCode {
    install_panic_hook();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let rt = Runtime::new()?;

    match cli.command {
        Commands::Explain {
            input,
            language,
            output,
            pattern,
            provider,
            no_metrics,
        } => {
            rt.block_on(codexplain::cli::commands::explain::run(ExplainOptions {
                input,
                language,
                output,
                pattern,
                provider,
                show_metrics: !no_metrics,
                quiet: cli.quiet,
            }))?;
        }
        Commands::Providers => {
            rt.block_on(codexplain::cli::commands::providers::run())?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Stats => rt.block_on(codexplain::cli::commands::cache::stats())?,
            CacheAction::Clear => rt.block_on(codexplain::cli::commands::cache::clear())?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                codexplain::cli::commands::config::show(&format)?;
            }
            ConfigAction::Path => {
                codexplain::cli::commands::config::path()?;
            }
        },
    }

    Ok(())
}
