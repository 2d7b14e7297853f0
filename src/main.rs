use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use uiforge::convert::ConversionTarget;

#[derive(Parser)]
#[command(name = "uiforge")]
#[command(
    version,
    about = "Streaming UI generation with multi-framework conversion"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate UI markup from a prompt, streaming to the terminal
    Generate {
        #[arg(help = "What to generate")]
        prompt: String,
        #[arg(long, short, help = "Model identifier (see 'uiforge models')")]
        model: String,
        #[arg(long, short, default_value = "local", help = "User for quota accounting")]
        user: String,
        #[arg(long, help = "Existing markup to refine")]
        prior: Option<PathBuf>,
        #[arg(long = "note", help = "Extra instruction, repeatable")]
        annotations: Vec<String>,
        #[arg(long, short, value_enum, help = "Convert the result for a framework")]
        target: Option<ConversionTarget>,
        #[arg(long, default_value = "UiGenerated", help = "Component name (PascalCase)")]
        name: String,
        #[arg(long, short, help = "Write result to a file instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Convert existing markup for a framework (no model involved)
    Convert {
        #[arg(help = "Markup file, stdin when omitted")]
        input: Option<PathBuf>,
        #[arg(long, short, value_enum, help = "Target framework")]
        target: ConversionTarget,
        #[arg(long, default_value = "UiGenerated", help = "Component name (PascalCase)")]
        name: String,
        #[arg(long, short, help = "Write result to a file instead of stdout")]
        output: Option<PathBuf>,
    },

    /// List registered models
    Models {
        #[arg(long, help = "Also check provider reachability")]
        health: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration (merged from all sources)
    Show {
        #[arg(short = 'f', long, default_value = "text", help = "Output format: text, json")]
        format: String,
    },
    /// Show configuration file paths
    Path,
    /// Initialize configuration
    Init {
        #[arg(long, help = "Overwrite existing config")]
        force: bool,
    },
}

/// Set up panic handler for graceful error reporting
fn setup_panic_handler() {
    let default_hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |panic_info| {
        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("\n\x1b[1;31m━━━ PANIC ━━━\x1b[0m");
        eprintln!("\x1b[31muiforge encountered an unexpected error:\x1b[0m");
        eprintln!("  {}", message);

        if let Some(location) = panic_info.location() {
            eprintln!(
                "\x1b[90mLocation: {}:{}:{}\x1b[0m",
                location.file(),
                location.line(),
                location.column()
            );
        }
        eprintln!();

        default_hook(panic_info);
    }));
}

fn main() -> ExitCode {
    setup_panic_handler();

    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError:\x1b[0m {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_cli() -> uiforge::types::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Generate {
            prompt,
            model,
            user,
            prior,
            annotations,
            target,
            name,
            output,
        } => {
            let rt = Runtime::new()?;
            rt.block_on(uiforge::cli::commands::generate::run(
                uiforge::cli::commands::generate::GenerateOptions {
                    prompt,
                    model,
                    user,
                    prior,
                    annotations,
                    target,
                    name,
                    output,
                },
            ))?;
        }
        Commands::Convert {
            input,
            target,
            name,
            output,
        } => {
            uiforge::cli::commands::convert::run(input, target, &name, output)?;
        }
        Commands::Models { health } => {
            let rt = Runtime::new()?;
            rt.block_on(uiforge::cli::commands::models::run(health))?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show { format } => {
                uiforge::cli::commands::config::show(&format)?;
            }
            ConfigAction::Path => {
                uiforge::cli::commands::config::path()?;
            }
            ConfigAction::Init { force } => {
                uiforge::cli::commands::config::init(force)?;
            }
        },
    }

    Ok(())
}
