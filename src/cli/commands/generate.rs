//! Generate Command
//!
//! Stream a UI generation to the terminal, optionally converting the
//! result for a target framework.
//!
//! Usage:
//!   uiforge generate "a pricing card" --model gpt-4o
//!   uiforge generate "add a footer" --model llama3 --prior page.html
//!   uiforge generate "a tag list" --model gpt-4o --target react -o Tags.jsx

use console::style;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ConfigLoader;
use crate::convert::{ConversionTarget, convert_named};
use crate::markup;
use crate::orchestrator::{GenerationOutcome, Orchestrator, PartialReason};
use crate::provider::ProviderRouter;
use crate::quota::{MemoryUsageStore, QuotaLedger};
use crate::types::{GenerationRequest, Result};

pub struct GenerateOptions {
    pub prompt: String,
    pub model: String,
    pub user: String,
    pub prior: Option<PathBuf>,
    pub annotations: Vec<String>,
    pub target: Option<ConversionTarget>,
    pub name: String,
    pub output: Option<PathBuf>,
}

pub async fn run(options: GenerateOptions) -> Result<()> {
    let config = ConfigLoader::load()?;

    // Standalone runs account quota in-process; a service deployment
    // plugs a shared UsageStore in here instead.
    let store = Arc::new(MemoryUsageStore::new());
    let ledger = QuotaLedger::new(store, config.quota.limit_tokens, config.quota.window_secs);
    let router = Arc::new(ProviderRouter::from_config(&config)?);
    let orchestrator = Orchestrator::from_config(router, ledger.clone(), &config);

    let mut request = GenerationRequest::new(&options.user, &options.model, &options.prompt);
    if let Some(prior_path) = &options.prior {
        request = request.with_prior_markup(std::fs::read_to_string(prior_path)?);
    }
    for annotation in &options.annotations {
        request = request.with_annotation(annotation);
    }

    eprintln!(
        "{} {} via {}",
        style("Generating").cyan().bold(),
        style(&options.model).bold(),
        style(request.request_id).dim()
    );

    let mut handle = orchestrator.generate(request).await?;

    let mut stdout = std::io::stdout();
    while let Some(event) = handle.next_event().await {
        if !event.delta.is_empty() {
            write!(stdout, "{}", event.delta)?;
            stdout.flush()?;
        }
    }
    writeln!(stdout)?;

    let (text, usage) = match handle.outcome().await {
        GenerationOutcome::Completed { text, usage } => (text, usage),
        GenerationOutcome::PartiallyCompleted {
            text,
            usage,
            reason,
        } => {
            let why = match reason {
                PartialReason::StreamFault(fault) => fault.to_string(),
                PartialReason::Cancelled => "cancelled".to_string(),
            };
            eprintln!(
                "{} stream ended early ({why}); keeping partial output",
                style("Warning:").yellow().bold()
            );
            (text, usage)
        }
        GenerationOutcome::Failed(error) => return Err(error),
    };

    let approx = if usage.approximate { "~" } else { "" };
    eprintln!(
        "{} {approx}{} tokens ({} in / {} out)",
        style("Usage:").dim(),
        usage.total(),
        usage.input_tokens,
        usage.output_tokens
    );
    if let Ok(snapshot) = ledger.snapshot(&options.user) {
        eprintln!(
            "{} {} of {} tokens used this window",
            style("Quota:").dim(),
            snapshot.committed,
            snapshot.limit
        );
    }

    let Some(target) = options.target else {
        // Raw markup already streamed to stdout; only persist on request
        if let Some(path) = &options.output {
            std::fs::write(path, &text)?;
            eprintln!("{} {}", style("Wrote").green(), path.display());
        }
        return Ok(());
    };

    let tree = markup::parse(&text)?;
    let converted = convert_named(&tree, target, &options.name)?;
    eprintln!(
        "{} {} component {}",
        style("Converted:").green().bold(),
        target,
        style(&options.name).bold()
    );
    write_result(&options.output, &converted)
}

fn write_result(output: &Option<PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)?;
            eprintln!("{} {}", style("Wrote").green(), path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}
