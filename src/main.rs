use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use layershift::config::{Config, Selection};
use layershift::convert::CancelToken;
use layershift::pipeline::{Converter, analyze};
use layershift::provider::{create_provider, list_providers};

#[derive(Parser)]
#[command(name = "layershift", version)]
#[command(about = "Convert a layered Java codebase to Node.js with an LLM")]
struct Cli {
    /// Configuration file (default: layershift.json)
    #[arg(short, long, global = true, default_value = "")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the source tree, then convert the selected units
    Convert {
        /// Source directory (overrides config)
        #[arg(short, long)]
        source: Option<String>,

        /// Output directory (overrides config)
        #[arg(short, long)]
        output: Option<String>,

        /// Convert one controller with its matching service and DAO
        #[arg(long)]
        matched: bool,

        /// Ask the provider for unit descriptions and a project overview
        #[arg(long)]
        describe: bool,
    },

    /// Build the knowledge base only
    Analyze {
        /// Source directory (overrides config)
        #[arg(short, long)]
        source: Option<String>,

        /// Ask the provider for unit descriptions and a project overview
        #[arg(long)]
        describe: bool,
    },

    /// List known providers and whether each is configured
    Providers,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Convert {
            source,
            output,
            matched,
            describe,
        } => {
            if let Some(source) = source {
                config.source_dir = source;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            if matched {
                config.selection = Selection::Matched;
            }
            config.describe_units |= describe;
            config.validate()?;
            convert(&config)
        }
        Commands::Analyze { source, describe } => {
            if let Some(source) = source {
                config.source_dir = source;
            }
            config.validate()?;
            analyze_only(&config, describe)
        }
        Commands::Providers => {
            print_providers(&config);
            Ok(())
        }
    }
}

fn convert(config: &Config) -> Result<()> {
    let provider = create_provider(&config.provider).context("failed to initialize provider")?;
    info!(
        "Using provider {} ({})",
        provider.name(),
        config.provider.model_name()
    );

    let cancel = interrupt_token()?;
    let mut analysis = analyze(config)?;
    let mut converter = Converter::new(config, provider.as_ref(), cancel);

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("valid template")
            .progress_chars("█▓░"),
    );
    let summary = converter.run(&mut analysis, |position, total, unit| {
        pb.set_length(total as u64);
        pb.set_position(position as u64);
        pb.set_message(unit.name().to_string());
    })?;
    pb.finish_and_clear();

    println!(
        "Processed {} of {} units ({} chunks, {} oversized)",
        summary.units_processed, summary.units_scanned, summary.chunks_emitted, summary.oversized_chunks
    );
    for artifact in &summary.artifacts {
        println!("  ✓ {artifact}");
    }
    for failure in summary.failures.iter().filter(|f| f.kind.is_fatal_for_unit()) {
        println!("  ✗ {} [{}] {}", failure.path, failure.kind, failure.detail);
    }
    if summary.cancelled {
        println!("Cancelled: partial output kept in {}", config.output_dir);
    }
    println!("Summary written to {}", config.summary_path);
    Ok(())
}

/// Token cancelled by Ctrl-C. Provider loops stop at the next call and the
/// caller still writes what it has.
fn interrupt_token() -> Result<CancelToken> {
    let cancel = CancelToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping after the current provider call");
        handler_token.cancel();
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn analyze_only(config: &Config, describe: bool) -> Result<()> {
    let mut analysis = analyze(config)?;
    if describe {
        let provider =
            create_provider(&config.provider).context("failed to initialize provider")?;
        let cancel = interrupt_token()?;
        Converter::new(config, provider.as_ref(), cancel.clone()).describe(&mut analysis);
        if cancel.is_cancelled() {
            warn!("Descriptions cancelled; writing the records gathered so far");
        }
    }
    analysis
        .knowledge
        .write_json(Path::new(&config.knowledge_base_path))?;

    let stats = analysis.knowledge.statistics();
    println!("Analyzed {} modules", stats.total_modules);
    for (unit_type, count) in &stats.by_type {
        println!("  {unit_type}: {count}");
    }
    Ok(())
}

fn print_providers(config: &Config) {
    println!("Available LLM providers:");
    for status in list_providers(&config.provider) {
        let mark = if status.configured { "✓" } else { "✗" };
        println!("  {mark} {} ({})", status.name, status.id);
        if !status.configured {
            println!("      setup: {}", status.setup_hint);
        }
    }
    println!("Selected: {}", config.provider.name);
}
