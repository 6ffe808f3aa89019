use std::sync::Arc;

use colored::Colorize;
use visor_lens::{MemoryLensOpener, StoreSummary};
use visor_model::{MemoryBatch, MinerInfo};
use visor_store::StoreContext;

use crate::cli::*;
use crate::config::VisorConfig;
use crate::replay::{self, ReplayOutcome};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = VisorConfig::load(cli.config.as_deref())?;
    match cli.command {
        Command::Replay(args) => cmd_replay(apply_overrides(config, &args), &cli.format).await,
        Command::Config => cmd_config(&config),
    }
}

/// Command-line flags win over the file.
pub fn apply_overrides(mut config: VisorConfig, args: &ReplayArgs) -> VisorConfig {
    if let Some(tipsets) = args.tipsets {
        config.replay.tipsets = tipsets;
    }
    if let Some(miners) = args.miners {
        config.replay.miners = miners;
    }
    if let Some(seed) = args.seed {
        config.replay.seed = seed;
    }
    if let Some(start) = args.start_height {
        config.replay.start_height = start;
    }
    if args.no_instrument {
        config.instrumentation.enabled = false;
    }
    config
}

async fn cmd_replay(config: VisorConfig, format: &OutputFormat) -> anyhow::Result<()> {
    let ctx = StoreContext::background();
    let lens = replay::build_chain(&config, &ctx).await?;
    let opener = MemoryLensOpener::new(Arc::new(lens));
    let batch = MemoryBatch::new();
    let outcome = replay::replay(&opener, &config, &batch, &ctx).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print_outcome(&outcome, batch.row_count(MinerInfo::TABLE.name)),
    }
    Ok(())
}

fn print_outcome(outcome: &ReplayOutcome, rows: usize) {
    println!(
        "{} Replayed {} tipsets: {} miner infos ({} rows), {} messages, {} gas",
        "✓".green().bold(),
        outcome.tipsets.to_string().bold(),
        outcome.miner_infos,
        rows,
        outcome.messages,
        outcome.gas_used
    );
    if outcome.windows.is_empty() {
        println!("  Instrumentation {}", "off".dimmed());
        return;
    }
    for window in &outcome.windows {
        println!(
            "\nHeight {}  state {}",
            window.height.to_string().yellow().bold(),
            short(&window.state_root).cyan()
        );
        for summary in &window.summaries {
            print_summary(summary);
        }
    }
    println!(
        "\n{} gets, {} redundant",
        outcome.total_gets().to_string().bold(),
        outcome.redundant_gets().to_string().red()
    );
}

fn print_summary(summary: &StoreSummary) {
    let hottest = summary
        .most_requested
        .map(|k| format!("{} x{}", short(&k.key.to_hex()), k.count))
        .unwrap_or_else(|| "-".into());
    println!(
        "  {}/{} {}  gets {} unique {} redundant {}  hottest {}",
        summary.processor.green(),
        summary.method,
        summary.args.dimmed(),
        summary.total_gets,
        summary.unique_gets,
        summary.redundant_gets,
        hottest
    );
}

fn short(hex: &str) -> &str {
    &hex[..hex.len().min(12)]
}

fn cmd_config(config: &VisorConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
