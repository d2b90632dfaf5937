//! Market Harvester
//!
//! Runs scheduled royalty harvesting against the configured launch markets.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use market_harvester::{load_config, HarvesterConfig, HarvesterRuntime};

/// Royalty harvester for launch markets
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "market-harvester")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "HARVEST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured cadence
    #[arg(long, global = true, env = "HARVEST_CADENCE_SECS")]
    cadence_secs: Option<u64>,

    /// Override the configured per-cycle cost ceiling
    #[arg(long, global = true, env = "HARVEST_COST_CEILING")]
    cost_ceiling: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start harvesting
    Run {
        /// Run a single cycle, print its report as JSON and exit
        #[arg(long)]
        once: bool,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}

impl Cli {
    fn resolve_config(&self) -> Result<HarvesterConfig> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(cadence) = self.cadence_secs {
            config.cadence_secs = cadence;
        }
        if let Some(ceiling) = self.cost_ceiling {
            config.cost_ceiling_per_cycle = Some(ceiling);
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    match cli.command {
        Command::CheckConfig => {
            println!(
                "Configuration OK: {} asset(s), cadence {}s, cost ceiling {}",
                config.assets.len(),
                config.cadence_secs,
                config
                    .cost_ceiling_per_cycle
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
            Ok(())
        }
        Command::Run { once } => {
            let runtime = HarvesterRuntime::from_config(&config).await?;

            if once {
                let result = runtime.orchestrator.run_once().await;
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            let service = runtime.service();
            service.start().await?;

            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
            service.stop().await?;

            if let Some(result) = service.last_result().await {
                info!(
                    cycles = service.cycles_completed().await,
                    last_harvested = result.harvested,
                    last_skipped = result.skipped,
                    "Harvester exiting"
                );
            }
            Ok(())
        }
    }
}
