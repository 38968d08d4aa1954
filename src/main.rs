mod config;
mod entsoe;
mod generation;
mod plants;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{Level, error, info};

use crate::config::Config;
use crate::entsoe::EntsoeClient;
use crate::generation::report::{CountryOutcome, GenerationReporter};

/// Environment variable consulted when `--log-level` is not given
const LOG_LEVEL_ENV: &str = "ENTSOE_MIX_LOG";
const DEFAULT_LOG_LEVEL: &str = "info";

/// European generation mix reports and renewable plant maps
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// TOML file overriding the built-in configuration
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Log level: error, warn, info, debug or trace
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch recent generation per country and write generation mix charts
    Generation {
        /// Directory for chart files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// ENTSO-E security token (defaults to the configured environment variable)
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Map solar and wind plants from the global power plant database
    Plants {
        /// Path to the plant database CSV
        #[arg(short, long)]
        database: Option<PathBuf>,
        /// Directory for the map file
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
    /// List the area keys accepted in the country configuration
    Areas,
}

fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let level = match log_level {
        Some(level) => level.to_string(),
        None => std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string()),
    };
    let level: Level = level
        .parse()
        .with_context(|| format!("Unknown log level: {level}"))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
    Ok(())
}

async fn handle_generation_command(
    config: Config,
    output_dir: Option<PathBuf>,
    api_key: Option<String>,
) -> Result<()> {
    let generation = config.generation;
    let api_key = match api_key {
        Some(key) => key,
        None => std::env::var(&generation.api_key_env).with_context(|| {
            format!("{} environment variable not set", generation.api_key_env)
        })?,
    };
    let output_dir = output_dir.unwrap_or_else(|| generation.output_dir.clone());

    let client = EntsoeClient::new(api_key).with_base_url(&generation.api_url);
    let mapping = generation.category_mapping()?;
    let reporter = GenerationReporter::new(&client, &generation, mapping);

    let results = reporter.run(&output_dir, Utc::now()).await?;

    let reported = results
        .iter()
        .filter(|(_, outcome)| matches!(outcome, CountryOutcome::Reported(_)))
        .count();
    info!(
        "Reported {} of {} countries, charts in {}",
        reported,
        results.len(),
        output_dir.display()
    );

    Ok(())
}

fn handle_plants_command(
    config: Config,
    database: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let settings = config.plants;
    let database = database.unwrap_or_else(|| settings.database.clone());
    let output_dir = output_dir.unwrap_or_else(|| settings.output_dir.clone());
    let fuels = settings.fuel_names();

    fs::create_dir_all(&output_dir).with_context(|| {
        format!("Failed to create output directory: {}", output_dir.display())
    })?;

    let plants = plants::load_plants(&database)?;
    let selected = plants::filter_plants(&plants, &settings.countries, &fuels);
    let summary = plants::summarize(&selected, &settings.countries, &fuels);
    plants::log_summary(selected.len(), &summary);

    plants::map::write_map(&selected, &settings, &output_dir)?;
    info!("Process completed successfully!");

    Ok(())
}

fn handle_areas_command() {
    for key in entsoe::areas::list_keys() {
        if let Some(area) = entsoe::areas::lookup(key) {
            println!("{:<8} {:<18} {}", area.key, area.code, area.name);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    let result = match cli.command {
        Commands::Generation {
            output_dir,
            api_key,
        } => handle_generation_command(config, output_dir, api_key).await,
        Commands::Plants {
            database,
            output_dir,
        } => handle_plants_command(config, database, output_dir),
        Commands::Areas => {
            handle_areas_command();
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("An error occurred: {:#}", e);
    }
    result
}
