//! tempo-cli
//!
//! Command-line interface for the platform API:
//! - Read sensor data with rollups
//! - Fetch single datapoints
//! - List devices
//! - Delete datapoints
//! - Inspect monitoring rules

use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tempo_client::config::{generate_default_config, Config, LoggingConfig};
use tempo_client::query::{QueryBuilder, SelectionType, Selector};
use tempo_client::{Execution, HttpClient, HttpClientConfig, Outcome};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tempo-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query devices, sensors and monitoring rules on the time-series platform")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ~/.config/tempo/config.toml or ./tempo.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the API base URL
    #[arg(long, global = true)]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read sensor data
    Read {
        /// Device keys (any of)
        #[arg(short, long)]
        devices: Vec<String>,
        /// Sensor keys (any of)
        #[arg(short, long)]
        sensors: Vec<String>,
        /// Time range ending now (e.g., 6h, 7d, 4w)
        #[arg(short, long, default_value = "1d")]
        last: String,
        /// Rollup as function:period (e.g., mean:1hour)
        #[arg(short, long)]
        rollup: Option<String>,
        /// Convert timestamps to this time zone
        #[arg(long)]
        tz: Option<String>,
    },

    /// Fetch one datapoint per sensor
    Single {
        #[arg(short, long)]
        devices: Vec<String>,
        #[arg(short, long)]
        sensors: Vec<String>,
        /// Function: earliest, latest, before, after, exact, nearest
        #[arg(short, long, default_value = "latest")]
        function: String,
        /// Timestamp (ISO 8601) for functions that need one
        #[arg(short, long)]
        timestamp: Option<String>,
        /// Include device and sensor metadata in the result
        #[arg(long)]
        include_selection: bool,
    },

    /// List devices
    Devices {
        /// Device keys (any of)
        keys: Vec<String>,
        /// Attributes in key=value format (all must match)
        #[arg(short = 'A', long)]
        attributes: Vec<String>,
    },

    /// Delete a range of datapoints from one sensor
    DeleteDatapoints {
        device: String,
        sensor: String,
        /// Start (ISO 8601)
        #[arg(long)]
        start: String,
        /// End (ISO 8601)
        #[arg(long)]
        end: String,
    },

    /// Inspect a monitoring rule
    Rule {
        key: String,
        #[arg(value_enum, default_value = "show")]
        view: RuleView,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum RuleView {
    Show,
    Annotations,
    Changes,
    Logs,
    Usage,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let config = generate_default_config();
        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(path, &config)?;
                println!("Config written to {:?}", path);
            }
            None => print!("{}", config),
        }
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    if let Some(url) = cli.base_url.clone() {
        config.client.base_url = url;
    }

    init_logging(&config.logging);
    tracing::debug!(base_url = %config.client.base_url, "Using platform API");

    let client = HttpClient::new(HttpClientConfig::from(&config.client))
        .context("failed to create HTTP client")?;

    let execution = match cli.command {
        Commands::Read {
            devices,
            sensors,
            last,
            rollup,
            tz,
        } => {
            let end = Utc::now();
            let start = range_ending(end, &last)?;

            let mut query = select(client.query(SelectionType::Sensors), &devices, &sensors)?;
            if let Some(rollup) = rollup {
                let (function, period) = rollup
                    .split_once(':')
                    .with_context(|| format!("invalid rollup '{}', expected function:period", rollup))?;
                query = query.rollup(function, period, None);
            }
            if let Some(tz) = tz {
                query = query.convert_timezone(tz);
            }
            query.read(start, end).await?
        }

        Commands::Single {
            devices,
            sensors,
            function,
            timestamp,
            include_selection,
        } => {
            let timestamp = timestamp.as_deref().map(parse_time).transpose()?;
            select(client.query(SelectionType::Sensors), &devices, &sensors)?
                .single(function, timestamp, include_selection)
                .await?
        }

        Commands::Devices { keys, attributes } => {
            let mut query = select(client.query(SelectionType::Devices), &keys, &[])?;
            for attribute in &attributes {
                let (k, v) = attribute
                    .split_once('=')
                    .with_context(|| format!("invalid attribute '{}', expected key=value", attribute))?;
                query = query.filter(Selector::attribute(SelectionType::Devices, k, v))?;
            }
            query.read_all().await?
        }

        Commands::DeleteDatapoints {
            device,
            sensor,
            start,
            end,
        } => {
            client
                .query(SelectionType::Sensors)
                .filter(Selector::key(SelectionType::Devices, device))?
                .filter(Selector::key(SelectionType::Sensors, sensor))?
                .delete(Some(parse_time(&start)?), Some(parse_time(&end)?))
                .await?
        }

        Commands::Rule { key, view } => {
            let query = client
                .query(SelectionType::Rules)
                .filter(Selector::key(SelectionType::Rules, key))?;
            match view {
                RuleView::Show => query.read_all().await?,
                RuleView::Annotations => query.annotations().await?,
                RuleView::Changes => query.changes().await?,
                RuleView::Logs => query.logs().await?,
                RuleView::Usage => query.usage().await?,
            }
        }

        Commands::Config { .. } => unreachable!("handled before connecting"),
    };

    print_execution(&execution)
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| format!("tempo_client={},tempo_cli={}", logging.level, logging.level)),
    );

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Add key selectors for devices and sensors, any-of within each category
fn select<'a>(
    mut query: QueryBuilder<'a>,
    devices: &[String],
    sensors: &[String],
) -> anyhow::Result<QueryBuilder<'a>> {
    for (selection_type, keys) in [
        (SelectionType::Devices, devices),
        (SelectionType::Sensors, sensors),
    ] {
        let selector = match keys {
            [] => continue,
            [key] => Selector::key(selection_type, key),
            keys => Selector::or(keys.iter().map(|k| Selector::key(selection_type, k))),
        };
        query = query.filter(selector)?;
    }
    Ok(query)
}

fn print_execution(execution: &Execution) -> anyhow::Result<()> {
    let response = &execution.response;

    for advisory in execution.query.advisories() {
        eprintln!("warning: {}", advisory);
    }

    match response.json::<serde_json::Value>() {
        Ok(body) => println!("{}", serde_json::to_string_pretty(&body)?),
        Err(_) if response.body().is_empty() => {}
        Err(_) => println!("{}", response.body()),
    }

    match response.successful() {
        Outcome::Success => Ok(()),
        Outcome::Partial => {
            eprintln!("Partial success ({} {})", response.status(), response.reason());
            std::process::exit(2);
        }
        Outcome::Failure => {
            eprintln!("Request failed ({} {})", response.status(), response.reason());
            std::process::exit(1);
        }
    }
}

fn parse_time(s: &str) -> anyhow::Result<DateTime<Utc>> {
    match s {
        "now" => Ok(Utc::now()),
        _ => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid timestamp '{}', expected ISO 8601", s))?
            .with_timezone(&Utc)),
    }
}

/// Start of a `last`-style range that ends at `end`
fn range_ending(end: DateTime<Utc>, last: &str) -> anyhow::Result<DateTime<Utc>> {
    end.checked_sub_signed(parse_duration(last)?)
        .with_context(|| format!("Time range '{}' reaches before the earliest supported date", last))
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim().to_lowercase();

    let duration = if let Some(hours) = s.strip_suffix('h') {
        Duration::try_hours(hours.parse()?)
    } else if let Some(days) = s.strip_suffix('d') {
        Duration::try_days(days.parse()?)
    } else if let Some(weeks) = s.strip_suffix('w') {
        Duration::try_weeks(weeks.parse()?)
    } else {
        bail!("Invalid duration format: {}. Use: 6h, 7d, 4w", s)
    };

    duration.with_context(|| format!("Duration out of range: {}", s))
}
