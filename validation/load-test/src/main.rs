//! Load test CLI for the parking management web app.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use load_test::{LoadRunner, ResultsReport, TestConfig, TestResults};

#[derive(Parser)]
#[command(name = "load-test")]
#[command(about = "Virtual-user load testing tool for the parking management app", long_about = None)]
struct Cli {
    /// Log level
    #[arg(long, env = "LOAD_TEST_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test from a scenario file
    Run {
        /// Path to scenario YAML file
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override target number of concurrent users
        #[arg(short, long)]
        users: Option<u32>,

        /// Override ramp-up duration in seconds
        #[arg(short, long)]
        ramp: Option<u64>,

        /// Override test duration in seconds
        #[arg(short, long)]
        duration: Option<u64>,

        /// Override target host (base URL)
        #[arg(long, env = "LOAD_TEST_HOST")]
        host: Option<String>,

        /// Override RNG seed
        #[arg(long)]
        seed: Option<u64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },

    /// Run a quick smoke test with the built-in browsing scenario
    Quick {
        /// Base URL
        #[arg(long, env = "LOAD_TEST_HOST", default_value = "http://localhost:5173")]
        url: String,

        /// Number of users
        #[arg(short, long, default_value = "5")]
        users: u32,

        /// Test duration in seconds
        #[arg(short, long, default_value = "30")]
        duration: u64,
    },

    /// List available scenarios
    List {
        /// Scenarios directory
        #[arg(short, long, default_value = "validation/load-test/scenarios")]
        dir: PathBuf,
    },
}

fn init_tracing(log_level: &str, json: bool) -> anyhow::Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Reports go to stdout, logs to stderr.
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn print_results(results: &TestResults, output: OutputFormat) -> anyhow::Result<()> {
    match output {
        OutputFormat::Json => println!("{}", ResultsReport::format_json(results)?),
        OutputFormat::Csv => {
            println!("{}", ResultsReport::csv_header());
            println!("{}", ResultsReport::format_csv(results));
        }
        OutputFormat::Table => println!("{}", ResultsReport::format_table(results)),
    }
    Ok(())
}

fn list_scenarios(dir: &Path) -> anyhow::Result<()> {
    println!("Available scenarios in {}:", dir.display());
    println!();

    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read scenario directory {}", dir.display()))?;

    let mut scenarios = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        );
        if !is_yaml {
            continue;
        }
        // Try to load the config to get name and description
        match TestConfig::from_file(&path) {
            Ok(config) => {
                let filename = entry.file_name().to_string_lossy().to_string();
                scenarios.push((filename, config.name, config.description));
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping scenario"),
        }
    }

    scenarios.sort_by(|a, b| a.0.cmp(&b.0));

    if scenarios.is_empty() {
        println!("No scenario files found");
    } else {
        for (filename, name, desc) in scenarios {
            println!("  {} - {}", filename, name);
            println!("    {}", desc);
            println!();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json)?;

    match cli.command {
        Commands::Run {
            scenario,
            users,
            ramp,
            duration,
            host,
            seed,
            output,
        } => {
            info!(scenario = %scenario.display(), "Loading scenario");

            // Load and validate configuration
            let mut config = TestConfig::from_file(&scenario)?;

            // Apply overrides
            if let Some(u) = users {
                config.concurrency = u;
            }
            if let Some(r) = ramp {
                config.ramp_secs = r;
            }
            if let Some(d) = duration {
                config.duration_secs = d;
            }
            if let Some(h) = host {
                config.base_url = h;
            }
            if seed.is_some() {
                config.seed = seed;
            }

            config.validate()?;

            println!("✓ Configuration loaded successfully");
            println!("  Name: {}", config.name);
            println!("  Description: {}", config.description);
            println!();

            let results = LoadRunner::new(config).run().await?;
            print_results(&results, output)
        }
        Commands::Quick {
            url,
            users,
            duration,
        } => {
            let mut config = TestConfig::parking_default(url);
            config.name = "quick".to_string();
            config.description = "Quick smoke test".to_string();
            config.concurrency = users;
            config.duration_secs = duration;
            config.ramp_secs = config.ramp_secs.min(duration / 2);

            let results = LoadRunner::new(config).run().await?;
            print_results(&results, OutputFormat::Table)
        }
        Commands::List { dir } => list_scenarios(&dir),
    }
}
