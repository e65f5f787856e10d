//! Nichewatch CLI — entry point.

use clap::{Parser, Subcommand, ValueEnum};

use nichewatch::config::{resolve_profile_dir, Platform, PlatformSpec, SpiderConfig};
use nichewatch::pipeline::AcquisitionPipeline;
use nichewatch::session::{SessionHealthMonitor, SessionStore, SessionVerifier};
use nichewatch::{BrowserSession, FingerprintPolicy};

#[derive(Parser)]
#[command(
    name = "nichewatch",
    about = "Market-signal acquisition for RedNote and Goofish",
    version
)]
struct Cli {
    /// Browser profile directory (defaults to NICHEWATCH_PROFILE or
    /// ~/.nichewatch/browser_profile).
    #[arg(short, long)]
    profile: Option<String>,

    /// Target platform.
    #[arg(long, value_enum, default_value = "rednote")]
    platform: PlatformArg,

    /// Run with a visible browser window.
    #[arg(long)]
    headed: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlatformArg {
    Rednote,
    Goofish,
}

impl From<PlatformArg> for Platform {
    fn from(arg: PlatformArg) -> Self {
        match arg {
            PlatformArg::Rednote => Platform::RedNote,
            PlatformArg::Goofish => Platform::Goofish,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Extract items for one or more search keys.
    Acquire {
        /// Search keys, processed in order.
        #[arg(required = true)]
        keys: Vec<String>,

        /// Write the result JSON to a file instead of stdout.
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Check whether the persisted session is still logged in.
    Verify {
        /// Treat inconclusive checks as failures.
        #[arg(long)]
        strict: bool,
    },

    /// Score session health and print the report.
    Health {
        /// Write the report JSON to a file instead of stdout.
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn spider_config(cli: &Cli) -> SpiderConfig {
    let mut config = SpiderConfig::default().with_profile_dir(resolve_profile_dir(cli.profile.as_deref()));
    config.headless = !cli.headed;
    config
}

fn emit(value: &serde_json::Value, output: Option<&str>) -> anyhow::Result<()> {
    let pretty = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, pretty)?,
        None => println!("{pretty}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = spider_config(&cli);
    let platform: Platform = cli.platform.into();
    let spec = PlatformSpec::for_platform(platform);

    match &cli.command {
        Commands::Acquire { keys, output } => {
            let mut policy = FingerprintPolicy::new();
            let session = BrowserSession::launch(&config, &mut policy).await?;
            let pipeline = AcquisitionPipeline::new(spec, &config);
            let outcome = pipeline.run(&session, keys).await;
            session.close().await;
            let outcome = outcome?;

            emit(
                &serde_json::json!({
                    "generated_at": chrono::Utc::now(),
                    "platform": platform,
                    "results": outcome.results,
                    "stats": outcome.stats,
                }),
                output.as_deref(),
            )?;
        }

        Commands::Verify { strict } => {
            let store = SessionStore::new(&config.profile_dir, config.min_profile_bytes);
            let verifier = SessionVerifier::new(store, spec);
            let mut policy = FingerprintPolicy::new();
            let session = BrowserSession::launch(&config, &mut policy).await?;
            let verdict = verifier.verify(&session, *strict).await;
            session.close().await;

            emit(&serde_json::to_value(&verdict)?, None)?;
            if !verdict.ok {
                std::process::exit(1);
            }
        }

        Commands::Health { output } => {
            let mut policy = FingerprintPolicy::new();
            let session = BrowserSession::launch(&config, &mut policy).await?;
            let mut monitor = SessionHealthMonitor::new(spec);
            let report = monitor.check_health(&session).await;
            session.close().await;

            emit(&serde_json::to_value(&report)?, output.as_deref())?;
        }
    }

    Ok(())
}
