use camino::Utf8PathBuf;
use clap::{ArgAction, Parser, ValueEnum};
use convergence_harness::sim::{SimulatedServer, SimulationConfig};
use convergence_harness::webdriver::WebDriverFactory;
use convergence_harness::{HarnessConfig, ScenarioRunner, SurfaceFactory};
use eyre::{Result as EyreResult, WrapErr};
use tokio::fs::create_dir_all;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, OutputWriter};

mod output;

/// Offline convergence scenarios for a collaborative document page
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a JSON configuration file
    #[arg(long, value_name = "PATH", env = "E2E_CONFIG")]
    pub config: Option<Utf8PathBuf>,

    /// Where sessions are opened
    #[arg(long, value_enum, default_value_t)]
    pub backend: Backend,

    /// WebDriver endpoint, overrides the configuration file
    #[arg(long, value_name = "URL", env = "E2E_WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    /// Page under test, overrides the configuration file
    #[arg(long, value_name = "URL", env = "E2E_BASE_URL")]
    pub base_url: Option<String>,

    /// Sessions opened per scenario
    #[arg(long)]
    pub sessions: Option<usize>,

    /// Seed for random action selection and delays
    #[arg(long, env = "E2E_SEED")]
    pub seed: Option<u64>,

    /// Also run quarantined scenarios
    #[arg(long)]
    pub include_quarantined: bool,

    /// Only run scenarios whose name contains this string
    #[arg(long)]
    pub filter: Option<String>,

    /// Directory for the markdown report
    #[arg(long, value_name = "PATH", default_value = "./e2e-output")]
    pub output_dir: Utf8PathBuf,

    #[arg(long, value_enum, default_value_t)]
    pub output_format: OutputFormat,

    /// Enable verbose logging (can be specified multiple times)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum Backend {
    /// Browser pages driven over the WebDriver protocol
    #[default]
    Webdriver,
    /// In-process stand-in for the page and its sync server
    Simulated,
}

#[tokio::main]
async fn main() -> EyreResult<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "convergence_harness=info,e2e_tests=info".into()),
        1 => EnvFilter::new("convergence_harness=debug,e2e_tests=debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {path}");
            HarnessConfig::load(path).await?
        }
        None => HarnessConfig::default(),
    };

    if let Some(webdriver_url) = args.webdriver_url {
        config.target.webdriver_url = webdriver_url;
    }
    if let Some(base_url) = args.base_url {
        config.target.base_url = base_url;
    }
    if let Some(sessions) = args.sessions {
        config.sessions = sessions;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    create_dir_all(&args.output_dir)
        .await
        .wrap_err_with(|| format!("failed to create output dir '{}'", args.output_dir))?;

    let factory: Box<dyn SurfaceFactory> = match args.backend {
        Backend::Webdriver => Box::new(WebDriverFactory::new(&config.target)?),
        Backend::Simulated => Box::new(SimulatedServer::new(SimulationConfig::default())),
    };

    let output_writer = OutputWriter::new(args.output_format);

    let runner = ScenarioRunner::new(factory.as_ref(), config)
        .include_quarantined(args.include_quarantined)
        .with_filter(args.filter);

    output_writer.write_header(&format!("Running scenarios (seed {})", runner.seed()), 1);

    let report = runner.run().await;

    output_writer.write_report(&report);

    let report_file = report.store_to_file(&args.output_dir).await?;
    output_writer.write_str(&format!("Report written to {report_file}"));

    report.result()
}
