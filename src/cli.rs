use crate::config::AppConfig;
use crate::error::AppError;
use crate::infra::{build_estimator, fetch_config};
use crate::server;
use crate::telemetry;
use crate::workflows::cases::domain::SAMPLE_STRIDE;
use crate::workflows::cases::SnapshotStore;
use crate::workflows::forecast::Forecast;
use crate::workflows::sampling::{PollError, SamplingPlan, SamplingPoller, UscisStatusClient};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "OPT Case Tracker",
    about = "Track USCIS I-765 case statuses and estimate approval dates from sampled snapshots",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Sweep a receipt range and write a snapshot file
    Sample(SampleArgs),
    /// Estimate the approval date for one receipt number
    Estimate(EstimateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug)]
pub(crate) struct SampleArgs {
    /// First sequence number of the sweep (inclusive)
    #[arg(long)]
    start: u32,
    /// End of the sweep (exclusive)
    #[arg(long)]
    end: u32,
    /// Distance between sampled sequence numbers
    #[arg(long, default_value_t = SAMPLE_STRIDE)]
    stride: u32,
    /// Base pause between fetches in seconds; the actual pause is one to
    /// two times this value
    #[arg(long, default_value_t = 5)]
    delay_secs: u64,
    /// Directory receiving the snapshot file
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
    /// Comma-separated proxy pool overriding the configured one
    #[arg(long)]
    proxies: Option<String>,
    /// Rotate the egress proxy every N fetches (0 disables rotation)
    #[arg(long)]
    rotate_every: Option<u32>,
}

#[derive(Args, Debug)]
pub(crate) struct EstimateArgs {
    /// Receipt number to estimate, e.g. YSC1790123456
    receipt: String,
    /// Snapshot version counting back from the newest capture
    #[arg(long, default_value_t = 0)]
    version: usize,
    /// Business days of history for the throughput window
    #[arg(long, default_value_t = 10)]
    history: u32,
    /// Directory holding snapshot files
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Sample(args) => run_sample(args).await,
        Command::Estimate(args) => run_estimate(args).await,
    }
}

async fn run_sample(args: SampleArgs) -> Result<(), AppError> {
    let SampleArgs {
        start,
        end,
        stride,
        delay_secs,
        snapshot_dir,
        proxies,
        rotate_every,
    } = args;

    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    if let Some(dir) = snapshot_dir {
        config.tracker.snapshot_dir = dir;
    }
    if let Some(raw) = proxies {
        config.tracker.proxy_pool = raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(every) = rotate_every {
        config.tracker.rotate_every = every;
    }

    let tracker = config.tracker;
    let plan = SamplingPlan {
        start,
        end,
        stride,
        base_delay: Duration::from_secs(delay_secs),
    };

    let path = tokio::task::spawn_blocking(move || -> Result<PathBuf, PollError> {
        let gateway = UscisStatusClient::connect(fetch_config(&tracker))?;
        let store = SnapshotStore::new(tracker.snapshot_dir.clone());
        let mut poller = SamplingPoller::new(Box::new(gateway), store);
        poller.run(plan)
    })
    .await??;

    println!("Snapshot written to {}", path.display());
    Ok(())
}

async fn run_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let EstimateArgs {
        receipt,
        version,
        history,
        snapshot_dir,
    } = args;

    let mut config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    if let Some(dir) = snapshot_dir {
        config.tracker.snapshot_dir = dir;
    }

    let tracker = config.tracker;
    let forecast = tokio::task::spawn_blocking(move || {
        let mut estimator = build_estimator(&tracker)?;
        estimator.estimate(&receipt, version, history)
    })
    .await??;

    render_forecast(&forecast);
    Ok(())
}

fn render_forecast(forecast: &Forecast) {
    println!("Result: {}", forecast.code_label);
    println!("{}", forecast.info);

    if let Some(date) = forecast.estimated_completion {
        println!("Estimated completion: {date}");
    }
    if let Some(pending) = forecast.pending_cases {
        println!("Pending cases ahead: {pending}");
    }
    if let Some(speed) = forecast.daily_speed {
        println!("Average daily approvals: {speed}");
    }
    if let Some(change) = forecast.speed_change_percent {
        println!("Speed change against the prior half-window: {change}%");
    }

    if !forecast.bucket_progress.is_empty() {
        println!("\nBucket completion");
        for (bucket, percent) in &forecast.bucket_progress {
            println!("- bucket {bucket}: {percent}%");
        }
    }
}
