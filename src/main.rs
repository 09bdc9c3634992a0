use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;
use conncheck::export::{export_csv, export_json, generate_report};
use conncheck::prefs::Prefs;
use conncheck::probe::IcmpPinger;
use conncheck::{
    Config, MeasurementReport, ProbeRecord, ProbeSample, QualityChecker, QualityObserver,
    QualityVerdict, TransportError,
};

/// Collects a run for output and prints live lines in interactive mode
struct CliObserver {
    report: Mutex<MeasurementReport>,
    live: bool,
    done: Mutex<Option<oneshot::Sender<Option<QualityVerdict>>>>,
}

impl CliObserver {
    fn new(config: Config, live: bool, done: oneshot::Sender<Option<QualityVerdict>>) -> Self {
        Self {
            report: Mutex::new(MeasurementReport::new(config)),
            live,
            done: Mutex::new(Some(done)),
        }
    }
}

impl QualityObserver for CliObserver {
    fn on_start(&self) {
        if self.live {
            let report = self.report.lock();
            eprintln!(
                "Checking {} with {} probes...",
                report.target, report.config.count
            );
        }
    }

    fn on_progress(&self, fraction: f64) {
        debug!(progress = fraction, "Probe resolved");
    }

    fn on_sample(&self, record: &ProbeRecord) {
        if self.live {
            match record.sample {
                ProbeSample::Reply { rtt } => eprintln!(
                    "  seq={} time={:.1}ms",
                    record.sequence,
                    rtt.as_secs_f64() * 1000.0
                ),
                ProbeSample::Lost { reason } => {
                    eprintln!("  seq={} {}", record.sequence, reason.label())
                }
            }
        }
        self.report.lock().push(*record);
    }

    fn on_error(&self, error: &TransportError) {
        warn!(%error, "Quality check aborted");
        self.report.lock().error = Some(error.to_string());
    }

    fn on_finish(&self, verdict: Option<QualityVerdict>) {
        self.report.lock().verdict = verdict;
        if let Some(done) = self.done.lock().take() {
            let _ = done.send(verdict);
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "conncheck=debug",
        _ => "conncheck=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Defaults, then the config file, then command-line flags
fn load_config(args: &Args) -> Result<Config> {
    let prefs = match args.config {
        Some(ref path) => Prefs::load_from(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => Prefs::load(),
    };

    let mut config = Config::default();
    prefs.apply(&mut config)?;
    args.apply_to(&mut config).map_err(anyhow::Error::msg)?;
    config.validate()?;
    Ok(config)
}

fn save_config(args: &Args, config: &Config) -> Result<()> {
    let prefs = Prefs::from_config(config);
    match args.config {
        Some(ref path) => {
            prefs
                .save_to(path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Saved settings to {}", path.display());
        }
        None => {
            prefs.save().context("Failed to write config file")?;
            if let Some(path) = Prefs::path() {
                println!("Saved settings to {}", path.display());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    init_logging(args.verbose);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    debug!(?config, "Effective configuration");

    if args.save_config {
        return save_config(&args, &config);
    }

    let (done_tx, done_rx) = oneshot::channel();
    let observer = Arc::new(CliObserver::new(
        config.clone(),
        !args.is_batch_mode(),
        done_tx,
    ));

    let pinger = IcmpPinger::with_payload(config.target.clone(), config.payload_size);
    let checker = Arc::new(QualityChecker::new(pinger.clone(), &config, observer.clone()));
    checker.start();

    // Setup Ctrl+C handler
    let checker_clone = Arc::clone(&checker);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            checker_clone.cancel();
        }
    });

    let verdict = done_rx.await.ok().flatten();

    let report = {
        let mut report = observer.report.lock();
        report.resolved = pinger.target();
        report.clone()
    };

    if args.json {
        export_json(&report, std::io::stdout())?;
    } else if args.csv {
        export_csv(&report, std::io::stdout())?;
    } else if args.report {
        generate_report(&report, std::io::stdout())?;
    } else {
        match (verdict, report.error) {
            (Some(verdict), _) => println!("Quality: {}", verdict),
            (None, Some(error)) => eprintln!("Error: {}", error),
            (None, None) => eprintln!("Cancelled"),
        }
    }

    if verdict.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
