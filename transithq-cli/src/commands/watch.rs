//! `transithq watch`: mount a view and follow the feed.
//!
//! The view runs on the headless surface, so the command shows exactly what
//! a map would be told to draw: one status line per update.
//!
//! ```text
//! feed ──► poller ──► ViewController ──► sink ──► headless surface
//!                          │
//!                          └──► status ──► stdout
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing::info;
use transithq::sink::SinkMode;
use transithq::surface::HeadlessSurfaceFactory;
use transithq::view::{ViewController, ViewStatus};

use super::common::{DisplayMode, FeedArgs};
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the watch command.
#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// Display mode (overrides map.mode)
    #[arg(long, value_enum)]
    pub mode: Option<DisplayMode>,

    /// Seconds between retrievals (overrides feed.interval_secs)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    pub duration: Option<u64>,

    /// Print each status as a JSON object
    #[arg(long)]
    pub json: bool,
}

/// Run the watch command until Ctrl+C or `--duration` elapses.
pub fn run(args: WatchArgs, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("watch");

    let mut view_config = runner.config().view_config();
    if let Some(mode) = args.mode {
        view_config = view_config.with_mode(SinkMode::from(mode));
    }
    if let Some(secs) = args.interval {
        view_config = view_config.with_poll_interval(Duration::from_secs(secs));
    }

    let source = args.feed.resolve(runner.config());
    let feed = source.build()?;

    if !args.json {
        println!("TransitHQ v{}", transithq::VERSION);
        println!("================");
        println!();
        println!("Feed:      {}", feed.describe());
        println!("Mode:      {}", view_config.mode);
        println!("Interval:  {}s", view_config.poll_interval.as_secs());
        println!();
        println!("Press Ctrl+C to stop.");
        println!();
    }

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    ctrlc::set_handler(move || ctrlc_token.cancel())
        .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;

    let factory = Arc::new(HeadlessSurfaceFactory::default());
    let (controller, handle) = ViewController::new(view_config, feed, factory);
    let json = args.json;

    let summary = runner.runtime().block_on(async move {
        let view = tokio::spawn(controller.run(shutdown.clone()));

        if let Some(secs) = args.duration {
            let timer_token = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(secs)).await;
                timer_token.cancel();
            });
        }

        let mut status = handle.status();
        let mut printer = StatusPrinter::new(json);
        loop {
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    printer.observe(&current)?;
                }
                _ = shutdown.cancelled() => break,
            }
        }

        view.await.map_err(|e| CliError::Task(e.to_string()))??;
        Ok::<_, CliError>(printer.finish())
    })?;

    info!(updates = summary.updates, "Watch finished");
    if !json {
        println!();
        println!(
            "Stopped after {} updates ({} failed retrievals).",
            summary.updates, summary.failures
        );
    }

    Ok(())
}

/// Totals reported when the watch ends.
#[derive(Debug, Default, PartialEq)]
struct WatchSummary {
    updates: u64,
    failures: u64,
}

/// Prints a status whenever the displayed snapshot changes or a retrieval fails.
struct StatusPrinter {
    json: bool,
    last_sequence: u64,
    last_failures: u64,
    summary: WatchSummary,
}

impl StatusPrinter {
    fn new(json: bool) -> Self {
        Self {
            json,
            last_sequence: 0,
            last_failures: 0,
            summary: WatchSummary::default(),
        }
    }

    /// Returns whether the status was printed.
    fn observe(&mut self, status: &ViewStatus) -> Result<bool, CliError> {
        let new_snapshot = status.sequence != self.last_sequence;
        // The status channel coalesces, so count by the view's running total.
        let new_failures = status.failures.saturating_sub(self.last_failures);
        if !new_snapshot && new_failures == 0 {
            return Ok(false);
        }

        if new_snapshot {
            self.summary.updates += 1;
        }
        self.summary.failures += new_failures;
        self.last_sequence = status.sequence;
        self.last_failures = status.failures;

        if self.json {
            let line = serde_json::to_string(status).map_err(|e| CliError::Output(e.to_string()))?;
            println!("{}", line);
        } else if status.error.is_some() {
            println!("{}", style(status.status_line()).yellow());
        } else {
            println!("{}", status.status_line());
        }
        Ok(true)
    }

    fn finish(self) -> WatchSummary {
        self.summary
    }
}
