//! `transithq fetch`: one retrieval, printed as GeoJSON.

use clap::Args;
use tracing::info;

use super::common::FeedArgs;
use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the fetch command.
#[derive(Debug, Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub feed: FeedArgs,

    /// Print compact JSON on one line
    #[arg(long)]
    pub compact: bool,
}

/// Retrieve one snapshot and print it as a GeoJSON FeatureCollection.
///
/// The collection goes to stdout so it can be piped; the count goes to
/// stderr.
pub fn run(args: FetchArgs, verbose: bool) -> Result<(), CliError> {
    let runner = CliRunner::new(verbose)?;
    runner.log_startup("fetch");

    let source = args.feed.resolve(runner.config());
    let feed = source.build()?;
    let snapshot = runner.runtime().block_on(feed.fetch())?;

    info!(
        feed = %feed.describe(),
        vehicles = snapshot.len(),
        rejected = snapshot.rejected(),
        "Fetched snapshot"
    );

    let collection = snapshot.to_feature_collection();
    let json = if args.compact {
        serde_json::to_string(&collection)
    } else {
        serde_json::to_string_pretty(&collection)
    }
    .map_err(|e| CliError::Output(e.to_string()))?;

    println!("{}", json);
    if snapshot.rejected() > 0 {
        eprintln!(
            "{} vehicles ({} malformed entries skipped)",
            collection.features.len(),
            snapshot.rejected()
        );
    } else {
        eprintln!("{} vehicles", collection.features.len());
    }

    Ok(())
}
