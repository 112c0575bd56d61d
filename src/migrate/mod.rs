//! Move archived Amazon S3 objects back into the STANDARD storage class.
//!
//! Objects stored in Glacier are restored, copied onto themselves using
//! the STANDARD storage class (in parts, when they're too large for a
//! single copy), and the archived versions left behind are deleted.
use clap::{App, Arg, ArgMatches, SubCommand};
use rusoto_core::{credential::ChainProvider, region::Region, HttpClient};
use rusoto_s3::S3Client;

use std::time::Duration;

use crate::cli;
use crate::types::UtilResult;

pub mod bucket;
pub mod config;
pub mod copy;
pub mod migrator;
pub mod parts;
pub mod restore;

#[cfg(test)]
pub mod fake;

use self::bucket::S3Bucket;
use self::config::MigrateConfig;
use self::migrator::{Migrator, Stage};

/// Generates an appropriate `SubCommand` for this module.
pub fn cmd<'a, 'b>() -> App<'a, 'b> {
    SubCommand::with_name("migrate")
        .about("Restore Glacier objects and move them back to STANDARD")
        .args(&cli::global_args())
        .args(&[
            Arg::with_name("bucket")
                .help("An S3 bucket to migrate objects within")
                .index(1)
                .required(true),
            Arg::with_name("endpoint")
                .help("An endpoint URL to use for S3 requests")
                .long("endpoint")
                .takes_value(true),
            Arg::with_name("region")
                .help("The region of the bucket [default: from environment]")
                .long("region")
                .takes_value(true),
            Arg::with_name("part-size")
                .help("Size of each part of a multipart copy [default: 500MiB]")
                .long("part-size")
                .takes_value(true),
            Arg::with_name("threshold")
                .help("Objects above this size are copied in parts [default: 5GiB]")
                .long("threshold")
                .takes_value(true),
            Arg::with_name("poll-interval")
                .help("Delay between restore status checks [default: 60s]")
                .long("poll-interval")
                .takes_value(true),
            Arg::with_name("max-wait")
                .help("Maximum time to wait for restores [default: 48h]")
                .long("max-wait")
                .takes_value(true),
            Arg::with_name("restore-days")
                .help("Days to keep restored copies available [default: 1]")
                .long("restore-days")
                .takes_value(true),
            Arg::with_name("tier")
                .help("Retrieval tier used for restores [default: Standard]")
                .long("tier")
                .takes_value(true)
                .possible_values(config::TIERS),
            Arg::with_name("source-class")
                .help("Storage class to migrate from [default: GLACIER]")
                .long("source-class")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1),
            Arg::with_name("log-file")
                .help("File to append log output to")
                .long("log-file")
                .takes_value(true)
                .default_value("glacier_to_standard.log"),
        ])
}

/// Executes this subcommand and returns a `UtilResult` to indicate success.
pub async fn exec(args: &ArgMatches<'_>) -> UtilResult<()> {
    let config = MigrateConfig::from_args(args)?;
    let bucket = S3Bucket::new(client(&config)?, config.bucket.clone());

    // dry runs only report on what would be migrated
    if cli::is_dry_run(args) {
        let mut migrator = Migrator::new(&bucket, &config);

        for object in migrator.discover().await? {
            let path = if object.size > config.multipart_threshold {
                "multipart"
            } else {
                "single"
            };
            info!("Would migrate {} ({} bytes, {} copy)", object.key, object.size, path);
        }

        return Ok(());
    }

    let report = Migrator::new(&bucket, &config).run().await?;

    for stage in &[Stage::Cleaned, Stage::Copied, Stage::Failed] {
        let count = report.count(*stage);
        if count > 0 {
            info!("{} objects {}", count, stage);
        }
    }

    if !report.timed_out.is_empty() {
        return Err(format!(
            "{} objects did not finish restoring: {}",
            report.timed_out.len(),
            report.timed_out.join(", ")
        )
        .into());
    }

    Ok(())
}

/// Creates an S3 client honouring the endpoint and region overrides.
fn client(config: &MigrateConfig) -> UtilResult<S3Client> {
    let region = match (&config.endpoint, &config.region) {
        (Some(endpoint), name) => Region::Custom {
            name: name
                .clone()
                .unwrap_or_else(|| Region::default().name().to_string()),
            endpoint: endpoint.clone(),
        },
        (None, Some(name)) => name.parse()?,
        (None, None) => Region::default(),
    };

    // create provided with timeout
    let mut chain = ChainProvider::new();
    chain.set_timeout(Duration::from_millis(500));

    Ok(S3Client::new_with(HttpClient::new()?, chain, region))
}
