//! Validated configuration of a migration run.
use clap::ArgMatches;

use std::time::Duration;

use super::bucket::GLACIER;
use crate::cli;
use crate::types::UtilResult;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Smallest part S3 accepts in a multipart upload (other than the last).
pub const MIN_PART_SIZE: u64 = 5 * MIB;

/// Largest object (and part) S3 will copy in a single request.
pub const MAX_COPY_SIZE: u64 = 5 * GIB;

/// Retrieval tiers accepted by the restore API.
pub const TIERS: &[&str] = &["Standard", "Bulk", "Expedited"];

/// Operator supplied parameters of a migration.
#[derive(Clone, Debug)]
pub struct MigrateConfig {
    /// Bucket to migrate objects within.
    pub bucket: String,
    /// Endpoint override for the S3 client.
    pub endpoint: Option<String>,
    /// Region of the bucket (default provider chain when unset).
    pub region: Option<String>,
    /// Storage classes which are considered cold and migrated.
    pub source_classes: Vec<String>,
    /// Width of each part in a multipart copy.
    pub part_size: u64,
    /// Objects strictly larger than this are copied in parts.
    pub multipart_threshold: u64,
    /// Delay between two sweeps checking restore status.
    pub poll_interval: Duration,
    /// Upper bound on the time spent waiting for restores.
    pub max_wait: Duration,
    /// Number of days restored copies stay available.
    pub restore_days: i64,
    /// Retrieval tier used when requesting restores.
    pub restore_tier: String,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: None,
            region: None,
            source_classes: vec![GLACIER.to_string()],
            part_size: 500 * MIB,
            multipart_threshold: MAX_COPY_SIZE,
            poll_interval: Duration::from_secs(60),
            max_wait: Duration::from_secs(48 * 60 * 60),
            restore_days: 1,
            restore_tier: "Standard".to_string(),
        }
    }
}

impl MigrateConfig {
    /// Builds (and validates) a configuration from parsed CLI arguments.
    pub fn from_args(args: &ArgMatches<'_>) -> UtilResult<Self> {
        let defaults = Self::default();

        let config = Self {
            bucket: cli::required(args, "bucket")?
                .trim_start_matches("s3://")
                .trim_end_matches('/')
                .to_string(),
            endpoint: args.value_of("endpoint").map(str::to_string),
            region: args.value_of("region").map(str::to_string),
            source_classes: match args.values_of("source-class") {
                Some(values) => values.map(str::to_string).collect(),
                None => defaults.source_classes,
            },
            part_size: match args.value_of("part-size") {
                Some(size) => cli::parse_size(size)?,
                None => defaults.part_size,
            },
            multipart_threshold: match args.value_of("threshold") {
                Some(size) => cli::parse_size(size)?,
                None => defaults.multipart_threshold,
            },
            poll_interval: match args.value_of("poll-interval") {
                Some(duration) => cli::parse_duration(duration)?,
                None => defaults.poll_interval,
            },
            max_wait: match args.value_of("max-wait") {
                Some(duration) => cli::parse_duration(duration)?,
                None => defaults.max_wait,
            },
            restore_days: match args.value_of("restore-days") {
                Some(days) => days
                    .parse()
                    .map_err(|_| format!("Invalid restore days: {}", days))?,
                None => defaults.restore_days,
            },
            restore_tier: args
                .value_of("tier")
                .map(str::to_string)
                .unwrap_or(defaults.restore_tier),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks all values against the limits imposed by S3.
    pub fn validate(&self) -> UtilResult<()> {
        if self.bucket.is_empty() || self.bucket.contains('/') {
            return Err(format!("Invalid bucket name: '{}'", self.bucket).into());
        }
        if self.source_classes.is_empty() {
            return Err("At least one source storage class is required".into());
        }
        if self.part_size < MIN_PART_SIZE || self.part_size > MAX_COPY_SIZE {
            return Err(format!(
                "Part size must be between {} and {} bytes",
                MIN_PART_SIZE, MAX_COPY_SIZE
            )
            .into());
        }
        if self.multipart_threshold == 0 || self.multipart_threshold > MAX_COPY_SIZE {
            return Err(format!(
                "Multipart threshold must be between 1 and {} bytes",
                MAX_COPY_SIZE
            )
            .into());
        }
        if self.poll_interval == Duration::from_secs(0) {
            return Err("Poll interval must be greater than zero".into());
        }
        if self.restore_days < 1 {
            return Err("Restored copies must be kept for at least one day".into());
        }
        if !TIERS.contains(&self.restore_tier.as_str()) {
            return Err(format!(
                "Unknown restore tier '{}', expected one of {}",
                self.restore_tier,
                TIERS.join(", ")
            )
            .into());
        }
        Ok(())
    }

    /// Number of status sweeps allowed before the wait times out.
    ///
    /// The first sweep happens immediately, every further one after
    /// another `poll_interval`.
    pub fn max_sweeps(&self) -> u64 {
        let interval = self.poll_interval.as_millis().max(1);
        (self.max_wait.as_millis() / interval) as u64 + 1
    }

    /// Whether a listed storage class should be migrated.
    pub fn is_source_class(&self, storage_class: Option<&str>) -> bool {
        match storage_class {
            Some(class) => self.source_classes.iter().any(|c| c == class),
            None => false,
        }
    }
}
