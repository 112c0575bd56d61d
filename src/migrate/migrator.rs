//! Sequential controller moving archived objects back to STANDARD.
//!
//! Each object key moves through a fixed set of stages, one remote call at
//! a time. Failures are tracked per key and never stop the rest of the
//! batch; a key simply stays at the stage it reached.
use pretty_bytes::converter::convert;
use tokio::time;

use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Display, Formatter};

use super::bucket::{Bucket, ObjectHead, ObjectSummary};
use super::config::MigrateConfig;
use super::copy;
use super::restore::RestoreStatus;
use crate::types::UtilResult;
use crate::walker::ObjectWalker;

/// Progress of a single key through the migration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Discovered,
    RestoreRequested,
    Restoring,
    Restored,
    Copied,
    Cleaned,
    Failed,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let label = match self {
            Stage::Discovered => "discovered",
            Stage::RestoreRequested => "restore requested",
            Stage::Restoring => "restoring",
            Stage::Restored => "restored",
            Stage::Copied => "copied",
            Stage::Cleaned => "cleaned",
            Stage::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Result of waiting for restores to complete.
#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    /// Every key was restored.
    Restored(HashMap<String, ObjectHead>),
    /// The wait ran out before every key was restored.
    TimedOut {
        restored: HashMap<String, ObjectHead>,
        pending: Vec<String>,
    },
}

/// Summary of a migration run.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Final stage reached by every discovered key.
    pub stages: BTreeMap<String, Stage>,
    /// Keys which were still restoring when the wait ran out.
    pub timed_out: Vec<String>,
}

impl MigrationReport {
    /// Number of keys which finished at the provided stage.
    pub fn count(&self, stage: Stage) -> usize {
        self.stages.values().filter(|s| **s == stage).count()
    }

    /// Number of keys which didn't make it all the way through.
    pub fn unfinished(&self) -> usize {
        self.stages.len() - self.count(Stage::Cleaned)
    }

    /// A single line describing how the run ended.
    pub fn summary(&self) -> String {
        let unfinished = self.unfinished();
        if unfinished == 0 {
            return "All eligible objects transitioned and cleaned up.".to_string();
        }
        format!(
            "{} of {} objects not fully transitioned ({} failed, {} timed out)",
            unfinished,
            self.stages.len(),
            self.count(Stage::Failed),
            self.timed_out.len()
        )
    }
}

/// Formats a byte count for log output.
fn human_bytes(bytes: u64) -> String {
    convert(bytes as f64).replacen(' ', "", 1)
}

/// Drives the migration of a single bucket.
pub struct Migrator<'a> {
    bucket: &'a dyn Bucket,
    config: &'a MigrateConfig,
    stages: BTreeMap<String, Stage>,
}

impl<'a> Migrator<'a> {
    /// Construct a new `Migrator` for a bucket/configuration pair.
    pub fn new(bucket: &'a dyn Bucket, config: &'a MigrateConfig) -> Self {
        Self {
            bucket,
            config,
            stages: BTreeMap::new(),
        }
    }

    /// Runs every phase of the migration, in order.
    ///
    /// Only a failure to list the bucket is returned as an error; every
    /// other failure is logged and recorded against its key.
    pub async fn run(mut self) -> UtilResult<MigrationReport> {
        info!(
            "Starting GLACIER -> STANDARD transition for bucket: {}",
            self.bucket.name()
        );

        let candidates = self.discover().await?;
        if candidates.is_empty() {
            info!("No GLACIER objects found.");
            return Ok(self.into_report(Vec::new()));
        }

        let keys: Vec<String> = candidates.into_iter().map(|object| object.key).collect();

        // every key gets a restore request or is skipped
        self.initiate_restores(&keys).await;

        let (restored, timed_out) = match self.wait_for_restores(&keys).await {
            PollOutcome::Restored(restored) => (restored, Vec::new()),
            PollOutcome::TimedOut { restored, pending } => {
                error!(
                    "Timed out waiting for {} of {} restores",
                    pending.len(),
                    keys.len()
                );
                (restored, pending)
            }
        };

        self.transition(&keys, &restored).await;

        // only claim success once every key is cleaned
        let report = self.into_report(timed_out);
        if report.unfinished() == 0 {
            info!("{}", report.summary());
        } else {
            warn!("{}", report.summary());
        }
        Ok(report)
    }

    /// Lists the bucket, keeping every object in a source storage class.
    pub async fn discover(&mut self) -> UtilResult<Vec<ObjectSummary>> {
        info!("Scanning for GLACIER objects...");

        let mut walker = ObjectWalker::new(self.bucket);
        let mut candidates = Vec::new();

        while let Some(object) = walker.next().await? {
            // anything outside the source classes is left alone
            if self.config.is_source_class(object.storage_class.as_deref()) {
                self.stages.insert(object.key.clone(), Stage::Discovered);
                candidates.push(object);
            }
        }

        info!("Found {} GLACIER objects.", candidates.len());
        Ok(candidates)
    }

    /// Requests a restore of every key which isn't restored or restoring.
    pub async fn initiate_restores(&mut self, keys: &[String]) {
        for key in keys {
            let head = match self.bucket.head_object(key).await {
                Ok(head) => head,
                Err(err) => {
                    error!("Error restoring {}: {}", key, err);
                    self.set_stage(key, Stage::Failed);
                    continue;
                }
            };

            // only request restores which aren't already underway
            match head.restore {
                RestoreStatus::Ongoing => {
                    info!("Restore already in progress: {}", key);
                    self.set_stage(key, Stage::Restoring);
                }
                RestoreStatus::Restored { .. } => {
                    info!("Already restored: {}", key);
                    self.set_stage(key, Stage::Restored);
                }
                RestoreStatus::NotRestored => {
                    let request = self.bucket.restore_object(
                        key,
                        self.config.restore_days,
                        &self.config.restore_tier,
                    );

                    match request.await {
                        Ok(()) => {
                            info!("Restore initiated: {}", key);
                            self.set_stage(key, Stage::RestoreRequested);
                        }
                        Err(err) => {
                            error!("Error restoring {}: {}", key, err);
                            self.set_stage(key, Stage::Failed);
                        }
                    }
                }
            }
        }
    }

    /// Checks every unrestored key on an interval until all are restored.
    ///
    /// The wait is bounded by the configured maximum; once exhausted, the
    /// keys restored so far are returned alongside those still pending.
    pub async fn wait_for_restores(&mut self, keys: &[String]) -> PollOutcome {
        info!(
            "Waiting for restoration to complete (checking every {})...",
            humantime::format_duration(self.config.poll_interval)
        );

        let max_sweeps = self.config.max_sweeps();
        let mut restored = HashMap::new();
        let mut sweeps = 0;

        loop {
            for key in keys {
                // skip anything confirmed in an earlier sweep
                if restored.contains_key(key) {
                    continue;
                }

                match self.bucket.head_object(key).await {
                    Ok(head) if head.restore.is_restored() => {
                        info!("Restored: {} ({} bytes)", key, head.size);
                        self.set_stage(key, Stage::Restored);
                        restored.insert(key.clone(), head);
                    }
                    Ok(_) => (),
                    Err(err) => error!("Error checking {}: {}", key, err),
                }
            }

            // report progress after every sweep
            sweeps += 1;
            info!("{} of {} objects restored.", restored.len(), keys.len());

            if restored.len() == keys.len() {
                return PollOutcome::Restored(restored);
            }

            // out of time, hand back what we have
            if sweeps >= max_sweeps {
                let pending = keys
                    .iter()
                    .filter(|key| !restored.contains_key(*key))
                    .cloned()
                    .collect();
                return PollOutcome::TimedOut { restored, pending };
            }

            time::delay_for(self.config.poll_interval).await;
        }
    }

    /// Copies every restored key into STANDARD and drops its cold versions.
    ///
    /// Keys are handled in discovery order; keys missing from `restored`
    /// are left untouched.
    pub async fn transition(&mut self, keys: &[String], restored: &HashMap<String, ObjectHead>) {
        info!("Transitioning restored objects to STANDARD storage...");

        for key in keys {
            let head = match restored.get(key) {
                Some(head) => head,
                None => continue,
            };

            // large copies take a while, so flag them up front
            if head.size > self.config.multipart_threshold {
                info!("Multipart copying {} ({})...", key, human_bytes(head.size));
            }

            match copy::copy_to_standard(self.bucket, self.config, key, head).await {
                Ok(_) => self.set_stage(key, Stage::Copied),
                Err(failure) => {
                    error!("Failed to transition {} to STANDARD: {}", key, failure.cause);
                    if let Some(abort) = &failure.abort {
                        warn!("Could not abort upload for {}: {}", key, abort);
                    }
                    self.set_stage(key, Stage::Failed);
                    continue;
                }
            }

            // a failed cleanup leaves the copy in place
            match self.cleanup_versions(key).await {
                Ok(_) => self.set_stage(key, Stage::Cleaned),
                Err(err) => error!("Error cleaning up versions for {}: {}", key, err),
            }
        }
    }

    /// Deletes every non current Glacier or Deep Archive version of a key.
    pub async fn cleanup_versions(&self, key: &str) -> UtilResult<usize> {
        let mut deleted = 0;

        for version in self.bucket.list_object_versions(key).await? {
            // the current version is the fresh STANDARD copy
            if version.is_latest || !version.is_cold() {
                continue;
            }

            self.bucket
                .delete_object_version(key, &version.version_id)
                .await?;

            info!(
                "Deleted Glacier version: {} (version {})",
                key, version.version_id
            );
            deleted += 1;
        }

        Ok(deleted)
    }

    /// The stage every discovered key has reached so far.
    pub fn stages(&self) -> &BTreeMap<String, Stage> {
        &self.stages
    }

    fn set_stage(&mut self, key: &str, stage: Stage) {
        self.stages.insert(key.to_string(), stage);
    }

    fn into_report(self, timed_out: Vec<String>) -> MigrationReport {
        MigrationReport {
            stages: self.stages,
            timed_out,
        }
    }
}
