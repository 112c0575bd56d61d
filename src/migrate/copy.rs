//! In-place copies of restored objects into a new storage class.
//!
//! Objects up to the multipart threshold are copied with a single request;
//! anything larger is copied range by range into a multipart upload over
//! the same key. A failed multipart copy is aborted, and the abort failure
//! (if any) is reported alongside the original cause.
use std::fmt::{self, Display, Formatter};

use super::bucket::{Bucket, CopiedPart, ObjectHead, STANDARD};
use super::config::MigrateConfig;
use super::parts::{self, Part};
use crate::types::UtilError;

/// The route taken by a successful copy.
#[derive(Clone, Debug, PartialEq)]
pub enum CopyPath {
    Single,
    Multipart { parts: usize },
}

/// A failed copy, along with any failure to clean up after it.
#[derive(Clone, Debug, PartialEq)]
pub struct CopyFailure {
    /// The error which stopped the copy.
    pub cause: UtilError,
    /// The error raised when aborting the upload, if the abort failed too.
    pub abort: Option<UtilError>,
}

impl From<UtilError> for CopyFailure {
    fn from(cause: UtilError) -> CopyFailure {
        CopyFailure { cause, abort: None }
    }
}

impl Display for CopyFailure {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match &self.abort {
            Some(abort) => write!(f, "{} (abort also failed: {})", self.cause, abort),
            None => write!(f, "{}", self.cause),
        }
    }
}

/// Copies a restored object onto itself in the STANDARD storage class.
pub async fn copy_to_standard(
    bucket: &dyn Bucket,
    config: &MigrateConfig,
    key: &str,
    head: &ObjectHead,
) -> Result<CopyPath, CopyFailure> {
    // small enough to copy in a single request
    if head.size <= config.multipart_threshold {
        bucket.copy_object(key, STANDARD).await?;
        info!("Standard copy complete for: {}", key);
        return Ok(CopyPath::Single);
    }

    // plan the ranges before creating anything which needs an abort
    let parts = parts::plan(head.size, config.part_size)?;
    let upload_id = bucket.create_multipart_upload(key, head, STANDARD).await?;

    match copy_parts(bucket, key, &upload_id, &parts).await {
        Ok(()) => {
            info!("Completed multipart copy for {}", key);
            Ok(CopyPath::Multipart { parts: parts.len() })
        }
        Err(cause) => {
            // abort to free the stored parts, keeping both errors
            let abort = bucket.abort_multipart_upload(key, &upload_id).await.err();
            Err(CopyFailure { cause, abort })
        }
    }
}

/// Copies every planned part in order, then completes the upload.
async fn copy_parts(
    bucket: &dyn Bucket,
    key: &str,
    upload_id: &str,
    parts: &[Part],
) -> Result<(), UtilError> {
    let mut copied = Vec::with_capacity(parts.len());

    for part in parts {
        let e_tag = bucket.upload_part_copy(key, upload_id, part).await?;

        info!("Copied part {}/{} for {}", part.number, parts.len(), key);

        copied.push(CopiedPart {
            number: part.number,
            e_tag,
        });
    }

    // parts are completed in the order they were planned
    bucket
        .complete_multipart_upload(key, upload_id, copied)
        .await
}
