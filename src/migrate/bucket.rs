//! The narrow slice of the S3 API used by the migration.
//!
//! Everything the migrator does against a bucket goes through the `Bucket`
//! trait, which keeps the controller independent of Rusoto request shapes
//! (and allows it to run against an in-memory bucket in tests).
use async_trait::async_trait;
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload,
    CopyObjectRequest, CreateMultipartUploadRequest, DeleteObjectRequest, GlacierJobParameters,
    HeadObjectRequest, ListObjectVersionsOutput, ListObjectVersionsRequest, ListObjectsV2Request,
    RestoreObjectRequest, RestoreRequest, S3Client, UploadPartCopyRequest, S3,
};

use std::collections::HashMap;

use super::parts::Part;
use super::restore::RestoreStatus;
use crate::types::UtilResult;

/// Storage class of the Glacier Flexible Retrieval tier.
pub const GLACIER: &str = "GLACIER";

/// Storage class of the Glacier Deep Archive tier.
pub const DEEP_ARCHIVE: &str = "DEEP_ARCHIVE";

/// Storage class objects are migrated into.
pub const STANDARD: &str = "STANDARD";

/// An object as seen when listing a bucket.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub storage_class: Option<String>,
}

/// A single page of a bucket listing.
#[derive(Debug, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectSummary>,
    pub next_token: Option<String>,
}

/// Object metadata as returned by a HEAD request.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectHead {
    pub size: u64,
    pub restore: RestoreStatus,
    pub storage_class: Option<String>,
    pub headers: ObjectHeaders,
}

/// Headers, user metadata and encryption settings stored with an object.
///
/// A single copy keeps these through `MetadataDirective=COPY`, but a
/// multipart upload starts from nothing so they are set explicitly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectHeaders {
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub content_type: Option<String>,
    pub expires: Option<String>,
    pub website_redirect_location: Option<String>,
    pub server_side_encryption: Option<String>,
    pub ssekms_key_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// A single version of an object key.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectVersion {
    pub key: String,
    pub version_id: String,
    pub is_latest: bool,
    pub storage_class: Option<String>,
}

impl ObjectVersion {
    /// Whether this version lives in one of the Glacier tiers.
    pub fn is_cold(&self) -> bool {
        match self.storage_class.as_deref() {
            Some(GLACIER) | Some(DEEP_ARCHIVE) => true,
            _ => false,
        }
    }
}

/// A part copied as part of a multipart upload.
#[derive(Clone, Debug, PartialEq)]
pub struct CopiedPart {
    pub number: i64,
    pub e_tag: String,
}

/// Bucket scoped operations required to migrate objects between tiers.
#[async_trait]
pub trait Bucket: Send + Sync {
    /// The name of the bucket being operated on.
    fn name(&self) -> &str;

    /// Lists a page of objects, starting from a continuation token.
    async fn list_objects(&self, token: Option<String>) -> UtilResult<ObjectPage>;

    /// Fetches the metadata (including restore status) of an object.
    async fn head_object(&self, key: &str) -> UtilResult<ObjectHead>;

    /// Requests a temporary restore of an archived object.
    async fn restore_object(&self, key: &str, days: i64, tier: &str) -> UtilResult<()>;

    /// Copies an object onto itself using a new storage class.
    async fn copy_object(&self, key: &str, storage_class: &str) -> UtilResult<()>;

    /// Starts a multipart upload over an existing key, returning the upload id.
    async fn create_multipart_upload(
        &self,
        key: &str,
        head: &ObjectHead,
        storage_class: &str,
    ) -> UtilResult<String>;

    /// Copies a byte range of the key into a part of an upload, returning the ETag.
    async fn upload_part_copy(&self, key: &str, upload_id: &str, part: &Part)
        -> UtilResult<String>;

    /// Completes an upload from the ordered set of copied parts.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CopiedPart>,
    ) -> UtilResult<()>;

    /// Aborts an in-flight multipart upload.
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> UtilResult<()>;

    /// Lists every version of exactly the provided key.
    async fn list_object_versions(&self, key: &str) -> UtilResult<Vec<ObjectVersion>>;

    /// Deletes a single version of a key.
    async fn delete_object_version(&self, key: &str, version_id: &str) -> UtilResult<()>;
}

/// `Bucket` implementation backed by a Rusoto `S3Client`.
pub struct S3Bucket {
    s3: S3Client,
    name: String,
}

impl S3Bucket {
    /// Construct a new `S3Bucket` for a client/bucket pair.
    pub fn new(s3: S3Client, name: String) -> Self {
        Self { s3, name }
    }

    /// Formats the copy source of a key within this bucket.
    fn copy_source(&self, key: &str) -> String {
        encode_copy_source(&self.name, key)
    }
}

/// Builds a URL encoded `bucket/key` copy source header value.
///
/// Unreserved characters and path separators are kept as is, anything
/// else is percent encoded byte by byte.
pub fn encode_copy_source(bucket: &str, key: &str) -> String {
    let mut source = String::with_capacity(bucket.len() + key.len() + 1);

    source.push_str(bucket);
    source.push('/');

    for byte in key.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                source.push(byte as char)
            }
            _ => source.push_str(&format!("%{:02X}", byte)),
        }
    }

    source
}

/// Key and version id markers to resume a version listing from.
type VersionMarkers = (Option<String>, Option<String>);

/// Collects the versions of exactly `key` from a page of a version listing.
///
/// Listing by prefix also returns longer keys (`key2` when asking for
/// `key`), which are skipped. Returns the markers of the next page if the
/// listing was truncated.
fn versions_of_key(
    key: &str,
    page: ListObjectVersionsOutput,
    versions: &mut Vec<ObjectVersion>,
) -> Option<VersionMarkers> {
    for version in page.versions.unwrap_or_default() {
        match (version.key, version.version_id) {
            (Some(name), Some(version_id)) if name == key => versions.push(ObjectVersion {
                key: name,
                version_id,
                is_latest: version.is_latest.unwrap_or(false),
                storage_class: version.storage_class,
            }),
            _ => (),
        }
    }

    if page.is_truncated.unwrap_or(false) {
        Some((page.next_key_marker, page.next_version_id_marker))
    } else {
        None
    }
}

/// Converts an optional signed SDK length into a byte count.
fn to_size(length: Option<i64>) -> u64 {
    length.unwrap_or(0).max(0) as u64
}

#[async_trait]
impl Bucket for S3Bucket {
    fn name(&self) -> &str {
        &self.name
    }

    async fn list_objects(&self, token: Option<String>) -> UtilResult<ObjectPage> {
        let request = ListObjectsV2Request {
            bucket: self.name.clone(),
            continuation_token: token,
            ..ListObjectsV2Request::default()
        };

        let response = self.s3.list_objects_v2(request).await?;

        // objects without a key can't be acted on
        let objects = response
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| {
                Some(ObjectSummary {
                    key: object.key?,
                    size: to_size(object.size),
                    storage_class: object.storage_class,
                })
            })
            .collect();

        Ok(ObjectPage {
            objects,
            next_token: response.next_continuation_token,
        })
    }

    async fn head_object(&self, key: &str) -> UtilResult<ObjectHead> {
        let request = HeadObjectRequest {
            bucket: self.name.clone(),
            key: key.to_string(),
            ..HeadObjectRequest::default()
        };

        let response = self.s3.head_object(request).await?;

        // everything a multipart copy would otherwise lose
        let headers = ObjectHeaders {
            cache_control: response.cache_control,
            content_disposition: response.content_disposition,
            content_encoding: response.content_encoding,
            content_language: response.content_language,
            content_type: response.content_type,
            expires: response.expires,
            website_redirect_location: response.website_redirect_location,
            server_side_encryption: response.server_side_encryption,
            ssekms_key_id: response.ssekms_key_id,
            metadata: response.metadata.unwrap_or_default(),
        };

        Ok(ObjectHead {
            size: to_size(response.content_length),
            restore: RestoreStatus::parse(response.restore.as_deref()),
            storage_class: response.storage_class,
            headers,
        })
    }

    async fn restore_object(&self, key: &str, days: i64, tier: &str) -> UtilResult<()> {
        let restore = RestoreRequest {
            days: Some(days),
            glacier_job_parameters: Some(GlacierJobParameters {
                tier: tier.to_string(),
            }),
            ..RestoreRequest::default()
        };

        let request = RestoreObjectRequest {
            bucket: self.name.clone(),
            key: key.to_string(),
            restore_request: Some(restore),
            ..RestoreObjectRequest::default()
        };

        self.s3.restore_object(request).await?;
        Ok(())
    }

    async fn copy_object(&self, key: &str, storage_class: &str) -> UtilResult<()> {
        // copying onto itself requires a change, here the storage class
        let request = CopyObjectRequest {
            bucket: self.name.clone(),
            key: key.to_string(),
            copy_source: self.copy_source(key),
            storage_class: Some(storage_class.to_string()),
            metadata_directive: Some("COPY".to_string()),
            ..CopyObjectRequest::default()
        };

        self.s3.copy_object(request).await?;
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        head: &ObjectHead,
        storage_class: &str,
    ) -> UtilResult<String> {
        let headers = head.headers.clone();

        // multipart uploads can't copy metadata, so it's carried over by hand
        let metadata = if headers.metadata.is_empty() {
            None
        } else {
            Some(headers.metadata)
        };

        let request = CreateMultipartUploadRequest {
            bucket: self.name.clone(),
            key: key.to_string(),
            storage_class: Some(storage_class.to_string()),
            cache_control: headers.cache_control,
            content_disposition: headers.content_disposition,
            content_encoding: headers.content_encoding,
            content_language: headers.content_language,
            content_type: headers.content_type,
            expires: headers.expires,
            website_redirect_location: headers.website_redirect_location,
            server_side_encryption: headers.server_side_encryption,
            ssekms_key_id: headers.ssekms_key_id,
            metadata,
            ..CreateMultipartUploadRequest::default()
        };

        // the upload id is needed for every following part
        self.s3
            .create_multipart_upload(request)
            .await?
            .upload_id
            .ok_or_else(|| format!("No upload identifier returned for {}", key).into())
    }

    async fn upload_part_copy(
        &self,
        key: &str,
        upload_id: &str,
        part: &Part,
    ) -> UtilResult<String> {
        let request = UploadPartCopyRequest {
            bucket: self.name.clone(),
            key: key.to_string(),
            copy_source: self.copy_source(key),
            copy_source_range: Some(part.range()),
            part_number: part.number,
            upload_id: upload_id.to_string(),
            ..UploadPartCopyRequest::default()
        };

        // the ETag is required to complete the upload
        self.s3
            .upload_part_copy(request)
            .await?
            .copy_part_result
            .and_then(|result| result.e_tag)
            .ok_or_else(|| format!("No ETag returned for part {} of {}", part.number, key).into())
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CopiedPart>,
    ) -> UtilResult<()> {
        let completed = parts
            .into_iter()
            .map(|part| rusoto_s3::CompletedPart {
                e_tag: Some(part.e_tag),
                part_number: Some(part.number),
            })
            .collect();

        let request = CompleteMultipartUploadRequest {
            bucket: self.name.clone(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            multipart_upload: Some(CompletedMultipartUpload {
                parts: Some(completed),
            }),
            ..CompleteMultipartUploadRequest::default()
        };

        self.s3.complete_multipart_upload(request).await?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> UtilResult<()> {
        let request = AbortMultipartUploadRequest {
            bucket: self.name.clone(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            ..AbortMultipartUploadRequest::default()
        };

        self.s3.abort_multipart_upload(request).await?;
        Ok(())
    }

    async fn list_object_versions(&self, key: &str) -> UtilResult<Vec<ObjectVersion>> {
        let mut versions = Vec::new();
        let mut key_marker = None;
        let mut version_id_marker = None;

        loop {
            let request = ListObjectVersionsRequest {
                bucket: self.name.clone(),
                prefix: Some(key.to_string()),
                key_marker: key_marker.take(),
                version_id_marker: version_id_marker.take(),
                ..ListObjectVersionsRequest::default()
            };

            let response = self.s3.list_object_versions(request).await?;

            // keep going until a page comes back untruncated
            match versions_of_key(key, response, &mut versions) {
                Some((next_key, next_version_id)) => {
                    key_marker = next_key;
                    version_id_marker = next_version_id;
                }
                None => return Ok(versions),
            }
        }
    }

    async fn delete_object_version(&self, key: &str, version_id: &str) -> UtilResult<()> {
        let request = DeleteObjectRequest {
            bucket: self.name.clone(),
            key: key.to_string(),
            version_id: Some(version_id.to_string()),
            ..DeleteObjectRequest::default()
        };

        self.s3.delete_object(request).await?;
        Ok(())
    }
}
