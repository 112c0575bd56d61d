//! In-memory `Bucket` used to exercise the migration in tests.
//!
//! Every call is recorded as a short line such as `restore key` or
//! `part key 3`, and any call can be made to fail by registering the
//! same line (or a prefix of it, ending on a word) via `fail_on`.
use async_trait::async_trait;

use std::collections::HashMap;
use std::sync::Mutex;

use super::bucket::{
    Bucket, CopiedPart, ObjectHead, ObjectHeaders, ObjectPage, ObjectSummary, ObjectVersion,
};
use super::parts::Part;
use super::restore::RestoreStatus;
use crate::types::UtilResult;

/// Objects returned per listing page, kept small to force pagination.
const PAGE_SIZE: usize = 2;

struct FakeObject {
    key: String,
    size: u64,
    restore: RestoreStatus,
    // number of status checks an ongoing restore takes to complete
    restore_after: u32,
    headers: ObjectHeaders,
    versions: Vec<ObjectVersion>,
}

impl FakeObject {
    fn storage_class(&self) -> Option<String> {
        self.versions
            .iter()
            .find(|version| version.is_latest)
            .and_then(|version| version.storage_class.clone())
    }
}

struct Upload {
    key: String,
    storage_class: String,
    headers: ObjectHeaders,
}

#[derive(Default)]
struct State {
    objects: Vec<FakeObject>,
    uploads: HashMap<String, Upload>,
    calls: Vec<String>,
    failures: Vec<String>,
    next_version: u64,
}

impl State {
    fn record(&mut self, call: String) -> UtilResult<()> {
        let failure = self
            .failures
            .iter()
            .find(|failure| matches(&call, failure))
            .cloned();

        self.calls.push(call);

        match failure {
            Some(failure) => Err(format!("injected failure: {}", failure).into()),
            None => Ok(()),
        }
    }

    fn object(&mut self, key: &str) -> UtilResult<&mut FakeObject> {
        self.objects
            .iter_mut()
            .find(|object| object.key == key)
            .ok_or_else(|| format!("NoSuchKey: {}", key).into())
    }

    fn version_id(&mut self) -> String {
        self.next_version += 1;
        format!("v{}", self.next_version)
    }

    /// Writes a new current version of a key in the provided class.
    fn write_version(&mut self, key: &str, storage_class: &str) -> UtilResult<()> {
        let version_id = self.version_id();
        let object = self.object(key)?;

        for version in &mut object.versions {
            version.is_latest = false;
        }

        object.versions.push(ObjectVersion {
            key: key.to_string(),
            version_id,
            is_latest: true,
            storage_class: Some(storage_class.to_string()),
        });
        object.restore = RestoreStatus::NotRestored;
        Ok(())
    }
}

fn matches(call: &str, pattern: &str) -> bool {
    call == pattern || call.starts_with(&format!("{} ", pattern))
}

/// A versioned bucket living entirely in memory.
pub struct FakeBucket {
    state: Mutex<State>,
}

impl FakeBucket {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Adds an object which has never been restored.
    pub fn insert(&self, key: &str, size: u64, storage_class: &str) {
        let mut state = self.state.lock().unwrap();
        let version_id = state.version_id();

        state.objects.push(FakeObject {
            key: key.to_string(),
            size,
            restore: RestoreStatus::NotRestored,
            restore_after: 0,
            headers: ObjectHeaders::default(),
            versions: vec![ObjectVersion {
                key: key.to_string(),
                version_id,
                is_latest: true,
                storage_class: Some(storage_class.to_string()),
            }],
        });
    }

    /// Adds an object with a completed restore.
    pub fn insert_restored(&self, key: &str, size: u64, storage_class: &str) {
        self.insert(key, size, storage_class);
        self.with_object(key, |object| {
            object.restore = RestoreStatus::Restored { expiry: None };
        });
    }

    /// Adds an object whose restore is already in progress.
    pub fn insert_restoring(&self, key: &str, size: u64, storage_class: &str, after: u32) {
        self.insert(key, size, storage_class);
        self.with_object(key, |object| {
            object.restore = RestoreStatus::Ongoing;
            object.restore_after = after;
        });
    }

    /// Sets how many status checks any restore of `key` takes to complete.
    pub fn set_restore_after(&self, key: &str, after: u32) {
        self.with_object(key, |object| object.restore_after = after);
    }

    /// Pushes an older, non current version underneath the current one.
    pub fn insert_old_version(&self, key: &str, storage_class: &str) {
        let mut state = self.state.lock().unwrap();
        let version_id = state.version_id();
        let object = state.object(key).unwrap();

        object.versions.insert(
            0,
            ObjectVersion {
                key: key.to_string(),
                version_id,
                is_latest: false,
                storage_class: Some(storage_class.to_string()),
            },
        );
    }

    /// Replaces the headers and user metadata stored with a key.
    pub fn set_headers(&self, key: &str, headers: ObjectHeaders) {
        self.with_object(key, |object| object.headers = headers);
    }

    /// Makes every call matching `pattern` fail.
    pub fn fail_on(&self, pattern: &str) {
        self.state.lock().unwrap().failures.push(pattern.to_string());
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Number of calls made which match `pattern`.
    pub fn count_calls(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches(call, pattern))
            .count()
    }

    /// Storage classes of all versions of a key, oldest first.
    pub fn version_classes(&self, key: &str) -> Vec<String> {
        let mut state = self.state.lock().unwrap();
        state
            .object(key)
            .unwrap()
            .versions
            .iter()
            .filter_map(|version| version.storage_class.clone())
            .collect()
    }

    fn with_object<F>(&self, key: &str, f: F)
    where
        F: FnOnce(&mut FakeObject),
    {
        let mut state = self.state.lock().unwrap();
        f(state.object(key).unwrap());
    }
}

#[async_trait]
impl Bucket for FakeBucket {
    fn name(&self) -> &str {
        "archive"
    }

    async fn list_objects(&self, token: Option<String>) -> UtilResult<ObjectPage> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("list {}", token.as_deref().unwrap_or("-")))?;

        let start = match token {
            Some(token) => token.parse::<usize>().map_err(|_| "bad token")?,
            None => 0,
        };

        let objects: Vec<ObjectSummary> = state
            .objects
            .iter()
            .skip(start)
            .take(PAGE_SIZE)
            .map(|object| ObjectSummary {
                key: object.key.clone(),
                size: object.size,
                storage_class: object.storage_class(),
            })
            .collect();

        let next = start + objects.len();
        let next_token = if next < state.objects.len() {
            Some(next.to_string())
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_token,
        })
    }

    async fn head_object(&self, key: &str) -> UtilResult<ObjectHead> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("head {}", key))?;

        let object = state.object(key)?;
        if object.restore == RestoreStatus::Ongoing {
            if object.restore_after == 0 {
                object.restore = RestoreStatus::Restored { expiry: None };
            } else {
                object.restore_after -= 1;
            }
        }

        Ok(ObjectHead {
            size: object.size,
            restore: object.restore.clone(),
            storage_class: object.storage_class(),
            headers: object.headers.clone(),
        })
    }

    async fn restore_object(&self, key: &str, days: i64, tier: &str) -> UtilResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("restore {} {} {}", key, days, tier))?;
        state.object(key)?.restore = RestoreStatus::Ongoing;
        Ok(())
    }

    // headers are left untouched, as with `MetadataDirective=COPY`
    async fn copy_object(&self, key: &str, storage_class: &str) -> UtilResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("copy {} {}", key, storage_class))?;

        if !state.object(key)?.restore.is_restored() {
            return Err(format!("InvalidObjectState: {}", key).into());
        }
        state.write_version(key, storage_class)
    }

    async fn create_multipart_upload(
        &self,
        key: &str,
        head: &ObjectHead,
        storage_class: &str,
    ) -> UtilResult<String> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("create {}", key))?;

        let upload_id = format!("upload-{}", key);
        state.uploads.insert(
            upload_id.clone(),
            Upload {
                key: key.to_string(),
                storage_class: storage_class.to_string(),
                headers: head.headers.clone(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part_copy(
        &self,
        key: &str,
        upload_id: &str,
        part: &Part,
    ) -> UtilResult<String> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("part {} {}", key, part.number))?;

        if !state.uploads.contains_key(upload_id) {
            return Err(format!("NoSuchUpload: {}", upload_id).into());
        }
        if !state.object(key)?.restore.is_restored() {
            return Err(format!("InvalidObjectState: {}", key).into());
        }
        Ok(format!("\"etag-{}-{}\"", key, part.number))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CopiedPart>,
    ) -> UtilResult<()> {
        let mut state = self.state.lock().unwrap();
        let numbers: Vec<String> = parts.iter().map(|p| p.number.to_string()).collect();
        state.record(format!("complete {} {}", key, numbers.join(",")))?;

        let upload = state
            .uploads
            .remove(upload_id)
            .ok_or_else(|| format!("NoSuchUpload: {}", upload_id))?;

        state.write_version(&upload.key, &upload.storage_class)?;

        // the new version only has what the upload was created with
        state.object(&upload.key)?.headers = upload.headers;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> UtilResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("abort {}", key))?;
        state.uploads.remove(upload_id);
        Ok(())
    }

    async fn list_object_versions(&self, key: &str) -> UtilResult<Vec<ObjectVersion>> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("versions {}", key))?;
        Ok(state.object(key)?.versions.clone())
    }

    async fn delete_object_version(&self, key: &str, version_id: &str) -> UtilResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record(format!("delete {} {}", key, version_id))?;
        state
            .object(key)?
            .versions
            .retain(|version| version.version_id != version_id);
        Ok(())
    }
}

