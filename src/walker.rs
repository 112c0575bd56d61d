//! Common object traversal structures for AWS S3.
//!
//! This module doesn't contain anything special beyond a pseudo-iterator
//! to walk over the objects of a `Bucket` in a more idiomatic manner.
use crate::migrate::bucket::{Bucket, ObjectSummary};
use crate::types::UtilResult;

use std::collections::VecDeque;

/// Pseudo `Iterator` structure to walk over objects in AWS S3.
///
/// As this is a fallible iteration, a `for` style loop cannot be used
/// easily. Instead, this pattern must be used:
///
/// ```rust
/// let walker = ObjectWalker::new(...);
///
/// while let Some(object) = walker.next().await? {
///     // do something...
/// }
/// ```
///
/// Even though this isn't as convenient as `for`, it's still much
/// cleaner than manually iterating the S3 object pages.
pub struct ObjectWalker<'a> {
    bucket: &'a dyn Bucket,
    token: Option<String>,
    buffer: VecDeque<ObjectSummary>,
    finished: bool,
}

impl<'a> ObjectWalker<'a> {
    /// Construct a new `ObjectWalker` over a bucket.
    pub fn new(bucket: &'a dyn Bucket) -> Self {
        Self {
            bucket,
            token: None,
            buffer: VecDeque::new(),
            finished: false,
        }
    }

    /// Attempts to fetch the next object in the bucket.
    ///
    /// Calls can fail, which is why a `Result` is returned. Even if a call
    /// succeeds there is no guarantee an object exists, which is why an
    /// `Option` is returned.
    ///
    /// Calling this method does not guarantee a call will be made to AWS;
    /// there may already be buffered data to be returned immediately.
    pub async fn next(&mut self) -> UtilResult<Option<ObjectSummary>> {
        loop {
            // always check the buffer first
            if let Some(object) = self.buffer.pop_front() {
                return Ok(Some(object));
            }

            // if done, no fetch
            if self.finished {
                return Ok(None);
            }

            // pages can be empty even when more follow, so keep going
            let page = self.bucket.list_objects(self.token.take()).await?;

            self.buffer.extend(page.objects);
            self.token = page.next_token;
            self.finished = self.token.is_none();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ObjectWalker;
    use crate::migrate::fake::FakeBucket;

    #[tokio::test]
    async fn walking_every_page() {
        let bucket = FakeBucket::new();
        for key in &["a", "b", "c", "d", "e"] {
            bucket.insert(key, 1, "GLACIER");
        }

        let mut walker = ObjectWalker::new(&bucket);
        let mut keys = Vec::new();

        while let Some(object) = walker.next().await.unwrap() {
            keys.push(object.key);
        }

        assert_eq!(keys, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(bucket.calls(), vec!["list -", "list 2", "list 4"]);
    }

    #[tokio::test]
    async fn walking_empty_buckets() {
        let bucket = FakeBucket::new();
        let mut walker = ObjectWalker::new(&bucket);

        assert_eq!(walker.next().await.unwrap(), None);
        assert_eq!(walker.next().await.unwrap(), None);
        assert_eq!(bucket.calls(), vec!["list -"]);
    }
}
