//! Byte range planning for multipart copies.
use crate::types::UtilResult;

/// The largest number of parts S3 accepts in a single upload.
pub const MAX_PARTS: u64 = 10_000;

/// An inclusive byte range of the source object, copied as one part.
#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub number: i64,
    pub start: u64,
    pub end: u64,
}

impl Part {
    /// Length of this part in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Formats this part as a `CopySourceRange` value.
    pub fn range(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Splits an object of `size` bytes into parts of `part_size` bytes.
///
/// Every part is `part_size` long except the last, which ends exactly on
/// the final byte of the object.
pub fn plan(size: u64, part_size: u64) -> UtilResult<Vec<Part>> {
    if part_size == 0 {
        return Err("Part size must be greater than zero".into());
    }

    let count = (size + part_size - 1) / part_size;
    if count > MAX_PARTS {
        return Err(format!(
            "Object of {} bytes needs {} parts, above the limit of {}",
            size, count, MAX_PARTS
        )
        .into());
    }

    let parts = (0..count)
        .map(|index| {
            let start = index * part_size;
            Part {
                number: index as i64 + 1,
                start,
                end: (start + part_size).min(size) - 1,
            }
        })
        .collect();

    Ok(parts)
}
