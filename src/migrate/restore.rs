//! Interpretation of the `x-amz-restore` object header.
//!
//! S3 reports the state of an archive restore as a header of the form
//! `ongoing-request="false", expiry-date="Fri, 21 Dec 2012 00:00:00 GMT"`,
//! which is missing entirely when no restore has ever been requested.

/// Restore state of an archived object.
#[derive(Clone, Debug, PartialEq)]
pub enum RestoreStatus {
    /// No restore has been requested (or a previous one has expired).
    NotRestored,
    /// A restore has been requested but is still in progress.
    Ongoing,
    /// A restored copy is available until the (optional) expiry date.
    Restored { expiry: Option<String> },
}

impl RestoreStatus {
    /// Parses the raw value of the restore header.
    pub fn parse(header: Option<&str>) -> RestoreStatus {
        let header = match header {
            Some(header) => header,
            None => return RestoreStatus::NotRestored,
        };

        if header.contains(r#"ongoing-request="true""#) {
            return RestoreStatus::Ongoing;
        }

        if header.contains(r#"ongoing-request="false""#) {
            return RestoreStatus::Restored {
                expiry: field(header, "expiry-date"),
            };
        }

        RestoreStatus::NotRestored
    }

    /// Whether the object can be copied right now.
    pub fn is_restored(&self) -> bool {
        match self {
            RestoreStatus::Restored { .. } => true,
            _ => false,
        }
    }
}

/// Extracts a quoted `name="value"` field from a header value.
fn field(header: &str, name: &str) -> Option<String> {
    let prefix = format!("{}=\"", name);
    let start = header.find(&prefix)? + prefix.len();
    let len = header[start..].find('"')?;
    Some(header[start..start + len].to_string())
}
