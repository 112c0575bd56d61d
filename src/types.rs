//! Types module for the main runtime, exposing error and result types.
//!
//! Most code in this module is based around coercion of error types into
//! a common error type, to be used as the general "Error" of this crate.
use logger::SetLoggerError;
use quick_xml::events::Event;
use quick_xml::Reader;
use rusoto_core::credential::CredentialsError;
use rusoto_core::region::ParseRegionError;
use rusoto_core::request;

use std::fmt::{self, Debug, Display, Formatter};
use std::io;

/// Public type alias for a result with a `UtilError` error type.
pub type UtilResult<T> = Result<T, UtilError>;

/// Delegating error wrapper for errors raised by the main archive.
///
/// The internal `String` representation enables cheap coercion from
/// other error types by binding their error messages through.
#[derive(Clone, PartialEq)]
pub struct UtilError(String);

impl UtilError {
    /// Returns the message carried by this error.
    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Debug implementation for `UtilError`.
impl Debug for UtilError {
    /// Formats an `UtilError` by delegating to `Display`.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        Display::fmt(self, f)
    }
}

/// Display implementation for `UtilError`.
impl Display for UtilError {
    /// Formats an `UtilError` by writing out the inner representation.
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UtilError {}

/// Macro to implement `From` for provided types.
macro_rules! derive_from {
    ($type:ty) => {
        impl<'a> From<$type> for UtilError {
            fn from(t: $type) -> UtilError {
                UtilError(t.to_string())
            }
        }
    };
}

// Easy derivations of derive_from.
derive_from!(&'a str);
derive_from!(io::Error);
derive_from!(clap::Error);
derive_from!(SetLoggerError);
derive_from!(regex::Error);
derive_from!(request::TlsError);
derive_from!(toml::de::Error);
derive_from!(humantime::DurationError);
derive_from!(CredentialsError);
derive_from!(ParseRegionError);
derive_from!(String);

/// Pulls the `<Message>` text out of an XML error body, if there is one.
///
/// AWS reports most service failures as XML documents; the message tag
/// is far more readable than the raw body.
fn xml_message(body: &str) -> Option<String> {
    if !body.starts_with("<?xml") {
        return None;
    }

    // create an XML reader and buffer
    let mut reader = Reader::from_str(body);
    let mut buffer = Vec::new();

    loop {
        match reader.read_event(&mut buffer) {
            // end, or error, just give up
            Ok(Event::Eof) | Err(_) => return None,

            // first message tag wins
            Ok(Event::Start(ref e)) if e.name() == b"Message" => {
                return reader.read_text(b"Message", &mut Vec::new()).ok();
            }

            _ => (),
        }
        buffer.clear();
    }
}

/// Macro to implement `From` for Rusoto types.
macro_rules! derive_from_rusoto {
    ($type:ty) => {
        impl From<rusoto_core::RusotoError<$type>> for UtilError {
            /// Converts a Rusoto error to a `UtilError`.
            fn from(err: rusoto_core::RusotoError<$type>) -> UtilError {
                let msg = err.to_string();
                UtilError(xml_message(&msg).unwrap_or(msg))
            }
        }
    };
}

// derive error display for all used rusoto_s3 types
derive_from_rusoto!(rusoto_s3::AbortMultipartUploadError);
derive_from_rusoto!(rusoto_s3::CompleteMultipartUploadError);
derive_from_rusoto!(rusoto_s3::CopyObjectError);
derive_from_rusoto!(rusoto_s3::CreateMultipartUploadError);
derive_from_rusoto!(rusoto_s3::DeleteObjectError);
derive_from_rusoto!(rusoto_s3::HeadObjectError);
derive_from_rusoto!(rusoto_s3::ListObjectsV2Error);
derive_from_rusoto!(rusoto_s3::ListObjectVersionsError);
derive_from_rusoto!(rusoto_s3::RestoreObjectError);
derive_from_rusoto!(rusoto_s3::UploadPartCopyError);

// and the single rusoto_ec2 type
derive_from_rusoto!(rusoto_ec2::DescribeVpcEndpointsError);
