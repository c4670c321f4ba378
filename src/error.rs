// Error type shared by the framing, blob, and block layers.
//
// None of these are retried: every variant describes a structural defect in
// the stream (or the sink) and aborts the current read/write.

use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed framing, truncated data, or inconsistent array lengths.
    #[error("malformed data: {0}")]
    Format(String),

    /// Blob decompression failed or produced the wrong size.
    #[error("blob decompression failed: {0}")]
    Codec(String),

    /// A string-table (or other) index points past the end of its table.
    #[error("index {index} out of range (table has {len} entries)")]
    Index { index: i64, len: usize },

    /// Unrecognized frame type, compression scheme, or required feature.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Map an I/O error hit in the middle of a frame. Running out of bytes
    /// there means the stream was cut short, which is a format defect.
    pub(crate) fn truncated(e: io::Error, what: &str) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::Format(format!("truncated stream while reading {what}"))
        } else {
            Self::Io(e)
        }
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Self::Format(format!("protobuf decode: {e}"))
    }
}

impl From<prost::EncodeError> for Error {
    fn from(e: prost::EncodeError) -> Self {
        Self::Format(format!("protobuf encode: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_maps_to_format() {
        let e = Error::truncated(io::Error::from(io::ErrorKind::UnexpectedEof), "payload");
        assert!(matches!(e, Error::Format(ref m) if m.contains("payload")));

        let e = Error::truncated(io::Error::from(io::ErrorKind::PermissionDenied), "payload");
        assert!(matches!(e, Error::Io(_)));
    }

    #[test]
    fn index_error_display() {
        let e = Error::Index { index: 7, len: 3 };
        assert_eq!(
            e.to_string(),
            "index 7 out of range (table has 3 entries)"
        );
    }
}
