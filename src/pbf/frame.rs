// Outer stream framing.
//
// Each frame on the wire is:
//   1. u32 big-endian length of the BlobHeader message
//   2. BlobHeader (declared type name + payload length)
//   3. Blob payload (`datasize` bytes)
//
// EOF exactly at a frame boundary ends the stream; EOF anywhere else is a
// truncated stream.

use std::io::{self, Read, Write};

use log::debug;
use prost::Message;

use super::proto::BlobHeader;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Type names and hard limits
// ---------------------------------------------------------------------------

/// Type name of the one-time file header frame.
pub const HEADER_TYPE: &str = "OSMHeader";
/// Type name of a data block frame.
pub const DATA_TYPE: &str = "OSMData";

/// Maximum serialized BlobHeader size.
pub const MAX_HEADER_LEN: usize = 64 * 1024;
/// Maximum payload size, and maximum decompressed block size.
pub const MAX_BLOB_LEN: usize = 32 * 1024 * 1024;

/// The two frame kinds a stream may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Header,
    Data,
}

impl FrameKind {
    pub fn from_type_name(name: &str) -> Result<Self> {
        match name {
            HEADER_TYPE => Ok(Self::Header),
            DATA_TYPE => Ok(Self::Data),
            other => Err(Error::Unsupported(format!("frame type {other:?}"))),
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Header => HEADER_TYPE,
            Self::Data => DATA_TYPE,
        }
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// A frame whose payload borrows the reader's buffer.
#[derive(Debug)]
pub struct RawFrame<'a> {
    pub kind: FrameKind,
    /// Opaque index data carried in the header, if any.
    pub indexdata: Option<Vec<u8>>,
    pub payload: &'a [u8],
}

/// Pulls frames off a byte stream, reusing one payload buffer.
pub struct FrameReader<R> {
    reader: R,
    header_buf: Vec<u8>,
    payload_buf: Vec<u8>,
    frames_read: u64,
    bytes_read: u64,
}

impl<R: Read> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            header_buf: Vec::new(),
            payload_buf: Vec::new(),
            frames_read: 0,
            bytes_read: 0,
        }
    }

    /// Read the next frame, or `None` on clean EOF.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame<'_>>> {
        let header_len = match read_length_prefix(&mut self.reader)? {
            Some(len) => len as usize,
            None => return Ok(None),
        };
        if header_len > MAX_HEADER_LEN {
            return Err(Error::format(format!(
                "frame header too large: {header_len} exceeds max {MAX_HEADER_LEN}"
            )));
        }

        self.header_buf.resize(header_len, 0);
        self.reader
            .read_exact(&mut self.header_buf)
            .map_err(|e| Error::truncated(e, "frame header"))?;
        let header = BlobHeader::decode(self.header_buf.as_slice())?;

        let kind = FrameKind::from_type_name(&header.r#type)?;
        let payload_len = usize::try_from(header.datasize).map_err(|_| {
            Error::format(format!("negative payload length {}", header.datasize))
        })?;
        if payload_len > MAX_BLOB_LEN {
            return Err(Error::format(format!(
                "frame payload too large: {payload_len} exceeds max {MAX_BLOB_LEN}"
            )));
        }

        self.payload_buf.resize(payload_len, 0);
        self.reader
            .read_exact(&mut self.payload_buf)
            .map_err(|e| Error::truncated(e, "frame payload"))?;

        self.frames_read += 1;
        self.bytes_read += (4 + header_len + payload_len) as u64;
        debug!(
            "frame {}: {} header={header_len} payload={payload_len}",
            self.frames_read,
            kind.type_name()
        );

        Ok(Some(RawFrame {
            kind,
            indexdata: header.indexdata,
            payload: &self.payload_buf,
        }))
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Read the 4-byte length prefix. `None` if the stream ends before the
/// first byte; a partial prefix is a truncation.
fn read_length_prefix<R: Read>(r: &mut R) -> Result<Option<u32>> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(Error::format(format!(
                    "truncated frame length prefix ({filled} of 4 bytes)"
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(Some(u32::from_be_bytes(buf)))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write one frame. Returns the number of bytes written.
///
/// Flushing is left to the caller.
pub fn write_frame<W: Write>(w: &mut W, kind: FrameKind, payload: &[u8]) -> Result<u64> {
    if payload.len() > MAX_BLOB_LEN {
        return Err(Error::format(format!(
            "frame payload too large: {} exceeds max {MAX_BLOB_LEN}",
            payload.len()
        )));
    }
    let header = BlobHeader {
        r#type: kind.type_name().to_owned(),
        indexdata: None,
        datasize: payload.len() as i32,
    };
    let header_bytes = header.encode_to_vec();

    w.write_all(&(header_bytes.len() as u32).to_be_bytes())?;
    w.write_all(&header_bytes)?;
    w.write_all(payload)?;

    Ok((4 + header_bytes.len() + payload.len()) as u64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
