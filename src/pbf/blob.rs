// Blob payload (de)compression.
//
// A Blob carries exactly one of several data fields; the field used is the
// compression mode. Built-in backends:
//   - Raw (passthrough)
//   - Zlib/Deflate (via flate2)
//   - LZMA (via lzma-rs, feature-gated `lzma`)
//
// bzip2, lz4 and zstd payloads are recognized and rejected as unsupported.

use std::io::{self, Read, Write};

use prost::Message;

use super::frame::MAX_BLOB_LEN;
use super::proto::{Blob, blob::Data};
use crate::error::{Error, Result};

/// Payloads shorter than this are always stored raw.
const MIN_COMPRESS_SIZE: usize = 64;

// ---------------------------------------------------------------------------
// Modes and options
// ---------------------------------------------------------------------------

/// Which Blob data field carries the block bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobMode {
    Raw,
    Deflate,
    Lzma,
}

/// Compression requested by a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Store blocks uncompressed.
    Raw,
    /// Zlib container, level 0-9.
    Deflate(u32),
    /// LZMA (requires the `lzma` feature).
    #[cfg(feature = "lzma")]
    Lzma,
}

impl Default for Compression {
    fn default() -> Self {
        Self::Deflate(6)
    }
}

impl Compression {
    pub fn backend(self) -> Box<dyn BlobBackend> {
        match self {
            Self::Raw => Box::new(NoCompression),
            Self::Deflate(level) => Box::new(ZlibBackend::new(level)),
            #[cfg(feature = "lzma")]
            Self::Lzma => Box::new(LzmaBackend),
        }
    }
}

// ---------------------------------------------------------------------------
// BlobBackend trait
// ---------------------------------------------------------------------------

/// A compressor for block payloads.
pub trait BlobBackend: Send + Sync {
    /// The Blob field this backend writes and reads.
    fn mode(&self) -> BlobMode;

    /// Compress a serialized block.
    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>>;

    /// Decompress into `out` (cleared first). Implementations must stop with
    /// an error once `limit` bytes have been produced.
    fn decompress(&self, data: &[u8], limit: usize, out: &mut Vec<u8>) -> Result<()>;

    /// Whether this payload is worth compressing.
    fn should_compress(&self, data: &[u8]) -> bool {
        data.len() >= MIN_COMPRESS_SIZE
    }
}

/// Passthrough backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompression;

impl BlobBackend for NoCompression {
    fn mode(&self) -> BlobMode {
        BlobMode::Raw
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], limit: usize, out: &mut Vec<u8>) -> Result<()> {
        if data.len() > limit {
            return Err(Error::format(format!(
                "raw block too large: {} exceeds max {limit}",
                data.len()
            )));
        }
        out.clear();
        out.extend_from_slice(data);
        Ok(())
    }

    fn should_compress(&self, _data: &[u8]) -> bool {
        false
    }
}

/// Zlib/Deflate backend.
#[derive(Debug, Clone, Copy)]
pub struct ZlibBackend {
    level: flate2::Compression,
}

impl ZlibBackend {
    /// Create a Zlib backend with the given compression level (0-9).
    pub fn new(level: u32) -> Self {
        Self {
            level: flate2::Compression::new(level.min(9)),
        }
    }
}

impl Default for ZlibBackend {
    fn default() -> Self {
        Self::new(6)
    }
}

impl BlobBackend for ZlibBackend {
    fn mode(&self) -> BlobMode {
        BlobMode::Deflate
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), self.level);
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8], limit: usize, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        let decoder = flate2::read::ZlibDecoder::new(data);
        read_limited(decoder, limit, out)
            .map_err(|e| Error::Codec(format!("zlib: {e}")))?;
        check_limit(out, limit)
    }
}

/// LZMA backend.
#[cfg(feature = "lzma")]
#[derive(Debug, Clone, Copy, Default)]
pub struct LzmaBackend;

#[cfg(feature = "lzma")]
impl BlobBackend for LzmaBackend {
    fn mode(&self) -> BlobMode {
        BlobMode::Lzma
    }

    fn compress(&self, data: &[u8]) -> io::Result<Vec<u8>> {
        let mut input = io::Cursor::new(data);
        let mut output = Vec::new();
        lzma_rs::lzma_compress(&mut input, &mut output)?;
        Ok(output)
    }

    fn decompress(&self, data: &[u8], limit: usize, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        let mut input = io::BufReader::new(io::Cursor::new(data));
        let mut sink = LimitedWriter {
            out,
            limit,
            overflowed: false,
        };
        // The dictionary buffer only holds bytes already decoded, so capping
        // it at the output limit bounds memory before the first flush.
        let opts = lzma_rs::decompress::Options {
            memlimit: Some(limit),
            ..Default::default()
        };
        let result = lzma_rs::lzma_decompress_with_options(&mut input, &mut sink, &opts);
        let over_memlimit = matches!(
            &result,
            Err(lzma_rs::error::Error::LzmaError(msg)) if msg.contains("memory limit")
        );
        if sink.overflowed || over_memlimit {
            return Err(Error::format(format!(
                "decompressed block exceeds max {limit} bytes"
            )));
        }
        result.map_err(|e| Error::Codec(format!("lzma: {e}")))
    }
}

/// Output sink that refuses to grow past `limit` bytes, so a hostile stream
/// fails as soon as it overshoots instead of after full expansion.
#[cfg(feature = "lzma")]
struct LimitedWriter<'a> {
    out: &'a mut Vec<u8>,
    limit: usize,
    overflowed: bool,
}

#[cfg(feature = "lzma")]
impl Write for LimitedWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.out.len() + buf.len() > self.limit {
            self.overflowed = true;
            return Err(io::Error::other("decompressed size limit exceeded"));
        }
        self.out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn read_limited<R: Read>(r: R, limit: usize, out: &mut Vec<u8>) -> io::Result<()> {
    // One byte past the limit tells "exactly at limit" from "too large".
    r.take(limit as u64 + 1).read_to_end(out)?;
    Ok(())
}

fn check_limit(out: &[u8], limit: usize) -> Result<()> {
    if out.len() > limit {
        return Err(Error::format(format!(
            "decompressed block exceeds max {limit} bytes"
        )));
    }
    Ok(())
}

/// Decode-side dispatch from the Blob field to a backend.
pub fn backend_for_mode(mode: BlobMode) -> Result<Box<dyn BlobBackend>> {
    match mode {
        BlobMode::Raw => Ok(Box::new(NoCompression)),
        BlobMode::Deflate => Ok(Box::new(ZlibBackend::default())),
        #[cfg(feature = "lzma")]
        BlobMode::Lzma => Ok(Box::new(LzmaBackend)),
        #[cfg(not(feature = "lzma"))]
        BlobMode::Lzma => Err(Error::Unsupported(
            "LZMA blobs require the 'lzma' feature".into(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Blob encode/decode
// ---------------------------------------------------------------------------

/// Decompress a mode-tagged buffer. `raw_size`, if known, must match.
pub fn decompress(
    data: &[u8],
    mode: BlobMode,
    raw_size: Option<usize>,
    out: &mut Vec<u8>,
) -> Result<()> {
    if let Some(n) = raw_size
        && n > MAX_BLOB_LEN
    {
        return Err(Error::format(format!(
            "raw_size {n} exceeds max {MAX_BLOB_LEN}"
        )));
    }
    let backend = backend_for_mode(mode)?;
    backend.decompress(data, MAX_BLOB_LEN, out)?;
    if let Some(expected) = raw_size
        && mode != BlobMode::Raw
        && out.len() != expected
    {
        return Err(Error::Codec(format!(
            "size mismatch: raw_size says {expected}, got {}",
            out.len()
        )));
    }
    Ok(())
}

/// Parse a frame payload and decompress the block it carries into `out`.
/// Returns the mode that was found.
pub fn decode_blob(payload: &[u8], out: &mut Vec<u8>) -> Result<BlobMode> {
    let blob = Blob::decode(payload)?;
    let raw_size = match blob.raw_size {
        Some(n) => Some(
            usize::try_from(n).map_err(|_| Error::format(format!("negative raw_size {n}")))?,
        ),
        None => None,
    };
    let (mode, data) = match &blob.data {
        Some(Data::Raw(d)) => (BlobMode::Raw, d),
        Some(Data::ZlibData(d)) => (BlobMode::Deflate, d),
        Some(Data::LzmaData(d)) => (BlobMode::Lzma, d),
        Some(Data::ObsoleteBzip2Data(_)) => {
            return Err(Error::Unsupported("bzip2 blob compression".into()));
        }
        Some(Data::Lz4Data(_)) => return Err(Error::Unsupported("lz4 blob compression".into())),
        Some(Data::ZstdData(_)) => {
            return Err(Error::Unsupported("zstd blob compression".into()));
        }
        None => return Err(Error::format("blob carries no data")),
    };
    decompress(data, mode, raw_size, out)?;
    Ok(mode)
}

/// Serialize a Blob carrying `block`, compressed with `compression` when
/// that is worth it. Returns the payload bytes and the mode actually used.
pub fn encode_blob(block: &[u8], compression: Compression) -> Result<(Vec<u8>, BlobMode)> {
    // Readers reject anything larger, compressed or not.
    if block.len() > MAX_BLOB_LEN {
        return Err(Error::format(format!(
            "block too large: {} bytes exceeds max {MAX_BLOB_LEN}",
            block.len()
        )));
    }
    let backend = compression.backend();

    let mut blob = Blob {
        raw_size: None,
        data: None,
    };
    let mut mode = BlobMode::Raw;
    if backend.should_compress(block) {
        let packed = backend.compress(block)?;
        if packed.len() < block.len() {
            mode = backend.mode();
            blob.raw_size = Some(block.len() as i32);
            blob.data = Some(match mode {
                BlobMode::Raw => Data::Raw(packed),
                BlobMode::Deflate => Data::ZlibData(packed),
                BlobMode::Lzma => Data::LzmaData(packed),
            });
        }
    }
    if blob.data.is_none() {
        blob.data = Some(Data::Raw(block.to_vec()));
    }

    Ok((blob.encode_to_vec(), mode))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
