// Streaming PBF writer.
//
// PbfWriter buffers elements per kind and emits a data block each time
// `block_size` elements are pending:
//   - The header frame is written before the first data frame, or at
//     `finish` for an empty stream
//   - Each block holds at most one group per kind (nodes, ways, relations)
//   - One BlockEncoder is reused for every block

use std::io::{self, Write};

use log::{debug, warn};

use crate::elements::{Element, Node, Relation, Way};
use crate::error::{Error, Result};
use crate::pbf::blob::{BlobMode, Compression, encode_blob};
use crate::pbf::block::BlockContext;
use crate::pbf::encoder::BlockEncoder;
use crate::pbf::frame::{FrameKind, write_frame};
use crate::pbf::header::{FEATURE_DENSE_NODES, FileHeader};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`PbfWriter`].
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Payload compression.
    pub compression: Compression,
    /// Elements per data block.
    pub block_size: usize,
    /// Quantization constants written into every block.
    pub context: BlockContext,
    /// Header block written at the start of the stream.
    pub header: FileHeader,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            block_size: 8000,
            context: BlockContext::default(),
            header: FileHeader::for_writer(),
        }
    }
}

/// Counters returned by [`PbfWriter::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Data blocks written.
    pub blocks: u64,
    /// Data blocks that ended up stored raw.
    pub raw_blocks: u64,
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
    /// Bytes written to the underlying stream, header frame included.
    pub bytes_written: u64,
}

// ---------------------------------------------------------------------------
// PbfWriter
// ---------------------------------------------------------------------------

/// Streaming writer producing a PBF byte stream.
///
/// # Example
/// ```no_run
/// use oxipbf::elements::Node;
/// use oxipbf::stream::{PbfWriter, WriteOptions};
///
/// let mut w = PbfWriter::new(Vec::new(), WriteOptions::default()).unwrap();
/// w.write(Node::new(1, 51.0, 4.0).with_tag("amenity", "cafe")).unwrap();
/// let (bytes, _stats) = w.finish().unwrap();
/// ```
pub struct PbfWriter<W: Write> {
    /// `None` only after `finish`.
    inner: Option<W>,
    opts: WriteOptions,
    encoder: BlockEncoder,
    nodes: Vec<Node>,
    ways: Vec<Way>,
    relations: Vec<Relation>,
    header_written: bool,
    stats: WriteStats,
}

impl<W: Write> PbfWriter<W> {
    pub fn new(writer: W, mut opts: WriteOptions) -> Result<Self> {
        if opts.block_size == 0 {
            return Err(Error::format("block_size must be positive"));
        }
        // Any node group may come out dense.
        opts.header.require(FEATURE_DENSE_NODES);
        let encoder = BlockEncoder::new(opts.context)?;
        Ok(Self {
            inner: Some(writer),
            opts,
            encoder,
            nodes: Vec::new(),
            ways: Vec::new(),
            relations: Vec::new(),
            header_written: false,
            stats: WriteStats::default(),
        })
    }

    /// Buffer one element, writing a block if the buffer is full.
    pub fn write(&mut self, element: impl Into<Element>) -> Result<()> {
        match element.into() {
            Element::Node(n) => self.nodes.push(n),
            Element::Way(w) => self.ways.push(w),
            Element::Relation(r) => self.relations.push(r),
        }
        if self.pending() >= self.opts.block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    pub fn write_all<I>(&mut self, elements: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: Into<Element>,
    {
        for e in elements {
            self.write(e)?;
        }
        Ok(())
    }

    /// Number of buffered elements not yet written.
    pub fn pending(&self) -> usize {
        self.nodes.len() + self.ways.len() + self.relations.len()
    }

    /// Write all buffered elements as one block now. No-op if none are
    /// buffered.
    pub fn flush_block(&mut self) -> Result<()> {
        if self.pending() == 0 {
            return Ok(());
        }
        self.write_header()?;

        let block = self.encoder.encode(&self.nodes, &self.ways, &self.relations)?;
        let raw_len = block.len();
        let (payload, mode) = encode_blob(block, self.opts.compression)?;

        let n = write_frame(self.sink()?, FrameKind::Data, &payload)?;
        debug!(
            "block {}: {} nodes, {} ways, {} relations, {raw_len} -> {} bytes ({mode:?})",
            self.stats.blocks + 1,
            self.nodes.len(),
            self.ways.len(),
            self.relations.len(),
            payload.len()
        );

        self.stats.blocks += 1;
        if mode == BlobMode::Raw {
            self.stats.raw_blocks += 1;
        }
        self.stats.nodes += self.nodes.len() as u64;
        self.stats.ways += self.ways.len() as u64;
        self.stats.relations += self.relations.len() as u64;
        self.stats.bytes_written += n;

        self.nodes.clear();
        self.ways.clear();
        self.relations.clear();
        Ok(())
    }

    /// Write the remaining elements, flush the stream, and hand it back.
    pub fn finish(mut self) -> Result<(W, WriteStats)> {
        self.flush_block()?;
        self.write_header()?;
        let mut inner = self
            .inner
            .take()
            .ok_or_else(|| Error::Io(io::Error::other("writer already finished")))?;
        inner.flush()?;
        Ok((inner, self.stats))
    }

    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.inner.as_ref()
    }

    fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        let raw = self.opts.header.encode_to_vec();
        let (payload, _) = encode_blob(&raw, self.opts.compression)?;
        let n = write_frame(self.sink()?, FrameKind::Header, &payload)?;
        self.stats.bytes_written += n;
        self.header_written = true;
        Ok(())
    }

    fn sink(&mut self) -> Result<&mut W> {
        self.inner
            .as_mut()
            .ok_or_else(|| Error::Io(io::Error::other("writer already finished")))
    }
}

impl<W: Write> Drop for PbfWriter<W> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.as_mut() else {
            return;
        };
        let pending = self.nodes.len() + self.ways.len() + self.relations.len();
        if pending > 0 {
            warn!("PbfWriter dropped without finish: {pending} buffered elements discarded");
        }
        if let Err(e) = inner.flush() {
            warn!("PbfWriter flush on drop failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::{Member, MemberType};
    use crate::pbf::frame::FrameReader;
    use crate::stream::reader::PbfReader;
    use std::io::Cursor;

    fn frame_kinds(bytes: &[u8]) -> Vec<FrameKind> {
        let mut r = FrameReader::new(Cursor::new(bytes));
        let mut kinds = Vec::new();
        while let Some(f) = r.next_frame().unwrap() {
            kinds.push(f.kind);
        }
        kinds
    }

    #[test]
    fn empty_stream_still_has_header() {
        let w = PbfWriter::new(Vec::new(), WriteOptions::default()).unwrap();
        let (bytes, stats) = w.finish().unwrap();
        assert_eq!(frame_kinds(&bytes), [FrameKind::Header]);
        assert_eq!(stats.blocks, 0);
        assert_eq!(stats.bytes_written, bytes.len() as u64);
    }

    #[test]
    fn blocks_split_at_block_size() {
        let opts = WriteOptions {
            block_size: 3,
            ..Default::default()
        };
        let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
        w.write_all((1..=7).map(|i| Node::new(i, 0.0, 0.0))).unwrap();
        assert_eq!(w.pending(), 1);
        let (bytes, stats) = w.finish().unwrap();
        assert_eq!(stats.blocks, 3);
        assert_eq!(stats.nodes, 7);
        assert_eq!(
            frame_kinds(&bytes),
            [FrameKind::Header, FrameKind::Data, FrameKind::Data, FrameKind::Data]
        );
    }

    #[test]
    fn mixed_kinds_share_a_block() {
        let mut w = PbfWriter::new(Vec::new(), WriteOptions::default()).unwrap();
        w.write(Relation::new(3, vec![Member::new(MemberType::Node, 1, "stop")]))
            .unwrap();
        w.write(Node::new(1, 1.5, 2.5)).unwrap();
        w.write(Way::new(2, vec![1])).unwrap();
        let (bytes, stats) = w.finish().unwrap();
        assert_eq!(stats.blocks, 1);

        let mut r = PbfReader::new(Cursor::new(bytes));
        let mut out: Vec<Element> = Vec::new();
        r.read_to(&mut out).unwrap();
        // Groups come out nodes, ways, relations.
        let ids: Vec<i64> = out.iter().map(Element::id).collect();
        assert_eq!(ids, [1, 2, 3]);
    }

    #[test]
    fn raw_compression_counts_raw_blocks() {
        let opts = WriteOptions {
            compression: Compression::Raw,
            ..Default::default()
        };
        let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
        w.write(Node::new(1, 0.0, 0.0)).unwrap();
        let (_, stats) = w.finish().unwrap();
        assert_eq!(stats.raw_blocks, 1);
    }

    #[test]
    fn zero_block_size_rejected() {
        let opts = WriteOptions {
            block_size: 0,
            ..Default::default()
        };
        assert!(PbfWriter::new(Vec::new(), opts).is_err());
    }

    #[test]
    fn drop_without_finish_flushes_sink() {
        let mut buf = Vec::new();
        {
            let opts = WriteOptions {
                block_size: 1,
                ..Default::default()
            };
            let mut w = PbfWriter::new(io::BufWriter::new(&mut buf), opts).unwrap();
            w.write(Node::new(1, 0.0, 0.0)).unwrap();
            w.write(Node::new(2, 0.0, 0.0)).unwrap();
        }
        assert_eq!(
            frame_kinds(&buf),
            [FrameKind::Header, FrameKind::Data, FrameKind::Data]
        );
    }

    #[test]
    fn custom_header_gains_dense_nodes() {
        let opts = WriteOptions {
            header: FileHeader {
                source: Some("survey".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
        w.write(Node::new(1, 0.5, 0.5)).unwrap();
        let (bytes, _) = w.finish().unwrap();

        let mut r = PbfReader::new(Cursor::new(bytes));
        let header = r.read_header().unwrap().unwrap();
        assert!(header.has_feature(FEATURE_DENSE_NODES));
        assert_eq!(header.source.as_deref(), Some("survey"));
        assert_eq!(
            header
                .required_features
                .iter()
                .filter(|f| *f == FEATURE_DENSE_NODES)
                .count(),
            1
        );
    }

    #[test]
    fn oversized_block_fails_on_write() {
        let huge = "x".repeat(crate::pbf::frame::MAX_BLOB_LEN + 1);
        let opts = WriteOptions {
            compression: Compression::Raw,
            ..Default::default()
        };
        let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
        w.write(Node::new(1, 0.0, 0.0).with_tag("note", huge)).unwrap();
        assert!(matches!(w.finish(), Err(Error::Format(_))));
    }
}
