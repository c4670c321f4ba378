// Streaming PBF reader.
//
// PbfReader pulls frames off any `Read`, decompresses them, and either
// returns the decoded block or pushes its elements into a sink:
//   - One frame in memory at a time (payload, decompressed block, Block)
//   - Header frames are parsed and kept, never handed to a sink
//   - Optional cancellation flag, checked between frames only

use std::collections::VecDeque;
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;

use crate::elements::{Element, ElementKinds, Node, Relation, Way};
use crate::error::Result;
use crate::pbf::blob::decode_blob;
use crate::pbf::block::{Block, BlockContext};
use crate::pbf::decoder::{DecodeCounts, ElementSink, decode_block};
use crate::pbf::frame::{FrameKind, FrameReader};
use crate::pbf::header::FileHeader;

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Configuration for [`PbfReader`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Kinds handed to sinks. Groups of other kinds are skipped without
    /// building any elements.
    pub kinds: ElementKinds,
    /// Set to `true` from anywhere to stop before the next frame.
    pub cancel: Option<Arc<AtomicBool>>,
}

/// How a full read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The stream ended cleanly.
    Completed,
    /// The cancellation flag was seen between two frames.
    Cancelled,
}

/// Counters kept while reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Frames read, header frames included.
    pub frames: u64,
    /// Data blocks decoded.
    pub blocks: u64,
    /// Elements handed to sinks, per kind.
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
    /// Bytes consumed from the underlying stream.
    pub bytes_read: u64,
}

impl ReadStats {
    fn add(&mut self, counts: DecodeCounts) {
        self.nodes += counts.nodes;
        self.ways += counts.ways;
        self.relations += counts.relations;
    }
}

// ---------------------------------------------------------------------------
// PbfReader
// ---------------------------------------------------------------------------

/// Streaming reader over a PBF byte stream.
///
/// One instance owns one stream and one reusable [`Block`]; it is not meant
/// to be shared between threads.
pub struct PbfReader<R: Read> {
    frames: FrameReader<R>,
    opts: ReadOptions,
    header: Option<FileHeader>,
    /// Decompressed bytes of the current frame.
    scratch: Vec<u8>,
    /// Scratch holds a data block not yet returned (left by `read_header`).
    pending: bool,
    block: Block,
    stats: ReadStats,
    cancelled: bool,
}

impl<R: Read> PbfReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_options(reader, ReadOptions::default())
    }

    pub fn with_options(reader: R, opts: ReadOptions) -> Self {
        Self {
            frames: FrameReader::new(reader),
            opts,
            header: None,
            scratch: Vec::new(),
            pending: false,
            block: Block::default(),
            stats: ReadStats::default(),
            cancelled: false,
        }
    }

    /// The file header, once its frame has been read.
    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    /// Read up to the first frame and return the file header if the stream
    /// starts with one. A data frame found instead is kept for the next
    /// block read.
    pub fn read_header(&mut self) -> Result<Option<&FileHeader>> {
        if self.header.is_none() && !self.pending && self.stats.frames == 0 {
            self.pending = self.advance_one()? == Some(FrameKind::Data);
        }
        Ok(self.header.as_ref())
    }

    /// Decode the next data block into the reader's own buffer.
    ///
    /// The returned block is overwritten by the next call; the borrow makes
    /// sure it is no longer in use by then.
    pub fn next_block(&mut self) -> Result<Option<&Block>> {
        if !self.next_data()? {
            return Ok(None);
        }
        self.block.decode_into(&self.scratch)?;
        self.stats.blocks += 1;
        Ok(Some(&self.block))
    }

    /// Decode the next data block into a fresh allocation.
    pub fn next_block_owned(&mut self) -> Result<Option<Block>> {
        if !self.next_data()? {
            return Ok(None);
        }
        let block = Block::decode(&self.scratch)?;
        self.stats.blocks += 1;
        Ok(Some(block))
    }

    /// Decode the next data block and push its elements into `sink`.
    /// Returns `false` once the stream has ended or been cancelled.
    pub fn read_block_to<S: ElementSink + ?Sized>(&mut self, sink: &mut S) -> Result<bool> {
        if !self.next_data()? {
            return Ok(false);
        }
        self.block.decode_into(&self.scratch)?;
        self.stats.blocks += 1;
        let counts = decode_block(&self.block, self.opts.kinds, sink)?;
        self.stats.add(counts);
        Ok(true)
    }

    /// Push every remaining element into `sink`.
    pub fn read_to<S: ElementSink + ?Sized>(&mut self, sink: &mut S) -> Result<ReadOutcome> {
        while self.read_block_to(sink)? {}
        debug!(
            "read finished: {} frames, {} blocks, {} bytes{}",
            self.stats.frames,
            self.stats.blocks,
            self.stats.bytes_read,
            if self.cancelled { " (cancelled)" } else { "" }
        );
        Ok(self.outcome())
    }

    /// Lazy iterator over the remaining elements, one block buffered at a
    /// time. Stops after the first error.
    pub fn elements(&mut self) -> Elements<'_, R> {
        Elements {
            reader: self,
            queue: VecDeque::new(),
            done: false,
        }
    }

    pub fn outcome(&self) -> ReadOutcome {
        if self.cancelled {
            ReadOutcome::Cancelled
        } else {
            ReadOutcome::Completed
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    pub fn into_inner(self) -> R {
        self.frames.into_inner()
    }

    /// Leave the next data block's bytes in `scratch`. Header frames on the
    /// way are parsed and stored.
    fn next_data(&mut self) -> Result<bool> {
        if self.pending {
            self.pending = false;
            return Ok(true);
        }
        loop {
            match self.advance_one()? {
                Some(FrameKind::Data) => return Ok(true),
                Some(FrameKind::Header) => continue,
                None => return Ok(false),
            }
        }
    }

    /// Read and decompress one frame. `None` at end of stream or after
    /// cancellation.
    fn advance_one(&mut self) -> Result<Option<FrameKind>> {
        if self.cancelled {
            return Ok(None);
        }
        if let Some(flag) = &self.opts.cancel
            && flag.load(Ordering::Relaxed)
        {
            debug!("read cancelled after {} frames", self.stats.frames);
            self.cancelled = true;
            return Ok(None);
        }

        let Some(frame) = self.frames.next_frame()? else {
            return Ok(None);
        };
        let kind = frame.kind;
        decode_blob(frame.payload, &mut self.scratch)?;
        self.stats.frames = self.frames.frames_read();
        self.stats.bytes_read = self.frames.bytes_read();

        if kind == FrameKind::Header {
            let header = FileHeader::decode(&self.scratch)?;
            debug!(
                "file header: program={:?} required={:?}",
                header.writing_program, header.required_features
            );
            self.header = Some(header);
        }
        Ok(Some(kind))
    }
}

// ---------------------------------------------------------------------------
// Elements iterator
// ---------------------------------------------------------------------------

/// Iterator returned by [`PbfReader::elements`].
pub struct Elements<'a, R: Read> {
    reader: &'a mut PbfReader<R>,
    queue: VecDeque<Element>,
    done: bool,
}

struct Queue<'q>(&'q mut VecDeque<Element>);

impl ElementSink for Queue<'_> {
    fn on_node(&mut self, _: &BlockContext, node: Node) -> Result<()> {
        self.0.push_back(Element::Node(node));
        Ok(())
    }

    fn on_way(&mut self, _: &BlockContext, way: Way) -> Result<()> {
        self.0.push_back(Element::Way(way));
        Ok(())
    }

    fn on_relation(&mut self, _: &BlockContext, relation: Relation) -> Result<()> {
        self.0.push_back(Element::Relation(relation));
        Ok(())
    }
}

impl<R: Read> Iterator for Elements<'_, R> {
    type Item = Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(e) = self.queue.pop_front() {
                return Some(Ok(e));
            }
            if self.done {
                return None;
            }
            match self.reader.read_block_to(&mut Queue(&mut self.queue)) {
                Ok(true) => {}
                Ok(false) => self.done = true,
                Err(e) => {
                    // A failed block yields nothing, not even what was
                    // queued before the error.
                    self.queue.clear();
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<R: Read> std::iter::FusedIterator for Elements<'_, R> {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::stream::writer::{PbfWriter, WriteOptions};
    use prost::Message;
    use std::io::Cursor;

    fn sample_stream(block_size: usize) -> Vec<u8> {
        let opts = WriteOptions {
            block_size,
            ..Default::default()
        };
        let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
        for i in 1..=10 {
            w.write(Node::new(i, 0.0, 0.0)).unwrap();
        }
        w.write(Way::new(100, vec![1, 2, 3])).unwrap();
        w.finish().unwrap().0
    }

    #[test]
    fn header_is_kept_not_emitted() {
        let mut r = PbfReader::new(Cursor::new(sample_stream(8000)));
        let mut out: Vec<Element> = Vec::new();
        assert_eq!(r.read_to(&mut out).unwrap(), ReadOutcome::Completed);
        assert_eq!(out.len(), 11);
        assert!(r.header().is_some());
        assert_eq!(r.stats().frames, 2);
        assert_eq!(r.stats().blocks, 1);
    }

    #[test]
    fn read_header_keeps_first_data_frame() {
        let stream = sample_stream(8000);
        // Drop the header frame so the stream starts with data.
        let header_len = u32::from_be_bytes([stream[0], stream[1], stream[2], stream[3]]) as usize;
        let header =
            crate::pbf::proto::BlobHeader::decode(&stream[4..4 + header_len]).unwrap();
        let data = stream[4 + header_len + header.datasize as usize..].to_vec();

        let mut r = PbfReader::new(Cursor::new(data));
        assert!(r.read_header().unwrap().is_none());
        let mut out: Vec<Element> = Vec::new();
        r.read_to(&mut out).unwrap();
        assert_eq!(out.len(), 11);
    }

    #[test]
    fn next_block_reuses_buffer() {
        let mut r = PbfReader::new(Cursor::new(sample_stream(4)));
        let mut groups = Vec::new();
        while let Some(block) = r.next_block().unwrap() {
            groups.push(block.groups.len());
        }
        // 10 nodes + 1 way in blocks of 4: [4n] [4n] [2n, 1w]
        assert_eq!(groups, [1, 1, 2]);
        assert_eq!(r.stats().blocks, 3);
    }

    #[test]
    fn owned_blocks_outlive_the_next_read() {
        let mut r = PbfReader::new(Cursor::new(sample_stream(4)));
        let first = r.next_block_owned().unwrap().unwrap();
        let second = r.next_block_owned().unwrap().unwrap();
        assert_eq!(first.groups.len(), 1);
        assert_eq!(second.groups.len(), 1);
        assert!(r.next_block_owned().unwrap().is_some());
        assert!(r.next_block_owned().unwrap().is_none());
    }

    #[test]
    fn cancel_before_first_frame() {
        let flag = Arc::new(AtomicBool::new(true));
        let opts = ReadOptions {
            cancel: Some(flag),
            ..Default::default()
        };
        let mut r = PbfReader::with_options(Cursor::new(sample_stream(8000)), opts);
        let mut out: Vec<Element> = Vec::new();
        assert_eq!(r.read_to(&mut out).unwrap(), ReadOutcome::Cancelled);
        assert!(out.is_empty());
        assert_eq!(r.stats().frames, 0);
    }

    #[test]
    fn elements_iterator_stops_on_error() {
        let mut stream = sample_stream(8000);
        stream.truncate(stream.len() - 3);
        let mut r = PbfReader::new(Cursor::new(stream));
        let mut it = r.elements();
        assert!(matches!(it.next(), Some(Err(Error::Format(_)))));
        assert!(it.next().is_none());
    }

    #[test]
    fn elements_iterator_drops_partial_block() {
        use crate::pbf::blob::{Compression, encode_blob};
        use crate::pbf::frame::write_frame;
        use crate::pbf::proto;

        // Both nodes decode before the trailing keys_vals entry is seen.
        let block = proto::PrimitiveBlock {
            stringtable: Some(proto::StringTable { s: vec![Vec::new()] }),
            primitivegroup: vec![proto::PrimitiveGroup {
                dense: Some(proto::DenseNodes {
                    id: vec![1, 1],
                    lat: vec![0, 0],
                    lon: vec![0, 0],
                    keys_vals: vec![0, 0, 0],
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (payload, _) = encode_blob(&block.encode_to_vec(), Compression::Raw).unwrap();
        let mut stream = Vec::new();
        write_frame(&mut stream, FrameKind::Data, &payload).unwrap();

        let mut r = PbfReader::new(Cursor::new(stream));
        let items: Vec<Result<Element>> = r.elements().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Format(_))));
    }
}
