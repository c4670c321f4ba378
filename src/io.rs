// File-level helpers.
//
// These own the file handles for the duration of a call: files are opened
// before the first frame and closed on every return path, errors included.
// Reads go through a `BufReader`, writes through a `BufWriter`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::elements::{Element, ElementKinds, Node, Relation, Way};
use crate::error::Result;
use crate::pbf::block::BlockContext;
use crate::pbf::decoder::ElementSink;
use crate::pbf::header::FEATURE_HISTORICAL;
use crate::stream::reader::{PbfReader, ReadOptions, ReadOutcome, ReadStats};
use crate::stream::writer::{PbfWriter, WriteOptions, WriteStats};

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

pub const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Opening
// ---------------------------------------------------------------------------

/// Open a PBF file for streaming reads.
pub fn open_reader(path: &Path, opts: ReadOptions) -> Result<PbfReader<BufReader<File>>> {
    let file = File::open(path)?;
    Ok(PbfReader::with_options(
        BufReader::with_capacity(BUF_SIZE, file),
        opts,
    ))
}

/// Create (or truncate) a PBF file for streaming writes.
pub fn create_writer(path: &Path, opts: WriteOptions) -> Result<PbfWriter<BufWriter<File>>> {
    let file = File::create(path)?;
    PbfWriter::new(BufWriter::with_capacity(BUF_SIZE, file), opts)
}

// ---------------------------------------------------------------------------
// Whole-file operations
// ---------------------------------------------------------------------------

/// Read every element of the given kinds into memory.
pub fn read_file(path: &Path, kinds: ElementKinds) -> Result<Vec<Element>> {
    let mut reader = open_reader(
        path,
        ReadOptions {
            kinds,
            ..Default::default()
        },
    )?;
    let mut out = Vec::new();
    reader.read_to(&mut out)?;
    Ok(out)
}

/// Write `elements` to a new file.
pub fn write_file<I>(path: &Path, elements: I, opts: WriteOptions) -> Result<WriteStats>
where
    I: IntoIterator,
    I::Item: Into<Element>,
{
    let mut writer = create_writer(path, opts)?;
    writer.write_all(elements)?;
    let (_, stats) = writer.finish()?;
    Ok(stats)
}

/// Statistics returned by [`copy_file`].
#[derive(Debug, Clone)]
pub struct CopyStats {
    pub input_size: u64,
    pub output_size: u64,
    pub outcome: ReadOutcome,
    pub read: ReadStats,
    pub written: WriteStats,
}

/// Sink forwarding every decoded element into a writer.
struct Forward<'w, W: Write>(&'w mut PbfWriter<W>);

impl<W: Write> ElementSink for Forward<'_, W> {
    fn on_node(&mut self, _: &BlockContext, node: Node) -> Result<()> {
        self.0.write(node)
    }

    fn on_way(&mut self, _: &BlockContext, way: Way) -> Result<()> {
        self.0.write(way)
    }

    fn on_relation(&mut self, _: &BlockContext, relation: Relation) -> Result<()> {
        self.0.write(relation)
    }
}

/// Re-encode `input` into `output`, keeping only the kinds in
/// `read_opts.kinds`. The input's header fields are carried over.
pub fn copy_file(
    input: &Path,
    output: &Path,
    read_opts: ReadOptions,
    mut write_opts: WriteOptions,
) -> Result<CopyStats> {
    let input_size = std::fs::metadata(input)?.len();
    let mut reader = open_reader(input, read_opts)?;
    if let Some(header) = reader.read_header()? {
        write_opts.header.bbox = header.bbox;
        write_opts.header.source = header.source.clone();
        write_opts.header.replication_timestamp = header.replication_timestamp;
        write_opts.header.replication_sequence_number = header.replication_sequence_number;
        write_opts.header.replication_base_url = header.replication_base_url.clone();
        if header.has_feature(FEATURE_HISTORICAL) {
            write_opts.header.require(FEATURE_HISTORICAL);
        }
    }

    let mut writer = create_writer(output, write_opts)?;
    let outcome = reader.read_to(&mut Forward(&mut writer))?;
    let (file, written) = writer.finish()?;
    let output_size = file.into_inner().map_err(|e| e.into_error())?.metadata()?.len();

    Ok(CopyStats {
        input_size,
        output_size,
        outcome,
        read: reader.stats(),
        written,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
