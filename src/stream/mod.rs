// Streaming layer: whole PBF streams on top of the format layer.
//
// - `reader`: frame loop, kind filtering, cancellation, element iterator
// - `writer`: per-kind buffering, block grouping, header emission

pub mod reader;
pub mod writer;

pub use reader::{Elements, PbfReader, ReadOptions, ReadOutcome, ReadStats};
pub use writer::{PbfWriter, WriteOptions, WriteStats};
