// OSM PBF format layer.
//
// Everything needed to turn frames of a byte stream into blocks of domain
// objects and back, with no knowledge of where the bytes come from.
//
// # Modules
//
// - `proto`: protobuf wire messages (container, header, data block)
// - `delta`: delta coding and coordinate/timestamp quantization
// - `strings`: per-block string table
// - `frame`: length-prefixed frame reading/writing
// - `blob`: payload compression backends
// - `header`: the one-time file header block
// - `block`: in-memory block, groups, quantization context
// - `decoder`: block -> elements, pushed into an `ElementSink`
// - `encoder`: elements -> block bytes, reusing wire buffers

pub mod blob;
pub mod block;
pub mod decoder;
pub mod delta;
pub mod encoder;
pub mod frame;
pub mod header;
pub mod proto;
pub mod strings;

// Re-export key types for convenience.
pub use blob::{BlobBackend, BlobMode, Compression, decode_blob, encode_blob};
pub use block::{Block, BlockContext, ExplicitGroup, Group};
pub use decoder::{DecodeCounts, ElementSink, decode_block};
pub use encoder::BlockEncoder;
pub use frame::{DATA_TYPE, FrameKind, FrameReader, HEADER_TYPE, RawFrame, write_frame};
pub use header::{BoundingBox, FileHeader};
pub use strings::StringTable;
