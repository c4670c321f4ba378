//! Oxipbf: streaming OpenStreetMap PBF codec in Rust.
//!
//! The crate provides:
//! - Domain objects: nodes, ways, relations with tags and metadata (`elements`)
//! - The PBF format layer: framing, blob compression, string tables, delta
//!   coding, dense/explicit block encode and decode (`pbf`)
//! - Streaming reader/writer over any `Read`/`Write` (`stream`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! Memory use is bounded by one block at a time in both directions.
//!
//! # Quick Start
//!
//! ```no_run
//! use oxipbf::elements::{Element, Node, Way};
//! use oxipbf::stream::{PbfReader, PbfWriter, WriteOptions};
//!
//! let mut writer = PbfWriter::new(Vec::new(), WriteOptions::default()).unwrap();
//! writer.write(Node::new(1, 51.0, 4.0).with_tag("amenity", "cafe")).unwrap();
//! writer.write(Way::new(10, vec![1, 1])).unwrap();
//! let (bytes, _) = writer.finish().unwrap();
//!
//! let mut reader = PbfReader::new(bytes.as_slice());
//! let mut elements: Vec<Element> = Vec::new();
//! reader.read_to(&mut elements).unwrap();
//! assert_eq!(elements.len(), 2);
//! ```

pub mod elements;
pub mod error;
pub mod io;
pub mod pbf;
pub mod stream;

#[cfg(feature = "cli")]
pub mod cli;

pub use elements::{Element, ElementKinds, Info, Member, MemberType, Node, Relation, Tags, Way};
pub use error::{Error, Result};
