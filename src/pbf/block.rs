// In-memory form of one data block.
//
// The wire PrimitiveGroup lets every field be set at once; here a group is
// either a dense node set or a list of explicit records. A wire group that
// carries both is split into a Dense group followed by an Explicit one.

use log::trace;
use prost::Message;

use super::delta;
use super::proto;
use super::strings::StringTable;
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// BlockContext
// ---------------------------------------------------------------------------

/// Quantization constants of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockContext {
    /// Nanodegrees per stored coordinate unit.
    pub granularity: i32,
    /// Nanodegrees added to every latitude.
    pub lat_offset: i64,
    /// Nanodegrees added to every longitude.
    pub lon_offset: i64,
    /// Milliseconds per stored timestamp unit.
    pub date_granularity: i32,
}

impl Default for BlockContext {
    fn default() -> Self {
        Self {
            granularity: 100,
            lat_offset: 0,
            lon_offset: 0,
            date_granularity: 1000,
        }
    }
}

impl BlockContext {
    pub fn validate(&self) -> Result<()> {
        if self.granularity <= 0 {
            return Err(Error::format(format!(
                "granularity must be positive, got {}",
                self.granularity
            )));
        }
        if self.date_granularity <= 0 {
            return Err(Error::format(format!(
                "date_granularity must be positive, got {}",
                self.date_granularity
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn decode_lat(&self, stored: i64) -> f64 {
        delta::decode_coord(stored, self.lat_offset, self.granularity)
    }

    #[inline]
    pub fn decode_lon(&self, stored: i64) -> f64 {
        delta::decode_coord(stored, self.lon_offset, self.granularity)
    }

    #[inline]
    pub fn encode_lat(&self, degrees: f64) -> i64 {
        delta::encode_coord(degrees, self.lat_offset, self.granularity)
    }

    #[inline]
    pub fn encode_lon(&self, degrees: f64) -> i64 {
        delta::encode_coord(degrees, self.lon_offset, self.granularity)
    }

    #[inline]
    pub fn decode_timestamp(&self, stored: i64) -> i64 {
        delta::decode_timestamp(stored, self.date_granularity)
    }

    #[inline]
    pub fn encode_timestamp(&self, millis: i64) -> i64 {
        delta::encode_timestamp(millis, self.date_granularity)
    }
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// Full-form records of one group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExplicitGroup {
    pub nodes: Vec<proto::Node>,
    pub ways: Vec<proto::Way>,
    pub relations: Vec<proto::Relation>,
}

impl ExplicitGroup {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.ways.is_empty() && self.relations.is_empty()
    }
}

/// One group of primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum Group {
    Dense(proto::DenseNodes),
    Explicit(ExplicitGroup),
}

impl Group {
    fn push_from_wire(out: &mut Vec<Group>, wire: proto::PrimitiveGroup) {
        if !wire.changesets.is_empty() {
            trace!("skipping {} changeset records", wire.changesets.len());
        }
        if let Some(dense) = wire.dense {
            out.push(Group::Dense(dense));
        }
        let explicit = ExplicitGroup {
            nodes: wire.nodes,
            ways: wire.ways,
            relations: wire.relations,
        };
        if !explicit.is_empty() {
            out.push(Group::Explicit(explicit));
        }
    }

    fn to_wire(&self) -> proto::PrimitiveGroup {
        match self {
            Group::Dense(d) => proto::PrimitiveGroup {
                dense: Some(d.clone()),
                ..Default::default()
            },
            Group::Explicit(e) => proto::PrimitiveGroup {
                nodes: e.nodes.clone(),
                ways: e.ways.clone(),
                relations: e.relations.clone(),
                ..Default::default()
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// A decoded data block: quantization constants, string table, groups.
#[derive(Debug, Clone)]
pub struct Block {
    pub context: BlockContext,
    pub strings: StringTable,
    pub groups: Vec<Group>,
}

impl Default for Block {
    fn default() -> Self {
        Self::new(BlockContext::default())
    }
}

impl Block {
    pub fn new(context: BlockContext) -> Self {
        Self {
            context,
            strings: StringTable::new(),
            groups: Vec::new(),
        }
    }

    /// Parse a decompressed block into a fresh allocation.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut block = Self::default();
        block.decode_into(bytes)?;
        Ok(block)
    }

    /// Parse a decompressed block into `self`, replacing its contents and
    /// reusing its allocations.
    ///
    /// Whatever was read out of the previous contents must be finished with
    /// before this is called: the buffer is overwritten in place. On error
    /// the block is left empty.
    pub fn decode_into(&mut self, bytes: &[u8]) -> Result<()> {
        self.clear();
        let wire = proto::PrimitiveBlock::decode(bytes)?;
        let context = BlockContext {
            granularity: wire.granularity(),
            lat_offset: wire.lat_offset(),
            lon_offset: wire.lon_offset(),
            date_granularity: wire.date_granularity(),
        };
        context.validate()?;

        self.context = context;
        self.strings
            .reset_from_wire(wire.stringtable.map(|t| t.s).unwrap_or_default());
        for group in wire.primitivegroup {
            Group::push_from_wire(&mut self.groups, group);
        }
        Ok(())
    }

    /// Drop all groups and strings, keeping allocations.
    pub fn clear(&mut self) {
        self.context = BlockContext::default();
        self.strings.clear();
        self.groups.clear();
    }

    pub fn to_wire(&self) -> proto::PrimitiveBlock {
        proto::PrimitiveBlock {
            stringtable: Some(proto::StringTable {
                s: self.strings.as_slice().to_vec(),
            }),
            primitivegroup: self.groups.iter().map(Group::to_wire).collect(),
            granularity: Some(self.context.granularity),
            date_granularity: Some(self.context.date_granularity),
            lat_offset: Some(self.context.lat_offset),
            lon_offset: Some(self.context.lon_offset),
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        self.to_wire().encode_to_vec()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
