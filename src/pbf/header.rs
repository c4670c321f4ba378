// The one-time file header block ("OSMHeader" frame).
//
// The reader keeps it for callers that ask, and never hands it to a sink.

use log::warn;
use prost::Message;

use super::proto::{HeaderBBox, HeaderBlock};
use crate::error::{Error, Result};

pub const FEATURE_SCHEMA: &str = "OsmSchema-V0.6";
pub const FEATURE_DENSE_NODES: &str = "DenseNodes";
pub const FEATURE_HISTORICAL: &str = "HistoricalInformation";

/// Required features this crate can decode.
const SUPPORTED_FEATURES: &[&str] = &[FEATURE_SCHEMA, FEATURE_DENSE_NODES, FEATURE_HISTORICAL];

/// Bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl BoundingBox {
    fn from_wire(b: &HeaderBBox) -> Self {
        Self {
            left: b.left as f64 / 1e9,
            right: b.right as f64 / 1e9,
            top: b.top as f64 / 1e9,
            bottom: b.bottom as f64 / 1e9,
        }
    }

    fn to_wire(self) -> HeaderBBox {
        let nanos = |deg: f64| (deg * 1e9).round() as i64;
        HeaderBBox {
            left: nanos(self.left),
            right: nanos(self.right),
            top: nanos(self.top),
            bottom: nanos(self.bottom),
        }
    }
}

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileHeader {
    pub bbox: Option<BoundingBox>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub writing_program: Option<String>,
    pub source: Option<String>,
    /// Seconds since the epoch.
    pub replication_timestamp: Option<i64>,
    pub replication_sequence_number: Option<i64>,
    pub replication_base_url: Option<String>,
}

impl FileHeader {
    /// Header a writer emits by default.
    pub fn for_writer() -> Self {
        Self {
            required_features: vec![FEATURE_SCHEMA.to_owned(), FEATURE_DENSE_NODES.to_owned()],
            writing_program: Some(concat!("oxipbf ", env!("CARGO_PKG_VERSION")).to_owned()),
            ..Default::default()
        }
    }

    /// Parse a decompressed header block and check its required features.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let wire = HeaderBlock::decode(bytes)?;
        let header = Self {
            bbox: wire.bbox.as_ref().map(BoundingBox::from_wire),
            required_features: wire.required_features,
            optional_features: wire.optional_features,
            writing_program: wire.writingprogram,
            source: wire.source,
            replication_timestamp: wire.osmosis_replication_timestamp,
            replication_sequence_number: wire.osmosis_replication_sequence_number,
            replication_base_url: wire.osmosis_replication_base_url,
        };
        header.check_features()?;
        Ok(header)
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        HeaderBlock {
            bbox: self.bbox.map(BoundingBox::to_wire),
            required_features: self.required_features.clone(),
            optional_features: self.optional_features.clone(),
            writingprogram: self.writing_program.clone(),
            source: self.source.clone(),
            osmosis_replication_timestamp: self.replication_timestamp,
            osmosis_replication_sequence_number: self.replication_sequence_number,
            osmosis_replication_base_url: self.replication_base_url.clone(),
        }
        .encode_to_vec()
    }

    /// Reject files that need a feature we cannot honor.
    pub fn check_features(&self) -> Result<()> {
        if let Some(f) = self
            .required_features
            .iter()
            .find(|f| !SUPPORTED_FEATURES.contains(&f.as_str()))
        {
            return Err(Error::Unsupported(format!("required feature {f:?}")));
        }
        for f in &self.optional_features {
            if f != "Sort.Type_then_ID" && f != "LocationsOnWays" {
                warn!("ignoring optional feature {f:?}");
            }
        }
        Ok(())
    }

    /// Add `name` to the required features unless it is already there.
    pub fn require(&mut self, name: &str) {
        if !self.required_features.iter().any(|f| f == name) {
            self.required_features.push(name.to_owned());
        }
    }

    pub fn has_feature(&self, name: &str) -> bool {
        self.required_features.iter().any(|f| f == name)
            || self.optional_features.iter().any(|f| f == name)
    }
}
