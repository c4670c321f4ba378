// Domain objects handed to sinks by the decoder and accepted by the writer.
//
// Coordinates are degrees, timestamps are unix milliseconds. Everything the
// wire stores as a string-table index is resolved to an owned `String`.

use std::collections::BTreeMap;

use bitflags::bitflags;

/// Tag map. Keys are unique per element.
pub type Tags = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Optional per-element metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Info {
    pub version: Option<i32>,
    /// Unix milliseconds.
    pub timestamp: Option<i64>,
    pub changeset: Option<i64>,
    pub user_id: Option<i32>,
    pub user_name: Option<String>,
    /// `false` only for deleted elements in history files.
    pub visible: bool,
}

impl Default for Info {
    fn default() -> Self {
        Self {
            version: None,
            timestamp: None,
            changeset: None,
            user_id: None,
            user_name: None,
            visible: true,
        }
    }
}

impl Info {
    /// True if no field carries data (`visible` at its default).
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// A point feature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub tags: Tags,
    pub info: Info,
}

/// An ordered chain of node references.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Way {
    pub id: i64,
    pub nodes: Vec<i64>,
    pub tags: Tags,
    pub info: Info,
}

/// Kind of object a relation member points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

/// One entry of a relation's member list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub id: i64,
    pub member_type: MemberType,
    pub role: String,
}

impl Member {
    pub fn new(member_type: MemberType, id: i64, role: impl Into<String>) -> Self {
        Self {
            id,
            member_type,
            role: role.into(),
        }
    }
}

/// A named grouping of other objects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<Member>,
    pub tags: Tags,
    pub info: Info,
}

impl Node {
    pub fn new(id: i64, lat: f64, lon: f64) -> Self {
        Self {
            id,
            lat,
            lon,
            ..Default::default()
        }
    }
}

impl Way {
    pub fn new(id: i64, nodes: Vec<i64>) -> Self {
        Self {
            id,
            nodes,
            ..Default::default()
        }
    }
}

impl Relation {
    pub fn new(id: i64, members: Vec<Member>) -> Self {
        Self {
            id,
            members,
            ..Default::default()
        }
    }
}

macro_rules! builder_methods {
    ($($ty:ty),*) => {$(
        impl $ty {
            /// Add (or replace) a tag.
            pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
                self.tags.insert(key.into(), value.into());
                self
            }

            pub fn with_info(mut self, info: Info) -> Self {
                self.info = info;
                self
            }
        }
    )*};
}

builder_methods!(Node, Way, Relation);

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

bitflags! {
    /// Set of primitive kinds, used to skip whole kinds while decoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ElementKinds: u8 {
        const NODES = 1 << 0;
        const WAYS = 1 << 1;
        const RELATIONS = 1 << 2;
    }
}

impl Default for ElementKinds {
    fn default() -> Self {
        Self::all()
    }
}

/// Any of the three primitive kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Element {
    pub fn id(&self) -> i64 {
        match self {
            Self::Node(n) => n.id,
            Self::Way(w) => w.id,
            Self::Relation(r) => r.id,
        }
    }

    pub fn kind(&self) -> ElementKinds {
        match self {
            Self::Node(_) => ElementKinds::NODES,
            Self::Way(_) => ElementKinds::WAYS,
            Self::Relation(_) => ElementKinds::RELATIONS,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Self::Node(n) => &n.tags,
            Self::Way(w) => &w.tags,
            Self::Relation(r) => &r.tags,
        }
    }

    pub fn info(&self) -> &Info {
        match self {
            Self::Node(n) => &n.info,
            Self::Way(w) => &w.info,
            Self::Relation(r) => &r.info,
        }
    }
}

impl From<Node> for Element {
    fn from(n: Node) -> Self {
        Self::Node(n)
    }
}

impl From<Way> for Element {
    fn from(w: Way) -> Self {
        Self::Way(w)
    }
}

impl From<Relation> for Element {
    fn from(r: Relation) -> Self {
        Self::Relation(r)
    }
}
