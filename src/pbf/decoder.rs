// Block -> domain objects.
//
// Groups are visited in block order and primitives in group order; every
// decoded element is handed to the sink before the next one is built.
// Running sums are local to one dense group or one record.

use log::debug;

use super::block::{Block, BlockContext, ExplicitGroup, Group};
use super::delta::{self, DeltaDecoder};
use super::proto;
use super::strings::StringTable;
use crate::elements::{Element, ElementKinds, Info, Member, MemberType, Node, Relation, Tags, Way};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Push-style consumer of decoded primitives.
///
/// `ctx` carries the quantization constants of the block the element came
/// from. Returning an error aborts the decode.
pub trait ElementSink {
    fn on_node(&mut self, ctx: &BlockContext, node: Node) -> Result<()> {
        let _ = (ctx, node);
        Ok(())
    }

    fn on_way(&mut self, ctx: &BlockContext, way: Way) -> Result<()> {
        let _ = (ctx, way);
        Ok(())
    }

    fn on_relation(&mut self, ctx: &BlockContext, relation: Relation) -> Result<()> {
        let _ = (ctx, relation);
        Ok(())
    }
}

impl ElementSink for Vec<Element> {
    fn on_node(&mut self, _: &BlockContext, node: Node) -> Result<()> {
        self.push(Element::Node(node));
        Ok(())
    }

    fn on_way(&mut self, _: &BlockContext, way: Way) -> Result<()> {
        self.push(Element::Way(way));
        Ok(())
    }

    fn on_relation(&mut self, _: &BlockContext, relation: Relation) -> Result<()> {
        self.push(Element::Relation(relation));
        Ok(())
    }
}

impl<S: ElementSink + ?Sized> ElementSink for &mut S {
    fn on_node(&mut self, ctx: &BlockContext, node: Node) -> Result<()> {
        (**self).on_node(ctx, node)
    }

    fn on_way(&mut self, ctx: &BlockContext, way: Way) -> Result<()> {
        (**self).on_way(ctx, way)
    }

    fn on_relation(&mut self, ctx: &BlockContext, relation: Relation) -> Result<()> {
        (**self).on_relation(ctx, relation)
    }
}

/// Number of elements handed to the sink, per kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeCounts {
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
}

impl DecodeCounts {
    pub fn total(&self) -> u64 {
        self.nodes + self.ways + self.relations
    }
}

impl std::ops::AddAssign for DecodeCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes += rhs.nodes;
        self.ways += rhs.ways;
        self.relations += rhs.relations;
    }
}

// ---------------------------------------------------------------------------
// Block decode
// ---------------------------------------------------------------------------

/// Decode every group of `block` whose kind is in `kinds` into `sink`.
pub fn decode_block<S: ElementSink + ?Sized>(
    block: &Block,
    kinds: ElementKinds,
    sink: &mut S,
) -> Result<DecodeCounts> {
    let ctx = &block.context;
    let strings = &block.strings;
    let mut counts = DecodeCounts::default();

    for group in &block.groups {
        match group {
            Group::Dense(dense) => {
                if kinds.contains(ElementKinds::NODES) {
                    counts.nodes += decode_dense(dense, ctx, strings, sink)?;
                }
            }
            Group::Explicit(explicit) => {
                counts += decode_explicit(explicit, kinds, ctx, strings, sink)?;
            }
        }
    }

    debug!(
        "decoded block: {} groups, {} nodes, {} ways, {} relations",
        block.groups.len(),
        counts.nodes,
        counts.ways,
        counts.relations
    );
    Ok(counts)
}

// ---------------------------------------------------------------------------
// Dense nodes
// ---------------------------------------------------------------------------

/// Which DenseInfo columns are present. Each is either empty or of length N.
struct DenseColumns<'a> {
    version: Option<&'a [i32]>,
    timestamp: Option<&'a [i64]>,
    changeset: Option<&'a [i64]>,
    uid: Option<&'a [i32]>,
    user_sid: Option<&'a [i32]>,
    visible: Option<&'a [bool]>,
}

impl<'a> DenseColumns<'a> {
    fn check(info: Option<&'a proto::DenseInfo>, n: usize) -> Result<Self> {
        fn column<'a, T>(name: &str, col: &'a [T], n: usize) -> Result<Option<&'a [T]>> {
            match col.len() {
                0 => Ok(None),
                len if len == n => Ok(Some(col)),
                len => Err(Error::format(format!(
                    "dense info column {name} has {len} entries, expected {n}"
                ))),
            }
        }

        let Some(info) = info else {
            return Ok(Self {
                version: None,
                timestamp: None,
                changeset: None,
                uid: None,
                user_sid: None,
                visible: None,
            });
        };
        Ok(Self {
            version: column("version", &info.version, n)?,
            timestamp: column("timestamp", &info.timestamp, n)?,
            changeset: column("changeset", &info.changeset, n)?,
            uid: column("uid", &info.uid, n)?,
            user_sid: column("user_sid", &info.user_sid, n)?,
            visible: column("visible", &info.visible, n)?,
        })
    }
}

fn decode_dense<S: ElementSink + ?Sized>(
    dense: &proto::DenseNodes,
    ctx: &BlockContext,
    strings: &StringTable,
    sink: &mut S,
) -> Result<u64> {
    let n = dense.id.len();
    if dense.lat.len() != n || dense.lon.len() != n {
        return Err(Error::format(format!(
            "dense columns differ in length: id={n} lat={} lon={}",
            dense.lat.len(),
            dense.lon.len()
        )));
    }
    let cols = DenseColumns::check(dense.denseinfo.as_ref(), n)?;

    let mut id = DeltaDecoder::new();
    let mut lat = DeltaDecoder::new();
    let mut lon = DeltaDecoder::new();
    let mut timestamp = DeltaDecoder::new();
    let mut changeset = DeltaDecoder::new();
    let mut uid = DeltaDecoder::new();
    let mut user_sid = DeltaDecoder::new();
    let mut cursor = 0usize;

    for i in 0..n {
        let tags = if dense.keys_vals.is_empty() {
            Tags::new()
        } else {
            dense_tags(&dense.keys_vals, &mut cursor, strings)?
        };

        let info = Info {
            version: cols.version.map(|c| c[i]),
            timestamp: cols
                .timestamp
                .map(|c| ctx.decode_timestamp(timestamp.value(c[i]))),
            changeset: cols.changeset.map(|c| changeset.value(c[i])),
            user_id: cols.uid.map(|c| uid.value(i64::from(c[i])) as i32),
            user_name: match cols.user_sid {
                Some(c) => {
                    let sid = user_sid.value(i64::from(c[i])) as i32;
                    Some(strings.lookup_str(i64::from(sid))?.to_owned())
                }
                None => None,
            },
            visible: cols.visible.is_none_or(|c| c[i]),
        };

        let node = Node {
            id: id.value(dense.id[i]),
            lat: ctx.decode_lat(lat.value(dense.lat[i])),
            lon: ctx.decode_lon(lon.value(dense.lon[i])),
            tags,
            info,
        };
        sink.on_node(ctx, node)?;
    }

    if !dense.keys_vals.is_empty() && cursor != dense.keys_vals.len() {
        return Err(Error::format(format!(
            "dense keys_vals has {} trailing entries after {n} nodes",
            dense.keys_vals.len() - cursor
        )));
    }
    Ok(n as u64)
}

/// Consume one sentinel-terminated run of (key, value) pairs.
fn dense_tags(keys_vals: &[i32], cursor: &mut usize, strings: &StringTable) -> Result<Tags> {
    let mut tags = Tags::new();
    loop {
        let key = *keys_vals
            .get(*cursor)
            .ok_or_else(|| Error::format("dense keys_vals ends inside a tag run"))?;
        *cursor += 1;
        if key == 0 {
            return Ok(tags);
        }
        let val = *keys_vals
            .get(*cursor)
            .ok_or_else(|| Error::format("dense keys_vals ends between key and value"))?;
        *cursor += 1;
        tags.insert(
            strings.lookup_str(i64::from(key))?.to_owned(),
            strings.lookup_str(i64::from(val))?.to_owned(),
        );
    }
}

// ---------------------------------------------------------------------------
// Explicit records
// ---------------------------------------------------------------------------

fn decode_explicit<S: ElementSink + ?Sized>(
    group: &ExplicitGroup,
    kinds: ElementKinds,
    ctx: &BlockContext,
    strings: &StringTable,
    sink: &mut S,
) -> Result<DecodeCounts> {
    let mut counts = DecodeCounts::default();

    if kinds.contains(ElementKinds::NODES) {
        for rec in &group.nodes {
            let node = Node {
                id: rec.id,
                lat: ctx.decode_lat(rec.lat),
                lon: ctx.decode_lon(rec.lon),
                tags: record_tags(&rec.keys, &rec.vals, strings)?,
                info: info_from_wire(rec.info.as_ref(), ctx, strings)?,
            };
            sink.on_node(ctx, node)?;
            counts.nodes += 1;
        }
    }

    if kinds.contains(ElementKinds::WAYS) {
        for rec in &group.ways {
            let mut nodes = Vec::with_capacity(rec.refs.len());
            delta::extend_values(&mut nodes, rec.refs.iter().copied());
            let way = Way {
                id: rec.id,
                nodes,
                tags: record_tags(&rec.keys, &rec.vals, strings)?,
                info: info_from_wire(rec.info.as_ref(), ctx, strings)?,
            };
            sink.on_way(ctx, way)?;
            counts.ways += 1;
        }
    }

    if kinds.contains(ElementKinds::RELATIONS) {
        for rec in &group.relations {
            let relation = Relation {
                id: rec.id,
                members: members(rec, strings)?,
                tags: record_tags(&rec.keys, &rec.vals, strings)?,
                info: info_from_wire(rec.info.as_ref(), ctx, strings)?,
            };
            sink.on_relation(ctx, relation)?;
            counts.relations += 1;
        }
    }

    Ok(counts)
}

fn record_tags(keys: &[u32], vals: &[u32], strings: &StringTable) -> Result<Tags> {
    if keys.len() != vals.len() {
        return Err(Error::format(format!(
            "record has {} keys but {} values",
            keys.len(),
            vals.len()
        )));
    }
    keys.iter()
        .zip(vals)
        .map(|(&k, &v)| {
            Ok((
                strings.lookup_str(i64::from(k))?.to_owned(),
                strings.lookup_str(i64::from(v))?.to_owned(),
            ))
        })
        .collect()
}

fn members(rec: &proto::Relation, strings: &StringTable) -> Result<Vec<Member>> {
    let n = rec.memids.len();
    if rec.roles_sid.len() != n || rec.types.len() != n {
        return Err(Error::format(format!(
            "relation {} member columns differ in length: memids={n} roles={} types={}",
            rec.id,
            rec.roles_sid.len(),
            rec.types.len()
        )));
    }

    let mut id = DeltaDecoder::new();
    rec.memids
        .iter()
        .zip(&rec.roles_sid)
        .zip(&rec.types)
        .map(|((&memid, &role), &ty)| {
            Ok(Member {
                id: id.value(memid),
                member_type: member_type(ty)?,
                role: strings.lookup_str(i64::from(role))?.to_owned(),
            })
        })
        .collect()
}

fn member_type(raw: i32) -> Result<MemberType> {
    use proto::relation::MemberType as Wire;

    match Wire::try_from(raw) {
        Ok(Wire::Node) => Ok(MemberType::Node),
        Ok(Wire::Way) => Ok(MemberType::Way),
        Ok(Wire::Relation) => Ok(MemberType::Relation),
        Err(_) => Err(Error::format(format!("invalid member type {raw}"))),
    }
}

fn info_from_wire(
    info: Option<&proto::Info>,
    ctx: &BlockContext,
    strings: &StringTable,
) -> Result<Info> {
    let Some(info) = info else {
        return Ok(Info::default());
    };
    Ok(Info {
        version: info.version,
        timestamp: info.timestamp.map(|t| ctx.decode_timestamp(t)),
        changeset: info.changeset,
        user_id: info.uid,
        user_name: match info.user_sid {
            Some(sid) => Some(strings.lookup_str(i64::from(sid))?.to_owned()),
            None => None,
        },
        visible: info.visible.unwrap_or(true),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
