// Domain objects -> serialized block.
//
// One group per kind, in node/way/relation order. Nodes go into a dense
// group when the dense layout can carry them losslessly and into explicit
// records otherwise. The wire block is kept between calls and refilled in
// place: every vector is overwritten element-for-element and then truncated
// to the new length, so nothing from a longer previous block survives.

use log::debug;
use prost::Message;

use super::block::BlockContext;
use super::delta::{self, DeltaEncoder};
use super::proto;
use super::strings::StringTable;
use crate::elements::{Info, MemberType, Node, Relation, Tags, Way};
use crate::error::{Error, Result};

/// Serializes batches of elements into `PrimitiveBlock` bytes, reusing its
/// wire buffers across calls.
#[derive(Debug)]
pub struct BlockEncoder {
    context: BlockContext,
    strings: StringTable,
    wire: proto::PrimitiveBlock,
    buf: Vec<u8>,
}

impl Default for BlockEncoder {
    fn default() -> Self {
        Self {
            context: BlockContext::default(),
            strings: StringTable::new(),
            wire: proto::PrimitiveBlock::default(),
            buf: Vec::new(),
        }
    }
}

impl BlockEncoder {
    pub fn new(context: BlockContext) -> Result<Self> {
        context.validate()?;
        Ok(Self {
            context,
            ..Default::default()
        })
    }

    pub fn context(&self) -> &BlockContext {
        &self.context
    }

    /// The wire block as left by the last [`encode`](Self::encode).
    pub fn wire(&self) -> &proto::PrimitiveBlock {
        &self.wire
    }

    /// Encode one block. The returned bytes stay valid until the next call.
    pub fn encode(&mut self, nodes: &[Node], ways: &[Way], relations: &[Relation]) -> Result<&[u8]> {
        let ctx = self.context;
        self.strings.clear();

        let groups = &mut self.wire.primitivegroup;
        let mut used = 0;

        if !nodes.is_empty() {
            let slot = group_slot(groups, used);
            if dense_eligible(nodes) {
                reset_group(slot, false);
                let dense = slot.dense.get_or_insert_with(Default::default);
                fill_dense(dense, nodes, &ctx, &mut self.strings)?;
            } else {
                reset_group(slot, true);
                overwrite(&mut slot.nodes, nodes, |rec, node| {
                    fill_node(rec, node, &ctx, &mut self.strings)
                })?;
            }
            used += 1;
        }

        if !ways.is_empty() {
            let slot = group_slot(groups, used);
            reset_group(slot, true);
            overwrite(&mut slot.ways, ways, |rec, way| {
                fill_way(rec, way, &ctx, &mut self.strings);
                Ok(())
            })?;
            used += 1;
        }

        if !relations.is_empty() {
            let slot = group_slot(groups, used);
            reset_group(slot, true);
            overwrite(&mut slot.relations, relations, |rec, rel| {
                fill_relation(rec, rel, &ctx, &mut self.strings);
                Ok(())
            })?;
            used += 1;
        }

        groups.truncate(used);

        self.strings
            .write_wire(&mut self.wire.stringtable.get_or_insert_with(Default::default).s);
        self.wire.granularity = Some(ctx.granularity);
        self.wire.date_granularity = Some(ctx.date_granularity);
        self.wire.lat_offset = Some(ctx.lat_offset);
        self.wire.lon_offset = Some(ctx.lon_offset);

        self.buf.clear();
        self.wire.encode(&mut self.buf)?;
        debug!(
            "encoded block: {used} groups, {} strings, {} bytes",
            self.strings.len(),
            self.buf.len()
        );
        Ok(&self.buf)
    }
}

// ---------------------------------------------------------------------------
// Buffer reuse
// ---------------------------------------------------------------------------

/// Refill `buf` from `items`, reusing the records already there and
/// truncating whatever a longer previous fill left behind.
fn overwrite<T: Default, I: IntoIterator>(
    buf: &mut Vec<T>,
    items: I,
    mut fill: impl FnMut(&mut T, I::Item) -> Result<()>,
) -> Result<()> {
    let mut n = 0;
    for item in items {
        if n == buf.len() {
            buf.push(T::default());
        }
        fill(&mut buf[n], item)?;
        n += 1;
    }
    buf.truncate(n);
    Ok(())
}

fn group_slot(groups: &mut Vec<proto::PrimitiveGroup>, i: usize) -> &mut proto::PrimitiveGroup {
    if i == groups.len() {
        groups.push(proto::PrimitiveGroup::default());
    }
    &mut groups[i]
}

/// Empty the slot's record lists before it is filled with one kind. The
/// lists keep their allocations; `overwrite` regrows the one being filled.
fn reset_group(slot: &mut proto::PrimitiveGroup, explicit: bool) {
    if explicit {
        slot.dense = None;
    }
    slot.nodes.truncate(0);
    slot.ways.truncate(0);
    slot.relations.truncate(0);
    slot.changesets.clear();
}

// ---------------------------------------------------------------------------
// Dense nodes
// ---------------------------------------------------------------------------

/// Which optional `Info` fields an element carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InfoShape {
    version: bool,
    timestamp: bool,
    changeset: bool,
    user_id: bool,
    user_name: bool,
}

impl InfoShape {
    fn of(info: &Info) -> Self {
        Self {
            version: info.version.is_some(),
            timestamp: info.timestamp.is_some(),
            changeset: info.changeset.is_some(),
            user_id: info.user_id.is_some(),
            user_name: info.user_name.is_some(),
        }
    }

    fn any(self) -> bool {
        self.version || self.timestamp || self.changeset || self.user_id || self.user_name
    }
}

/// Dense columns are all-or-nothing per field, and index 0 ends a tag run,
/// so a node set is dense-encodable only if every node has the same info
/// fields and no tag key is empty.
fn dense_eligible(nodes: &[Node]) -> bool {
    let Some(first) = nodes.first() else {
        return true;
    };
    let shape = InfoShape::of(&first.info);
    nodes
        .iter()
        .all(|n| InfoShape::of(&n.info) == shape && !n.tags.contains_key(""))
}

fn check_coords(node: &Node) -> Result<()> {
    if node.lat.is_finite() && node.lon.is_finite() {
        Ok(())
    } else {
        Err(Error::format(format!(
            "node {} has non-finite coordinates ({}, {})",
            node.id, node.lat, node.lon
        )))
    }
}

fn fill_dense(
    dense: &mut proto::DenseNodes,
    nodes: &[Node],
    ctx: &BlockContext,
    strings: &mut StringTable,
) -> Result<()> {
    for node in nodes {
        check_coords(node)?;
    }

    dense.id.clear();
    delta::extend_deltas(&mut dense.id, nodes.iter().map(|n| n.id));
    dense.lat.clear();
    delta::extend_deltas(&mut dense.lat, nodes.iter().map(|n| ctx.encode_lat(n.lat)));
    dense.lon.clear();
    delta::extend_deltas(&mut dense.lon, nodes.iter().map(|n| ctx.encode_lon(n.lon)));

    dense.keys_vals.clear();
    if nodes.iter().any(|n| !n.tags.is_empty()) {
        for node in nodes {
            for (k, v) in &node.tags {
                dense.keys_vals.push(strings.internalize(k) as i32);
                dense.keys_vals.push(strings.internalize(v) as i32);
            }
            dense.keys_vals.push(0);
        }
    }

    // Eligibility guarantees every node shares the first node's shape.
    let shape = nodes.first().map(|n| InfoShape::of(&n.info));
    let any_hidden = nodes.iter().any(|n| !n.info.visible);
    let Some(shape) = shape.filter(|s| s.any() || any_hidden) else {
        dense.denseinfo = None;
        return Ok(());
    };

    let info = dense.denseinfo.get_or_insert_with(Default::default);

    info.version.clear();
    if shape.version {
        info.version
            .extend(nodes.iter().map(|n| n.info.version.unwrap_or_default()));
    }

    info.timestamp.clear();
    if shape.timestamp {
        delta::extend_deltas(
            &mut info.timestamp,
            nodes
                .iter()
                .map(|n| ctx.encode_timestamp(n.info.timestamp.unwrap_or_default())),
        );
    }

    info.changeset.clear();
    if shape.changeset {
        delta::extend_deltas(
            &mut info.changeset,
            nodes.iter().map(|n| n.info.changeset.unwrap_or_default()),
        );
    }

    info.uid.clear();
    if shape.user_id {
        let mut enc = DeltaEncoder::new();
        info.uid.extend(
            nodes
                .iter()
                .map(|n| enc.delta(i64::from(n.info.user_id.unwrap_or_default())) as i32),
        );
    }

    info.user_sid.clear();
    if shape.user_name {
        let mut enc = DeltaEncoder::new();
        for node in nodes {
            let sid = strings.internalize_opt(node.info.user_name.as_deref());
            info.user_sid.push(enc.delta(i64::from(sid)) as i32);
        }
    }

    info.visible.clear();
    if any_hidden {
        info.visible.extend(nodes.iter().map(|n| n.info.visible));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Explicit records
// ---------------------------------------------------------------------------

fn fill_tags(keys: &mut Vec<u32>, vals: &mut Vec<u32>, tags: &Tags, strings: &mut StringTable) {
    keys.clear();
    vals.clear();
    for (k, v) in tags {
        keys.push(strings.internalize(k));
        vals.push(strings.internalize(v));
    }
}

fn info_to_wire(info: &Info, ctx: &BlockContext, strings: &mut StringTable) -> Option<proto::Info> {
    if info.is_empty() {
        return None;
    }
    Some(proto::Info {
        version: info.version,
        timestamp: info.timestamp.map(|t| ctx.encode_timestamp(t)),
        changeset: info.changeset,
        uid: info.user_id,
        user_sid: info.user_name.as_deref().map(|u| strings.internalize(u)),
        visible: (!info.visible).then_some(false),
    })
}

fn fill_node(
    rec: &mut proto::Node,
    node: &Node,
    ctx: &BlockContext,
    strings: &mut StringTable,
) -> Result<()> {
    check_coords(node)?;
    rec.id = node.id;
    rec.lat = ctx.encode_lat(node.lat);
    rec.lon = ctx.encode_lon(node.lon);
    fill_tags(&mut rec.keys, &mut rec.vals, &node.tags, strings);
    rec.info = info_to_wire(&node.info, ctx, strings);
    Ok(())
}

fn fill_way(rec: &mut proto::Way, way: &Way, ctx: &BlockContext, strings: &mut StringTable) {
    rec.id = way.id;
    fill_tags(&mut rec.keys, &mut rec.vals, &way.tags, strings);
    rec.info = info_to_wire(&way.info, ctx, strings);
    rec.refs.clear();
    delta::extend_deltas(&mut rec.refs, way.nodes.iter().copied());
}

fn fill_relation(
    rec: &mut proto::Relation,
    rel: &Relation,
    ctx: &BlockContext,
    strings: &mut StringTable,
) {
    use proto::relation::MemberType as Wire;

    rec.id = rel.id;
    fill_tags(&mut rec.keys, &mut rec.vals, &rel.tags, strings);
    rec.info = info_to_wire(&rel.info, ctx, strings);

    rec.memids.clear();
    delta::extend_deltas(&mut rec.memids, rel.members.iter().map(|m| m.id));
    rec.roles_sid.clear();
    rec.types.clear();
    for m in &rel.members {
        rec.roles_sid.push(strings.internalize(&m.role) as i32);
        let ty = match m.member_type {
            MemberType::Node => Wire::Node,
            MemberType::Way => Wire::Way,
            MemberType::Relation => Wire::Relation,
        };
        rec.types.push(ty as i32);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
