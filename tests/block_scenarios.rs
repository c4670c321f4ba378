use std::io::Cursor;

use oxipbf::elements::{Element, ElementKinds, Info, Member, MemberType, Node, Relation, Way};
use oxipbf::pbf::blob::{self, BlobMode, Compression};
use oxipbf::pbf::block::{Block, BlockContext, Group};
use oxipbf::pbf::decoder::decode_block;
use oxipbf::pbf::encoder::BlockEncoder;
use oxipbf::pbf::proto;
use oxipbf::pbf::strings::StringTable;
use oxipbf::stream::{PbfReader, PbfWriter, WriteOptions};

fn roundtrip(elements: &[Element], compression: Compression) -> Vec<Element> {
    let opts = WriteOptions {
        compression,
        ..Default::default()
    };
    let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
    w.write_all(elements.iter().cloned()).unwrap();
    let (bytes, _) = w.finish().unwrap();

    let mut out: Vec<Element> = Vec::new();
    PbfReader::new(Cursor::new(bytes)).read_to(&mut out).unwrap();
    out
}

fn decode_wire(strings: &[&str], group: Group) -> Vec<Element> {
    let mut block = Block::default();
    block.strings = StringTable::from_wire(strings.iter().map(|s| s.as_bytes().to_vec()).collect());
    block.groups.push(group);
    let mut out = Vec::new();
    decode_block(&block, ElementKinds::all(), &mut out).unwrap();
    out
}

#[test]
fn scenario_a_single_tagged_node() {
    let node = Node::new(1, 51.0, 4.0).with_tag("amenity", "cafe");
    let out = roundtrip(&[node.into()], Compression::default());
    assert_eq!(out.len(), 1);
    let Element::Node(n) = &out[0] else {
        panic!("expected a node, got {:?}", out[0]);
    };
    assert_eq!(n.id, 1);
    assert!((n.lat - 51.0).abs() < 1e-7);
    assert!((n.lon - 4.0).abs() < 1e-7);
    assert_eq!(n.tags.get("amenity").map(String::as_str), Some("cafe"));
}

#[test]
fn scenario_b_dense_ids() {
    let out = decode_wire(
        &[""],
        Group::Dense(proto::DenseNodes {
            id: vec![10, 1, 2],
            lat: vec![0; 3],
            lon: vec![0; 3],
            ..Default::default()
        }),
    );
    let ids: Vec<i64> = out.iter().map(Element::id).collect();
    assert_eq!(ids, [10, 11, 13]);

    // And the encoder produces exactly those deltas.
    let mut enc = BlockEncoder::default();
    let nodes: Vec<Node> = [10, 11, 13].iter().map(|&id| Node::new(id, 0.0, 0.0)).collect();
    enc.encode(&nodes, &[], &[]).unwrap();
    let dense = enc.wire().primitivegroup[0].dense.as_ref().unwrap();
    assert_eq!(dense.id, [10, 1, 2]);
}

#[test]
fn scenario_c_way_refs_with_negative_delta() {
    let way = Way::new(5, vec![100, 105, 90, 200]);
    let mut enc = BlockEncoder::default();
    enc.encode(&[], std::slice::from_ref(&way), &[]).unwrap();
    assert_eq!(enc.wire().primitivegroup[0].ways[0].refs, [100, 5, -15, 110]);

    let out = roundtrip(&[way.clone().into()], Compression::default());
    assert_eq!(out, [Element::Way(way)]);
}

#[test]
fn scenario_d_relation_members() {
    let rel = Relation::new(
        9,
        vec![
            Member::new(MemberType::Way, 50, "outer"),
            Member::new(MemberType::Node, 5, ""),
        ],
    )
    .with_tag("type", "multipolygon");

    let mut enc = BlockEncoder::default();
    enc.encode(&[], &[], std::slice::from_ref(&rel)).unwrap();
    let wire = &enc.wire().primitivegroup[0].relations[0];
    assert_eq!(wire.roles_sid[1], 0);
    assert_eq!(wire.memids, [50, -45]);

    let out = roundtrip(&[rel.clone().into()], Compression::default());
    let Element::Relation(r) = &out[0] else {
        panic!("expected a relation, got {:?}", out[0]);
    };
    assert_eq!(r.members, rel.members);
    assert_eq!(r.members[1].role, "");
}

#[test]
fn scenario_f_raw_and_deflate_decode_identically() {
    let mut elements: Vec<Element> = (1..=500)
        .map(|i| {
            Node::new(i, 50.0 + i as f64 * 1e-5, 4.0 - i as f64 * 1e-5)
                .with_tag("amenity", if i % 2 == 0 { "cafe" } else { "bench" })
                .into()
        })
        .collect();
    elements.extend((1..=50).map(|i| Element::from(Way::new(1000 + i, (i..i + 10).collect()))));

    let mut enc = BlockEncoder::default();
    let nodes: Vec<Node> = elements
        .iter()
        .filter_map(|e| match e {
            Element::Node(n) => Some(n.clone()),
            _ => None,
        })
        .collect();
    let raw_block = enc.encode(&nodes, &[], &[]).unwrap().to_vec();

    let (raw_payload, raw_mode) = blob::encode_blob(&raw_block, Compression::Raw).unwrap();
    let (z_payload, z_mode) = blob::encode_blob(&raw_block, Compression::Deflate(6)).unwrap();
    assert_eq!(raw_mode, BlobMode::Raw);
    assert_eq!(z_mode, BlobMode::Deflate);
    assert!(z_payload.len() < raw_payload.len());

    let mut a = Vec::new();
    let mut b = Vec::new();
    blob::decode_blob(&raw_payload, &mut a).unwrap();
    blob::decode_blob(&z_payload, &mut b).unwrap();
    assert_eq!(a, b);

    let raw = roundtrip(&elements, Compression::Raw);
    let deflated = roundtrip(&elements, Compression::Deflate(9));
    assert_eq!(raw, deflated);
    assert_eq!(raw.len(), elements.len());
}

#[cfg(feature = "lzma")]
#[test]
fn lzma_decodes_like_raw() {
    let elements: Vec<Element> = (1..=200)
        .map(|i| Element::from(Node::new(i, 1.0, 2.0).with_tag("k", "v")))
        .collect();
    assert_eq!(
        roundtrip(&elements, Compression::Lzma),
        roundtrip(&elements, Compression::Raw)
    );
}

#[test]
fn metadata_roundtrip_dense_and_explicit() {
    let meta = |v: i32, hidden: bool| Info {
        version: Some(v),
        timestamp: Some(1_650_000_000_000 + i64::from(v) * 1000),
        changeset: Some(1000 + i64::from(v)),
        user_id: Some(v * 3),
        user_name: Some(format!("user{v}")),
        visible: !hidden,
    };
    let elements: Vec<Element> = vec![
        Node::new(1, 10.0, 20.0).with_info(meta(1, false)).into(),
        Node::new(2, -10.0, -20.0).with_info(meta(2, true)).into(),
        Way::new(3, vec![1, 2]).with_info(meta(3, false)).into(),
        Relation::new(4, vec![Member::new(MemberType::Relation, 4, "self")])
            .with_info(meta(4, true))
            .into(),
    ];
    assert_eq!(roundtrip(&elements, Compression::default()), elements);
}

#[test]
fn custom_context_roundtrip() {
    let ctx = BlockContext {
        granularity: 1000,
        lat_offset: 500,
        lon_offset: -500,
        date_granularity: 1,
    };
    let lat = ctx.decode_lat(ctx.encode_lat(48.8566));
    let lon = ctx.decode_lon(ctx.encode_lon(2.3522));
    let node = Node::new(1, lat, lon).with_info(Info {
        timestamp: Some(1_234_567),
        ..Default::default()
    });

    let opts = WriteOptions {
        context: ctx,
        ..Default::default()
    };
    let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
    w.write(node.clone()).unwrap();
    let (bytes, _) = w.finish().unwrap();

    let mut r = PbfReader::new(Cursor::new(bytes));
    let block = r.next_block().unwrap().unwrap();
    assert_eq!(block.context, ctx);
    let mut out = Vec::new();
    decode_block(block, ElementKinds::all(), &mut out).unwrap();
    assert_eq!(out, [Element::Node(node)]);
}
