use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use oxipbf::elements::{Element, ElementKinds, Member, MemberType, Node, Relation, Way};
use oxipbf::error::Result;
use oxipbf::pbf::block::{BlockContext, Group};
use oxipbf::pbf::decoder::ElementSink;
use oxipbf::stream::{PbfReader, PbfWriter, ReadOptions, ReadOutcome, WriteOptions};
use tempfile::tempdir;

fn sample(n: i64) -> Vec<Element> {
    let mut out: Vec<Element> = (1..=n)
        .map(|i| {
            let node = Node::new(i, (i % 90) as f64, (i % 180) as f64);
            if i % 3 == 0 {
                node.with_tag("name", format!("n{i}")).into()
            } else {
                node.into()
            }
        })
        .collect();
    out.extend((1..=n / 10).map(|i| Element::from(Way::new(100_000 + i, vec![i, i + 1, i + 2]))));
    out.extend((1..=n / 100).map(|i| {
        Element::from(Relation::new(
            200_000 + i,
            vec![
                Member::new(MemberType::Way, 100_000 + i, "outer"),
                Member::new(MemberType::Node, i, ""),
            ],
        ))
    }));
    out
}

fn write(elements: &[Element], block_size: usize) -> Vec<u8> {
    let opts = WriteOptions {
        block_size,
        ..Default::default()
    };
    let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
    w.write_all(elements.iter().cloned()).unwrap();
    w.finish().unwrap().0
}

#[test]
fn mixed_kinds_roundtrip_in_kind_order() {
    let elements = sample(2_000);
    let bytes = write(&elements, 8000);
    let mut out: Vec<Element> = Vec::new();
    let mut r = PbfReader::new(Cursor::new(bytes));
    assert_eq!(r.read_to(&mut out).unwrap(), ReadOutcome::Completed);
    assert_eq!(out, elements);
    assert_eq!(r.stats().nodes, 2_000);
    assert_eq!(r.stats().ways, 200);
    assert_eq!(r.stats().relations, 20);
}

#[test]
fn small_blocks_keep_every_element() {
    let elements = sample(1_000);
    let bytes = write(&elements, 7);
    let mut r = PbfReader::new(Cursor::new(bytes));
    let out: Vec<Element> = r.elements().collect::<Result<_>>().unwrap();
    assert_eq!(out.len(), elements.len());
    assert_eq!(r.stats().blocks, (elements.len() as u64).div_ceil(7));

    let mut ids: Vec<i64> = out.iter().map(Element::id).collect();
    let mut expected: Vec<i64> = elements.iter().map(Element::id).collect();
    ids.sort_unstable();
    expected.sort_unstable();
    assert_eq!(ids, expected);
}

#[test]
fn reused_block_buffer_has_no_stale_groups() {
    // First block: nodes, ways and relations. Second block: ways only.
    let mut w = PbfWriter::new(Vec::new(), WriteOptions::default()).unwrap();
    w.write_all(sample(500)).unwrap();
    w.flush_block().unwrap();
    w.write(Way::new(1, vec![5, 4, 3])).unwrap();
    let (bytes, stats) = w.finish().unwrap();
    assert_eq!(stats.blocks, 2);

    let mut r = PbfReader::new(Cursor::new(bytes));
    let first = r.next_block().unwrap().unwrap();
    assert_eq!(first.groups.len(), 3);
    let second = r.next_block().unwrap().unwrap();
    assert_eq!(second.groups.len(), 1);
    let Group::Explicit(g) = &second.groups[0] else {
        panic!("expected an explicit group");
    };
    assert!(g.nodes.is_empty());
    assert_eq!(g.ways.len(), 1);
    assert!(g.relations.is_empty());
    assert_eq!(second.strings.len(), 1);
    assert!(r.next_block().unwrap().is_none());
}

#[test]
fn kind_filter_skips_other_kinds() {
    let elements = sample(300);
    let bytes = write(&elements, 8000);
    let opts = ReadOptions {
        kinds: ElementKinds::WAYS | ElementKinds::RELATIONS,
        ..Default::default()
    };
    let mut r = PbfReader::with_options(Cursor::new(bytes), opts);
    let mut out: Vec<Element> = Vec::new();
    r.read_to(&mut out).unwrap();
    assert!(out.iter().all(|e| e.kind() != ElementKinds::NODES));
    assert_eq!(out.len(), 30 + 3);
    assert_eq!(r.stats().nodes, 0);
}

/// Sets the cancel flag after the first block's last node.
struct CancelAfter {
    flag: Arc<AtomicBool>,
    seen: usize,
    limit: usize,
}

impl ElementSink for CancelAfter {
    fn on_node(&mut self, _: &BlockContext, _: Node) -> Result<()> {
        self.seen += 1;
        if self.seen == self.limit {
            self.flag.store(true, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[test]
fn cancellation_between_frames() {
    let elements: Vec<Element> = (1..=100).map(|i| Node::new(i, 0.0, 0.0).into()).collect();
    let bytes = write(&elements, 10);

    let flag = Arc::new(AtomicBool::new(false));
    let opts = ReadOptions {
        cancel: Some(flag.clone()),
        ..Default::default()
    };
    let mut r = PbfReader::with_options(Cursor::new(bytes), opts);
    let mut sink = CancelAfter {
        flag,
        seen: 0,
        limit: 15,
    };
    assert_eq!(r.read_to(&mut sink).unwrap(), ReadOutcome::Cancelled);
    // The block in flight when the flag was set is delivered whole.
    assert_eq!(sink.seen, 20);
    assert_eq!(r.stats().blocks, 2);
    assert!(r.next_block().unwrap().is_none());
}

#[test]
fn owned_blocks_match_reused_blocks() {
    let bytes = write(&sample(400), 50);
    let mut a = PbfReader::new(Cursor::new(bytes.clone()));
    let mut b = PbfReader::new(Cursor::new(bytes));
    let mut owned = Vec::new();
    while let Some(block) = a.next_block_owned().unwrap() {
        owned.push(block);
    }
    let mut i = 0;
    while let Some(block) = b.next_block().unwrap() {
        assert_eq!(block.groups, owned[i].groups);
        assert_eq!(block.strings.as_slice(), owned[i].strings.as_slice());
        i += 1;
    }
    assert_eq!(i, owned.len());
}

#[test]
fn header_available_after_read_header() {
    let bytes = write(&sample(10), 8000);
    let mut r = PbfReader::new(Cursor::new(bytes));
    assert!(r.header().is_none());
    let header = r.read_header().unwrap().cloned().unwrap();
    assert!(header.has_feature("DenseNodes"));
    assert!(
        header
            .writing_program
            .as_deref()
            .is_some_and(|p| p.starts_with("oxipbf"))
    );
    let mut out: Vec<Element> = Vec::new();
    r.read_to(&mut out).unwrap();
    assert_eq!(out.len(), 11);
}

#[test]
fn file_helpers_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("sample.osm.pbf");
    let elements = sample(1_500);
    let stats = oxipbf::io::write_file(&path, elements.clone(), WriteOptions::default()).unwrap();
    assert_eq!(stats.nodes, 1_500);
    assert_eq!(
        stats.bytes_written,
        std::fs::metadata(&path).unwrap().len()
    );
    let back = oxipbf::io::read_file(&path, ElementKinds::all()).unwrap();
    assert_eq!(back, elements);
}
