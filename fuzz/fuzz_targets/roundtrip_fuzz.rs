#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipbf::elements::{Element, Member, MemberType, Node, Relation, Way};
use oxipbf::pbf::blob::Compression;
use oxipbf::stream::{PbfReader, PbfWriter, WriteOptions};

fn word(b: u8) -> String {
    ["", "a", "name", "highway", "outer"][usize::from(b % 5)].to_string()
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks compression and block size, the rest becomes
    // elements, 8 bytes per element.
    let flags = data[0];
    let compression = if flags & 1 == 0 {
        Compression::Raw
    } else {
        Compression::Deflate(u32::from(flags >> 4) % 10)
    };
    let block_size = usize::from((flags >> 1) & 7) + 1;

    let mut nodes = Vec::new();
    let mut ways = Vec::new();
    let mut relations = Vec::new();
    for (i, chunk) in data[1..].chunks(8).enumerate() {
        let id = i64::from(chunk[0]) - 128;
        let v = chunk.iter().map(|&b| i64::from(b)).sum::<i64>();
        match chunk[0] % 3 {
            0 => {
                // Stored-unit grid so coordinates survive exactly.
                let lat = oxipbf::pbf::delta::decode_coord(v * 1_000 - 2_000, 0, 100);
                let mut node = Node::new(id + i as i64, lat, -lat);
                if let Some(&b) = chunk.get(1) {
                    node = node.with_tag(format!("k{}", b % 4), word(b));
                }
                nodes.push(Element::from(node));
            }
            1 => {
                let refs = chunk.iter().map(|&b| i64::from(b) * 1_000 - 100_000).collect();
                ways.push(Element::from(Way::new(id, refs)));
            }
            _ => {
                let members = chunk
                    .iter()
                    .map(|&b| {
                        let t = [MemberType::Node, MemberType::Way, MemberType::Relation];
                        Member::new(t[usize::from(b % 3)], i64::from(b) - v, word(b >> 2))
                    })
                    .collect();
                relations.push(Element::from(Relation::new(id, members)));
            }
        }
    }
    let elements: Vec<Element> = nodes.into_iter().chain(ways).chain(relations).collect();

    let opts = WriteOptions {
        compression,
        block_size,
        ..Default::default()
    };
    let mut w = PbfWriter::new(Vec::new(), opts).unwrap();
    w.write_all(elements.iter().cloned()).unwrap();
    let (bytes, _) = w.finish().unwrap();

    let mut out: Vec<Element> = Vec::new();
    PbfReader::new(bytes.as_slice()).read_to(&mut out).unwrap();
    assert_eq!(out, elements);
});
