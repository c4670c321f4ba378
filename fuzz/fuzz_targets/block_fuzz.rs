#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipbf::elements::{Element, ElementKinds};
use oxipbf::pbf::blob::decode_blob;
use oxipbf::pbf::block::Block;
use oxipbf::pbf::decoder::decode_block;

fuzz_target!(|data: &[u8]| {
    // Bytes as a decompressed PrimitiveBlock.
    if let Ok(block) = Block::decode(data) {
        let mut out: Vec<Element> = Vec::new();
        let _ = decode_block(&block, ElementKinds::all(), &mut out);
    }

    // Bytes as a Blob payload.
    let mut scratch = Vec::new();
    let _ = decode_blob(data, &mut scratch);
});
