#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipbf::elements::Element;
use oxipbf::stream::PbfReader;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes as a whole stream: errors are fine, panics are not.
    let mut out: Vec<Element> = Vec::new();
    let _ = PbfReader::new(data).read_to(&mut out);

    // And through the iterator, which must stop after the first error.
    let mut reader = PbfReader::new(data);
    let mut errors = 0;
    for item in reader.elements() {
        if item.is_err() {
            errors += 1;
        }
    }
    assert!(errors <= 1);
});
