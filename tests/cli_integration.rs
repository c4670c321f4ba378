use std::path::Path;
use std::process::Command;

use oxipbf::elements::{Element, ElementKinds, Node, Way};
use oxipbf::stream::WriteOptions;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_oxipbf").to_string()
}

fn write_sample(path: &Path) -> Vec<Element> {
    let mut elements: Vec<Element> = (1..=50)
        .map(|i| Node::new(i, 45.0, 7.0).with_tag("k", "v").into())
        .collect();
    elements.push(Way::new(100, vec![1, 2, 3]).into());
    oxipbf::io::write_file(path, elements.clone(), WriteOptions::default()).unwrap();
    elements
}

#[test]
fn cli_info_text() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.osm.pbf");
    write_sample(&input);

    let out = Command::new(bin()).arg("info").arg(&input).output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    assert!(stdout.contains("Nodes: 50"), "{stdout}");
    assert!(stdout.contains("Ways: 1"), "{stdout}");
    assert!(stdout.contains("Relations: 0"), "{stdout}");
}

#[test]
fn cli_info_json() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.osm.pbf");
    write_sample(&input);

    let out = Command::new(bin())
        .args(["--json", "info"])
        .arg(&input)
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["command"], "info");
    assert_eq!(json["nodes"], 50);
    assert_eq!(json["ways"], 1);
    assert_eq!(json["tagged"], 50);
    assert_eq!(json["min_id"], 1);
    assert_eq!(json["max_id"], 100);
    assert!(
        json["required_features"]
            .as_array()
            .unwrap()
            .iter()
            .any(|f| f == "OsmSchema-V0.6")
    );
}

#[test]
fn cli_cat_filters_and_recompresses() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.osm.pbf");
    let output = dir.path().join("out.osm.pbf");
    let elements = write_sample(&input);

    let st = Command::new(bin())
        .args(["cat", "--compression", "raw", "--no-ways"])
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());

    let back = oxipbf::io::read_file(&output, ElementKinds::all()).unwrap();
    let nodes: Vec<Element> = elements
        .into_iter()
        .filter(|e| e.kind() == ElementKinds::NODES)
        .collect();
    assert_eq!(back, nodes);
    // Raw blocks are larger than the deflated input.
    assert!(
        std::fs::metadata(&output).unwrap().len() > std::fs::metadata(&input).unwrap().len()
    );
}

#[test]
fn cli_cat_refuses_existing_output_without_force() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.osm.pbf");
    let output = dir.path().join("out.osm.pbf");
    write_sample(&input);
    std::fs::write(&output, b"keep me").unwrap();

    let st = Command::new(bin())
        .arg("cat")
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(!st.success());
    assert_eq!(std::fs::read(&output).unwrap(), b"keep me");

    let st = Command::new(bin())
        .args(["-f", "cat"])
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(oxipbf::io::read_file(&output, ElementKinds::all()).unwrap().len(), 51);
}

#[test]
fn cli_info_on_garbage_fails() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("garbage.pbf");
    std::fs::write(&input, [0u8, 0, 0, 5, 1, 2]).unwrap();
    let out = Command::new(bin()).arg("info").arg(&input).output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("oxipbf"));
}

#[test]
fn cli_config_works() {
    let out = Command::new(bin()).arg("config").output().unwrap();
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("oxipbf version"));
    assert!(stderr.contains("DEFAULT_BLOCK_SIZE=8000"));
}
