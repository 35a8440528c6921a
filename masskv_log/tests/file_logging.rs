use std::fs;

use tracing::Level;

#[test]
fn writes_json_lines_to_rolling_file() {
    let dir = tempfile::tempdir().unwrap();
    let handle = masskv_log::init(dir.path(), Level::INFO).unwrap();
    tracing::info!(ncol = 3, "row published");
    tracing::debug!("filtered out");
    handle.set_level(Level::DEBUG).unwrap();
    tracing::debug!("now visible");
    drop(handle);

    let mut contents = String::new();
    for entry in fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("masskv.log"), "unexpected file {name}");
        contents.push_str(&fs::read_to_string(&path).unwrap());
    }
    assert!(contents.contains("row published"));
    assert!(contents.contains("\"ncol\":3"));
    assert!(!contents.contains("filtered out"));
    assert!(contents.contains("now visible"));
}
