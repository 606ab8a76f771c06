use gpxtour_wasm::converter::tracks_to_feature_collection;
use gpxtour_wasm::options::ExportOptions;
use gpxtour_wasm::parser::parse_gpx;
use std::path::Path;

fn load_fixture(path: &str) -> String {
    std::fs::read_to_string(format!("tests/fixtures/{path}")).unwrap()
}

/// Stats carry computed floats; snapshots stick to what the file says.
fn snapshot_opts() -> ExportOptions {
    ExportOptions {
        include_stats: false,
        ..Default::default()
    }
}

fn convert_with_opts(gpx: &str, opts: &ExportOptions) -> serde_json::Value {
    let data = parse_gpx(gpx).unwrap();
    let fc = tracks_to_feature_collection(&data, opts);
    serde_json::to_value(&fc).unwrap()
}

/// Compare actual GeoJSON output against the expected snapshot file.
/// When `UPDATE_SNAPSHOTS=1` is set, write/overwrite the expected file instead.
fn assert_snapshot(actual: &serde_json::Value, expected_path: &str) {
    let path = format!("tests/fixtures/expected/{expected_path}");

    if matches!(std::env::var("UPDATE_SNAPSHOTS").as_deref(), Ok("1")) {
        let dir = Path::new(&path).parent().unwrap();
        std::fs::create_dir_all(dir).unwrap();
        let pretty = serde_json::to_string_pretty(actual).unwrap();
        std::fs::write(&path, pretty.as_bytes()).unwrap();
        eprintln!("Updated snapshot: {path}");
        return;
    }

    let expected_str = std::fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("Expected file not found: {path}. Run with UPDATE_SNAPSHOTS=1 to generate."));
    let expected: serde_json::Value = serde_json::from_str(&expected_str)
        .unwrap_or_else(|e| panic!("Failed to parse {path}: {e}"));

    assert_eq!(
        *actual, expected,
        "Snapshot mismatch for {path}.\nRun with UPDATE_SNAPSHOTS=1 to update."
    );
}

fn assert_snapshot_fixture(fixture: &str, expected: &str) {
    let gpx = load_fixture(fixture);
    let actual = convert_with_opts(&gpx, &snapshot_opts());
    assert_snapshot(&actual, expected);
}

#[test]
fn snapshot_01_waypoints() {
    assert_snapshot_fixture("basic/01_waypoints.gpx", "basic/01_waypoints.geojson");
}

#[test]
fn snapshot_02_multi_segment_separate() {
    assert_snapshot_fixture(
        "tracks/02_multi_segment.gpx",
        "tracks/02_multi_segment.geojson",
    );
}

#[test]
fn snapshot_02_multi_segment_joined() {
    let gpx = load_fixture("tracks/02_multi_segment.gpx");
    let opts = ExportOptions {
        join_track_segments: true,
        ..snapshot_opts()
    };
    let actual = convert_with_opts(&gpx, &opts);
    assert_snapshot(&actual, "tracks/02_multi_segment_joined.geojson");
}

#[test]
fn snapshot_05_bad_points() {
    assert_snapshot_fixture(
        "edge_cases/05_bad_points.gpx",
        "edge_cases/05_bad_points.geojson",
    );
}
