use chrono::{DateTime, SecondsFormat, Utc};
use geojson::{Feature, FeatureCollection, Geometry, Value};
use serde_json::{Map, Value as JsonValue};

use crate::geomath::{Bounds, Coordinate};
use crate::options::ExportOptions;
use crate::simplify::simplify;
use crate::tour::{Keyframe, KeyframeKind, Tour};
use crate::track::{GpxData, Point, Track};

/// Convert parsed GPX data to a GeoJSON FeatureCollection: waypoints first,
/// then every enabled track.
pub fn tracks_to_feature_collection(data: &GpxData, opts: &ExportOptions) -> FeatureCollection {
    let mut features: Vec<Feature> = data
        .waypoints
        .iter()
        .map(|wpt| point_feature(wpt, "waypoint", opts))
        .collect();

    for trk in data.tracks.iter().filter(|t| t.status) {
        features.extend(track_to_features(trk, opts));
    }

    collection(features, None)
}

/// Convert a synthesized tour to GeoJSON: the camera path as a LineString
/// and one Point per stop the camera waits at.
pub fn tour_to_feature_collection(keyframes: &[Keyframe]) -> FeatureCollection {
    let mut features = Vec::new();

    let path: Vec<Vec<f64>> = keyframes
        .iter()
        .filter(|k| k.kind == KeyframeKind::FlyTo)
        .map(|k| vec![k.lon, k.lat, k.ele])
        .collect();
    if path.len() >= 2 {
        let mut props = Map::new();
        props.insert("gpxType".to_string(), JsonValue::from("tour"));
        props.insert(
            "duration".to_string(),
            JsonValue::from(Tour::total_duration(keyframes)),
        );
        props.insert("keyframes".to_string(), JsonValue::from(keyframes.len()));
        props.insert(
            "holds".to_string(),
            JsonValue::from(keyframes.iter().filter(|k| k.is_hold()).count()),
        );
        features.push(feature(Value::LineString(path), props));
    }

    for k in keyframes.iter().filter(|k| k.is_wait()) {
        let mut props = Map::new();
        props.insert("gpxType".to_string(), JsonValue::from("stop"));
        if let Some(index) = k.stop {
            props.insert("stop".to_string(), JsonValue::from(index));
        }
        props.insert("wait".to_string(), JsonValue::from(k.duration));
        props.insert("heading".to_string(), JsonValue::from(k.heading));
        props.insert("tilt".to_string(), JsonValue::from(k.tilt));
        props.insert("range".to_string(), JsonValue::from(k.range));
        features.push(feature(Value::Point(vec![k.lon, k.lat, k.ele]), props));
    }

    let bbox = Bounds::from_coords(keyframes)
        .map(|b| vec![b.min_lon, b.min_lat, b.max_lon, b.max_lat]);
    collection(features, bbox)
}

fn collection(features: Vec<Feature>, bbox: Option<Vec<f64>>) -> FeatureCollection {
    FeatureCollection {
        bbox,
        features,
        foreign_members: None,
    }
}

fn feature(value: Value, props: Map<String, JsonValue>) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(props),
        foreign_members: None,
    }
}

fn track_to_features(trk: &Track, opts: &ExportOptions) -> Vec<Feature> {
    // segments are never empty once they are part of a track
    let lines: Vec<Vec<&Point>> = trk
        .segments()
        .iter()
        .map(|seg| {
            let points: Vec<&Point> = seg.points().iter().collect();
            match opts.simplify {
                Some(eps) => simplify(&points, eps),
                None => points,
            }
        })
        .collect();

    let total_points: usize = lines.iter().map(Vec::len).sum();
    match total_points {
        0 => return Vec::new(),
        1 => {
            let pt = lines.iter().flatten().next().copied();
            return pt.map(|p| point_feature(p, "track", opts)).into_iter().collect();
        }
        _ => {}
    }

    let lines: Vec<Vec<&Point>> = lines.into_iter().filter(|l| l.len() >= 2).collect();
    if lines.is_empty() {
        return Vec::new();
    }

    if opts.join_track_segments && lines.len() > 1 {
        let geometry = Value::MultiLineString(
            lines
                .iter()
                .map(|line| line_coords(line, opts.include_elevation))
                .collect(),
        );
        let mut props = build_track_props(trk, opts);
        if opts.include_time {
            let times: Vec<Vec<JsonValue>> = lines.iter().map(|line| line_times(line)).collect();
            if times.iter().flatten().any(|t| !t.is_null()) {
                insert_times(
                    &mut props,
                    JsonValue::Array(times.into_iter().map(JsonValue::Array).collect()),
                );
            }
        }
        return vec![feature(geometry, props)];
    }

    lines
        .iter()
        .map(|line| {
            let mut props = build_track_props(trk, opts);
            if opts.include_time {
                let times = line_times(line);
                if times.iter().any(|t| !t.is_null()) {
                    insert_times(&mut props, JsonValue::Array(times));
                }
            }
            feature(
                Value::LineString(line_coords(line, opts.include_elevation)),
                props,
            )
        })
        .collect()
}

fn point_feature(pt: &Point, gpx_type: &str, opts: &ExportOptions) -> Feature {
    let mut props = Map::new();
    props.insert("gpxType".to_string(), JsonValue::from(gpx_type));
    insert_attr(&mut props, pt.attr.iter());
    props.insert("ele".to_string(), JsonValue::from(pt.ele));
    if let Some(time) = pt.time {
        props.insert("time".to_string(), JsonValue::from(format_time(time)));
    }
    feature(Value::Point(point_coords(pt, opts.include_elevation)), props)
}

fn build_track_props(trk: &Track, opts: &ExportOptions) -> Map<String, JsonValue> {
    let mut props = Map::new();
    props.insert("gpxType".to_string(), JsonValue::from("track"));
    if !trk.name.is_empty() {
        props.insert("name".to_string(), JsonValue::from(trk.name.as_str()));
    }
    if !trk.desc.is_empty() {
        props.insert("desc".to_string(), JsonValue::from(trk.desc.as_str()));
    }
    insert_attr(&mut props, trk.attr.iter());
    if opts.include_stats {
        if let Ok(stats) = serde_json::to_value(trk.stats()) {
            props.insert("stats".to_string(), stats);
        }
    }
    props
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Build [lon, lat] or [lon, lat, ele] coordinate array.
fn point_coords(pt: &Point, include_elevation: bool) -> Vec<f64> {
    if include_elevation {
        vec![pt.lon(), pt.lat(), pt.ele]
    } else {
        vec![pt.lon(), pt.lat()]
    }
}

fn line_coords(line: &[&Point], include_elevation: bool) -> Vec<Vec<f64>> {
    line.iter()
        .map(|pt| point_coords(pt, include_elevation))
        .collect()
}

fn line_times(line: &[&Point]) -> Vec<JsonValue> {
    line.iter()
        .map(|pt| match pt.time {
            Some(t) => JsonValue::from(format_time(t)),
            None => JsonValue::Null,
        })
        .collect()
}

fn insert_attr<'a>(
    props: &mut Map<String, JsonValue>,
    attr: impl Iterator<Item = (&'a String, &'a String)>,
) {
    for (key, value) in attr {
        props.insert(key.clone(), JsonValue::from(value.as_str()));
    }
}

fn insert_times(props: &mut Map<String, JsonValue>, times: JsonValue) {
    let mut coord_props = Map::new();
    coord_props.insert("times".to_string(), times);
    props.insert(
        "coordinateProperties".to_string(),
        JsonValue::Object(coord_props),
    );
}
