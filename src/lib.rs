pub mod converter;
pub mod error;
pub mod geomath;
pub mod kml;
pub mod options;
pub mod parser;
pub mod path;
pub mod simplify;
pub mod tour;
pub mod track;

use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

use crate::options::{ExportOptions, StopInput, TourOptions};
use crate::tour::{Keyframe, Stop, Tour};
use crate::track::{GpxData, TrackStats};

/// Convert GPX string to GeoJSON, returned as a JS object.
#[wasm_bindgen(js_name = gpxToGeoJson)]
pub fn gpx_to_geojson(gpx_string: &str, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts: ExportOptions = parse_options(options)?;
    let gpx_data = parser::parse_gpx(gpx_string)?;
    let fc = converter::tracks_to_feature_collection(&gpx_data, &opts);
    to_js(&fc)
}

/// Convert GPX string to GeoJSON, returned as a JSON string.
#[wasm_bindgen(js_name = gpxToGeoJsonString)]
pub fn gpx_to_geojson_string(gpx_string: &str, options: JsValue) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts: ExportOptions = parse_options(options)?;
    let gpx_data = parser::parse_gpx(gpx_string)?;
    let fc = converter::tracks_to_feature_collection(&gpx_data, &opts);
    serde_json::to_string(&fc).map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Length, time and speed figures of every track in a GPX string.
#[wasm_bindgen(js_name = gpxTrackStats)]
pub fn gpx_track_stats(gpx_string: &str) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let gpx_data = parser::parse_gpx(gpx_string)?;
    let stats: Vec<TrackStats> = gpx_data.tracks.iter().map(|t| t.stats()).collect();
    to_js(&stats)
}

/// Camera keyframes of a tour through `stops` along the tracks of a GPX string.
#[wasm_bindgen(js_name = gpxToTour)]
pub fn gpx_to_tour(gpx_string: &str, stops: JsValue, options: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let opts: TourOptions = parse_options(options)?;
    let gpx_data = parser::parse_gpx(gpx_string)?;
    let stops = parse_stops(stops, &opts)?;
    let keyframes = synthesize(&gpx_data, &stops, &opts)?;
    to_js(&keyframes)
}

/// KML document with a `gx:Tour` through `stops` along the tracks of a GPX string.
#[wasm_bindgen(js_name = gpxToKmlTour)]
pub fn gpx_to_kml_tour(
    gpx_string: &str,
    stops: JsValue,
    options: JsValue,
    name: &str,
) -> Result<String, JsValue> {
    console_error_panic_hook::set_once();

    let opts: TourOptions = parse_options(options)?;
    let gpx_data = parser::parse_gpx(gpx_string)?;
    let stops = parse_stops(stops, &opts)?;
    let keyframes = synthesize(&gpx_data, &stops, &opts)?;
    let description = gpx_data.name.as_deref().unwrap_or_default();
    Ok(kml::render_tour(name, description, &stops, &keyframes)?)
}

fn synthesize(data: &GpxData, stops: &[Stop], opts: &TourOptions) -> Result<Vec<Keyframe>, JsValue> {
    let tour = Tour::new(stops, data.enabled_point_lists(), opts)?;
    Ok(tour.collect())
}

fn parse_stops(stops: JsValue, opts: &TourOptions) -> Result<Vec<Stop>, JsValue> {
    let inputs: Vec<StopInput> =
        serde_wasm_bindgen::from_value(stops).map_err(|e| JsValue::from_str(&e.to_string()))?;
    Ok(Stop::from_inputs(inputs, opts)?)
}

fn parse_options<T: DeserializeOwned + Default>(options: JsValue) -> Result<T, JsValue> {
    if options.is_undefined() || options.is_null() {
        Ok(T::default())
    } else {
        serde_wasm_bindgen::from_value(options).map_err(|e| JsValue::from_str(&e.to_string()))
    }
}

/// Plain JS objects rather than `Map`s for JSON maps.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}
