//! KML rendering of a tour: one placemark per stop and a `gx:Tour` playlist.

use chrono::SecondsFormat;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};

use crate::error::TourError;
use crate::geomath::Coordinate;
use crate::tour::{Keyframe, KeyframeKind, Stop};

type Result<T> = std::result::Result<T, TourError>;

const KML_NS: &str = "http://www.opengis.net/kml/2.2";
const GX_NS: &str = "http://www.google.com/kml/ext/2.2";
const FLY_TO_MODE: &str = "smooth";
const ALTITUDE_MODE: &str = "absolute";

type KmlWriter = Writer<Vec<u8>>;

fn start(w: &mut KmlWriter, tag: &str) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(tag)))?;
    Ok(())
}

fn end(w: &mut KmlWriter, tag: &str) -> Result<()> {
    w.write_event(Event::End(BytesStart::new(tag).to_end()))?;
    Ok(())
}

fn text_element(w: &mut KmlWriter, tag: &str, text: &str) -> Result<()> {
    start(w, tag)?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    end(w, tag)
}

fn placemark_id(index: usize) -> String {
    format!("stop-{index}")
}

fn write_placemark(w: &mut KmlWriter, index: usize, stop: &Stop) -> Result<()> {
    let id = placemark_id(index);
    let mut placemark = BytesStart::new("Placemark");
    placemark.push_attribute(("id", id.as_str()));
    w.write_event(Event::Start(placemark))?;

    if let Some(name) = &stop.name {
        text_element(w, "name", name)?;
    }
    if let Some(desc) = stop.point.attr.get("desc") {
        text_element(w, "description", desc)?;
    }
    if let Some(time) = stop.point.time {
        start(w, "TimeStamp")?;
        text_element(w, "when", &time.to_rfc3339_opts(SecondsFormat::Secs, true))?;
        end(w, "TimeStamp")?;
    }
    start(w, "Point")?;
    let p = &stop.point;
    text_element(
        w,
        "coordinates",
        &format!("{},{},{}", p.lon(), p.lat(), p.ele),
    )?;
    end(w, "Point")?;
    end(w, "Placemark")
}

fn write_fly_to(w: &mut KmlWriter, k: &Keyframe) -> Result<()> {
    start(w, "gx:FlyTo")?;
    text_element(w, "gx:duration", &k.duration.to_string())?;
    text_element(w, "gx:flyToMode", FLY_TO_MODE)?;
    start(w, "LookAt")?;
    text_element(w, "longitude", &k.lon.to_string())?;
    text_element(w, "latitude", &k.lat.to_string())?;
    text_element(w, "altitude", &k.ele.to_string())?;
    text_element(w, "heading", &k.heading.to_string())?;
    text_element(w, "tilt", &k.tilt.to_string())?;
    text_element(w, "range", &k.range.to_string())?;
    text_element(w, "altitudeMode", ALTITUDE_MODE)?;
    end(w, "LookAt")?;
    end(w, "gx:FlyTo")
}

fn write_balloon(w: &mut KmlWriter, index: usize, visible: bool) -> Result<()> {
    start(w, "gx:AnimatedUpdate")?;
    text_element(w, "gx:duration", "0.0")?;
    start(w, "Update")?;
    text_element(w, "targetHref", "")?;
    start(w, "Change")?;
    let id = placemark_id(index);
    let mut placemark = BytesStart::new("Placemark");
    placemark.push_attribute(("targetId", id.as_str()));
    w.write_event(Event::Start(placemark))?;
    text_element(w, "gx:balloonVisibility", if visible { "1" } else { "0" })?;
    end(w, "Placemark")?;
    end(w, "Change")?;
    end(w, "Update")?;
    end(w, "gx:AnimatedUpdate")
}

fn write_wait(w: &mut KmlWriter, k: &Keyframe) -> Result<()> {
    if let Some(index) = k.stop {
        write_balloon(w, index, true)?;
    }
    start(w, "gx:Wait")?;
    text_element(w, "gx:duration", &k.duration.to_string())?;
    end(w, "gx:Wait")?;
    if let Some(index) = k.stop {
        write_balloon(w, index, false)?;
    }
    Ok(())
}

/// Render a KML document with a placemark per stop and the keyframes as a
/// `gx:Tour` playlist. Wait keyframes open the balloon of their stop.
pub fn render_tour(
    name: &str,
    description: &str,
    stops: &[Stop],
    keyframes: &[Keyframe],
) -> Result<String> {
    let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut kml = BytesStart::new("kml");
    kml.push_attribute(("xmlns", KML_NS));
    kml.push_attribute(("xmlns:gx", GX_NS));
    w.write_event(Event::Start(kml.borrow()))?;
    start(&mut w, "Document")?;
    text_element(&mut w, "name", name)?;
    if !description.is_empty() {
        text_element(&mut w, "description", description)?;
    }
    text_element(&mut w, "open", "1")?;

    for (i, stop) in stops.iter().enumerate() {
        write_placemark(&mut w, i, stop)?;
    }

    start(&mut w, "gx:Tour")?;
    text_element(&mut w, "name", name)?;
    start(&mut w, "gx:Playlist")?;
    for k in keyframes {
        match k.kind {
            KeyframeKind::FlyTo | KeyframeKind::Hold => write_fly_to(&mut w, k)?,
            KeyframeKind::Wait => write_wait(&mut w, k)?,
        }
    }
    end(&mut w, "gx:Playlist")?;
    end(&mut w, "gx:Tour")?;

    end(&mut w, "Document")?;
    w.write_event(Event::End(kml.to_end()))?;

    log::debug!("rendered tour '{name}' with {} keyframes", keyframes.len());
    Ok(String::from_utf8_lossy(&w.into_inner()).into_owned())
}
