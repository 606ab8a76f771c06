use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::TourError;
use crate::geomath::Coordinate;
use crate::track::{GpxData, Point, Segment, Track, parse_time};

type Result<T> = std::result::Result<T, TourError>;

/// Parse a GPX 1.0/1.1 document into waypoints and tracks.
///
/// Routes are not part of the model and are skipped, as are points with
/// unusable coordinates or timestamps.
pub fn parse_gpx(xml: &str) -> Result<GpxData> {
    let mut reader = Reader::from_str(xml);
    let mut data = GpxData::default();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"wpt" => {
                    if let Some(pt) = parse_point(&e, &mut reader)? {
                        data.waypoints.push(pt);
                    }
                }
                b"trk" => data.tracks.push(parse_track(&mut reader)?),
                b"metadata" => data.name = parse_metadata_name(&mut reader)?,
                // GPX 1.0 keeps the document name at the top level
                b"name" => data.name = Some(read_text_owned(&mut reader, &e)?),
                b"gpx" => {}
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) if e.local_name().as_ref() == b"wpt" => {
                if let Some(pt) = empty_point(&e) {
                    data.waypoints.push(pt);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    log::debug!(
        "parsed GPX with {} waypoints and {} tracks",
        data.waypoints.len(),
        data.tracks.len()
    );
    Ok(data)
}

/// Parse lat/lon attributes from a point element's start tag.
fn parse_lat_lon(e: &BytesStart<'_>) -> Result<(f64, f64)> {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for attr_result in e.attributes() {
        let attr = attr_result.map_err(|e| TourError::XmlParse(e.into()))?;
        let val = std::str::from_utf8(&attr.value).unwrap_or_default();
        let (slot, attribute) = match attr.key.local_name().as_ref() {
            b"lat" => (&mut lat, "lat"),
            b"lon" => (&mut lon, "lon"),
            _ => continue,
        };
        *slot = Some(val.trim().parse::<f64>().map_err(|_| {
            TourError::InvalidAttribute {
                element: "point",
                attribute,
                value: val.to_string(),
            }
        })?);
    }

    let lat = lat.ok_or(TourError::MissingAttribute {
        element: "point",
        attribute: "lat",
    })?;
    let lon = lon.ok_or(TourError::MissingAttribute {
        element: "point",
        attribute: "lon",
    })?;

    Ok((lat, lon))
}

fn new_point(e: &BytesStart<'_>) -> Result<Point> {
    let (lat, lon) = parse_lat_lon(e)?;
    Point::new(lat, lon)
}

/// A self-closing point element: coordinates only.
fn empty_point(e: &BytesStart<'_>) -> Option<Point> {
    match new_point(e) {
        Ok(point) => Some(point),
        Err(err) => {
            log::warn!("skipping point: {err}");
            None
        }
    }
}

/// Parse a point element (wpt, trkpt) and its children.
/// Called after receiving Event::Start for the point element.
fn parse_point<'a>(start: &BytesStart<'a>, reader: &mut Reader<&'a [u8]>) -> Result<Option<Point>> {
    let mut point = match new_point(start) {
        Ok(point) => point,
        Err(err) => {
            log::warn!("skipping point: {err}");
            reader.read_to_end(start.name())?;
            return Ok(None);
        }
    };
    let mut bad_time = None;
    let end_name = start.name().0.to_vec();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"ele" => {
                    let text = read_text_owned(reader, &e)?;
                    if let Ok(ele) = text.trim().parse::<f64>() {
                        point.ele = ele;
                    }
                }
                b"time" => {
                    let text = read_text_owned(reader, &e)?;
                    match parse_time(&text) {
                        Ok(time) => point.time = Some(time),
                        Err(err) => bad_time = Some(err),
                    }
                }
                key @ (b"name" | b"desc" | b"cmt" | b"src" | b"sym" | b"type") => {
                    let key = String::from_utf8_lossy(key).into_owned();
                    let value = read_text_owned(reader, &e)?;
                    point.attr.insert(key, value);
                }
                _ => {
                    // links, extensions and GPX 1.0 extras
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(err) = bad_time {
        log::warn!("skipping point at {}, {}: {err}", point.lat(), point.lon());
        return Ok(None);
    }
    Ok(Some(point))
}

/// Document name inside <metadata>.
fn parse_metadata_name<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Option<String>> {
    let mut name = None;
    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"name" => {
                name = Some(read_text_owned(reader, &e)?);
            }
            Event::Start(e) => {
                reader.read_to_end(e.name())?;
            }
            Event::End(e) if e.local_name().as_ref() == b"metadata" => break,
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(name)
}

/// Parse a <trk> element.
fn parse_track<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Track> {
    let mut track = Track::new("");

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"name" => track.name = read_text_owned(reader, &e)?,
                b"desc" => track.desc = read_text_owned(reader, &e)?,
                key @ (b"cmt" | b"src" | b"type" | b"number") => {
                    let key = String::from_utf8_lossy(key).into_owned();
                    let value = read_text_owned(reader, &e)?;
                    track.attr.insert(key, value);
                }
                b"trkseg" => {
                    let name = track.segments().len().to_string();
                    let segment = parse_segment(reader, name)?;
                    if let Err(err) = track.add_segment(segment) {
                        log::debug!("track '{}': {err}, skipped", track.name);
                    }
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::End(e) if e.local_name().as_ref() == b"trk" => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(track)
}

/// Parse a <trkseg> element.
fn parse_segment<'a>(reader: &mut Reader<&'a [u8]>, name: String) -> Result<Segment> {
    let mut segment = Segment::new(name);

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"trkpt" => {
                    if let Some(pt) = parse_point(&e, reader)? {
                        segment.add_point(pt);
                    }
                }
                _ => {
                    reader.read_to_end(e.name())?;
                }
            },
            Event::Empty(e) if e.local_name().as_ref() == b"trkpt" => {
                if let Some(pt) = empty_point(&e) {
                    segment.add_point(pt);
                }
            }
            Event::End(e) if e.local_name().as_ref() == b"trkseg" => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(segment)
}

fn predefined_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => None,
    }
}

/// Read text content of an element as an owned String.
/// Handles regular text, CDATA sections and entity references.
fn read_text_owned<'a>(reader: &mut Reader<&'a [u8]>, start: &BytesStart<'_>) -> Result<String> {
    let end_name = start.name().0.to_vec();
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Text(e) => text.push_str(std::str::from_utf8(e.as_ref()).unwrap_or_default()),
            Event::CData(e) => text.push_str(std::str::from_utf8(e.as_ref()).unwrap_or_default()),
            Event::GeneralRef(e) => {
                let resolved = match e.resolve_char_ref() {
                    Ok(Some(ch)) => Some(ch),
                    _ => predefined_entity(std::str::from_utf8(e.as_ref()).unwrap_or_default()),
                };
                // unknown entities are dropped
                if let Some(ch) = resolved {
                    text.push(ch);
                }
            }
            Event::End(e) if e.name().0 == end_name.as_slice() => break,
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}
