use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::TourError;
use crate::geomath::{self, Bounds, Coordinate};

type Result<T> = std::result::Result<T, TourError>;

/// Seconds between two instants, with millisecond resolution.
pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Parse an RFC 3339 timestamp. Timestamps without an offset, common in
/// older GPX files, are taken as UTC.
pub fn parse_time(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    match DateTime::parse_from_rfc3339(text) {
        Ok(t) => Ok(t.with_timezone(&Utc)),
        Err(reason) => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| TourError::InvalidTime {
                value: text.to_string(),
                reason,
            }),
    }
}

/// A single recorded position.
///
/// Latitude and longitude are validated on construction and cannot change
/// afterwards; they are the identity used when matching path boundaries.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    lat: f64,
    lon: f64,
    pub ele: f64,
    pub time: Option<DateTime<Utc>>,
    pub status: bool,
    pub attr: BTreeMap<String, String>,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        geomath::check_lat(lat)?;
        geomath::check_lon(lon)?;
        Ok(Self {
            lat,
            lon,
            ele: 0.0,
            time: None,
            status: true,
            attr: BTreeMap::new(),
        })
    }

    pub fn with_ele(mut self, ele: f64) -> Self {
        self.ele = ele;
        self
    }

    pub fn with_time(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    pub fn distance_to<C: Coordinate + ?Sized>(&self, other: &C) -> f64 {
        geomath::haversine(self.lat, self.lon, other.lat(), other.lon())
    }

    pub fn bearing_to<C: Coordinate + ?Sized>(&self, other: &C) -> f64 {
        geomath::initial_bearing(self.lat, self.lon, other.lat(), other.lon())
    }

    /// Exact latitude/longitude equality.
    pub fn same_position<C: Coordinate + ?Sized>(&self, other: &C) -> bool {
        self.lat == other.lat() && self.lon == other.lon()
    }

    pub fn equals(&self, other: &Point, same_ele: bool, same_time: bool) -> bool {
        self.same_position(other)
            && (!same_ele || self.ele == other.ele)
            && (!same_time || self.time == other.time)
    }
}

impl Coordinate for Point {
    fn lat(&self) -> f64 {
        self.lat
    }

    fn lon(&self) -> f64 {
        self.lon
    }
}

/// Index at which `key` goes so the sequence stays sorted: before the first
/// element with a strictly later key, or at the end.
fn ordered_position<T, K: PartialOrd>(items: &[T], key: &K, key_of: impl Fn(&T) -> K) -> usize {
    match items.last() {
        Some(last) if key_of(last) > *key => items
            .iter()
            .position(|item| key_of(item) > *key)
            .unwrap_or(items.len()),
        _ => items.len(),
    }
}

/// A time-ordered run of points from one recording session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Segment {
    pub name: String,
    pub attr: BTreeMap<String, String>,
    points: Vec<Point>,
}

impl Segment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_points(name: impl Into<String>, points: impl IntoIterator<Item = Point>) -> Self {
        let mut segment = Self::new(name);
        for point in points {
            segment.add_point(point);
        }
        segment
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Insert keeping the points sorted by time; returns the insert position.
    /// Points with equal timestamps keep their insertion order.
    pub fn add_point(&mut self, point: Point) -> usize {
        let pos = ordered_position(&self.points, &point.time, |p| p.time);
        self.points.insert(pos, point);
        pos
    }

    pub fn remove_point(&mut self, pos: usize) -> Option<Point> {
        (pos < self.points.len()).then(|| self.points.remove(pos))
    }

    /// Position of the first point at the same place and elevation.
    pub fn position(&self, point: &Point) -> Option<usize> {
        self.points.iter().position(|p| p.equals(point, true, false))
    }

    /// Point whose timestamp is closest to `time`.
    pub fn closest(&self, time: DateTime<Utc>) -> Option<&Point> {
        self.points
            .iter()
            .filter_map(|p| p.time.map(|t| (p, (t - time).num_milliseconds().abs())))
            .min_by_key(|&(_, diff)| diff)
            .map(|(p, _)| p)
    }

    pub fn nearest_point_distance(&self, lat: f64, lon: f64) -> Option<(&Point, f64)> {
        self.points
            .iter()
            .map(|p| (p, geomath::haversine(p.lat, p.lon, lat, lon)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_coords(&self.points)
    }

    pub fn elevation_min_max(&self) -> Option<(f64, f64)> {
        let mut iter = self.points.iter().map(|p| p.ele);
        let first = iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), e| (lo.min(e), hi.max(e))))
    }

    pub fn time_min_max(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let mut times = self.points.iter().filter_map(|p| p.time);
        let first = times.next()?;
        let last = times.next_back().unwrap_or(first);
        Some((first, last))
    }

    /// `(min, avg, max)` speed in m/s over consecutive timed points.
    ///
    /// Pairs without a positive time delta are skipped; the average is total
    /// distance over total time of the pairs that were kept.
    pub fn speed_min_avg_max(&self) -> Option<(f64, f64, f64)> {
        let mut min = f64::INFINITY;
        let mut max = 0.0_f64;
        let mut distance = 0.0;
        let mut elapsed = 0.0;

        for w in self.points.windows(2) {
            let (Some(t0), Some(t1)) = (w[0].time, w[1].time) else {
                continue;
            };
            let dt = seconds_between(t0, t1);
            if dt <= 0.0 {
                continue;
            }
            let d = w[0].distance_to(&w[1]);
            let speed = d / dt;
            min = min.min(speed);
            max = max.max(speed);
            distance += d;
            elapsed += dt;
        }

        (elapsed > 0.0).then(|| (min, distance / elapsed, max))
    }
}

/// Reporting record for one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackStats {
    pub name: String,
    pub segments: usize,
    pub points: usize,
    pub length_min: f64,
    pub length_max: f64,
    pub length_total: f64,
    pub start: Option<String>,
    pub end: Option<String>,
    pub duration: Option<f64>,
    pub speed_min: Option<f64>,
    pub speed_avg: Option<f64>,
    pub speed_max: Option<f64>,
}

/// A named set of segments ordered by the time of their first point.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub name: String,
    pub desc: String,
    pub attr: BTreeMap<String, String>,
    /// Enabled for rendering and path extraction.
    pub status: bool,
    segments: Vec<Segment>,
}

impl Track {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: String::new(),
            attr: BTreeMap::new(),
            status: true,
            segments: Vec::new(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn add_segment(&mut self, segment: Segment) -> Result<usize> {
        let Some(first) = segment.points.first() else {
            return Err(TourError::EmptySegment);
        };
        let key = first.time;
        let pos = ordered_position(&self.segments, &key, |s| s.points.first().and_then(|p| p.time));
        self.segments.insert(pos, segment);
        Ok(pos)
    }

    pub fn remove_segment(&mut self, pos: usize) -> Option<Segment> {
        (pos < self.segments.len()).then(|| self.segments.remove(pos))
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.segments.iter().flat_map(|s| s.points.iter())
    }

    /// Every point, segment after segment: the flight path of the track.
    pub fn list_points(&self) -> Vec<&Point> {
        self.points().collect()
    }

    /// Points between two positions inside this track, exact matching.
    ///
    /// When `last` shows up before `first`, everything from the start of the
    /// track up to `last` is returned.
    pub fn list_path<A, B>(&self, first: &A, last: &B) -> Vec<&Point>
    where
        A: Coordinate + ?Sized,
        B: Coordinate + ?Sized,
    {
        let mut path = Vec::new();
        let mut found_first = false;
        for (i, point) in self.points().enumerate() {
            if found_first {
                path.push(point);
                if point.same_position(last) {
                    break;
                }
            } else if point.same_position(first) {
                found_first = true;
                path.push(point);
            } else if point.same_position(last) {
                return self.points().take(i + 1).collect();
            }
        }
        path
    }

    /// Segments whose time span, widened by `delta` on both sides, contains `time`.
    pub fn closest_segments(&self, time: DateTime<Utc>, delta: Duration) -> Vec<&Segment> {
        self.segments
            .iter()
            .filter(|s| match s.time_min_max() {
                Some((start, end)) => time > start - delta && time < end + delta,
                None => false,
            })
            .collect()
    }

    pub fn nearest_segment_point_distance(
        &self,
        lat: f64,
        lon: f64,
    ) -> Option<(&Segment, &Point, f64)> {
        self.segments
            .iter()
            .filter_map(|s| s.nearest_point_distance(lat, lon).map(|(p, d)| (s, p, d)))
            .min_by(|a, b| a.2.total_cmp(&b.2))
    }

    /// `(shortest, longest, total)` segment length in meters.
    pub fn length_min_max_total(&self) -> (f64, f64, f64) {
        if self.segments.is_empty() {
            return (0.0, 0.0, 0.0);
        }
        self.segments.iter().map(Segment::length).fold(
            (f64::INFINITY, 0.0, 0.0),
            |(min, max, total), len| (min.min(len), max.max(len), total + len),
        )
    }

    /// Earliest and latest timestamp, and the summed duration of the segments
    /// (gaps between segments are not counted).
    pub fn time_min_max_duration(&self) -> Option<(DateTime<Utc>, DateTime<Utc>, Duration)> {
        let mut result: Option<(DateTime<Utc>, DateTime<Utc>, Duration)> = None;
        for (start, end) in self.segments.iter().filter_map(Segment::time_min_max) {
            result = Some(match result {
                None => (start, end, end - start),
                Some((lo, hi, total)) => (lo.min(start), hi.max(end), total + (end - start)),
            });
        }
        result
    }

    /// Slowest and fastest pair over all segments, and the mean of the
    /// per-segment averages.
    pub fn speed_min_avg_max(&self) -> Option<(f64, f64, f64)> {
        let speeds: Vec<(f64, f64, f64)> = self
            .segments
            .iter()
            .filter_map(Segment::speed_min_avg_max)
            .collect();
        if speeds.is_empty() {
            return None;
        }
        let min = speeds.iter().map(|s| s.0).fold(f64::INFINITY, f64::min);
        let max = speeds.iter().map(|s| s.2).fold(0.0, f64::max);
        let avg = speeds.iter().map(|s| s.1).sum::<f64>() / speeds.len() as f64;
        Some((min, avg, max))
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_coords(self.points())
    }

    pub fn stats(&self) -> TrackStats {
        let (length_min, length_max, length_total) = self.length_min_max_total();
        let times = self.time_min_max_duration();
        let speed = self.speed_min_avg_max();
        TrackStats {
            name: self.name.clone(),
            segments: self.segments.len(),
            points: self.segments.iter().map(Segment::len).sum(),
            length_min,
            length_max,
            length_total,
            start: times.map(|(start, _, _)| start.to_rfc3339()),
            end: times.map(|(_, end, _)| end.to_rfc3339()),
            duration: times.map(|(_, _, d)| d.num_milliseconds() as f64 / 1000.0),
            speed_min: speed.map(|s| s.0),
            speed_avg: speed.map(|s| s.1),
            speed_max: speed.map(|s| s.2),
        }
    }
}

/// Parsed GPX document: waypoints and tracks.
#[derive(Debug, Default)]
pub struct GpxData {
    pub name: Option<String>,
    pub waypoints: Vec<Point>,
    pub tracks: Vec<Track>,
}

impl GpxData {
    /// Flattened point list of every enabled track, in document order.
    pub fn enabled_point_lists(&self) -> Vec<Vec<&Point>> {
        self.tracks
            .iter()
            .filter(|t| t.status)
            .map(Track::list_points)
            .filter(|points| !points.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn pt(lat: f64, lon: f64, secs: i64) -> Point {
        Point::new(lat, lon).unwrap().with_time(at(secs))
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("2023-11-14T22:13:20Z").unwrap(), at(0));
        assert_eq!(parse_time(" 2023-11-15T00:13:30+02:00 ").unwrap(), at(10));
        assert_eq!(parse_time("2023-11-14T22:13:20.000").unwrap(), at(0));
        assert!(matches!(
            parse_time("yesterday"),
            Err(TourError::InvalidTime { .. })
        ));
    }

    fn scenario_segment() -> Segment {
        Segment::from_points(
            "walk",
            [
                pt(0.0, 0.0, 0),
                pt(0.01, 0.0, 10),
                pt(0.02, 0.0, 20),
                pt(0.03, 0.0, 30),
            ],
        )
    }

    #[test]
    fn test_point_validation() {
        assert!(Point::new(90.0, 180.0).is_ok());
        assert!(matches!(
            Point::new(90.1, 0.0),
            Err(TourError::InvalidCoordinate { kind: "latitude", .. })
        ));
        assert!(matches!(
            Point::new(0.0, -180.1),
            Err(TourError::InvalidCoordinate { kind: "longitude", .. })
        ));
    }

    #[test]
    fn test_point_equals() {
        let a = pt(1.0, 2.0, 0).with_ele(5.0);
        let b = pt(1.0, 2.0, 10).with_ele(5.0);
        assert!(a.same_position(&b));
        assert!(a.equals(&b, true, false));
        assert!(!a.equals(&b, true, true));
        assert!(!a.equals(&b.clone().with_ele(6.0), true, false));
    }

    #[test]
    fn test_add_point_keeps_time_order() {
        let mut seg = Segment::new("s");
        for secs in [30, 10, 20, 0, 25, 5, 40] {
            seg.add_point(pt(0.0, secs as f64 / 100.0, secs));
        }
        let times: Vec<_> = seg.points().iter().map(|p| p.time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seg.len(), 7);
    }

    #[test]
    fn test_add_point_positions() {
        let mut seg = Segment::new("s");
        assert_eq!(seg.add_point(pt(0.0, 0.0, 10)), 0);
        assert_eq!(seg.add_point(pt(0.0, 0.1, 20)), 1);
        assert_eq!(seg.add_point(pt(0.0, 0.2, 0)), 0);
        // equal timestamps go after the existing one
        assert_eq!(seg.add_point(pt(0.0, 0.3, 10)), 2);
        assert_eq!(seg.points()[2].lon(), 0.3);
    }

    #[test]
    fn test_remove_and_position() {
        let mut seg = scenario_segment();
        let third = seg.points()[2].clone();
        assert_eq!(seg.position(&third), Some(2));
        assert_eq!(seg.remove_point(2), Some(third.clone()));
        assert_eq!(seg.position(&third), None);
        assert_eq!(seg.remove_point(10), None);
    }

    #[test]
    fn test_closest_and_nearest() {
        let seg = scenario_segment();
        assert_eq!(seg.closest(at(12)).unwrap().lat(), 0.01);
        assert_eq!(seg.closest(at(-100)).unwrap().lat(), 0.0);
        assert_eq!(seg.closest(at(100)).unwrap().lat(), 0.03);
        let (p, d) = seg.nearest_point_distance(0.021, 0.0).unwrap();
        assert_eq!(p.lat(), 0.02);
        assert!(d > 0.0 && d < 200.0);
    }

    #[test]
    fn test_segment_aggregates() {
        let seg = scenario_segment();
        let step = geomath::haversine(0.0, 0.0, 0.01, 0.0);
        assert!((seg.length() - 3.0 * step).abs() < 1e-6);

        let (min, avg, max) = seg.speed_min_avg_max().unwrap();
        assert!((min - step / 10.0).abs() < 1e-6);
        assert!((avg - step / 10.0).abs() < 1e-6);
        assert!((max - step / 10.0).abs() < 1e-6);

        let (start, end) = seg.time_min_max().unwrap();
        assert_eq!(start, at(0));
        assert_eq!(end, at(30));
    }

    #[test]
    fn test_speed_skips_zero_delta() {
        let seg = Segment::from_points(
            "s",
            [pt(0.0, 0.0, 0), pt(0.001, 0.0, 0), pt(0.002, 0.0, 10)],
        );
        let (min, avg, max) = seg.speed_min_avg_max().unwrap();
        assert!(min.is_finite() && avg.is_finite() && max.is_finite());
        let step = geomath::haversine(0.001, 0.0, 0.002, 0.0);
        assert!((max - step / 10.0).abs() < 1e-6);

        let untimed = Segment::from_points(
            "u",
            [Point::new(0.0, 0.0).unwrap(), Point::new(0.1, 0.0).unwrap()],
        );
        assert!(untimed.speed_min_avg_max().is_none());
        assert!(untimed.time_min_max().is_none());
    }

    #[test]
    fn test_add_empty_segment_fails() {
        let mut track = Track::new("t");
        assert!(matches!(
            track.add_segment(Segment::new("empty")),
            Err(TourError::EmptySegment)
        ));
        assert!(track.segments().is_empty());
    }

    #[test]
    fn test_segments_ordered_by_first_point() {
        let mut track = Track::new("t");
        let late = Segment::from_points("late", [pt(1.0, 1.0, 100), pt(1.0, 1.1, 110)]);
        let early = Segment::from_points("early", [pt(0.0, 0.0, 0), pt(0.0, 0.1, 10)]);
        let middle = Segment::from_points("middle", [pt(0.5, 0.5, 50)]);
        assert_eq!(track.add_segment(late).unwrap(), 0);
        assert_eq!(track.add_segment(early).unwrap(), 0);
        assert_eq!(track.add_segment(middle).unwrap(), 1);

        let names: Vec<_> = track.segments().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["early", "middle", "late"]);

        let points = track.list_points();
        assert_eq!(points.len(), 5);
        assert!(points.windows(2).all(|w| w[0].time <= w[1].time));
    }

    #[test]
    fn test_track_aggregates() {
        let mut track = Track::new("t");
        track.add_segment(scenario_segment()).unwrap();
        track
            .add_segment(Segment::from_points(
                "second",
                [pt(1.0, 0.0, 100), pt(1.0, 0.01, 160)],
            ))
            .unwrap();

        let (min, max, total) = track.length_min_max_total();
        assert!(min < max);
        assert!((total - (min + max)).abs() < 1e-9);

        let (start, end, duration) = track.time_min_max_duration().unwrap();
        assert_eq!(start, at(0));
        assert_eq!(end, at(160));
        assert_eq!(duration, Duration::seconds(90));

        let (smin, savg, smax) = track.speed_min_avg_max().unwrap();
        assert!(smin <= savg && savg <= smax);

        let stats = track.stats();
        assert_eq!(stats.segments, 2);
        assert_eq!(stats.points, 6);
        assert_eq!(stats.duration, Some(90.0));
    }

    #[test]
    fn test_empty_track_aggregates() {
        let track = Track::new("t");
        assert_eq!(track.length_min_max_total(), (0.0, 0.0, 0.0));
        assert!(track.time_min_max_duration().is_none());
        assert!(track.speed_min_avg_max().is_none());
        assert!(track.bounds().is_none());
    }

    #[test]
    fn test_list_path() {
        let mut track = Track::new("t");
        track.add_segment(scenario_segment()).unwrap();
        let a = Point::new(0.01, 0.0).unwrap();
        let b = Point::new(0.03, 0.0).unwrap();
        let path = track.list_path(&a, &b);
        assert_eq!(path.len(), 3);
        // last before first: prefix up to last
        let path = track.list_path(&b, &a);
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_closest_segments() {
        let mut track = Track::new("t");
        track.add_segment(scenario_segment()).unwrap();
        track
            .add_segment(Segment::from_points("far", [pt(1.0, 0.0, 1000), pt(1.0, 0.1, 1100)]))
            .unwrap();
        assert_eq!(track.closest_segments(at(15), Duration::zero()).len(), 1);
        assert_eq!(track.closest_segments(at(500), Duration::seconds(600)).len(), 2);
        let (seg, p, _) = track.nearest_segment_point_distance(1.0, 0.09).unwrap();
        assert_eq!(seg.name, "far");
        assert_eq!(p.lon(), 0.1);
    }

    #[test]
    fn test_enabled_point_lists() {
        let mut on = Track::new("on");
        on.add_segment(scenario_segment()).unwrap();
        let mut off = on.clone();
        off.status = false;
        let data = GpxData {
            tracks: vec![on, off, Track::new("empty")],
            ..Default::default()
        };
        let lists = data.enabled_point_lists();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].len(), 4);
    }
}
