//! Sub-path extraction between two boundary points.
//!
//! The extractor walks forward through the concatenated point lists of the
//! enabled tracks, keeping a cursor between calls: consecutive stops of a tour
//! are extracted in order and each search starts where the previous one ended.
//! An empty result is not an error; it tells the caller there is no recorded
//! path between the two boundaries.

use chrono::{DateTime, Utc};

use crate::geomath::{self, Coordinate};
use crate::track::{Point, seconds_between};

/// Position of the extractor inside the track list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    pub track: usize,
    pub point: usize,
}

/// How close a recorded point must be to a boundary to match it.
/// Zero on both axes means exact equality.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MatchTolerance {
    pub seconds: f64,
    pub meters: f64,
}

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Time(DateTime<Utc>),
    Position { lat: f64, lon: f64 },
}

impl Boundary {
    /// Distance to the boundary, in seconds or meters.
    fn deviation(&self, point: &Point) -> Option<f64> {
        match *self {
            Self::Time(t) => point.time.map(|pt| seconds_between(t, pt).abs()),
            Self::Position { lat, lon } => {
                Some(geomath::haversine(point.lat(), point.lon(), lat, lon))
            }
        }
    }

    fn matches(&self, point: &Point, tolerance: &MatchTolerance) -> bool {
        match *self {
            Self::Time(t) if tolerance.seconds <= 0.0 => point.time == Some(t),
            Self::Position { lat, lon } if tolerance.meters <= 0.0 => {
                point.lat() == lat && point.lon() == lon
            }
            Self::Time(_) => self
                .deviation(point)
                .is_some_and(|d| d <= tolerance.seconds),
            Self::Position { .. } => self
                .deviation(point)
                .is_some_and(|d| d <= tolerance.meters),
        }
    }

    /// The point lies beyond the boundary, so no later point of the same
    /// time-ordered list can match it.
    fn is_past(&self, point: &Point, tolerance: &MatchTolerance) -> bool {
        match *self {
            Self::Time(t) => point
                .time
                .is_some_and(|pt| seconds_between(t, pt) > tolerance.seconds.max(0.0)),
            Self::Position { .. } => false,
        }
    }
}

/// Move forward from a matching point while the next point still matches and
/// is strictly closer to the boundary.
fn settle(points: &[&Point], mut idx: usize, boundary: &Boundary, tolerance: &MatchTolerance) -> usize {
    if tolerance.seconds <= 0.0 && tolerance.meters <= 0.0 {
        return idx;
    }
    let Some(mut best) = boundary.deviation(points[idx]) else {
        return idx;
    };
    while let Some(next) = points.get(idx + 1) {
        match boundary.deviation(next) {
            Some(d) if d < best && boundary.matches(next, tolerance) => {
                best = d;
                idx += 1;
            }
            _ => break,
        }
    }
    idx
}

/// Drop points that repeat the position of their predecessor.
pub fn collapse_duplicates<'a>(points: Vec<&'a Point>) -> Vec<&'a Point> {
    let mut result: Vec<&'a Point> = Vec::with_capacity(points.len());
    for point in points {
        match result.last() {
            Some(prev) if prev.same_position(point) => {}
            _ => result.push(point),
        }
    }
    result
}

/// Single-owner, forward-only walker over the flattened tracks of one tour.
#[derive(Debug, Clone)]
pub struct PathExtractor<'a> {
    tracks: Vec<Vec<&'a Point>>,
    cursor: Cursor,
    tolerance: MatchTolerance,
}

impl<'a> PathExtractor<'a> {
    pub fn new(tracks: Vec<Vec<&'a Point>>, tolerance: MatchTolerance) -> Self {
        Self {
            tracks,
            cursor: Cursor::default(),
            tolerance,
        }
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn has_tracks(&self) -> bool {
        !self.tracks.is_empty()
    }

    /// Points from the one recorded at `start` to the one recorded at `end`.
    pub fn by_time(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<&'a Point> {
        collapse_duplicates(self.extract(Boundary::Time(start), Boundary::Time(end)))
    }

    /// Points from the one at `start` to the one at `end`.
    pub fn by_position<A, B>(&mut self, start: &A, end: &B) -> Vec<&'a Point>
    where
        A: Coordinate + ?Sized,
        B: Coordinate + ?Sized,
    {
        collapse_duplicates(self.extract(
            Boundary::Position {
                lat: start.lat(),
                lon: start.lon(),
            },
            Boundary::Position {
                lat: end.lat(),
                lon: end.lon(),
            },
        ))
    }

    /// Matches by time when both boundaries carry a timestamp, by position otherwise.
    pub fn path_between(&mut self, prev: &Point, next: &Point) -> Vec<&'a Point> {
        match (prev.time, next.time) {
            (Some(start), Some(end)) => self.by_time(start, end),
            _ => self.by_position(prev, next),
        }
    }

    fn extract(&mut self, start: Boundary, end: Boundary) -> Vec<&'a Point> {
        let saved = self.cursor;
        let tolerance = self.tolerance;

        // Consecutive stops may sit in tracks that overlap in time: when the
        // current track already begins after the start boundary, the start can
        // only be in the previous one.
        if let Some(first) = self.tracks.get(self.cursor.track).and_then(|t| t.first()) {
            if self.cursor.track > 0 && start.is_past(first, &tolerance) {
                log::debug!("start boundary precedes track {}, stepping back", self.cursor.track);
                self.cursor = Cursor {
                    track: self.cursor.track - 1,
                    point: 0,
                };
            }
        }

        let mut path = Vec::new();
        let mut found_first = false;
        let mut track = self.cursor.track;
        let mut idx = self.cursor.point;

        while track < self.tracks.len() {
            let points = &self.tracks[track];
            while idx < points.len() {
                let point = points[idx];
                if !found_first {
                    if start.matches(point, &tolerance) {
                        idx = settle(points, idx, &start, &tolerance);
                        found_first = true;
                        path.push(points[idx]);
                        if end.matches(points[idx], &tolerance) {
                            self.cursor = Cursor { track, point: idx };
                            return path;
                        }
                    } else if start.is_past(point, &tolerance) {
                        // time-ordered: the start is not in this track
                        break;
                    }
                } else {
                    path.push(point);
                    if end.matches(point, &tolerance) {
                        let last = settle(points, idx, &end, &tolerance);
                        path.extend(&points[idx + 1..=last]);
                        self.cursor = Cursor { track, point: last };
                        return path;
                    }
                    if end.is_past(point, &tolerance) {
                        // overshoot: keep the point, park the cursor before it
                        self.cursor = Cursor {
                            track,
                            point: idx.saturating_sub(1),
                        };
                        return path;
                    }
                }
                idx += 1;
            }
            track += 1;
            idx = 0;
        }

        log::debug!("no recorded path between {start:?} and {end:?}");
        self.cursor = saved;
        Vec::new()
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

    fn scenario() -> Vec<Point> {
        vec![
            pt(0.0, 0.0, 0),
            pt(0.01, 0.0, 10),
            pt(0.02, 0.0, 20),
            pt(0.03, 0.0, 30),
        ]
    }

    fn times(path: &[&Point]) -> Vec<i64> {
        path.iter()
            .map(|p| p.time.unwrap().timestamp() - 1_700_000_000)
            .collect()
    }

    #[test]
    fn test_full_range_by_time() {
        let points = scenario();
        let mut ex = PathExtractor::new(vec![points.iter().collect()], MatchTolerance::default());
        let path = ex.by_time(at(0), at(30));
        assert_eq!(times(&path), vec![0, 10, 20, 30]);
        assert_eq!(ex.cursor(), Cursor { track: 0, point: 3 });
    }

    #[test]
    fn test_no_exact_match_is_empty() {
        let points = scenario();
        let mut ex = PathExtractor::new(vec![points.iter().collect()], MatchTolerance::default());
        assert!(ex.by_time(at(5), at(15)).is_empty());
        // a failed search leaves the cursor alone
        assert_eq!(ex.cursor(), Cursor::default());
        assert_eq!(ex.by_time(at(0), at(10)).len(), 2);
    }

    #[test]
    fn test_consecutive_pairs_advance_cursor() {
        let points = scenario();
        let mut ex = PathExtractor::new(vec![points.iter().collect()], MatchTolerance::default());
        assert_eq!(times(&ex.by_time(at(0), at(10))), vec![0, 10]);
        assert_eq!(ex.cursor(), Cursor { track: 0, point: 1 });
        assert_eq!(times(&ex.by_time(at(10), at(30))), vec![10, 20, 30]);
    }

    #[test]
    fn test_same_boundary_returns_single_point() {
        let points = scenario();
        let mut ex = PathExtractor::new(vec![points.iter().collect()], MatchTolerance::default());
        assert_eq!(times(&ex.by_time(at(20), at(20))), vec![20]);
    }

    #[test]
    fn test_end_overshoot_included() {
        let points = scenario();
        let mut ex = PathExtractor::new(vec![points.iter().collect()], MatchTolerance::default());
        assert_eq!(times(&ex.by_time(at(0), at(25))), vec![0, 10, 20, 30]);
        assert_eq!(ex.cursor(), Cursor { track: 0, point: 2 });
    }

    #[test]
    fn test_path_spans_tracks() {
        let a = scenario();
        let b = vec![pt(0.04, 0.0, 40), pt(0.05, 0.0, 50)];
        let mut ex = PathExtractor::new(
            vec![a.iter().collect(), b.iter().collect()],
            MatchTolerance::default(),
        );
        assert_eq!(times(&ex.by_time(at(20), at(50))), vec![20, 30, 40, 50]);
        assert_eq!(ex.cursor(), Cursor { track: 1, point: 1 });
    }

    #[test]
    fn test_steps_back_into_overlapping_track() {
        let a = scenario();
        let b = vec![pt(1.0, 0.0, 25), pt(1.01, 0.0, 35), pt(1.02, 0.0, 45)];
        let mut ex = PathExtractor::new(
            vec![a.iter().collect(), b.iter().collect()],
            MatchTolerance::default(),
        );
        assert_eq!(times(&ex.by_time(at(25), at(45))), vec![25, 35, 45]);
        assert_eq!(ex.cursor().track, 1);
        assert_eq!(times(&ex.by_time(at(20), at(30))), vec![20, 30]);
        assert_eq!(ex.cursor(), Cursor { track: 0, point: 3 });
    }

    #[test]
    fn test_duplicate_positions_collapsed() {
        let points = vec![
            pt(0.0, 0.0, 0),
            pt(0.0, 0.0, 5),
            pt(0.01, 0.0, 10),
            pt(0.01, 0.0, 15),
            pt(0.02, 0.0, 20),
        ];
        let mut ex = PathExtractor::new(vec![points.iter().collect()], MatchTolerance::default());
        assert_eq!(times(&ex.by_time(at(0), at(20))), vec![0, 10, 20]);
    }

    #[test]
    fn test_by_position() {
        let points = scenario();
        let mut ex = PathExtractor::new(vec![points.iter().collect()], MatchTolerance::default());
        let start = Point::new(0.01, 0.0).unwrap();
        let end = Point::new(0.03, 0.0).unwrap();
        assert_eq!(times(&ex.by_position(&start, &end)), vec![10, 20, 30]);

        let nowhere = Point::new(5.0, 5.0).unwrap();
        assert!(ex.by_position(&end, &nowhere).is_empty());
        assert_eq!(ex.cursor(), Cursor { track: 0, point: 3 });
    }

    #[test]
    fn test_path_between_falls_back_to_position() {
        let points = scenario();
        let mut ex = PathExtractor::new(vec![points.iter().collect()], MatchTolerance::default());
        let prev = Point::new(0.0, 0.0).unwrap();
        let next = points[2].clone();
        assert_eq!(times(&ex.path_between(&prev, &next)), vec![0, 10, 20]);
    }

    #[test]
    fn test_time_tolerance_picks_nearest() {
        let points = scenario();
        let tolerance = MatchTolerance {
            seconds: 6.0,
            meters: 0.0,
        };
        let mut ex = PathExtractor::new(vec![points.iter().collect()], tolerance);
        assert_eq!(times(&ex.by_time(at(8), at(22))), vec![10, 20]);
    }

    #[test]
    fn test_position_tolerance() {
        let points = scenario();
        let tolerance = MatchTolerance {
            seconds: 0.0,
            meters: 50.0,
        };
        let mut ex = PathExtractor::new(vec![points.iter().collect()], tolerance);
        let start = Point::new(0.0101, 0.0001).unwrap();
        let end = Point::new(0.0299, 0.0).unwrap();
        assert_eq!(times(&ex.by_position(&start, &end)), vec![10, 20, 30]);
    }

    #[test]
    fn test_without_tracks() {
        let mut ex = PathExtractor::new(Vec::new(), MatchTolerance::default());
        assert!(!ex.has_tracks());
        assert!(ex.by_time(at(0), at(10)).is_empty());
    }
}
