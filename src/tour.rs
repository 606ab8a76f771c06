//! Camera tour synthesis.
//!
//! A [`Tour`] walks the stop list once and yields keyframes lazily: an
//! opening flight to the first stop, then for every pair of consecutive stops
//! the flight along the recorded track (or a straight hop when there is none)
//! followed by a wait at the stop. Flights along a track are paced at a
//! constant groundspeed, and sharp corners get an in-place turn.

use std::collections::VecDeque;

use serde::Serialize;

use crate::error::TourError;
use crate::geomath::{self, Bounds, Coordinate, DEFAULT_ASPECT_RATIO, DEFAULT_SCALE_RANGE};
use crate::options::{MIN_FLYTIME, SimplifyStrategy, StopInput, TourOptions};
use crate::path::PathExtractor;
use crate::simplify::simplify;
use crate::track::{Point, parse_time};

type Result<T> = std::result::Result<T, TourError>;

/// A tour waypoint, usually a geotagged photo, with optional camera overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub point: Point,
    pub name: Option<String>,
    /// Seconds the camera stays here.
    pub wait: f64,
    pub heading: Option<f64>,
    pub tilt: Option<f64>,
    pub range: Option<f64>,
    /// Seconds of the flight that ends here; the tour default when unset.
    pub flytime: Option<f64>,
    /// Fly along the recorded track from the previous stop.
    pub follow_path: bool,
}

impl Stop {
    pub fn new(point: Point, wait: f64) -> Self {
        Self {
            point,
            name: None,
            wait,
            heading: None,
            tilt: None,
            range: None,
            flytime: None,
            follow_path: true,
        }
    }

    /// Build a stop from host input, filling the blanks from `options`.
    pub fn from_input(input: StopInput, options: &TourOptions) -> Result<Self> {
        let mut point = Point::new(input.lat, input.lon)?;
        if let Some(ele) = input.ele {
            point.ele = ele;
        }
        if let Some(text) = &input.time {
            point.time = Some(parse_time(text)?);
        }
        if let Some(name) = &input.name {
            point.attr.insert("name".to_string(), name.clone());
        }

        let stop = Self {
            point,
            name: input.name,
            wait: input.wait.unwrap_or(options.wait),
            heading: input.heading.or(options.heading),
            tilt: input.tilt.or(options.tilt),
            range: input.range.or(options.range),
            flytime: input.flytime,
            follow_path: input.follow_path.unwrap_or(options.follow_path),
        };
        stop.validate()?;
        Ok(stop)
    }

    /// Build the whole stop list. The first stop waits `beginWait` unless it
    /// sets its own wait.
    pub fn from_inputs(inputs: Vec<StopInput>, options: &TourOptions) -> Result<Vec<Self>> {
        inputs
            .into_iter()
            .enumerate()
            .map(|(i, mut input)| {
                if i == 0 && input.wait.is_none() {
                    input.wait = Some(options.begin_wait);
                }
                Self::from_input(input, options)
            })
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let invalid = |option, value| Err(TourError::InvalidOption { option, value });
        if !(self.wait >= 0.0 && self.wait.is_finite()) {
            return invalid("wait", self.wait);
        }
        if let Some(flytime) = self.flytime {
            if !(flytime >= MIN_FLYTIME && flytime.is_finite()) {
                return invalid("flytime", flytime);
            }
        }
        if let Some(heading) = self.heading {
            if !heading.is_finite() {
                return invalid("heading", heading);
            }
        }
        if let Some(tilt) = self.tilt {
            if !(0.0..=90.0).contains(&tilt) {
                return invalid("tilt", tilt);
            }
        }
        if let Some(range) = self.range {
            if !(range >= 0.0 && range.is_finite()) {
                return invalid("range", range);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyframeKind {
    /// Camera flight to the keyframe position.
    FlyTo,
    /// In-place turn before a corner.
    Hold,
    /// Pause at a stop.
    Wait,
}

/// One camera instant of the tour.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    pub lon: f64,
    pub lat: f64,
    pub ele: f64,
    pub heading: f64,
    pub tilt: f64,
    pub range: f64,
    /// Seconds.
    pub duration: f64,
    pub kind: KeyframeKind,
    /// Index of the stop a wait keyframe belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<usize>,
}

impl Keyframe {
    pub fn is_hold(&self) -> bool {
        self.kind == KeyframeKind::Hold
    }

    pub fn is_wait(&self) -> bool {
        self.kind == KeyframeKind::Wait
    }
}

impl Coordinate for Keyframe {
    fn lat(&self) -> f64 {
        self.lat
    }

    fn lon(&self) -> f64 {
        self.lon
    }
}

/// Camera range of a leg: the minimum range for a leg of median length,
/// widening towards `altitude` the further the leg is from the median.
///
/// `leg_distance` is the direct distance between the two stops of the leg,
/// not the length of the recorded path or of one of its pieces; `median` is
/// taken over the same stop-to-stop distances.
pub fn camera_range(leg_distance: f64, median: f64, min_range: f64, altitude: f64) -> f64 {
    let longest = leg_distance.max(median);
    let deviation = if longest > 0.0 {
        ((leg_distance - median).abs() / longest).clamp(0.0, 1.0)
    } else {
        0.0
    };
    min_range + (altitude - min_range).max(0.0) * deviation
}

/// Tilt growing linearly from `min_tilt` at `min_range` to `max_tilt` at `altitude`.
pub fn camera_tilt(range: f64, min_range: f64, altitude: f64, min_tilt: f64, max_tilt: f64) -> f64 {
    let span = altitude - min_range;
    if span <= 0.0 {
        return max_tilt;
    }
    let t = ((range - min_range) / span).clamp(0.0, 1.0);
    min_tilt + (max_tilt - min_tilt) * t
}

/// Range of the opening shot: a point on the ellipse with semi-minor axis
/// `altitude` whose focus sits `offset` meters from the stop.
pub fn opening_range(tilt: f64, offset: f64, altitude: f64) -> f64 {
    let a = offset.hypot(altitude);
    if a <= 0.0 {
        return altitude;
    }
    let e = offset / a;
    let angle = (90.0 + tilt).to_radians();
    a * (1.0 - e * e) / (1.0 - e * angle.cos())
}

/// Simplification tolerance in meters for a leg flown at `range`.
pub fn simplify_epsilon(strategy: SimplifyStrategy, range: f64, factor: f64, min_epsilon: f64) -> f64 {
    match strategy {
        SimplifyStrategy::Auto => (range / factor).max(min_epsilon),
        SimplifyStrategy::Off => 0.0,
        SimplifyStrategy::Fixed(eps) => eps,
    }
}

/// True when turning from `previous` to `current` heading exceeds `corner_angle` degrees.
pub fn is_corner(previous: f64, current: f64, corner_angle: f64) -> bool {
    (current - previous).to_radians().cos() < corner_angle.to_radians().cos()
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeFirstStop,
    /// Next leg starts at this stop.
    Between(usize),
    AfterLastStop,
}

/// Lazy keyframe sequence over a stop list.
///
/// The tour owns the path extractor for its run, so its cursor only ever
/// moves forward through the tracks.
#[derive(Debug, Clone)]
pub struct Tour<'a> {
    stops: &'a [Stop],
    options: TourOptions,
    extractor: PathExtractor<'a>,
    state: State,
    pending: VecDeque<Keyframe>,
    altitude: f64,
    median_leg: f64,
    center: (f64, f64),
}

impl<'a> Tour<'a> {
    /// `tracks` are the flattened point lists of the enabled tracks, in
    /// recording order.
    pub fn new(stops: &'a [Stop], tracks: Vec<Vec<&'a Point>>, options: &TourOptions) -> Result<Self> {
        options.validate()?;
        for stop in stops {
            stop.validate()?;
        }

        let mut bounds = Bounds::from_coords(stops.iter().map(|s| &s.point));
        if let Some(track_bounds) = Bounds::from_coords(tracks.iter().flatten()) {
            match bounds.as_mut() {
                Some(b) => b.merge(&track_bounds),
                None => bounds = Some(track_bounds),
            }
        }
        let (altitude, center) = match &bounds {
            Some(b) => (
                best_view(b).max(options.min_range),
                b.center(),
            ),
            None => (options.min_range, (0.0, 0.0)),
        };

        let legs = stops
            .windows(2)
            .map(|pair| pair[0].point.distance_to(&pair[1].point))
            .collect();

        log::debug!(
            "tour over {} stops and {} tracks, altitude {altitude:.0}m",
            stops.len(),
            tracks.len()
        );
        Ok(Self {
            stops,
            options: options.clone(),
            extractor: PathExtractor::new(tracks, options.tolerance()),
            state: State::BeforeFirstStop,
            pending: VecDeque::new(),
            altitude,
            median_leg: median(legs),
            center,
        })
    }

    /// Altitude that frames every stop and track point.
    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    /// Median direct distance between consecutive stops.
    pub fn median_leg(&self) -> f64 {
        self.median_leg
    }

    /// Sum of the keyframe durations, in seconds.
    pub fn total_duration<'k>(keyframes: impl IntoIterator<Item = &'k Keyframe>) -> f64 {
        keyframes.into_iter().map(|k| k.duration).sum()
    }

    fn frame(&mut self, point: &Point, heading: f64, tilt: f64, range: f64, duration: f64, kind: KeyframeKind) {
        self.pending.push_back(Keyframe {
            lon: point.lon(),
            lat: point.lat(),
            ele: point.ele,
            heading: geomath::normalize_heading(heading),
            tilt,
            range,
            duration,
            kind,
            stop: None,
        });
    }

    fn wait(&mut self, index: usize, heading: f64, tilt: f64, range: f64) {
        let stops = self.stops;
        let stop = &stops[index];
        self.frame(&stop.point, heading, tilt, range, stop.wait, KeyframeKind::Wait);
        if let Some(k) = self.pending.back_mut() {
            k.stop = Some(index);
        }
    }

    fn begin(&mut self) {
        let stops = self.stops;
        let Some(first) = stops.first() else {
            return;
        };
        let (lat, lon) = (first.point.lat(), first.point.lon());
        let (center_lat, center_lon) = self.center;
        let heading = first
            .heading
            .unwrap_or_else(|| geomath::initial_bearing(lat, lon, center_lat, center_lon));
        let tilt = self.options.begin_tilt;
        let range = first.range.unwrap_or_else(|| {
            let offset = geomath::haversine(lat, lon, center_lat, center_lon);
            opening_range(tilt, offset, self.altitude)
        });
        self.frame(
            &first.point,
            heading,
            tilt,
            range,
            self.options.begin_flytime,
            KeyframeKind::FlyTo,
        );
        self.wait(0, heading, tilt, range);
    }

    fn leg(&mut self, index: usize) {
        let stops = self.stops;
        let (prev, next) = (&stops[index], &stops[index + 1]);
        let opts = &self.options;

        let leg_distance = prev.point.distance_to(&next.point);
        let range = next.range.unwrap_or_else(|| {
            camera_range(leg_distance, self.median_leg, opts.min_range, self.altitude)
        });
        let tilt = next.tilt.unwrap_or_else(|| {
            camera_tilt(range, opts.min_range, self.altitude, opts.min_tilt, opts.max_tilt)
        });
        let flytime = next.flytime.unwrap_or(opts.flytime);
        let epsilon = simplify_epsilon(opts.simplify, range, opts.simplify_factor, opts.min_epsilon);
        let corner_angle = opts.corner_angle;
        let hold_time = opts.hold_time;

        let mut path = Vec::new();
        if next.follow_path && prev.point.time.is_some() && next.point.time.is_some() {
            path = self.extractor.path_between(&prev.point, &next.point);
            if path.is_empty() && self.extractor.has_tracks() {
                log::debug!("no recorded path to stop {}, flying direct", index + 1);
            }
        }
        if path.len() > 2 {
            path = simplify(&path, epsilon);
        }

        let total: f64 = path.windows(2).map(|p| p[0].distance_to(p[1])).sum();
        let mut heading = next
            .heading
            .unwrap_or_else(|| prev.point.bearing_to(&next.point));

        if path.len() > 1 && total > 0.0 {
            let speed = total / flytime;
            let mut last_heading = None;
            for pair in path.windows(2) {
                let (current, following) = (pair[0], pair[1]);
                heading = next
                    .heading
                    .unwrap_or_else(|| current.bearing_to(following));
                if let Some(previous) = last_heading {
                    if is_corner(previous, heading, corner_angle) {
                        self.frame(current, heading, tilt, range, hold_time, KeyframeKind::Hold);
                    }
                }
                last_heading = Some(heading);
                let duration = current.distance_to(following) / speed;
                self.frame(following, heading, tilt, range, duration, KeyframeKind::FlyTo);
            }
        } else {
            if path.len() > 1 {
                log::debug!("leg to stop {} does not move, flying direct", index + 1);
            }
            self.frame(&next.point, heading, tilt, range, flytime, KeyframeKind::FlyTo);
        }
        self.wait(index + 1, heading, tilt, range);
    }
}

fn best_view(bounds: &Bounds) -> f64 {
    geomath::best_view_altitude(bounds, DEFAULT_SCALE_RANGE, DEFAULT_ASPECT_RATIO)
}

impl Iterator for Tour<'_> {
    type Item = Keyframe;

    fn next(&mut self) -> Option<Keyframe> {
        loop {
            if let Some(keyframe) = self.pending.pop_front() {
                return Some(keyframe);
            }
            match self.state {
                State::BeforeFirstStop => {
                    self.begin();
                    self.state = if self.stops.is_empty() {
                        State::AfterLastStop
                    } else {
                        State::Between(0)
                    };
                }
                State::Between(i) if i + 1 < self.stops.len() => {
                    self.leg(i);
                    self.state = State::Between(i + 1);
                }
                State::Between(_) => self.state = State::AfterLastStop,
                State::AfterLastStop => return None,
            }
        }
    }
}
