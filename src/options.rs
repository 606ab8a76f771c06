use serde::Deserialize;

use crate::error::TourError;
use crate::path::MatchTolerance;

type Result<T> = std::result::Result<T, TourError>;

/// Options for GPX track to GeoJSON export.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Include elevation as the 3rd coordinate value (default: true)
    #[serde(default = "default_true")]
    pub include_elevation: bool,

    /// Include timestamps in coordinateProperties.times (default: true)
    #[serde(default = "default_true")]
    pub include_time: bool,

    /// Include track statistics in properties (default: true)
    #[serde(default = "default_true")]
    pub include_stats: bool,

    /// Join track segments into a single MultiLineString (default: false)
    #[serde(default)]
    pub join_track_segments: bool,

    /// Simplify every line with this tolerance in meters (default: none)
    #[serde(default)]
    pub simplify: Option<f64>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_elevation: true,
            include_time: true,
            include_stats: true,
            join_track_segments: false,
            simplify: None,
        }
    }
}

/// How the path between two stops is simplified before keyframes are laid out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimplifyStrategy {
    /// Tolerance derived from the camera range of the leg.
    #[default]
    Auto,
    Off,
    /// Fixed tolerance in meters.
    Fixed(f64),
}

/// Camera and pacing configuration of a tour.
///
/// Stop level values (`StopInput`) win over these; `heading`, `tilt` and
/// `range` left empty here are estimated per leg.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourOptions {
    /// Seconds spent at each stop (default: 7)
    #[serde(default = "default_wait")]
    pub wait: f64,

    /// Seconds of flight between two stops (default: 5)
    #[serde(default = "default_flytime")]
    pub flytime: f64,

    #[serde(default)]
    pub heading: Option<f64>,

    #[serde(default)]
    pub tilt: Option<f64>,

    #[serde(default)]
    pub range: Option<f64>,

    /// Fly along the recorded track instead of straight hops (default: true)
    #[serde(default = "default_true")]
    pub follow_path: bool,

    /// Seconds of the opening flight to the first stop (default: 8)
    #[serde(default = "default_begin_flytime")]
    pub begin_flytime: f64,

    /// Seconds at the first stop (default: 5)
    #[serde(default = "default_begin_wait")]
    pub begin_wait: f64,

    /// Tilt of the opening flight (default: 40)
    #[serde(default = "default_max_tilt")]
    pub begin_tilt: f64,

    /// Heading change in degrees that makes the camera stop and turn (default: 30)
    #[serde(default = "default_corner_angle")]
    pub corner_angle: f64,

    /// Seconds of each in-place turn (default: 1)
    #[serde(default = "default_hold_time")]
    pub hold_time: f64,

    /// Closest camera range in meters (default: 50)
    #[serde(default = "default_min_range")]
    pub min_range: f64,

    #[serde(default)]
    pub min_tilt: f64,

    #[serde(default = "default_max_tilt")]
    pub max_tilt: f64,

    #[serde(default)]
    pub simplify: SimplifyStrategy,

    /// Automatic tolerance is the camera range divided by this (default: 30)
    #[serde(default = "default_simplify_factor")]
    pub simplify_factor: f64,

    /// Lower bound of the automatic tolerance in meters (default: 0.5)
    #[serde(default = "default_min_epsilon")]
    pub min_epsilon: f64,

    /// Time tolerance when matching stops to the track (default: 0, exact)
    #[serde(default)]
    pub match_seconds: f64,

    /// Distance tolerance when matching stops to the track (default: 0, exact)
    #[serde(default)]
    pub match_meters: f64,
}

impl Default for TourOptions {
    fn default() -> Self {
        Self {
            wait: default_wait(),
            flytime: default_flytime(),
            heading: None,
            tilt: None,
            range: None,
            follow_path: true,
            begin_flytime: default_begin_flytime(),
            begin_wait: default_begin_wait(),
            begin_tilt: default_max_tilt(),
            corner_angle: default_corner_angle(),
            hold_time: default_hold_time(),
            min_range: default_min_range(),
            min_tilt: 0.0,
            max_tilt: default_max_tilt(),
            simplify: SimplifyStrategy::Auto,
            simplify_factor: default_simplify_factor(),
            min_epsilon: default_min_epsilon(),
            match_seconds: 0.0,
            match_meters: 0.0,
        }
    }
}

impl TourOptions {
    pub fn validate(&self) -> Result<()> {
        check("wait", self.wait, self.wait >= 0.0)?;
        check("flytime", self.flytime, self.flytime >= MIN_FLYTIME)?;
        check(
            "beginFlytime",
            self.begin_flytime,
            self.begin_flytime >= MIN_FLYTIME,
        )?;
        check("beginWait", self.begin_wait, self.begin_wait >= 0.0)?;
        check("beginTilt", self.begin_tilt, is_tilt(self.begin_tilt))?;
        if let Some(heading) = self.heading {
            check("heading", heading, true)?;
        }
        if let Some(tilt) = self.tilt {
            check("tilt", tilt, is_tilt(tilt))?;
        }
        if let Some(range) = self.range {
            check("range", range, range >= 0.0)?;
        }
        check(
            "cornerAngle",
            self.corner_angle,
            self.corner_angle > 0.0 && self.corner_angle <= 180.0,
        )?;
        check("holdTime", self.hold_time, self.hold_time >= 0.0)?;
        check("minRange", self.min_range, self.min_range >= 0.0)?;
        check("minTilt", self.min_tilt, is_tilt(self.min_tilt))?;
        check(
            "maxTilt",
            self.max_tilt,
            is_tilt(self.max_tilt) && self.max_tilt >= self.min_tilt,
        )?;
        if let SimplifyStrategy::Fixed(eps) = self.simplify {
            check("simplify", eps, eps >= 0.0)?;
        }
        check(
            "simplifyFactor",
            self.simplify_factor,
            self.simplify_factor > 0.0,
        )?;
        check("minEpsilon", self.min_epsilon, self.min_epsilon >= 0.0)?;
        check("matchSeconds", self.match_seconds, self.match_seconds >= 0.0)?;
        check("matchMeters", self.match_meters, self.match_meters >= 0.0)?;
        Ok(())
    }

    pub fn tolerance(&self) -> MatchTolerance {
        MatchTolerance {
            seconds: self.match_seconds,
            meters: self.match_meters,
        }
    }
}

/// One stop of a tour as handed over by the host, usually a geotagged photo.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopInput {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub ele: Option<f64>,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub wait: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub tilt: Option<f64>,
    #[serde(default)]
    pub range: Option<f64>,
    #[serde(default)]
    pub flytime: Option<f64>,
    #[serde(default)]
    pub follow_path: Option<bool>,
}

pub(crate) const MIN_FLYTIME: f64 = 0.001;

fn is_tilt(value: f64) -> bool {
    (0.0..=90.0).contains(&value)
}

fn check(option: &'static str, value: f64, valid: bool) -> Result<()> {
    if valid && value.is_finite() {
        Ok(())
    } else {
        Err(TourError::InvalidOption { option, value })
    }
}

fn default_true() -> bool {
    true
}

fn default_wait() -> f64 {
    7.0
}

fn default_flytime() -> f64 {
    5.0
}

fn default_begin_flytime() -> f64 {
    8.0
}

fn default_begin_wait() -> f64 {
    5.0
}

fn default_corner_angle() -> f64 {
    30.0
}

fn default_hold_time() -> f64 {
    1.0
}

fn default_min_range() -> f64 {
    50.0
}

fn default_max_tilt() -> f64 {
    40.0
}

fn default_simplify_factor() -> f64 {
    30.0
}

fn default_min_epsilon() -> f64 {
    0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let opts = TourOptions::default();
        assert!(opts.validate().is_ok());
        assert_eq!(opts.simplify, SimplifyStrategy::Auto);
        assert_eq!(opts.tolerance(), MatchTolerance::default());
    }

    #[test]
    fn test_deserialize_partial() {
        let opts: TourOptions = serde_json::from_str(
            r#"{"flytime": 12, "maxTilt": 60, "simplify": {"fixed": 25.0}, "followPath": false}"#,
        )
        .unwrap();
        assert_eq!(opts.flytime, 12.0);
        assert_eq!(opts.max_tilt, 60.0);
        assert_eq!(opts.simplify, SimplifyStrategy::Fixed(25.0));
        assert!(!opts.follow_path);
        assert_eq!(opts.wait, 7.0);
        assert_eq!(opts.min_range, 50.0);
        assert!(opts.range.is_none());
    }

    #[test]
    fn test_deserialize_simplify_off() {
        let opts: TourOptions = serde_json::from_str(r#"{"simplify": "off"}"#).unwrap();
        assert_eq!(opts.simplify, SimplifyStrategy::Off);
    }

    #[test]
    fn test_validate_rejects() {
        let opts = TourOptions {
            flytime: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(TourError::InvalidOption {
                option: "flytime",
                ..
            })
        ));

        let opts = TourOptions {
            min_tilt: 50.0,
            max_tilt: 40.0,
            ..Default::default()
        };
        assert!(matches!(
            opts.validate(),
            Err(TourError::InvalidOption {
                option: "maxTilt",
                ..
            })
        ));

        let opts = TourOptions {
            tilt: Some(95.0),
            ..Default::default()
        };
        assert!(opts.validate().is_err());

        let opts = TourOptions {
            wait: f64::NAN,
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn test_export_defaults() {
        let opts: ExportOptions = serde_json::from_str("{}").unwrap();
        assert!(opts.include_elevation);
        assert!(opts.include_time);
        assert!(opts.include_stats);
        assert!(!opts.join_track_segments);
        assert!(opts.simplify.is_none());
    }

    #[test]
    fn test_stop_input() {
        let stop: StopInput = serde_json::from_str(
            r#"{"lat": 35.1, "lon": 139.2, "time": "2025-01-01T00:00:00Z", "followPath": false, "wait": 3}"#,
        )
        .unwrap();
        assert_eq!(stop.lat, 35.1);
        assert_eq!(stop.time.as_deref(), Some("2025-01-01T00:00:00Z"));
        assert_eq!(stop.follow_path, Some(false));
        assert_eq!(stop.wait, Some(3.0));
        assert!(stop.name.is_none());
    }
}
