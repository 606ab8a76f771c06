//! Geodesic primitives on a spherical Earth (WGS84 coordinates, mean radius).
//!
//! The checked functions ([`distance`], [`bearing`], [`move_coord`]) validate
//! their inputs and fail with [`TourError::InvalidCoordinate`]. The crate-internal
//! `haversine` and `initial_bearing` skip validation and are used on points that
//! were validated at construction.

use std::f64::consts::FRAC_PI_2;

use crate::error::TourError;

type Result<T> = std::result::Result<T, TourError>;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Upper bound for any distance between two points on the surface.
pub const MAX_DISTANCE_EARTH: f64 = 22_000_000.0;

pub const DEFAULT_SCALE_RANGE: f64 = 1.5;
pub const DEFAULT_ASPECT_RATIO: f64 = 1.5;

const MILLIARCSEC_PER_DEGREE: u64 = 3_600_000;
const MILLIARCSEC_PER_MINUTE: u64 = 60_000;

/// Anything with a latitude and a longitude in decimal degrees.
pub trait Coordinate {
    fn lat(&self) -> f64;
    fn lon(&self) -> f64;
}

impl<T: Coordinate + ?Sized> Coordinate for &T {
    fn lat(&self) -> f64 {
        (**self).lat()
    }

    fn lon(&self) -> f64 {
        (**self).lon()
    }
}

pub(crate) fn check_lat(lat: f64) -> Result<()> {
    if lat.is_finite() && (-90.0..=90.0).contains(&lat) {
        Ok(())
    } else {
        Err(TourError::latitude(lat))
    }
}

pub(crate) fn check_lon(lon: f64) -> Result<()> {
    if lon.is_finite() && (-180.0..=180.0).contains(&lon) {
        Ok(())
    } else {
        Err(TourError::longitude(lon))
    }
}

fn check_pair(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<()> {
    check_lat(lat1)?;
    check_lon(lon1)?;
    check_lat(lat2)?;
    check_lon(lon2)
}

/// Great-circle distance in meters (haversine formula).
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<f64> {
    check_pair(lat1, lon1, lat2, lon2)?;
    Ok(haversine(lat1, lon1, lat2, lon2))
}

pub(crate) fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    // rounding can push `a` slightly above 1
    let a = a.min(1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS * c
}

/// Initial bearing in degrees, in `[0, 360)`, along the great circle from 1 to 2.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Result<f64> {
    check_pair(lat1, lon1, lat2, lon2)?;
    Ok(initial_bearing(lat1, lon1, lat2, lon2))
}

pub(crate) fn initial_bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_lon = (lon2 - lon1).to_radians();
    let y = d_lon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lon.cos();
    normalize_heading(y.atan2(x).to_degrees())
}

/// Fold any angle into `[0, 360)`.
pub fn normalize_heading(degrees: f64) -> f64 {
    let h = degrees.rem_euclid(360.0);
    // rem_euclid rounds tiny negatives up to 360.0; the + 0.0 clears -0.0
    if h >= 360.0 { 0.0 } else { h + 0.0 }
}

/// Destination reached after travelling `distance` meters on `bearing` degrees.
/// The returned longitude is folded back into `[-180, 180]`.
pub fn move_coord(lat: f64, lon: f64, distance: f64, bearing: f64) -> Result<(f64, f64)> {
    check_lat(lat)?;
    check_lon(lon)?;
    let theta = bearing.to_radians();
    let phi = lat.to_radians();
    let lambda = lon.to_radians();
    let delta = distance / EARTH_RADIUS;

    let phi2 = (phi.sin() * delta.cos() + phi.cos() * delta.sin() * theta.cos()).asin();
    let lambda2 = lambda
        + (theta.sin() * delta.sin() * phi.cos()).atan2(delta.cos() - phi.sin() * phi2.sin());

    let lon2 = (lambda2.to_degrees() + 540.0).rem_euclid(360.0) - 180.0;
    Ok((phi2.to_degrees(), lon2))
}

/// Sexagesimal angle. The sign lives in `negative` so that `-0° 30'` survives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dms {
    pub negative: bool,
    pub degrees: u32,
    pub minutes: u32,
    pub seconds: f64,
}

impl Dms {
    pub fn to_decimal(&self) -> f64 {
        let value =
            f64::from(self.degrees) + f64::from(self.minutes) / 60.0 + self.seconds / 3600.0;
        if self.negative { -value } else { value }
    }
}

/// Decimal degrees from degrees, minutes and seconds. The sign is taken from `degrees`.
pub fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> Result<f64> {
    if !(0.0..60.0).contains(&minutes) {
        return Err(TourError::InvalidCoordinate {
            kind: "minutes",
            value: minutes,
        });
    }
    if !(0.0..60.0).contains(&seconds) {
        return Err(TourError::InvalidCoordinate {
            kind: "seconds",
            value: seconds,
        });
    }
    if !degrees.is_finite() {
        return Err(TourError::InvalidCoordinate {
            kind: "degrees",
            value: degrees,
        });
    }
    let magnitude = degrees.abs() + minutes / 60.0 + seconds / 3600.0;
    let value = if degrees.is_sign_negative() {
        -magnitude
    } else {
        magnitude
    };
    if value.abs() > 180.0 {
        return Err(TourError::InvalidCoordinate {
            kind: "angle",
            value,
        });
    }
    Ok(value)
}

/// Split decimal degrees into degrees, minutes and seconds, with seconds
/// rounded to the millisecond of arc. Rounding works on whole milliarcseconds,
/// so a value that rounds up to 60 seconds carries into the minutes.
pub fn decimal_to_dms(value: f64) -> Result<Dms> {
    if !value.is_finite() || value.abs() > 180.0 {
        return Err(TourError::InvalidCoordinate {
            kind: "angle",
            value,
        });
    }
    let total = (value.abs() * MILLIARCSEC_PER_DEGREE as f64).round() as u64;
    let degrees = total / MILLIARCSEC_PER_DEGREE;
    let rest = total % MILLIARCSEC_PER_DEGREE;
    let minutes = rest / MILLIARCSEC_PER_MINUTE;
    let millis = rest % MILLIARCSEC_PER_MINUTE;

    Ok(Dms {
        negative: value.is_sign_negative() && total > 0,
        degrees: degrees as u32,
        minutes: minutes as u32,
        seconds: millis as f64 / 1000.0,
    })
}

/// Axis-aligned latitude/longitude box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl Bounds {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            min_lat: lat,
            min_lon: lon,
            max_lat: lat,
            max_lon: lon,
        }
    }

    pub fn from_coords<I, C>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = C>,
        C: Coordinate,
    {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::new(first.lat(), first.lon());
        for c in iter {
            bounds.extend(c.lat(), c.lon());
        }
        Some(bounds)
    }

    pub fn extend(&mut self, lat: f64, lon: f64) {
        self.min_lat = self.min_lat.min(lat);
        self.max_lat = self.max_lat.max(lat);
        self.min_lon = self.min_lon.min(lon);
        self.max_lon = self.max_lon.max(lon);
    }

    pub fn merge(&mut self, other: &Bounds) {
        self.extend(other.min_lat, other.min_lon);
        self.extend(other.max_lat, other.max_lon);
    }

    /// `(lat, lon)` of the box centre.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.max_lat + self.min_lat) / 2.0,
            (self.max_lon + self.min_lon) / 2.0,
        )
    }
}

/// Camera altitude (meters) from which the whole box is visible.
///
/// Experimentally derived formula from the Google Earth API utility library
/// (`boundsview.js`). A box without extent yields 0.
pub fn best_view_altitude(bounds: &Bounds, scale_range: f64, aspect_ratio: f64) -> f64 {
    let (center_lat, center_lon) = bounds.center();
    let ew = haversine(center_lat, bounds.max_lon, center_lat, bounds.min_lon);
    let ns = haversine(bounds.min_lat, center_lon, bounds.max_lat, center_lon);

    let ratio = if ns > 0.0 {
        ew / ns
    } else if ew > 0.0 {
        f64::INFINITY
    } else {
        aspect_ratio
    };
    let aspect = aspect_ratio.max(ratio).min(1.0);

    let alpha = (45.0 / (aspect + 0.4) - 2.0).to_radians();
    let expand = ns.max(ew);
    let beta = FRAC_PI_2.min(alpha + expand / (2.0 * EARTH_RADIUS));
    let altitude = scale_range
        * EARTH_RADIUS
        * (beta.sin() * (1.0 + 1.0 / alpha.tan().powi(2)).sqrt() - 1.0);
    altitude.max(0.0)
}
