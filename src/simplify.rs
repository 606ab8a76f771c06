//! Douglas–Peucker line simplification over geographic coordinates.
//!
//! Deviations are measured in a local tangent plane: longitude deltas are
//! scaled by the cosine of the mean latitude of the two points involved and
//! folded across the antimeridian. The tolerance is converted once from
//! meters into squared degrees of arc.

use std::f64::consts::PI;

use crate::geomath::{Coordinate, EARTH_RADIUS};

/// Half a degree in radians; `cos(HALF_DEG_RAD * (lat_a + lat_b))` is the
/// cosine of the mean latitude.
const HALF_DEG_RAD: f64 = PI / 360.0;

/// Squared tolerance in degrees of arc for a tolerance in meters.
fn band_sqr(epsilon: f64) -> f64 {
    let band = epsilon * 360.0 / (2.0 * PI * EARTH_RADIUS);
    band * band
}

/// Flattened vector from `a` to `b`.
fn planar<A: Coordinate, B: Coordinate>(a: &A, b: &B) -> (f64, f64) {
    let mut x = b.lon() - a.lon();
    if x.abs() > 180.0 {
        x -= 360.0 * x.signum();
    }
    x *= (HALF_DEG_RAD * (a.lat() + b.lat())).cos();
    (x, b.lat() - a.lat())
}

/// Squared deviation of `p` from the segment `a`-`b`.
fn deviation_sqr<T: Coordinate>(a: &T, b: &T, p: &T) -> f64 {
    let (x12, y12) = planar(a, b);
    let (x13, y13) = planar(a, p);
    let (x23, y23) = planar(b, p);
    let d12 = x12 * x12 + y12 * y12;
    let d13 = x13 * x13 + y13 * y13;
    let d23 = x23 * x23 + y23 * y23;

    // obtuse at either end: the nearest point of the segment is that end.
    // A zero-length segment always takes one of these branches.
    if d13 >= d12 + d23 {
        d23
    } else if d23 >= d12 + d13 {
        d13
    } else {
        let cross = x13 * y12 - y13 * x12;
        cross * cross / d12
    }
}

/// Indices of the points kept by the simplification, ascending, always
/// including the first and the last one.
///
/// Fewer than three points, or a non-positive tolerance, keep every index.
pub fn simplify_indices<T: Coordinate>(points: &[T], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    if n < 3 || epsilon <= 0.0 || !epsilon.is_finite() {
        return (0..n).collect();
    }
    let band = band_sqr(epsilon);

    let mut keep = Vec::new();
    let mut stack = vec![(0, n - 1)];
    while let Some((start, end)) = stack.pop() {
        if end - start <= 1 {
            keep.push(start);
            continue;
        }
        let mut sig = start;
        let mut max_dev = -1.0;
        for i in start + 1..end {
            let dev = deviation_sqr(&points[start], &points[end], &points[i]);
            if dev > max_dev {
                sig = i;
                max_dev = dev;
            }
        }
        if max_dev < band {
            keep.push(start);
        } else {
            // left half popped first, so indices come out ascending
            stack.push((sig, end));
            stack.push((start, sig));
        }
    }
    keep.push(n - 1);
    keep
}

/// Reduce `points` so that no dropped point lies more than `epsilon` meters
/// off the simplified path.
pub fn simplify<T: Coordinate + Clone>(points: &[T], epsilon: f64) -> Vec<T> {
    simplify_indices(points, epsilon)
        .into_iter()
        .map(|i| points[i].clone())
        .collect()
}
