use crate::models::flight::LatLng;

/// Pairs at least this far apart (in planar degrees) are drawn as curves.
pub const LONG_HAUL_THRESHOLD: f64 = 20.0;
const CURVE_FACTOR: f64 = 0.2;
const NORTH_SOUTH_FACTOR: f64 = 0.5;
const MAX_CONTROL_LAT: f64 = 85.0;
const MIN_SAMPLES: usize = 3;
const MAX_SAMPLES: usize = 8;
const DEGREES_PER_EXTRA_SAMPLE: f64 = 30.0;

/// Shifts `to.lng` by ±360 when going the other way around is shorter, so the
/// returned longitude is always within 180 degrees of `from.lng`.
pub fn unwrap_longitude(from: LatLng, to: LatLng) -> LatLng {
    let delta = to.lng - from.lng;
    if delta > 180.0 {
        LatLng::new(to.lat, to.lng - 360.0)
    } else if delta < -180.0 {
        LatLng::new(to.lat, to.lng + 360.0)
    } else {
        to
    }
}

pub fn planar_distance(a: LatLng, b: LatLng) -> f64 {
    (b.lat - a.lat).hypot(b.lng - a.lng)
}

pub fn sample_count(distance: f64) -> usize {
    let extra = (distance / DEGREES_PER_EXTRA_SAMPLE).floor() as usize;
    (MIN_SAMPLES + extra).clamp(MIN_SAMPLES, MAX_SAMPLES)
}

/// Control point of the quadratic Bézier between `from` and an already
/// unwrapped `to`.
pub fn control_point(from: LatLng, to: LatLng) -> LatLng {
    let d_lat = to.lat - from.lat;
    let d_lng = to.lng - from.lng;
    let distance = d_lat.hypot(d_lng);
    let mid = LatLng::new((from.lat + to.lat) / 2.0, (from.lng + to.lng) / 2.0);
    if distance == 0.0 {
        return mid;
    }

    // unit normal to the chord
    let (mut n_lat, mut n_lng) = (-d_lng / distance, d_lat / distance);
    let mut offset = distance * CURVE_FACTOR;

    if d_lng.abs() >= d_lat.abs() {
        let pole = if mid.lat < 0.0 { -1.0 } else { 1.0 };
        if n_lat * pole < 0.0 {
            n_lat = -n_lat;
            n_lng = -n_lng;
        }
    } else {
        if n_lng < 0.0 {
            n_lat = -n_lat;
            n_lng = -n_lng;
        }
        offset *= NORTH_SOUTH_FACTOR;
    }

    LatLng::new(
        (mid.lat + n_lat * offset).clamp(-MAX_CONTROL_LAT, MAX_CONTROL_LAT),
        mid.lng + n_lng * offset
    )
}

fn bezier(from: LatLng, control: LatLng, to: LatLng, t: f64) -> LatLng {
    let u = 1.0 - t;
    LatLng::new(
        u * u * from.lat + 2.0 * u * t * control.lat + t * t * to.lat,
        u * u * from.lng + 2.0 * u * t * control.lng + t * t * to.lng
    )
}

/// Polyline for a route. Long-haul pairs are sampled along a Bézier curve;
/// short hops are a straight segment. The destination longitude in the output
/// may lie outside [-180, 180] after antimeridian unwrapping.
pub fn route_path(from: LatLng, to: LatLng) -> Vec<LatLng> {
    let to = unwrap_longitude(from, to);
    let distance = planar_distance(from, to);
    if distance < LONG_HAUL_THRESHOLD {
        return vec![from, to];
    }

    let control = control_point(from, to);
    let samples = sample_count(distance);
    let last = (samples - 1) as f64;
    (0..samples)
        .map(|i| {
            if i == 0 {
                from
            } else if i == samples - 1 {
                to
            } else {
                bezier(from, control, to, (i as f64) / last)
            }
        })
        .collect()
}
