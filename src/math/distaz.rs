//! Great-circle distance and azimuths between two geographic points.
//!
//! Latitudes are converted to geocentric colatitudes with the Earth flattening
//! `1/298.257` before the spherical-trigonometry formulas (Bullen, sec. 10.2) are
//! applied. Azimuths are measured clockwise from north in `[0, 360)`.

use crate::grid::km_per_degree;

const FLATTENING: f64 = 1.0 / 298.257;

/// Distance and azimuths from point 1 (station) to point 2 (event).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistAz {
    /// Arc distance in degrees.
    pub delta: f64,
    /// Azimuth at point 2 towards point 1.
    pub az: f64,
    /// Back-azimuth at point 1 towards point 2.
    pub baz: f64,
}

impl DistAz {
    pub fn new(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Self {
        if lat1 == lat2 && lon1 == lon2 {
            return Self {
                delta: 0.0,
                az: 0.0,
                baz: 0.0,
            };
        }

        let s = UnitFrame::at(lat1, lon1);
        let e = UnitFrame::at(lat2, lon2);

        let cos_delta = (s.a * e.a + s.b * e.b + s.c * e.c).clamp(-1.0, 1.0);
        let delta = cos_delta.acos().to_degrees();

        let rhs1 = (e.a - s.d).powi(2) + (e.b - s.e).powi(2) + e.c * e.c - 2.0;
        let rhs2 = (e.a - s.g).powi(2) + (e.b - s.h).powi(2) + (e.c - s.k).powi(2) - 2.0;
        let baz = normalize_azimuth(rhs1.atan2(rhs2));

        let rhs1 = (s.a - e.d).powi(2) + (s.b - e.e).powi(2) + s.c * s.c - 2.0;
        let rhs2 = (s.a - e.g).powi(2) + (s.b - e.h).powi(2) + (s.c - e.k).powi(2) - 2.0;
        let az = normalize_azimuth(rhs1.atan2(rhs2));

        Self { delta, az, baz }
    }

    pub fn km(&self) -> f64 {
        self.delta * km_per_degree()
    }
}

/// Epicentral distance in degrees.
pub fn delta_deg(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    DistAz::new(lat1, lon1, lat2, lon2).delta
}

struct UnitFrame {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    g: f64,
    h: f64,
    k: f64,
}

impl UnitFrame {
    fn at(lat: f64, lon: f64) -> Self {
        let colat = std::f64::consts::FRAC_PI_2
            - ((1.0 - FLATTENING) * (1.0 - FLATTENING) * lat.to_radians().tan()).atan();
        let lon = lon.to_radians();
        let c = colat.cos();
        let d = lon.sin();
        let e = -lon.cos();
        Self {
            a: colat.sin() * lon.cos(),
            b: colat.sin() * lon.sin(),
            c,
            d,
            e,
            g: -c * e,
            h: c * d,
            k: -colat.sin(),
        }
    }
}

fn normalize_azimuth(rad: f64) -> f64 {
    let mut deg = rad.to_degrees();
    if deg < 0.0 {
        deg += 360.0;
    }
    if deg.abs() < 1e-5 || (deg - 360.0).abs() < 1e-5 {
        0.0
    } else {
        deg
    }
}
