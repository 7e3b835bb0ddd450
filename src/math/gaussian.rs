//! Separable Gaussian smoothing of 3D arrays in index space.
//!
//! Boundaries use half-sample symmetric reflection (`d c b a | a b c d`) and the
//! kernel is truncated at four standard deviations.

use ndarray::{Array3, Axis};

const TRUNCATE: f64 = 4.0;

/// Smooth `data` in place with a per-axis standard deviation (in index units).
/// Axes with `sigma <= 0` are left untouched.
pub fn gaussian_filter3(data: &mut Array3<f64>, sigma: [f64; 3]) {
    for (axis, &s) in sigma.iter().enumerate() {
        if s > 0.0 && s.is_finite() && data.len_of(Axis(axis)) > 1 {
            smooth_axis(data, axis, s);
        }
    }
}

fn smooth_axis(data: &mut Array3<f64>, axis: usize, sigma: f64) {
    let kernel = kernel_1d(sigma);
    let radius = (kernel.len() / 2) as isize;
    let n = data.len_of(Axis(axis));
    let mut buf = vec![0.0; n];

    for mut lane in data.lanes_mut(Axis(axis)) {
        for (i, out) in buf.iter_mut().enumerate() {
            *out = kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * lane[reflect(i as isize + k as isize - radius, n)])
                .sum();
        }
        for (dst, src) in lane.iter_mut().zip(&buf) {
            *dst = *src;
        }
    }
}

fn kernel_1d(sigma: f64) -> Vec<f64> {
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-0.5 * (x as f64 / sigma).powi(2)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m >= n as isize {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_field_is_unchanged() {
        let mut a = Array3::from_elem((4, 5, 6), 3.25);
        gaussian_filter3(&mut a, [1.5, 2.0, 0.7]);
        assert!(a.iter().all(|v| (v - 3.25).abs() < 1e-12));
    }

    #[test]
    fn spike_spreads_and_preserves_mass() {
        let mut a = Array3::zeros((1, 1, 41));
        a[[0, 0, 20]] = 1.0;
        gaussian_filter3(&mut a, [0.0, 0.0, 2.0]);
        let total: f64 = a.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(a[[0, 0, 20]] < 1.0 && a[[0, 0, 19]] > 0.0);
        assert!((a[[0, 0, 18]] - a[[0, 0, 22]]).abs() < 1e-15);
    }

    #[test]
    fn reflect_mirrors_edges() {
        assert_eq!(reflect(-1, 4), 0);
        assert_eq!(reflect(-2, 4), 1);
        assert_eq!(reflect(4, 4), 3);
        assert_eq!(reflect(5, 4), 2);
        assert_eq!(reflect(9, 4), 1);
    }
}
