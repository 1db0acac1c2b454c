use ndarray::prelude::*;
use num_complex::Complex64;

/// Isotropic average of a second-rank tensor, tr(α)/3.
pub fn isotropic_average(tensor: ArrayView2<Complex64>) -> Complex64 {
    tensor.diag().sum() / 3.0
}

/// Rotationally averaged two-photon transition strength for linearly polarized light with
/// parallel polarizations,
///     δ = 1/15 Σ_ab (S_aa S_bb* + S_ab S_ab* + S_ab S_ba*).
pub fn two_photon_strength(s: ArrayView2<Complex64>) -> f64 {
    let mut sum: Complex64 = Complex64::new(0.0, 0.0);
    for a in 0..3 {
        for b in 0..3 {
            sum += s[[a, a]] * s[[b, b]].conj()
                + s[[a, b]] * s[[a, b]].conj()
                + s[[a, b]] * s[[b, a]].conj();
        }
    }
    sum.re / 15.0
}

/// Rotationally averaged three-photon transition strength for linearly polarized light,
///     δ = 1/35 (2 Σ_abc T_abc T_abc* + 3 Σ_abc T_aab T_bcc*).
pub fn three_photon_strength(t: ArrayView3<Complex64>) -> f64 {
    let mut full: Complex64 = Complex64::new(0.0, 0.0);
    let mut traces: Complex64 = Complex64::new(0.0, 0.0);
    for a in 0..3 {
        for b in 0..3 {
            for c in 0..3 {
                full += t[[a, b, c]] * t[[a, b, c]].conj();
                traces += t[[a, a, b]] * t[[b, c, c]].conj();
            }
        }
    }
    (2.0 * full.re + 3.0 * traces.re) / 35.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn complex(x: &Array2<f64>) -> Array2<Complex64> {
        x.mapv(|v| Complex64::new(v, 0.0))
    }

    #[test]
    fn isotropic_average_of_diagonal_tensor() {
        let alpha = complex(&Array2::from_diag(&arr1(&[1.0, 2.0, 6.0])));
        let average = isotropic_average(alpha.view());
        assert_abs_diff_eq!(average.re, 3.0, epsilon = 1e-14);
        assert_abs_diff_eq!(average.im, 0.0, epsilon = 1e-14);
    }

    #[test]
    fn two_photon_strength_of_single_element() {
        // Only S_zz = 2: δ = (4 + 4 + 4) / 15
        let mut s = Array2::zeros((3, 3));
        s[[2, 2]] = 2.0;
        let delta = two_photon_strength(complex(&s).view());
        assert_abs_diff_eq!(delta, 12.0 / 15.0, epsilon = 1e-14);
    }

    #[test]
    fn three_photon_strength_of_single_element() {
        // Only T_zzz = 1: δ = (2 + 3) / 35
        let mut t: Array3<Complex64> = Array3::zeros((3, 3, 3));
        t[[2, 2, 2]] = Complex64::new(1.0, 0.0);
        assert_abs_diff_eq!(three_photon_strength(t.view()), 1.0 / 7.0, epsilon = 1e-14);
    }
}
