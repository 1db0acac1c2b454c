use crate::constants::HARTREE_TO_EV;
use crate::driver::{isotropic_average, three_photon_strength, two_photon_strength, Evaluation};
use crate::symbolic::{OperatorKind, ResponseFunction};
use anyhow::{Context, Result};
use log::info;
use ndarray::prelude::*;
use ndarray_npy::write_npy;
use num_complex::Complex64;

/// Writes the real and the imaginary part of the tensor as two npy files.
pub fn write_tensor(prefix: &str, tensor: &ArrayD<Complex64>) -> Result<()> {
    let real: ArrayD<f64> = tensor.mapv(|z| z.re);
    let imag: ArrayD<f64> = tensor.mapv(|z| z.im);
    for (suffix, part) in [("real", &real), ("imag", &imag)] {
        let path: String = format!("{}_{}.npy", prefix, suffix);
        write_npy(&path, part).with_context(|| format!("Unable to write {}", path))?;
        info!("{: <30} {}", "Tensor written to:", path);
    }
    Ok(())
}

/// Prints the orientational averages that belong to the evaluated property. Only pure
/// electric-dipole tensors are averaged.
pub fn print_averages(
    function: ResponseFunction,
    operators: &[OperatorKind],
    result: &Evaluation,
    final_energy: Option<f64>,
) -> Result<()> {
    if operators.iter().any(|kind| *kind != OperatorKind::ElectricDipole) {
        return Ok(());
    }
    match function {
        ResponseFunction::Polarizability | ResponseFunction::ExcitedStatePolarizability => {
            let alpha: ArrayView2<Complex64> = result.tensor.view().into_dimensionality()?;
            let average: Complex64 = isotropic_average(alpha);
            info!(
                "{: <30} {:>16.8} {:>16.8}i",
                "Isotropic polarizability:", average.re, average.im
            );
        }
        ResponseFunction::TwoPhotonTransition => {
            let s: ArrayView2<Complex64> = result.tensor.view().into_dimensionality()?;
            info!("{: <30} {:>16.8} a.u.", "Two-photon strength:", two_photon_strength(s));
        }
        ResponseFunction::ThreePhotonTransition => {
            let t: ArrayView3<Complex64> = result.tensor.view().into_dimensionality()?;
            info!(
                "{: <30} {:>16.8} a.u.",
                "Three-photon strength:",
                three_photon_strength(t)
            );
        }
        _ => {}
    }
    if let Some(energy) = final_energy {
        info!(
            "{: <30} {:>16.8} a.u. {:>10.4} eV",
            "Final-state energy:",
            energy,
            energy * HARTREE_TO_EV
        );
    }
    Ok(())
}
