use crate::constants::HARTREE_TO_EV;
use crate::evaluation::{CacheStatistics, NearDegeneracy, NumericContext, Strategy};
use crate::symbolic::SumOverStates;
use crate::utils::Timer;
use log::{debug, info, warn};
use ndarray::prelude::*;
use num_complex::Complex64;

/// Near-degeneracies beyond this number are only counted.
const MAX_REPORTED_SIGNALS: usize = 10;

pub fn print_evaluation_init(
    name: &str,
    sos: &SumOverStates,
    context: &NumericContext,
    strategy: Strategy,
    n_components: usize,
) {
    info!("{:^80}", "");
    info!("{: ^80}", format!("Evaluation of the {}", name));
    info!("{:-^80}", "");
    let strategy_name: &str = match strategy {
        Strategy::SumOverStates => "explicit sum over states",
        Strategy::ResponseVectors => "response vectors",
    };
    info!("{: <30} {}", "Strategy:", strategy_name);
    info!("{: <30} {}", "Number of terms:", sos.number_of_terms());
    info!("{: <30} {}", "Tensor elements evaluated:", n_components);
    if strategy == Strategy::SumOverStates {
        info!("{: <30} {}", "Excited states summed over:", context.states().len());
    }
    for (label, value) in context.frequencies().iter() {
        info!(
            "{: <30} {:>12.6} a.u. {:>10.4} eV",
            format!("{}:", label),
            value,
            value * HARTREE_TO_EV
        );
    }
    if context.gamma() != 0.0 {
        info!("{: <30} {:>12.6} a.u.", "Damping γ:", context.gamma());
    }
    if let Some(f) = context.final_state() {
        info!("{: <30} {}", "Final state:", f);
    }
    debug!("{}", sos);
    info!("{:-^80}", "");
}

pub fn print_signals(signals: &[NearDegeneracy]) {
    if signals.is_empty() {
        return;
    }
    warn!(
        "{} denominator(s) are close to zero, the result may be unreliable:",
        signals.len()
    );
    for signal in signals.iter().take(MAX_REPORTED_SIGNALS) {
        warn!("    {}", signal);
    }
    if signals.len() > MAX_REPORTED_SIGNALS {
        warn!("    ... and {} more", signals.len() - MAX_REPORTED_SIGNALS);
    }
}

pub fn print_evaluation_end(timer: &Timer, statistics: &CacheStatistics) {
    debug!(
        "{: <30} {} entries, {} hits, {} misses",
        "Cache:", statistics.entries, statistics.hits, statistics.misses
    );
    info!("{}", timer);
    info!("{:-^80}", "");
}

/// Prints the non-zero elements of a tensor.
pub fn print_tensor(name: &str, tensor: &ArrayD<Complex64>, threshold: f64) {
    info!("{:^80}", "");
    info!("{: ^80}", name);
    info!("{:-^80}", "");
    info!("{: <12} {: >24} {: >24}", "Element", "Real", "Imaginary");
    let mut n_printed: usize = 0;
    for (index, value) in tensor.indexed_iter() {
        if value.norm() < threshold {
            continue;
        }
        let label: String = index
            .slice()
            .iter()
            .map(|c| ['x', 'y', 'z'][*c])
            .collect();
        info!("{: <12} {: >24.12e} {: >24.12e}", label, value.re, value.im);
        n_printed += 1;
    }
    if n_printed == 0 {
        info!("all elements vanish");
    }
    info!("{:-^80}", "");
}
