use super::*;
use crate::errors::ConstructionError;
use crate::symbolic::{label_operators, Denominator, LeviCivita, Term, F, K, N, O};
use crate::utils::*;
use approx::AbsDiffEq;
use responsefun_backend::{ModelSystem, OperatorComponent};

const DIPOLES_2: [OperatorKind; 2] = [OperatorKind::ElectricDipole; 2];
const DIPOLES_3: [OperatorKind; 3] = [OperatorKind::ElectricDipole; 3];
const DIPOLES_4: [OperatorKind; 4] = [OperatorKind::ElectricDipole; 4];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn options(gamma: f64) -> DriverOptions {
    DriverOptionsBuilder::default().gamma(gamma).build().unwrap()
}

#[test]
fn static_polarizability_of_two_level_system() {
    init_logger();
    let model = two_level_system();
    let driver = Driver::new(&model, DriverOptions::default());
    let result = driver
        .evaluate(
            ResponseFunction::Polarizability,
            &DIPOLES_2,
            &Frequencies::static_limit(1),
            None,
        )
        .unwrap();
    // α_zz = 2 μ² / ω
    let alpha_zz: Complex64 = result.tensor[IxDyn(&[2, 2])];
    assert!((alpha_zz.re - 5.76).abs() < 5.76e-6, "{}", alpha_zz);
    assert!(alpha_zz.im.abs_diff_eq(&0.0, EPSILON));
    assert!(result.tensor[IxDyn(&[0, 0])].norm() < EPSILON);
    assert!(result.tensor[IxDyn(&[0, 2])].norm() < EPSILON);
    assert_eq!(result.n_terms, 2);
    assert!(result.signals.is_empty());
}

#[test]
fn damped_polarizability_is_conjugated_for_negative_frequencies() {
    init_logger();
    let model = three_state_system();
    let driver = Driver::new(&model, options(0.01));
    let plus = driver
        .evaluate(
            ResponseFunction::Polarizability,
            &DIPOLES_2,
            &Frequencies::new(vec![0.1]),
            None,
        )
        .unwrap();
    let minus = driver
        .evaluate(
            ResponseFunction::Polarizability,
            &DIPOLES_2,
            &Frequencies::new(vec![-0.1]),
            None,
        )
        .unwrap();
    let conjugated: ArrayD<Complex64> = plus.tensor.mapv(|z| z.conj());
    assert!(max_deviation(&minus.tensor, &conjugated) < EPSILON);
    assert!(plus.tensor[IxDyn(&[0, 0])].im.abs() > 1e-6);
}

#[test]
fn polarizability_grows_towards_resonance() {
    init_logger();
    let model = two_level_system();
    let options = DriverOptionsBuilder::default()
        .gamma(0.01)
        .tolerance(0.05)
        .build()
        .unwrap();
    let driver = Driver::new(&model, options);
    let mut previous: f64 = 0.0;
    for omega in [0.40, 0.45, 0.49, 0.499, 0.5] {
        let result = driver
            .evaluate(
                ResponseFunction::Polarizability,
                &DIPOLES_2,
                &Frequencies::new(vec![omega]),
                None,
            )
            .unwrap();
        let alpha_zz: Complex64 = result.tensor[IxDyn(&[2, 2])];
        assert!(alpha_zz.re.is_finite() && alpha_zz.im.is_finite());
        assert!(alpha_zz.norm() > previous);
        previous = alpha_zz.norm();
        if omega < 0.45 {
            assert!(result.signals.is_empty());
        }
        if omega > 0.495 {
            assert!(!result.signals.is_empty());
        }
    }
}

#[test]
fn undamped_resonance_diverges() {
    let model = two_level_system();
    let driver = Driver::new(&model, DriverOptions::default());
    let result = driver.evaluate(
        ResponseFunction::Polarizability,
        &DIPOLES_2,
        &Frequencies::new(vec![0.5]),
        None,
    );
    assert!(matches!(result, Err(ResponseError::Divergence { .. })));
}

#[test]
fn static_hyperpolarizabilities_of_two_level_system() {
    init_logger();
    let model = polar_two_level_system();
    let driver = Driver::new(&model, DriverOptions::default());
    // β_zzz = 6 μ² Δμ / ω²
    let beta = driver
        .evaluate(
            ResponseFunction::FirstHyperpolarizability,
            &DIPOLES_3,
            &Frequencies::static_limit(2),
            None,
        )
        .unwrap();
    let beta_zzz: f64 = beta.tensor[IxDyn(&[2, 2, 2])].re;
    assert!((beta_zzz - 17.28).abs() < 17.28e-6, "{}", beta_zzz);
    // γ_zzzz = 24 μ² (Δμ² - μ²) / ω³
    let gamma = driver
        .evaluate(
            ResponseFunction::SecondHyperpolarizability,
            &DIPOLES_4,
            &Frequencies::static_limit(3),
            None,
        )
        .unwrap();
    let gamma_zzzz: f64 = gamma.tensor[IxDyn(&[2, 2, 2, 2])].re;
    assert!((gamma_zzzz + 329.0112).abs() < 329.0112e-6, "{}", gamma_zzzz);
}

fn compare_strategies(
    function: ResponseFunction,
    operators: &[OperatorKind],
    frequencies: Frequencies,
    gamma: f64,
    final_state: Option<usize>,
) {
    let model = three_state_system();
    let driver = Driver::new(&model, options(gamma));
    let sos = driver
        .evaluate(function, operators, &frequencies, final_state)
        .unwrap();
    let response = driver
        .evaluate_with_response_vectors(function, operators, &frequencies, final_state)
        .unwrap();
    let deviation: f64 = max_deviation(&sos.tensor, &response.tensor);
    assert!(deviation < 1e-8, "{}: deviation {:e}", function, deviation);
    assert!(sos.tensor.iter().any(|z| z.norm() > 1e-6));
}

#[test]
fn response_vectors_reproduce_polarizability() {
    init_logger();
    compare_strategies(
        ResponseFunction::Polarizability,
        &DIPOLES_2,
        Frequencies::new(vec![0.12]),
        0.005,
        None,
    );
    compare_strategies(
        ResponseFunction::Polarizability,
        &[OperatorKind::ElectricQuadrupole, OperatorKind::ElectricDipole],
        Frequencies::new(vec![0.07]),
        0.0,
        None,
    );
}

#[test]
fn response_vectors_reproduce_hyperpolarizabilities() {
    init_logger();
    compare_strategies(
        ResponseFunction::FirstHyperpolarizability,
        &DIPOLES_3,
        Frequencies::new(vec![0.05, 0.03]).with_outgoing(0.08),
        0.005,
        None,
    );
    compare_strategies(
        ResponseFunction::SecondHyperpolarizability,
        &DIPOLES_4,
        Frequencies::new(vec![0.02, 0.03, 0.01]),
        0.0,
        None,
    );
}

#[test]
fn response_vectors_reproduce_transition_moments() {
    init_logger();
    compare_strategies(
        ResponseFunction::TwoPhotonTransition,
        &DIPOLES_2,
        Frequencies::default(),
        0.0,
        Some(2),
    );
    compare_strategies(
        ResponseFunction::ThreePhotonTransition,
        &DIPOLES_3,
        Frequencies::default(),
        0.0,
        Some(2),
    );
}

#[test]
fn symmetric_and_parallel_evaluation_agree() {
    init_logger();
    let model = three_state_system();
    let frequencies = Frequencies::new(vec![0.1]);
    let full = Driver::new(&model, DriverOptions::default())
        .evaluate(ResponseFunction::Polarizability, &DIPOLES_2, &frequencies, None)
        .unwrap();
    let options = DriverOptionsBuilder::default()
        .symmetric(true)
        .parallel(true)
        .build()
        .unwrap();
    let reduced = Driver::new(&model, options)
        .evaluate(ResponseFunction::Polarizability, &DIPOLES_2, &frequencies, None)
        .unwrap();
    assert!(max_deviation(&full.tensor, &reduced.tensor) < EPSILON);
}

#[test]
fn matrix_elements_are_requested_once() {
    init_logger();
    let backend = CountingBackend::new(two_level_system());
    let driver = Driver::new(&backend, DriverOptions::default());
    let frequencies = Frequencies::new(vec![0.1]);
    driver
        .evaluate(ResponseFunction::Polarizability, &DIPOLES_2, &frequencies, None)
        .unwrap();
    // <1|μ_x|0>, <1|μ_y|0> and <1|μ_z|0>
    assert_eq!(backend.moments(), 3);
    // The cache does not survive the evaluation.
    driver
        .evaluate(ResponseFunction::Polarizability, &DIPOLES_2, &frequencies, None)
        .unwrap();
    assert_eq!(backend.moments(), 6);
}

#[test]
fn response_equations_are_solved_once() {
    init_logger();
    let backend = CountingBackend::new(three_state_system());
    let options = DriverOptionsBuilder::default()
        .gamma(0.01)
        .parallel(true)
        .build()
        .unwrap();
    let driver = Driver::new(&backend, options);
    driver
        .evaluate_with_response_vectors(
            ResponseFunction::Polarizability,
            &DIPOLES_2,
            &Frequencies::new(vec![0.1]),
            None,
        )
        .unwrap();
    // One right-hand side per component and two shifts (ω and -ω).
    assert_eq!(backend.vectors(), 3);
    assert_eq!(backend.solves(), 6);
    assert_eq!(backend.moments(), 0);
}

#[test]
fn excluded_final_state_is_skipped() {
    init_logger();
    let model: ModelSystem = three_state_system();
    let f: usize = 2;
    let full = Driver::new(&model, DriverOptions::default())
        .evaluate(
            ResponseFunction::TwoPhotonTransition,
            &DIPOLES_2,
            &Frequencies::default(),
            Some(f),
        )
        .unwrap();
    let options = DriverOptionsBuilder::default()
        .excluded(vec![(N, F)])
        .build()
        .unwrap();
    let driver = Driver::new(&model, options);
    let reduced = driver
        .evaluate(
            ResponseFunction::TwoPhotonTransition,
            &DIPOLES_2,
            &Frequencies::default(),
            Some(f),
        )
        .unwrap();
    // The summand n = f of S_xz: (<0|μ_x|f><f|μ_z|f> + <0|μ_z|f><f|μ_x|f>) / (ω_f / 2)
    let x = OperatorComponent::new(OperatorKind::ElectricDipole, vec![0]).unwrap();
    let z = OperatorComponent::new(OperatorKind::ElectricDipole, vec![2]).unwrap();
    let half: f64 = model.excitation_energies()[f] / 2.0;
    let summand: f64 = (model.transition_moment(&x, f).unwrap()
        * model.state_to_state_moment(&z, f, f).unwrap()
        + model.transition_moment(&z, f).unwrap() * model.state_to_state_moment(&x, f, f).unwrap())
        / half;
    let difference: Complex64 = full.tensor[IxDyn(&[0, 2])] - reduced.tensor[IxDyn(&[0, 2])];
    assert!((difference.re - summand).abs() < EPSILON, "{} != {}", difference, summand);

    // The final state is projected out of the response vectors.
    let projected = driver
        .evaluate_with_response_vectors(
            ResponseFunction::TwoPhotonTransition,
            &DIPOLES_2,
            &Frequencies::default(),
            Some(f),
        )
        .unwrap();
    assert!(max_deviation(&reduced.tensor, &projected.tensor) < 1e-8);

    // An index excluded by another one needs the explicit summation.
    let distinct = Driver::new(
        &model,
        DriverOptionsBuilder::default()
            .excluded(vec![(N, StateLabel::Summed('m'))])
            .build()
            .unwrap(),
    );
    let result = distinct.evaluate_with_response_vectors(
        ResponseFunction::ThreePhotonTransition,
        &DIPOLES_3,
        &Frequencies::default(),
        Some(f),
    );
    assert!(matches!(
        result,
        Err(ResponseError::Construction(ConstructionError::UnsupportedTerm { .. }))
    ));
}

#[test]
fn response_vectors_need_all_states() {
    init_logger();
    let model = three_state_system();
    let options = DriverOptionsBuilder::default()
        .states(Some(StateSet::lowest(1)))
        .build()
        .unwrap();
    let driver = Driver::new(&model, options);
    let frequencies = Frequencies::new(vec![0.1]);
    assert!(driver
        .evaluate(ResponseFunction::Polarizability, &DIPOLES_2, &frequencies, None)
        .is_ok());
    let result = driver.evaluate_with_response_vectors(
        ResponseFunction::Polarizability,
        &DIPOLES_2,
        &frequencies,
        None,
    );
    assert!(matches!(
        result,
        Err(ResponseError::Configuration(ConfigurationError::RestrictedStateSet {
            selected: 1,
            n_states: 3
        }))
    ));
}

#[test]
fn ground_state_terms_of_two_photon_moment() {
    init_logger();
    let model = three_state_system();
    let f: usize = 2;
    let evaluate = |ground_state_terms: bool| {
        let options = DriverOptionsBuilder::default()
            .ground_state_terms(ground_state_terms)
            .build()
            .unwrap();
        Driver::new(&model, options)
            .evaluate(
                ResponseFunction::TwoPhotonTransition,
                &DIPOLES_2,
                &Frequencies::default(),
                Some(f),
            )
            .unwrap()
    };
    let full = evaluate(true);
    let excited = evaluate(false);
    assert_eq!(full.n_terms, 4);
    assert_eq!(excited.n_terms, 2);
    // n = 0 in S_zz: 2 <0|μ_z|0><0|μ_z|f> / (-ω_f / 2)
    let z = OperatorComponent::new(OperatorKind::ElectricDipole, vec![2]).unwrap();
    let half: f64 = model.excitation_energies()[f] / 2.0;
    let summand: f64 = -2.0
        * model.ground_state_moment(&z).unwrap()
        * model.transition_moment(&z, f).unwrap()
        / half;
    let difference: Complex64 = full.tensor[IxDyn(&[2, 2])] - excited.tensor[IxDyn(&[2, 2])];
    assert!((difference.re - summand).abs() < EPSILON, "{} != {}", difference, summand);
}

#[test]
fn excited_state_polarizability_of_two_level_system() {
    init_logger();
    let model = two_level_system();
    let driver = Driver::new(&model, DriverOptions::default());
    let frequencies = Frequencies::static_limit(1);
    // Only the ground state couples to the excited state: α_f,zz = -2 μ² / ω.
    for result in [
        driver.evaluate(
            ResponseFunction::ExcitedStatePolarizability,
            &DIPOLES_2,
            &frequencies,
            Some(0),
        ),
        driver.evaluate_with_response_vectors(
            ResponseFunction::ExcitedStatePolarizability,
            &DIPOLES_2,
            &frequencies,
            Some(0),
        ),
    ] {
        let result = result.unwrap();
        let alpha_zz: Complex64 = result.tensor[IxDyn(&[2, 2])];
        assert!((alpha_zz.re + 5.76).abs() < 5.76e-6, "{}", alpha_zz);
        assert!(result.tensor[IxDyn(&[0, 0])].norm() < EPSILON);
    }
    // Without frequencies the final-state energy is not shared out.
    assert!(matches!(
        driver.evaluate(
            ResponseFunction::ExcitedStatePolarizability,
            &DIPOLES_2,
            &Frequencies::default(),
            Some(0),
        ),
        Err(ResponseError::Configuration(ConfigurationError::FrequencyCount { .. }))
    ));
}

#[test]
fn response_vectors_reproduce_excited_state_polarizability() {
    init_logger();
    compare_strategies(
        ResponseFunction::ExcitedStatePolarizability,
        &DIPOLES_2,
        Frequencies::new(vec![0.05]),
        0.005,
        Some(1),
    );
    compare_strategies(
        ResponseFunction::ExcitedStatePolarizability,
        &DIPOLES_2,
        Frequencies::static_limit(1),
        0.0,
        Some(0),
    );
}

#[test]
fn levi_civita_selects_the_antisymmetric_elements() {
    init_logger();
    let model = three_state_system();
    let driver = Driver::new(&model, DriverOptions::default());
    let ops = label_operators(&DIPOLES_3).unwrap();
    let build = |epsilon: Option<LeviCivita>| {
        let mut term = Term::scaled(-1.0);
        if let Some(epsilon) = epsilon {
            term = term.levi_civita(epsilon);
        }
        let term = term
            .moment(O, &ops[1], K)
            .moment(K, &ops[2], F)
            .moment(F, &ops[0], O)
            .over(Denominator::transition(K));
        SumOverStates::new(vec![term], vec![K])
            .unwrap()
            .with_final_state(F)
            .unwrap()
    };
    let epsilon = LeviCivita::new("ABC").unwrap();
    let plain = driver
        .evaluate_expression("plain", &build(None), &Frequencies::default(), Some(1))
        .unwrap();
    let weighted = driver
        .evaluate_expression(
            "weighted",
            &build(Some(epsilon)),
            &Frequencies::default(),
            Some(1),
        )
        .unwrap();
    let response = driver
        .evaluate_expression_with_response_vectors(
            "weighted",
            &build(Some(epsilon)),
            &Frequencies::default(),
            Some(1),
        )
        .unwrap();
    for index in tensor_elements(3, false) {
        let expected: Complex64 = plain.tensor[IxDyn(&index)] * epsilon.value(&index);
        assert!((weighted.tensor[IxDyn(&index)] - expected).norm() < EPSILON);
        assert!((response.tensor[IxDyn(&index)] - expected).norm() < 1e-8);
    }
    assert!(weighted.tensor[IxDyn(&[0, 1, 2])].norm() > 1e-6);
    assert!(weighted.tensor[IxDyn(&[0, 0, 2])].norm() < EPSILON);
}

#[test]
fn invalid_configurations_are_rejected() {
    let model = three_state_system();
    let driver = Driver::new(&model, DriverOptions::default());
    let alpha = |frequencies: Vec<f64>| {
        driver.evaluate(
            ResponseFunction::Polarizability,
            &DIPOLES_2,
            &Frequencies::new(frequencies),
            None,
        )
    };
    assert!(matches!(
        alpha(vec![0.1, 0.2]),
        Err(ResponseError::Configuration(ConfigurationError::FrequencyCount {
            expected: 1,
            found: 2
        }))
    ));
    assert!(matches!(
        alpha(vec![f64::NAN]),
        Err(ResponseError::Configuration(ConfigurationError::NonFiniteFrequency(_)))
    ));
    assert!(matches!(
        driver.evaluate(
            ResponseFunction::FirstHyperpolarizability,
            &DIPOLES_3,
            &Frequencies::new(vec![0.05, 0.03]).with_outgoing(0.1),
            None,
        ),
        Err(ResponseError::Configuration(ConfigurationError::FrequencySum { .. }))
    ));
    assert!(matches!(
        driver.evaluate(
            ResponseFunction::TwoPhotonTransition,
            &DIPOLES_2,
            &Frequencies::default(),
            None,
        ),
        Err(ResponseError::Configuration(ConfigurationError::MissingFinalState))
    ));
    assert!(matches!(
        driver.evaluate(
            ResponseFunction::Polarizability,
            &DIPOLES_2,
            &Frequencies::new(vec![0.1]),
            Some(0),
        ),
        Err(ResponseError::Configuration(ConfigurationError::UnexpectedFinalState))
    ));
    assert!(matches!(
        driver.evaluate(
            ResponseFunction::TwoPhotonTransition,
            &DIPOLES_2,
            &Frequencies::new(vec![0.1, 0.1]),
            Some(0),
        ),
        Err(ResponseError::Configuration(ConfigurationError::FinalStateResonance { .. }))
    ));
    assert!(matches!(
        driver.evaluate(
            ResponseFunction::TwoPhotonTransition,
            &DIPOLES_2,
            &Frequencies::default(),
            Some(3),
        ),
        Err(ResponseError::Configuration(ConfigurationError::StateOutOfRange { .. }))
    ));
    assert!(matches!(
        driver.evaluate(
            ResponseFunction::Polarizability,
            &DIPOLES_3,
            &Frequencies::new(vec![0.1]),
            None,
        ),
        Err(ResponseError::Construction(ConstructionError::UnsupportedCombination { .. }))
    ));

    let damped = Driver::new(&model, options(0.01));
    assert!(matches!(
        damped.evaluate(
            ResponseFunction::TwoPhotonTransition,
            &DIPOLES_2,
            &Frequencies::default(),
            Some(1),
        ),
        Err(ResponseError::Configuration(ConfigurationError::UnusedDamping(_)))
    ));

    let restricted = Driver::new(
        &model,
        DriverOptionsBuilder::default()
            .states(Some(StateSet::from_indices(vec![5])))
            .build()
            .unwrap(),
    );
    assert!(matches!(
        restricted.evaluate(
            ResponseFunction::Polarizability,
            &DIPOLES_2,
            &Frequencies::new(vec![0.1]),
            None,
        ),
        Err(ResponseError::Configuration(ConfigurationError::StateOutOfRange { state: 5, .. }))
    ));
}
