use crate::driver::{Driver, Evaluation};
use crate::evaluation::logging::print_tensor;
use crate::io::{print_averages, read_input, write_footer, write_header, write_tensor, Configuration};
use crate::symbolic::OperatorKind;
use crate::utils::Timer;
use anyhow::Result;
use clap::{App, Arg};
use env_logger::Builder;
use log::LevelFilter;
use responsefun_backend::{AdcBackend, ModelSystem};
use std::io::Write;
use std::process;

mod constants;
mod defaults;
mod driver;
mod errors;
mod evaluation;
mod io;
mod symbolic;
mod symmetrization;
mod utils;

#[macro_use]
extern crate clap;

/// Elements below this absolute value are not printed.
const PRINT_THRESHOLD: f64 = 1.0e-10;

fn main() {
    // Input.
    let matches = App::new(crate_name!())
        .version(crate_version!())
        .about("sum-over-states response functions for ADC")
        .arg(
            Arg::new("model-File")
                .about("Sets the model system (toml or json) to use")
                .required(true)
                .index(1),
        )
        .get_matches();
    // The model system is the only mandatory file to start a calculation.
    let model_file: &str = matches.value_of("model-File").unwrap_or_default();
    // The logger is configured from the input, so errors go to stderr directly.
    if let Err(err) = run(model_file) {
        eprintln!("Error: {:?}", err);
        process::exit(1);
    }
}

fn run(model_file: &str) -> Result<()> {
    let (model, config): (ModelSystem, Configuration) = read_input(model_file)?;

    // Multithreading.
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.parallelization.number_of_cores)
        .build_global()?;

    // Logging.
    // The log level is set.
    let log_level: LevelFilter = match config.verbose {
        2 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        0 => LevelFilter::Info,
        -1 => LevelFilter::Warn,
        -2 => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    // and the logger is build.
    Builder::new()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .filter(None, log_level)
        .init();

    // The program header is written to the command line.
    write_header();
    // and the total wall-time timer is started.
    let timer: Timer = Timer::start();

    // Computations.
    // ................................................................
    let operators: Vec<OperatorKind> = config.operator_kinds();
    let driver = Driver::new(&model, config.driver_options());
    let result: Evaluation = driver.evaluate_with(
        config.strategy,
        config.property,
        &operators,
        &config.frequencies(),
        config.final_state,
    )?;
    print_tensor(config.property.name(), &result.tensor, PRINT_THRESHOLD);
    let final_energy: Option<f64> = config
        .final_state
        .map(|f| model.excitation_energies()[f]);
    print_averages(config.property, &operators, &result, final_energy)?;
    if config.output.write_npy {
        write_tensor(&config.output.prefix, &result.tensor)?;
    }
    // ................................................................

    // Finished.
    // The total wall-time is printed together with the end statement.
    write_footer(timer);
    Ok(())
}
