// USAGE check_glider_netcdf [-s glider_DAC-2.0.json] file.nc

use anyhow::{Context, Result};
use clap::Parser;
use glider_netcdf::{read_dataset, validate, ValidationProfile};
use log::debug;
use std::{path::PathBuf, process::ExitCode};

/// Checks a NetCDF file against a Glider DAC profile. Prints each violation,
/// or PASS. The exit code is the number of violations, capped at 254; 255
/// means the file or profile could not be read.
#[derive(Parser, Debug)]
#[command(name = "check_glider_netcdf")]
struct Args {
    /// Profile JSON. Defaults to the bundled Glider DAC 2.0 profile.
    #[arg(long = "path-to-standard", short = 's')]
    standard: Option<PathBuf>,

    /// File to check.
    file: PathBuf,
}

const ERROR_EXIT: u8 = 255;

fn exit_code(violations: usize) -> u8 {
    violations.min(usize::from(ERROR_EXIT - 1)) as u8
}

fn run(args: &Args) -> Result<usize> {
    let profile = match &args.standard {
        Some(path) => ValidationProfile::load(path)?,
        None => ValidationProfile::dac_2_0()?,
    };
    let dataset = read_dataset(&args.file, false).with_context(|| format!("reading {}", args.file.display()))?;
    debug!(
        "{}: {} dimensions, {} variables",
        args.file.display(),
        dataset.dimensions.len(),
        dataset.variables.len()
    );

    let report = validate(&dataset, &profile);
    if report.is_success() {
        println!("PASS");
    }
    for violation in &report.violations {
        println!("{violation}");
    }
    Ok(report.error_count())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    match run(&args) {
        Ok(count) => ExitCode::from(exit_code(count)),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(ERROR_EXIT)
        }
    }
}
