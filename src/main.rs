// USAGE create_glider_netcdf usf-bass ./config ./out -f 'sbd/*.dba' -s 'tbd/*.dba'

use anyhow::{bail, Context, Result};
use clap::Parser;
use glider_netcdf::{
    convert::{check_pairing, create_netcdf, timeit, CreateOptions, DEFAULT_DEPTH_FIELD, DEFAULT_GPS_PREFIX},
    read_dataset,
    reader::{expand_paths, read_all},
    validate, GliderConfig, Mode, ValidationProfile,
};
use log::{info, warn};
use std::path::PathBuf;

/// Converts glider flight and science dumps into Glider DAC NetCDF files,
/// one file per profile.
#[derive(Parser, Debug)]
#[command(name = "create_glider_netcdf")]
struct Args {
    /// Glider name; selects `<config_dir>/<glider>/`.
    glider: String,

    /// Directory holding `global_attributes.json`, `datatypes.json` and one
    /// directory per glider.
    config_dir: PathBuf,

    /// Output directory, or the output file with `--single`.
    output: PathBuf,

    /// Flight `.dba` files. Glob patterns are expanded.
    #[arg(long, short)]
    flight: Vec<String>,

    /// Science `.dba` files. Glob patterns are expanded.
    #[arg(long, short)]
    science: Vec<String>,

    /// `rt` or `delayed`. Defaults to the mode of the source files.
    #[arg(long, short)]
    mode: Option<Mode>,

    /// Segment number. Defaults to the one in the source file name.
    #[arg(long)]
    segment_id: Option<i16>,

    /// Time sensor for every file, instead of the flight/science defaults.
    #[arg(long, short)]
    time: Option<String>,

    /// Field used to split profiles.
    #[arg(long, short, default_value = DEFAULT_DEPTH_FIELD)]
    depth: String,

    /// Prefix of the GPS lat/lon fields.
    #[arg(long, short, default_value = DEFAULT_GPS_PREFIX)]
    gps_prefix: String,

    /// Write one file with every row instead of one per profile.
    #[arg(long)]
    single: bool,

    /// Check each written file against the bundled DAC profile.
    #[arg(long)]
    check: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let flight = expand_paths(&args.flight)?;
    let science = expand_paths(&args.science)?;
    check_pairing(&flight, &science)?;

    let config = GliderConfig::load(&args.config_dir, &args.glider)
        .with_context(|| format!("loading configuration for {}", args.glider))?;
    if config.datatypes.is_empty() {
        bail!("{} maps no datatypes", args.config_dir.display());
    }

    let (flight, science) = timeit("read_dba", || -> Result<_> {
        Ok((read_all(&flight)?, read_all(&science)?))
    })?;

    let mut opts = CreateOptions::new(&args.glider, &args.output);
    opts.mode = args.mode;
    opts.segment_id = args.segment_id;
    opts.time_sensor = args.time;
    opts.depth_field = args.depth;
    opts.gps_prefix = args.gps_prefix;
    opts.single = args.single;

    let written = create_netcdf(&config, &flight, &science, &opts).context("creating NetCDF files")?;
    info!("{} files written", written.len());

    if args.check {
        let profile = ValidationProfile::dac_2_0()?;
        for path in &written {
            let report = validate(&read_dataset(path, false)?, &profile);
            for violation in &report.violations {
                warn!("{}: {violation}", path.display());
            }
        }
    }
    Ok(())
}
