//! The create pipeline: dumps in, one NetCDF file per profile out.

use crate::accumulator::{Column, RecordAccumulator, TimeSeries};
use crate::config::GliderConfig;
use crate::dataset::FILL_F64;
use crate::error::{GliderError, Result};
use crate::layout::{build_dataset, FileIds, UvValues};
use crate::profiles::{interpolate_gps, split_profiles, ProfileParams};
use crate::reader::{merged_records, source_filename, DbaFile, GliderFilename, Mode};
use crate::writer::write_dataset;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::{
    ops::Range,
    path::{Path, PathBuf},
    time::Instant,
};

pub const DEFAULT_DEPTH_FIELD: &str = "m_depth-m";
pub const DEFAULT_GPS_PREFIX:  &str = "m_gps_";

// ─────────────────────────────────────────────────────────────────────
// Simple timing helper
// ─────────────────────────────────────────────────────────────────────
pub fn timeit<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let t0 = Instant::now();
    let out = f();
    debug!("{label:<20}{:?}", t0.elapsed());
    out
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub glider:      String,
    pub output:      PathBuf,
    pub mode:        Option<Mode>,
    pub segment_id:  Option<i16>,
    pub time_sensor: Option<String>,
    pub depth_field: String,
    pub gps_prefix:  String,
    /// Write everything to `output` as one file instead of one per profile.
    pub single:      bool,
    pub profiles:    ProfileParams,
}

impl CreateOptions {
    pub fn new(glider: &str, output: &Path) -> CreateOptions {
        CreateOptions {
            glider:      glider.to_string(),
            output:      output.to_path_buf(),
            mode:        None,
            segment_id:  None,
            time_sensor: None,
            depth_field: DEFAULT_DEPTH_FIELD.to_string(),
            gps_prefix:  DEFAULT_GPS_PREFIX.to_string(),
            single:      false,
            profiles:    ProfileParams::default(),
        }
    }
}

/// Flight and science dumps of the same segment must share a base name,
/// e.g. `usf-bass-2014-061-1-0_sbd.dba` and `usf-bass-2014-061-1-0_tbd.dba`.
pub fn check_pairing(flight: &[PathBuf], science: &[PathBuf]) -> Result<()> {
    if flight.is_empty() && science.is_empty() {
        return Err(GliderError::data("no flight or science files given"));
    }
    if flight.is_empty() || science.is_empty() {
        return Ok(());
    }
    if flight.len() != science.len() {
        return Err(GliderError::data(format!(
            "{} flight files but {} science files",
            flight.len(),
            science.len()
        )));
    }
    for (f, s) in flight.iter().zip(science) {
        let (fb, sb) = (base_name(f), base_name(s));
        if fb != sb {
            return Err(GliderError::data(format!(
                "flight file {} does not match science file {}",
                f.display(),
                s.display()
            )));
        }
    }
    Ok(())
}

// name without directory and anything after the first `.` or `_`
fn base_name(path: &Path) -> String {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    name.split(['.', '_']).next().unwrap_or_default().to_string()
}

/// `usf-bass_20140302T164954Z_rt.nc`
pub fn output_file_name(glider: &str, begin: f64, mode: Mode) -> String {
    let stamp = DateTime::<Utc>::from_timestamp(begin.floor() as i64, 0)
        .map(|t| t.format("%Y%m%dT%H%M%SZ").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{glider}_{stamp}_{}.nc", mode.as_str())
}

/// Source file name of the first dump that carries one, falling back to
/// the dump's own path.
fn detect_source(files: &[&DbaFile]) -> Option<GliderFilename> {
    files
        .iter()
        .find_map(|d| source_filename(d))
        .or_else(|| files.iter().find_map(|d| GliderFilename::parse(&d.path).ok()))
}

/// Reads, maps and accumulates all records; the result has GPS fixes
/// interpolated onto every row.
pub fn accumulate(
    config: &GliderConfig,
    flight: &[DbaFile],
    science: &[DbaFile],
    opts: &CreateOptions,
) -> Result<TimeSeries> {
    let records = merged_records(flight, science, opts.time_sensor.as_deref())?;
    let total = records.len();

    let mut acc = RecordAccumulator::new(FILL_F64);
    let mut dropped = 0usize;
    for record in records {
        if !acc.insert_mapped(record, &config.datatypes)? {
            dropped += 1;
        }
    }
    debug!("{total} records, {dropped} unmapped, {} rows", acc.len());
    if acc.is_empty() {
        return Err(GliderError::data("no record maps to a configured datatype"));
    }
    let mut series = acc.finalize()?;

    let lat = config.datatypes.lookup(&format!("{}lat-lat", opts.gps_prefix)).map(|d| d.name.clone());
    let lon = config.datatypes.lookup(&format!("{}lon-lon", opts.gps_prefix)).map(|d| d.name.clone());
    if let (Some(lat), Some(lon)) = (lat, lon) {
        fill_positions(&mut series, &lat, &lon);
    }
    Ok(series)
}

/// Interpolates GPS onto every row and records which cells were filled in.
fn fill_positions(series: &mut TimeSeries, lat: &str, lon: &str) {
    let (Some(mut lat_col), Some(mut lon_col)) = (
        series.numeric(lat).map(<[f64]>::to_vec),
        series.numeric(lon).map(<[f64]>::to_vec),
    ) else {
        return;
    };
    let missing: Vec<bool> = lat_col
        .iter()
        .zip(&lon_col)
        .map(|(&la, &lo)| series.is_fill(la) || series.is_fill(lo))
        .collect();
    interpolate_gps(&series.time, &mut lat_col, &mut lon_col, series.fill);

    for (name, col) in [(lat, lat_col), (lon, lon_col)] {
        let filled: Vec<bool> = missing
            .iter()
            .zip(&col)
            .map(|(&was, &now)| was && !series.is_fill(now))
            .collect();
        series.interpolated.insert(name.to_string(), filled);
        series.columns.insert(name.to_string(), Column::Numeric(col));
    }
}

/// Row ranges for the output files.
pub fn profile_ranges(config: &GliderConfig, series: &TimeSeries, opts: &CreateOptions) -> Vec<Range<usize>> {
    if opts.single {
        return vec![0..series.len()];
    }
    let depth = config.datatypes.lookup(&opts.depth_field).and_then(|d| series.numeric(&d.name));
    match depth {
        Some(depth) => split_profiles(depth, series.fill, &opts.profiles),
        None => {
            warn!("no `{}` data, writing a single profile", opts.depth_field);
            vec![0..series.len()]
        }
    }
}

/// Runs the whole pipeline and returns the paths written.
pub fn create_netcdf(
    config: &GliderConfig,
    flight: &[DbaFile],
    science: &[DbaFile],
    opts: &CreateOptions,
) -> Result<Vec<PathBuf>> {
    let all: Vec<&DbaFile> = flight.iter().chain(science).collect();
    let source = detect_source(&all);

    let mode = opts
        .mode
        .or_else(|| all.iter().find_map(|d| d.mode()))
        .or_else(|| source.as_ref().and_then(GliderFilename::mode))
        .unwrap_or(Mode::Delayed);
    let segment_id = match opts.segment_id {
        Some(id) => id,
        None => source
            .as_ref()
            .and_then(|s| i16::try_from(s.segment).ok())
            .unwrap_or(1),
    };

    let series = timeit("accumulate", || accumulate(config, flight, science, opts))?;
    let uv = UvValues::from_series(&series, config);
    let ranges = profile_ranges(config, &series, opts);
    info!("{} rows in {} profiles ({})", series.len(), ranges.len(), mode.as_str());

    if !opts.single {
        std::fs::create_dir_all(&opts.output)?;
    }

    let mut written = Vec::with_capacity(ranges.len());
    for (i, range) in ranges.into_iter().enumerate() {
        let profile = series.slice(range);
        let profile_id = i16::try_from(i + 1)
            .map_err(|_| GliderError::data(format!("too many profiles ({})", i + 1)))?;
        let ds = build_dataset(config, &profile, FileIds { segment_id, profile_id }, &uv);

        let path = if opts.single {
            opts.output.clone()
        } else {
            let begin = profile.time.first().copied().unwrap_or_default();
            opts.output.join(output_file_name(&opts.glider, begin, mode))
        };
        timeit("write_dataset", || write_dataset(&path, &ds))?;
        info!("wrote {} ({} rows)", path.display(), profile.len());
        written.push(path);
    }
    Ok(written)
}
