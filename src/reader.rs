//! Reading of `dbd2asc` ASCII dumps (`.dba`) of glider flight and science
//! files, and of Slocum file names.
//!
//! A dump starts with `num_ascii_tags` lines of `key: value` tags, followed
//! by `num_label_lines` label lines (sensor names, units, byte widths) and
//! then one space-separated row per cycle. `NaN` cells are sensors that did
//! not report on that cycle and produce no record.

use crate::error::{GliderError, Result};
use crate::record::{Record, Value};
use glob::glob;
use log::{debug, warn};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

pub const FLIGHT_TIME_SENSOR:  &str = "m_present_time";
pub const SCIENCE_TIME_SENSOR: &str = "sci_m_present_time";

const DEFAULT_LABEL_LINES: usize = 3;

// ─────────────────────────────────────────────────────────────────────
// File names
// ─────────────────────────────────────────────────────────────────────

/// Real-time vs delayed-mode data, decided by the binary file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    RealTime,
    Delayed,
}

impl Mode {
    pub fn from_extension(ext: &str) -> Option<Mode> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "sbd" | "tbd" | "mbd" | "nbd" => Some(Mode::RealTime),
            "dbd" | "ebd" => Some(Mode::Delayed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::RealTime => "rt",
            Mode::Delayed => "delayed",
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Mode, String> {
        match s {
            "rt" => Ok(Mode::RealTime),
            "delayed" => Ok(Mode::Delayed),
            other => Err(format!("unknown mode `{other}`, expected `rt` or `delayed`")),
        }
    }
}

/// Parts of a Slocum file name such as `usf-bass-2014-061-1-0.sbd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GliderFilename {
    pub glider:    String,
    pub year:      u16,
    pub day:       u16,
    pub mission:   u32,
    pub segment:   u32,
    pub extension: String,
}

impl GliderFilename {
    pub fn parse(path: &Path) -> Result<GliderFilename> {
        let bad = |why: &str| GliderError::Input {
            path:    path.to_path_buf(),
            line:    0,
            message: format!("not a glider file name ({why})"),
        };
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| bad("no file stem"))?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string();

        // glider names may contain dashes, the trailing four parts may not
        let parts: Vec<_> = stem.rsplitn(5, '-').collect();
        if parts.len() != 5 {
            return Err(bad("expected <glider>-<year>-<day>-<mission>-<segment>"));
        }
        Ok(GliderFilename {
            glider:  parts[4].to_string(),
            year:    parts[3].parse().map_err(|_| bad("bad year"))?,
            day:     parts[2].parse().map_err(|_| bad("bad day"))?,
            mission: parts[1].parse().map_err(|_| bad("bad mission"))?,
            segment: parts[0].parse().map_err(|_| bad("bad segment"))?,
            extension,
        })
    }

    /// Mode implied by the extension. ASCII dumps carry the binary
    /// file's extension in their `filename_extension` tag instead.
    pub fn mode(&self) -> Option<Mode> {
        Mode::from_extension(&self.extension)
    }
}

/// Expands each argument as a glob pattern; arguments matching nothing are
/// kept verbatim so a later open reports the missing file.
pub fn expand_paths(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for pattern in patterns {
        let mut matched: Vec<PathBuf> = glob(pattern)
            .map_err(|e| GliderError::Input {
                path:    PathBuf::from(pattern),
                line:    0,
                message: e.to_string(),
            })?
            .filter_map(std::result::Result::ok)
            .collect();
        if matched.is_empty() {
            out.push(PathBuf::from(pattern));
        } else {
            matched.sort();
            out.append(&mut matched);
        }
    }
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────
// .dba files
// ─────────────────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub name:  String,
    pub units: String,
    pub bytes: u8,
}

impl Sensor {
    /// Field name used in records and in `datatypes.json`: `<name>-<units>`.
    pub fn field_name(&self) -> String {
        format!("{}-{}", self.name, self.units)
    }
}

#[derive(Debug, Clone)]
pub struct DbaFile {
    pub path:    PathBuf,
    pub tags:    BTreeMap<String, String>,
    pub sensors: Vec<Sensor>,
    pub rows:    Vec<Vec<f64>>,
}

impl DbaFile {
    pub fn read(path: &Path) -> Result<DbaFile> {
        let content = fs::read_to_string(path)?;
        DbaFile::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<DbaFile> {
        let err = |line: usize, message: String| GliderError::Input {
            path: path.to_path_buf(),
            line: line as u64,
            message,
        };
        let lines: Vec<&str> = content.lines().collect();

        // ---------------- tags ----------------
        let mut tags = BTreeMap::new();
        let mut idx = 0;
        let mut tag_count: Option<usize> = None;
        while tag_count.map_or(true, |n| idx < n) {
            let line = lines.get(idx).ok_or_else(|| err(idx + 1, "truncated header".into()))?;
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| err(idx + 1, format!("expected `key: value`, got `{line}`")))?;
            let (key, value) = (key.trim().to_string(), value.trim().to_string());
            if key == "num_ascii_tags" {
                tag_count = Some(value.parse().map_err(|_| err(idx + 1, "bad num_ascii_tags".into()))?);
            }
            tags.insert(key, value);
            idx += 1;
        }

        // ---------------- labels ----------------
        let label_lines = match tags.get("num_label_lines") {
            Some(v) => v.parse().map_err(|_| err(0, "bad num_label_lines".into()))?,
            None => DEFAULT_LABEL_LINES,
        };
        if label_lines < 2 || lines.len() < idx + label_lines {
            return Err(err(idx + 1, "missing sensor label lines".into()));
        }
        let names: Vec<_> = lines[idx].split_whitespace().collect();
        let units: Vec<_> = lines[idx + 1].split_whitespace().collect();
        let bytes: Vec<_> = if label_lines > 2 {
            lines[idx + 2].split_whitespace().collect()
        } else {
            Vec::new()
        };
        if names.len() != units.len() {
            return Err(err(idx + 2, format!("{} sensors but {} units", names.len(), units.len())));
        }
        let sensors: Vec<Sensor> = names
            .iter()
            .zip(&units)
            .enumerate()
            .map(|(i, (n, u))| Sensor {
                name:  n.to_string(),
                units: u.to_string(),
                bytes: bytes.get(i).and_then(|b| b.parse().ok()).unwrap_or(8),
            })
            .collect();
        let first_data_line = idx + label_lines;

        // ---------------- rows ----------------
        let blob = lines[first_data_line..].join("\n");
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(b' ')
            .from_reader(blob.as_bytes());

        let mut rows = Vec::new();
        for (r, result) in rdr.records().enumerate() {
            let rec = result?;
            let line = first_data_line + r + 1;
            let cells: Vec<&str> = rec.iter().filter(|f| !f.is_empty()).collect();
            if cells.is_empty() {
                continue;
            }
            if cells.len() != sensors.len() {
                return Err(err(line, format!("expected {} values, got {}", sensors.len(), cells.len())));
            }
            let row = cells
                .iter()
                .map(|c| c.parse::<f64>().map_err(|e| err(line, format!("`{c}`: {e}"))))
                .collect::<Result<Vec<_>>>()?;
            rows.push(row);
        }

        debug!("{}: {} sensors, {} rows", path.display(), sensors.len(), rows.len());
        Ok(DbaFile { path: path.to_path_buf(), tags, sensors, rows })
    }

    pub fn sensor_index(&self, name: &str) -> Option<usize> {
        self.sensors.iter().position(|s| s.name == name)
    }

    /// Mode from the `filename_extension` tag (the binary file's extension).
    pub fn mode(&self) -> Option<Mode> {
        self.tags.get("filename_extension").and_then(|e| Mode::from_extension(e))
    }

    /// One record per non-NaN cell, stamped with the value of `time_sensor`.
    /// Rows without a time value are skipped.
    pub fn records(&self, time_sensor: &str) -> Result<Vec<Record>> {
        let t_idx = self.sensor_index(time_sensor).ok_or_else(|| GliderError::Input {
            path:    self.path.clone(),
            line:    0,
            message: format!("no `{time_sensor}` column"),
        })?;
        let fields: Vec<String> = self.sensors.iter().map(Sensor::field_name).collect();
        let nmea: Vec<bool> = self.sensors.iter().map(|s| matches!(s.units.as_str(), "lat" | "lon")).collect();

        let mut out = Vec::new();
        let mut skipped = 0usize;
        for row in &self.rows {
            let t = row[t_idx];
            if !t.is_finite() {
                skipped += 1;
                continue;
            }
            for (i, &v) in row.iter().enumerate() {
                if i == t_idx || v.is_nan() {
                    continue;
                }
                let v = if nmea[i] { nmea_to_decimal(v) } else { v };
                out.push(Record { timestamp: t, field: fields[i].clone(), value: Value::Number(v) });
            }
        }
        if skipped > 0 {
            warn!("{}: skipped {skipped} rows without {time_sensor}", self.path.display());
        }
        Ok(out)
    }
}

/// `DDMM.MMMM` (sensors with `lat`/`lon` units) to decimal degrees.
pub fn nmea_to_decimal(v: f64) -> f64 {
    let degrees = (v / 100.0).trunc();
    degrees + (v - degrees * 100.0) / 60.0
}

pub fn read_all(paths: &[PathBuf]) -> Result<Vec<DbaFile>> {
    paths.iter().map(|p| DbaFile::read(p)).collect()
}

/// All records of the flight and science dumps as one stream.
/// `time_sensor` overrides the per-file default time column.
pub fn merged_records(flight: &[DbaFile], science: &[DbaFile], time_sensor: Option<&str>) -> Result<Vec<Record>> {
    let mut out = Vec::new();
    for (files, default_time) in [(flight, FLIGHT_TIME_SENSOR), (science, SCIENCE_TIME_SENSOR)] {
        for dba in files {
            out.extend(dba.records(time_sensor.unwrap_or(default_time))?);
        }
    }
    Ok(out)
}

/// Glider file name recorded in a dump's `filename` tag.
pub fn source_filename(dba: &DbaFile) -> Option<GliderFilename> {
    let name = dba.tags.get("filename")?;
    let mut parsed = GliderFilename::parse(Path::new(name)).ok()?;
    if let Some(ext) = dba.tags.get("filename_extension") {
        parsed.extension = ext.clone();
    }
    Some(parsed)
}
