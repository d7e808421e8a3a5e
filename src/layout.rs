//! Assembles the [`NcDataset`] for one output file from the configuration
//! and one profile's worth of accumulated data.

use crate::accumulator::{Column, TimeSeries};
use crate::config::GliderConfig;
use crate::dataset::{AttrValue, Attributes, NcDataset, NcType, VarData, Variable, FILL_F64};
use crate::datatypes::Datatype;
use crate::profiles::value_at;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::BTreeMap;

pub const TIME_UNITS: &str = "seconds since 1970-01-01 00:00:00 UTC";

pub const QC_FLAG_MEANINGS: &str = "no_qc_performed good_data probably_good_data \
    bad_data_that_are_potentially_correctable bad_data value_changed not_used not_used \
    interpolated_value missing_value";
pub const QC_NOT_PERFORMED: i8 = 0;
pub const QC_INTERPOLATED:  i8 = 8;
pub const QC_MISSING:       i8 = 9;

fn qc_flags() -> Vec<i8> {
    (0..=9).collect()
}

fn qc_attributes(standard_name: Option<&str>) -> Attributes {
    let mut attrs = Attributes::new();
    if let Some(std) = standard_name {
        attrs.insert("standard_name".into(), format!("{std} status_flag").into());
    }
    attrs.insert("flag_meanings".into(), QC_FLAG_MEANINGS.into());
    attrs.insert("valid_min".into(), AttrValue::Byte(0));
    attrs.insert("valid_max".into(), AttrValue::Byte(9));
    attrs.insert("flag_values".into(), AttrValue::Bytes(qc_flags()));
    attrs
}

/// ISO-8601 UTC, or `None` for a time chrono cannot represent.
pub fn iso8601(secs: f64) -> Option<String> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(whole as i64, nanos).map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Depth-averaged values on the `time_uv` dimension for one segment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UvValues {
    pub time:   Option<f64>,
    pub values: BTreeMap<String, f64>,
}

impl UvValues {
    /// Last valid value of every `time_uv` datatype in `series`.
    pub fn from_series(series: &TimeSeries, config: &GliderConfig) -> UvValues {
        let mut uv = UvValues::default();
        for (_, dt) in config.datatypes.iter().filter(|(_, dt)| dt.dimension == "time_uv") {
            let Some(col) = series.numeric(&dt.name) else { continue };
            if let Some(row) = col.iter().rposition(|&v| !series.is_fill(v)) {
                uv.values.insert(dt.name.clone(), col[row]);
                let t = series.time[row];
                uv.time = Some(uv.time.map_or(t, |prev: f64| prev.max(t)));
            }
        }
        uv
    }
}

/// Per-file identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileIds {
    pub segment_id: i16,
    pub profile_id: i16,
}

pub fn build_dataset(config: &GliderConfig, series: &TimeSeries, ids: FileIds, uv: &UvValues) -> NcDataset {
    let n = series.len();
    let mut ds = NcDataset::new();

    ds.add_dimension("time", n, true);
    ds.add_dimension("time_uv", 1, false);
    ds.add_dimension("trajectory", 1, false);

    // ---------------- time ----------------
    ds.add_variable(
        "time",
        Variable::new(NcType::Double, &["time"])
            .with_attr("axis", "T")
            .with_attr("calendar", "gregorian")
            .with_attr("units", TIME_UNITS)
            .with_attr("standard_name", "time")
            .with_attr("long_name", "Time")
            .with_attr("observation_type", "measured")
            .with_attr("sensor_name", " ")
            .with_data(VarData::Double(series.time.clone())),
    );
    let mut time_qc = Variable::new(NcType::Byte, &["time"])
        .with_default_fill()
        .with_attr("long_name", "time Quality Flag")
        .with_data(VarData::Byte(vec![QC_NOT_PERFORMED; n]));
    time_qc.attributes.extend(qc_attributes(Some("time")));
    ds.add_variable("time_qc", time_qc);

    ds.add_variable(
        "time_uv",
        Variable::new(NcType::Double, &["time_uv"])
            .with_attr("axis", "T")
            .with_attr("calendar", "gregorian")
            .with_attr("units", TIME_UNITS)
            .with_attr("standard_name", "time")
            .with_attr("long_name", "Approximate time midpoint of each segment")
            .with_attr("observation_type", "estimated")
            .with_data(VarData::Double(vec![uv.time.unwrap_or(FILL_F64)])),
    );

    // ---------------- identifiers ----------------
    ds.add_variable(
        "trajectory",
        Variable::new(NcType::Str, &["trajectory"])
            .with_attr("cf_role", "trajectory_id")
            .with_attr("long_name", "Unique identifier for each trajectory feature contained in the file")
            .with_attr("comment", "A trajectory can span multiple data files each containing a single segment.")
            .with_data(VarData::Text(vec![config.deployment.trajectory_id()])),
    );
    ds.add_variable(
        "segment_id",
        Variable::new(NcType::Short, &["trajectory"])
            .with_default_fill()
            .with_attr(
                "comment",
                "Sequential segment number within a trajectory/deployment. A segment corresponds to the set \
                 of data collected between 2 gps fixes obtained when the glider surfaces.",
            )
            .with_attr("long_name", "Segment ID")
            .with_attr("valid_min", AttrValue::Short(1))
            .with_attr("valid_max", AttrValue::Short(999))
            .with_attr("observation_type", "calculated")
            .with_data(VarData::Short(vec![ids.segment_id])),
    );
    ds.add_variable(
        "profile_id",
        Variable::new(NcType::Short, &["time"])
            .with_default_fill()
            .with_attr(
                "comment",
                "Sequential profile number within the current segment. A profile is defined as a single dive or climb",
            )
            .with_attr("long_name", "Profile ID")
            .with_attr("valid_min", AttrValue::Short(1))
            .with_attr("valid_max", AttrValue::Short(999))
            .with_attr("observation_type", "calculated")
            .with_data(VarData::Short(vec![ids.profile_id; n])),
    );

    add_profile_center(&mut ds, series);

    // ---------------- platform & instruments ----------------
    let mut platform = Variable::container();
    platform.attributes = config.deployment.platform.clone();
    ds.add_variable("platform", platform);
    for instrument in &config.instruments {
        let mut var = Variable::container();
        var.attributes = instrument.attrs.clone();
        ds.add_variable(&instrument.name, var);
    }

    // ---------------- configured datatypes ----------------
    let mut datatypes: Vec<&Datatype> = config.datatypes.iter().map(|(_, dt)| dt).collect();
    datatypes.sort_by(|a, b| a.name.cmp(&b.name));
    for dt in datatypes {
        if ds.variable(&dt.name).is_some() {
            continue;
        }
        match dt.dimension.as_str() {
            "time" => add_time_series(&mut ds, dt, series),
            "time_uv" => {
                if let Some(&value) = uv.values.get(&dt.name) {
                    let mut var = Variable::new(dt.nc_type, &["time_uv"])
                        .with_default_fill()
                        .with_data(VarData::from_f64(&[value], FILL_F64, dt.nc_type));
                    var.attributes.extend(dt.attrs.clone());
                    ds.add_variable(&dt.name, var);
                }
            }
            other => debug!("datatype {} on unsupported dimension `{other}` skipped", dt.name),
        }
    }

    // ---------------- global attributes ----------------
    ds.global_attributes = config.global_attributes.clone();
    for (key, value) in computed_global_attributes(series) {
        ds.global_attributes.insert(key, value);
    }

    ds
}

fn add_time_series(ds: &mut NcDataset, dt: &Datatype, series: &TimeSeries) {
    let Some(column) = series.columns.get(&dt.name) else { return };
    let (data, missing): (VarData, Vec<bool>) = match column {
        Column::Numeric(values) => (
            VarData::from_f64(values, series.fill, dt.nc_type),
            values.iter().map(|&v| series.is_fill(v)).collect(),
        ),
        Column::Text(values) => (
            VarData::Text(values.clone()),
            values.iter().map(String::is_empty).collect(),
        ),
    };

    let mut var = Variable::new(data.nc_type(), &["time"]).with_default_fill().with_data(data);
    var.attributes.extend(dt.attrs.clone());

    if let Some(flag_attrs) = &dt.status_flag {
        let qc_name = format!("{}_qc", dt.name);
        var.attributes.insert("ancillary_variables".into(), qc_name.clone().into());

        let flags = missing
            .iter()
            .enumerate()
            .map(|(row, &m)| match m {
                true => QC_MISSING,
                false if series.is_interpolated(&dt.name, row) => QC_INTERPOLATED,
                false => QC_NOT_PERFORMED,
            })
            .collect();
        let mut qc = Variable::new(NcType::Byte, &["time"]).with_default_fill().with_data(VarData::Byte(flags));
        qc.attributes.extend(flag_attrs.clone());
        qc.attributes.extend(qc_attributes(dt.attrs.get("standard_name").and_then(AttrValue::as_str)));
        ds.add_variable(&qc_name, qc);
    }

    ds.add_variable(&dt.name, var);
}

/// Scalar `profile_time`, `profile_lat` and `profile_lon` at the midpoint of
/// the profile's time span. Fill when the profile has no time or position.
fn add_profile_center(ds: &mut NcDataset, series: &TimeSeries) {
    let mid = match (series.time.first(), series.time.last()) {
        (Some(&first), Some(&last)) => Some((first + last) / 2.0),
        _ => None,
    };
    ds.add_variable(
        "profile_time",
        Variable::new(NcType::Double, &[])
            .with_default_fill()
            .with_attr("comment", "Timestamp corresponding to the mid-point of the profile")
            .with_attr("long_name", "Profile Center Time")
            .with_attr("observation_type", "calculated")
            .with_attr("platform", "platform")
            .with_attr("standard_name", "time")
            .with_attr("units", TIME_UNITS)
            .with_attr("calendar", "gregorian")
            .with_data(VarData::Double(vec![mid.unwrap_or(FILL_F64)])),
    );

    for (column, axis, units, limit) in [
        ("lat", "Latitude", "degrees_north", 90.0),
        ("lon", "Longitude", "degrees_east", 180.0),
    ] {
        let value = mid
            .zip(series.numeric(column))
            .and_then(|(t, values)| value_at(&series.time, values, t, series.fill));
        ds.add_variable(
            &format!("profile_{column}"),
            Variable::new(NcType::Double, &[])
                .with_default_fill()
                .with_attr(
                    "comment",
                    format!(
                        "Value is interpolated to provide an estimate of the {} at the mid-point of the profile",
                        axis.to_lowercase()
                    ),
                )
                .with_attr("long_name", format!("Profile Center {axis}"))
                .with_attr("observation_type", "calculated")
                .with_attr("platform", "platform")
                .with_attr("standard_name", axis.to_lowercase())
                .with_attr("units", units)
                .with_attr("valid_min", AttrValue::Double(-limit))
                .with_attr("valid_max", AttrValue::Double(limit))
                .with_data(VarData::Double(vec![value.unwrap_or(FILL_F64)])),
        );
    }
}

/// Attributes that differ per file.
fn computed_global_attributes(series: &TimeSeries) -> Attributes {
    let mut attrs = Attributes::new();
    if let Some(now) = iso8601(Utc::now().timestamp() as f64) {
        attrs.insert("date_created".into(), now.into());
    }
    if let (Some(&first), Some(&last)) = (series.time.first(), series.time.last()) {
        if let (Some(start), Some(end)) = (iso8601(first), iso8601(last)) {
            attrs.insert("time_coverage_start".into(), start.into());
            attrs.insert("time_coverage_end".into(), end.into());
        }
    }
    for (column, prefix) in [("lat", "geospatial_lat"), ("lon", "geospatial_lon")] {
        let Some(values) = series.numeric(column) else { continue };
        let valid = values.iter().copied().filter(|&v| !series.is_fill(v));
        let (lo, hi) = valid.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if lo <= hi {
            attrs.insert(format!("{prefix}_min"), AttrValue::Double(lo));
            attrs.insert(format!("{prefix}_max"), AttrValue::Double(hi));
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::RecordAccumulator;
    use crate::config::{Deployment, Instrument};
    use crate::datatypes::DatatypeMapper;
    use crate::record::Record;
    use std::path::PathBuf;

    fn datatype(name: &str, dimension: &str, flagged: bool) -> Datatype {
        let mut attrs = Attributes::new();
        attrs.insert("standard_name".into(), name.into());
        attrs.insert("units".into(), "1".into());
        Datatype {
            name: name.into(),
            nc_type: NcType::Double,
            dimension: dimension.into(),
            attrs,
            status_flag: flagged.then(Attributes::new),
        }
    }

    fn config() -> GliderConfig {
        let mut platform = Attributes::new();
        platform.insert("wmo_id".into(), AttrValue::Int(4801516));
        let mut global = Attributes::new();
        global.insert("title".into(), "bass".into());
        global.insert("date_created".into(), "stale".into());
        GliderConfig {
            config_dir:        PathBuf::from("cfg"),
            global_attributes: global,
            deployment:        Deployment {
                glider:            "usf-bass".into(),
                trajectory_date:   "20140301T0000".into(),
                global_attributes: Attributes::new(),
                platform,
            },
            instruments:       vec![Instrument { name: "instrument_ctd".into(), attrs: Attributes::new() }],
            datatypes:         DatatypeMapper::from_entries([
                ("m_depth-m".to_string(), datatype("depth", "time", true)),
                ("m_lat-lat".to_string(), datatype("lat", "time", false)),
                ("m_water_vx-m/s".to_string(), datatype("u", "time_uv", false)),
                ("sci_water_temp-degC".to_string(), datatype("temperature", "time", false)),
            ]),
        }
    }

    fn series(cfg: &GliderConfig) -> TimeSeries {
        let mut acc = RecordAccumulator::new(FILL_F64);
        for r in [
            Record::new(100.0, "m_depth-m", 1.0),
            Record::new(100.0, "m_lat-lat", 27.5),
            Record::new(101.0, "m_depth-m", 2.0),
            Record::new(102.0, "m_water_vx-m/s", 0.25),
            Record::new(102.0, "m_lat-lat", 27.7),
        ] {
            acc.insert_mapped(r, &cfg.datatypes).unwrap();
        }
        acc.finalize().unwrap()
    }

    #[test]
    fn builds_glider_layout() {
        let cfg = config();
        let ts = series(&cfg);
        let uv = UvValues::from_series(&ts, &cfg);
        assert_eq!(uv.time, Some(102.0));
        assert_eq!(uv.values["u"], 0.25);

        let ds = build_dataset(&cfg, &ts, FileIds { segment_id: 3, profile_id: 4 }, &uv);
        assert_eq!(ds.dimension("time").unwrap().len, 3);
        for name in ["time", "time_qc", "time_uv", "trajectory", "segment_id", "profile_id", "platform",
                     "instrument_ctd", "depth", "depth_qc", "lat", "u"] {
            assert!(ds.variable(name).is_some(), "missing {name}");
        }
        // configured but never reported
        assert!(ds.variable("temperature").is_none());

        assert_eq!(ds.variables["depth_qc"].data, VarData::Byte(vec![0, 0, QC_MISSING]));
        assert_eq!(
            ds.variables["depth"].attributes["ancillary_variables"],
            AttrValue::from("depth_qc")
        );
        assert_eq!(ds.variables["profile_id"].data, VarData::Short(vec![4, 4, 4]));
        assert_eq!(ds.variables["trajectory"].data, VarData::Text(vec!["usf-bass-20140301T0000".into()]));
        assert_eq!(ds.variables["platform"].attributes["wmo_id"], AttrValue::Int(4801516));

        // profile center: midpoint of 100..102, lat between the two fixes
        assert_eq!(ds.variables["profile_time"].data, VarData::Double(vec![101.0]));
        assert!(ds.variables["profile_time"].dimensions.is_empty());
        match &ds.variables["profile_lat"].data {
            VarData::Double(v) => assert!((v[0] - 27.6).abs() < 1e-9),
            other => panic!("profile_lat is not f64: {other:?}"),
        }
        assert_eq!(ds.variables["profile_lat"].attributes["units"], AttrValue::from("degrees_north"));
        assert_eq!(ds.variables["profile_lat"].attributes["standard_name"], AttrValue::from("latitude"));
        assert_eq!(ds.variables["profile_time"].attributes["units"], AttrValue::from(TIME_UNITS));
        // no lon column at all
        assert_eq!(ds.variables["profile_lon"].data, VarData::Double(vec![FILL_F64]));
        assert_eq!(ds.variables["profile_lon"].attributes["valid_max"], AttrValue::Double(180.0));
    }

    #[test]
    fn interpolated_cells_are_flagged() {
        let mut cfg = config();
        cfg.datatypes = DatatypeMapper::from_entries([
            ("m_depth-m".to_string(), datatype("depth", "time", false)),
            ("m_lat-lat".to_string(), datatype("lat", "time", true)),
        ]);
        let mut ts = series(&cfg);
        let lat = ts.numeric_mut("lat").unwrap();
        lat[1] = 27.6;
        ts.interpolated.insert("lat".into(), vec![false, true, false]);

        let ds = build_dataset(&cfg, &ts, FileIds { segment_id: 1, profile_id: 1 }, &UvValues::default());
        assert_eq!(
            ds.variables["lat_qc"].data,
            VarData::Byte(vec![QC_NOT_PERFORMED, QC_INTERPOLATED, QC_NOT_PERFORMED])
        );
    }

    #[test]
    fn computed_attributes_override_config() {
        let cfg = config();
        let ts = series(&cfg);
        let ds = build_dataset(&cfg, &ts, FileIds { segment_id: 1, profile_id: 1 }, &UvValues::default());
        assert_ne!(ds.global_attributes["date_created"], AttrValue::from("stale"));
        assert_eq!(ds.global_attributes["title"], AttrValue::from("bass"));
        assert_eq!(ds.global_attributes["time_coverage_start"], AttrValue::from("1970-01-01T00:01:40Z"));
        assert_eq!(ds.global_attributes["geospatial_lat_min"], AttrValue::Double(27.5));
        assert_eq!(ds.global_attributes["geospatial_lat_max"], AttrValue::Double(27.7));
        // no uv data in this file
        assert!(ds.variable("u").is_none());
        assert_eq!(ds.variables["time_uv"].data, VarData::Double(vec![FILL_F64]));
    }

    #[test]
    fn iso8601_formats_utc() {
        assert_eq!(iso8601(1393778994.5).as_deref(), Some("2014-03-02T16:49:54Z"));
    }
}
