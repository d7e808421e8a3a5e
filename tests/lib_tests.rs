use glider_netcdf::convert::{check_pairing, create_netcdf, CreateOptions};
use glider_netcdf::dataset::FILL_F64;
use glider_netcdf::reader::{expand_paths, read_all};
use glider_netcdf::validate::Category;
use glider_netcdf::*;
use std::path::{Path, PathBuf};

const CONFIG: &str = "tests/data/config";
const FLIGHT: &str = "tests/data/dba/usf-bass-2014-061-1-0_sbd.dba";
const SCIENCE: &str = "tests/data/dba/usf-bass-2014-061-1-0_tbd.dba";

fn config() -> GliderConfig {
    GliderConfig::load(Path::new(CONFIG), "usf-bass").unwrap()
}

fn dumps() -> (Vec<DbaFile>, Vec<DbaFile>) {
    (
        read_all(&[PathBuf::from(FLIGHT)]).unwrap(),
        read_all(&[PathBuf::from(SCIENCE)]).unwrap(),
    )
}

fn doubles(ds: &NcDataset, name: &str) -> Vec<f64> {
    match &ds.variables[name].data {
        VarData::Double(v) => v.clone(),
        other => panic!("{name} is not f64: {other:?}"),
    }
}

#[test]
fn test_load_config() {
    let cfg = config();
    assert_eq!(cfg.deployment.trajectory_id(), "usf-bass-20140301T0000");
    // deployment overrides the institution-wide blank
    assert_eq!(
        cfg.global_attributes["metadata_link"],
        AttrValue::from("http://gliders.ioos.us/usf-bass")
    );
    assert_eq!(cfg.global_attributes["wmo_id"], AttrValue::Int(4801516));
    assert_eq!(cfg.instruments.len(), 1);
    assert_eq!(cfg.instruments[0].name, "instrument_ctd");

    // dimension and placeholder entries are not output variables
    assert_eq!(cfg.datatypes.len(), 8);
    assert!(cfg.datatypes.lookup("m_present_time-timestamp").is_none());
    assert!(cfg.datatypes.lookup("m_battery-volts").is_none());
    assert_eq!(cfg.datatypes.lookup("m_depth-m").map(|d| d.name.as_str()), Some("depth"));
    assert_eq!(
        cfg.datatypes.lookup("sci_water_pressure-bar").map(|d| d.nc_type),
        Some(NcType::Float)
    );
}

#[test]
fn test_missing_glider_config() {
    let err = GliderConfig::load(Path::new(CONFIG), "ru05").unwrap_err();
    assert!(matches!(err, GliderError::Config { .. }), "{err}");
    assert!(err.to_string().contains("deployment.json"));
}

#[test]
fn test_lookup_is_stable() {
    let cfg = config();
    let a = cfg.datatypes.lookup("sci_water_temp-degc").cloned();
    let b = cfg.datatypes.lookup("sci_water_temp-degc").cloned();
    assert_eq!(a, b);
    assert_eq!(a.unwrap().units(), Some("Celsius"));
}

#[test]
fn test_expand_and_pair_fixtures() {
    let flight = expand_paths(&["tests/data/dba/*_sbd.dba".to_string()]).unwrap();
    let science = expand_paths(&["tests/data/dba/*_tbd.dba".to_string()]).unwrap();
    assert_eq!(flight, vec![PathBuf::from(FLIGHT)]);
    assert!(check_pairing(&flight, &science).is_ok());

    // unmatched patterns come back verbatim so opening them fails loudly
    let missing = expand_paths(&["tests/data/dba/nothing-*.dba".to_string()]).unwrap();
    assert_eq!(missing, vec![PathBuf::from("tests/data/dba/nothing-*.dba")]);
    assert!(read_all(&missing).is_err());
}

#[test]
fn test_create_one_file_per_profile() {
    let cfg = config();
    let (flight, science) = dumps();
    let out = tempfile::tempdir().unwrap();
    let opts = CreateOptions::new("usf-bass", out.path());

    let written = create_netcdf(&cfg, &flight, &science, &opts).unwrap();
    let names: Vec<_> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["usf-bass_20140302T164950Z_rt.nc", "usf-bass_20140302T165040Z_rt.nc"]);

    // ---------------- first profile: the dive ----------------
    let ds = read_dataset(&written[0], true).unwrap();
    let time = ds.dimension("time").unwrap();
    assert!(time.unlimited);
    assert_eq!(time.len, 5);
    assert_eq!(ds.dimension("time_uv").unwrap().len, 1);
    assert_eq!(ds.dimension("trajectory").unwrap().len, 1);

    assert_eq!(doubles(&ds, "time"), [1393778990.0, 1393779000.0, 1393779010.0, 1393779020.0, 1393779030.0]);
    assert_eq!(doubles(&ds, "depth"), [0.0, 5.0, 10.0, 15.0, 20.0]);
    assert_eq!(ds.variables["depth_qc"].data, VarData::Byte(vec![0; 5]));

    // science starts one cycle late
    let temp = doubles(&ds, "temperature");
    assert_eq!(temp[0], FILL_F64);
    assert_eq!(&temp[1..], [22.5, 22.1, 21.7, 21.2]);
    assert_eq!(ds.variables["temperature_qc"].data, VarData::Byte(vec![9, 0, 0, 0, 0]));
    match &ds.variables["pressure"].data {
        VarData::Float(p) => assert!((p[4] - 2.0).abs() < 1e-6),
        other => panic!("pressure is not f32: {other:?}"),
    }

    // GPS fixes at both surfacings, interpolated in between
    let lat = doubles(&ds, "lat");
    assert!((lat[0] - 27.971_666_67).abs() < 1e-6);
    assert!((lat[4] - 27.9725).abs() < 1e-6);
    let lon = doubles(&ds, "lon");
    assert!((lon[4] + 82.790_833_33).abs() < 1e-6);
    assert_eq!(ds.variables["lat_qc"].data, VarData::Byte(vec![0, 8, 8, 8, 8]));
    assert_eq!(ds.variables["lon_qc"].data, VarData::Byte(vec![0, 8, 8, 8, 8]));

    // profile center: halfway through the dive
    assert_eq!(doubles(&ds, "profile_time"), [1393779010.0]);
    assert!((doubles(&ds, "profile_lat")[0] - lat[2]).abs() < 1e-9);
    assert!((doubles(&ds, "profile_lat")[0] - 27.972_083_33).abs() < 1e-6);
    assert!((doubles(&ds, "profile_lon")[0] - lon[2]).abs() < 1e-9);

    // depth-averaged currents are the segment's last value
    assert_eq!(doubles(&ds, "u"), [0.12]);
    assert_eq!(doubles(&ds, "v"), [-0.05]);
    assert_eq!(doubles(&ds, "time_uv"), [1393779070.0]);

    assert_eq!(ds.variables["trajectory"].data, VarData::Text(vec!["usf-bass-20140301T0000".into()]));
    assert_eq!(ds.variables["segment_id"].data, VarData::Short(vec![0]));
    assert_eq!(ds.variables["profile_id"].data, VarData::Short(vec![1; 5]));
    assert_eq!(ds.variables["platform"].attributes["wmo_id"], AttrValue::Int(4801516));
    assert_eq!(
        ds.variables["instrument_ctd"].attributes["make_model"],
        AttrValue::from("Seabird GPCTD")
    );
    assert_eq!(ds.global_attributes["time_coverage_start"], AttrValue::from("2014-03-02T16:49:50Z"));
    assert_eq!(ds.global_attributes["time_coverage_end"], AttrValue::from("2014-03-02T16:50:30Z"));
    assert!(ds.variable("m_battery").is_none());

    // ---------------- second profile: the climb ----------------
    let ds = read_dataset(&written[1], true).unwrap();
    assert_eq!(ds.dimension("time").unwrap().len, 4);
    assert_eq!(ds.variables["profile_id"].data, VarData::Short(vec![2; 4]));
    assert_eq!(doubles(&ds, "u"), [0.12]);
    assert_eq!(ds.variables["lat_qc"].data, VarData::Byte(vec![8, 8, 8, 0]));
    assert_eq!(doubles(&ds, "profile_time"), [1393779055.0]);
}

#[test]
fn test_created_files_check_against_dac_profile() {
    let cfg = config();
    let (flight, science) = dumps();
    let out = tempfile::tempdir().unwrap();
    let written = create_netcdf(&cfg, &flight, &science, &CreateOptions::new("usf-bass", out.path())).unwrap();
    let profile = ValidationProfile::dac_2_0().unwrap();

    for path in &written {
        let report = validate(&read_dataset(path, false).unwrap(), &profile);
        // salinity and density are derived quantities that are never computed;
        // every other data variable carries a QC companion
        assert_eq!(
            report.violations,
            vec![
                Violation::MissingVariable("salinity".into()),
                Violation::MissingVariable("density".into()),
            ],
            "{}",
            path.display()
        );
        assert_eq!(report.count(Category::GlobalAttribute), 0);
        assert_eq!(report.count(Category::ClassAttribute), 0);
        assert!(!report.violations.iter().any(|v| matches!(v, Violation::MissingQcVariable(_))));
    }
}

#[test]
fn test_unflagged_position_fails_qc_check() {
    let mut cfg = config();
    let (flight, science) = dumps();
    let out = tempfile::tempdir().unwrap();

    let mut lat = cfg.datatypes.lookup("m_gps_lat-lat").cloned().unwrap();
    lat.status_flag = None;
    let mut entries: Vec<(String, Datatype)> =
        cfg.datatypes.iter().map(|(k, dt)| (k.to_string(), dt.clone())).collect();
    entries.retain(|(k, _)| k != "m_gps_lat-lat");
    entries.push(("m_gps_lat-lat".into(), lat));
    cfg.datatypes = DatatypeMapper::from_entries(entries);

    let written = create_netcdf(&cfg, &flight, &science, &CreateOptions::new("usf-bass", out.path())).unwrap();
    let report = validate(&read_dataset(&written[0], false).unwrap(), &ValidationProfile::dac_2_0().unwrap());
    assert_eq!(report.count(Category::ClassAttribute), 1);
    assert!(report.violations.contains(&Violation::MissingQcVariable("lat".into())));
}

#[test]
fn test_single_file_and_explicit_ids() {
    let cfg = config();
    let (flight, science) = dumps();
    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("segment.nc");

    let mut opts = CreateOptions::new("usf-bass", &target);
    opts.single = true;
    opts.mode = Some(Mode::Delayed);
    opts.segment_id = Some(12);

    let written = create_netcdf(&cfg, &flight, &science, &opts).unwrap();
    assert_eq!(written, [target.clone()]);
    let ds = read_dataset(&target, true).unwrap();
    assert_eq!(ds.dimension("time").unwrap().len, 9);
    assert_eq!(ds.variables["segment_id"].data, VarData::Short(vec![12]));
}

#[test]
fn test_missing_time_sensor_writes_nothing() {
    let cfg = config();
    let out = tempfile::tempdir().unwrap();
    let mut opts = CreateOptions::new("usf-bass", out.path());
    opts.time_sensor = Some("sci_m_present_time".into());

    // the flight dump has no science clock
    let (flight, _) = dumps();
    assert!(create_netcdf(&cfg, &flight, &[], &opts).is_err());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
}

#[test]
fn test_write_read_round_trip() {
    let out = tempfile::tempdir().unwrap();
    let path = out.path().join("roundtrip.nc");

    let mut ds = NcDataset::new();
    ds.add_dimension("time", 3, true);
    ds.add_dimension("trajectory", 1, false);
    ds.set_global_attribute("title", "round trip");
    ds.set_global_attribute("wmo_id", AttrValue::Int(4801516));
    ds.add_variable(
        "temperature",
        Variable::new(NcType::Float, &["time"])
            .with_default_fill()
            .with_attr("units", "Celsius")
            .with_attr("valid_range", AttrValue::Doubles(vec![-5.0, 40.0]))
            .with_data(VarData::Float(vec![21.25, 21.5, 21.75])),
    );
    ds.add_variable(
        "trajectory",
        Variable::new(NcType::Str, &["trajectory"]).with_data(VarData::Text(vec!["usf-bass-20140301T0000".into()])),
    );
    ds.add_variable("platform", Variable::container().with_attr("id", "usf-bass"));
    write_dataset(&path, &ds).unwrap();

    let back = read_dataset(&path, true).unwrap();
    assert_eq!(back.dimension("time").map(|d| d.len), Some(3));
    assert_eq!(back.dimension("trajectory").map(|d| (d.len, d.unlimited)), Some((1, false)));
    assert_eq!(back.global_attributes["title"], AttrValue::from("round trip"));
    assert_eq!(back.global_attributes["wmo_id"], AttrValue::Int(4801516));

    let mut names: Vec<_> = back.variables.keys().cloned().collect();
    names.sort();
    assert_eq!(names, ["platform", "temperature", "trajectory"]);

    let temp = &back.variables["temperature"];
    assert_eq!(temp.attributes["units"], AttrValue::from("Celsius"));
    assert_eq!(temp.attributes["valid_range"], AttrValue::Doubles(vec![-5.0, 40.0]));
    match &temp.data {
        VarData::Float(v) => {
            for (got, want) in v.iter().zip([21.25f32, 21.5, 21.75]) {
                assert!((got - want).abs() < 1e-6);
            }
        }
        other => panic!("temperature is not f32: {other:?}"),
    }
    assert_eq!(back.variables["trajectory"].data, VarData::Text(vec!["usf-bass-20140301T0000".into()]));
    assert_eq!(back.variables["platform"].attributes["id"], AttrValue::from("usf-bass"));
    assert!(back.variables["platform"].dimensions.is_empty());
}
