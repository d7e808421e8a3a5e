//! Slocum glider telemetry to Glider DAC NetCDF.
//!
//! `dbd2asc` dumps are read into [`Record`]s, renamed through the
//! [`DatatypeMapper`], aligned on a common time axis by the
//! [`RecordAccumulator`] and written one profile per file by the
//! typestate [`NcWriter`]. [`validate`] checks any dataset against a DAC
//! profile.

pub mod accumulator;
pub mod config;
pub mod convert;
pub mod dataset;
pub mod datatypes;
pub mod error;
pub mod layout;
pub mod profiles;
pub mod reader;
pub mod record;
pub mod validate;
pub mod writer;

pub use accumulator::{Column, RecordAccumulator, TimeSeries};
pub use config::GliderConfig;
pub use convert::{create_netcdf, CreateOptions};
pub use dataset::{AttrValue, NcDataset, NcType, VarData, Variable, FILL_F64};
pub use datatypes::{Datatype, DatatypeMapper};
pub use error::{GliderError, Result};
pub use reader::{DbaFile, GliderFilename, Mode};
pub use record::{Record, Value};
pub use validate::{validate, ValidationProfile, ValidationReport, Violation};
pub use writer::{read_dataset, write_dataset, NcWriter};
