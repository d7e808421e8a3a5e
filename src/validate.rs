//! Checks a dataset against a Glider DAC profile.
//!
//! All checks always run; every failure becomes one [`Violation`] in the
//! returned [`ValidationReport`]. Nothing here returns an error.

use crate::config::read_json;
use crate::dataset::{NcDataset, Variable};
use crate::error::{GliderError, Result};
use serde::Deserialize;
use std::{fmt, path::Path};

pub const DEFAULT_PROFILE_FILE: &str = "glider_DAC-2.0.json";
pub const PLATFORM_VARIABLE:    &str = "platform";
pub const CTD_VARIABLE:         &str = "instrument_ctd";

const DAC_2_0: &str = include_str!("../config/glider_DAC-2.0.json");

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidationProfile {
    pub global_attributes:     Vec<String>,
    pub dimensions:            Vec<String>,
    pub required_variables:    Vec<String>,
    #[serde(default)]
    pub ignore_variable_check: Vec<String>,
    #[serde(default)]
    pub variable_attributes:   Vec<String>,
    #[serde(default)]
    pub platform_attributes:   Vec<String>,
    #[serde(default)]
    pub ctd_attributes:        Vec<String>,
    /// Require a `<name>_qc` companion for every checked data variable.
    /// On unless the profile turns it off.
    #[serde(default = "enabled")]
    pub check_qc_variables:    bool,
}

fn enabled() -> bool {
    true
}

impl ValidationProfile {
    pub fn load(path: &Path) -> Result<ValidationProfile> {
        read_json(path)
    }

    /// The bundled Glider DAC 2.0 profile.
    pub fn dac_2_0() -> Result<ValidationProfile> {
        ValidationProfile::from_json(DAC_2_0)
    }

    pub fn from_json(json: &str) -> Result<ValidationProfile> {
        serde_json::from_str(json).map_err(|source| GliderError::ConfigJson {
            path: DEFAULT_PROFILE_FILE.into(),
            source,
        })
    }

    fn ignores(&self, variable: &str) -> bool {
        self.ignore_variable_check.iter().any(|v| v == variable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MissingGlobalAttribute(String),
    EmptyGlobalAttribute(String),
    MissingDimension(String),
    MissingVariable(String),
    MissingVariableAttribute { variable: String, attribute: String },
    MissingQcVariable(String),
    MissingPlatformAttribute(String),
    MissingCtdAttribute(String),
}

/// Which of the four check groups produced a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    GlobalAttribute,
    Dimension,
    Variable,
    ClassAttribute,
}

impl Violation {
    pub fn category(&self) -> Category {
        match self {
            Violation::MissingGlobalAttribute(_) | Violation::EmptyGlobalAttribute(_) => Category::GlobalAttribute,
            Violation::MissingDimension(_) => Category::Dimension,
            Violation::MissingVariable(_) => Category::Variable,
            Violation::MissingVariableAttribute { .. }
            | Violation::MissingQcVariable(_)
            | Violation::MissingPlatformAttribute(_)
            | Violation::MissingCtdAttribute(_) => Category::ClassAttribute,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MissingGlobalAttribute(a) => write!(f, "Global Attribute Missing: {a}"),
            Violation::EmptyGlobalAttribute(a) => write!(f, "Global Attribute Empty: {a}"),
            Violation::MissingDimension(d) => write!(f, "Dimension Missing: {d}"),
            Violation::MissingVariable(v) => write!(f, "Missing required variable {v}"),
            Violation::MissingVariableAttribute { variable, attribute } => {
                write!(f, "Variable attribute {attribute} missing in {variable} variable")
            }
            Violation::MissingQcVariable(v) => write!(f, "QC variable missing for {v}"),
            Violation::MissingPlatformAttribute(a) => write!(f, "Platform attribute {a} missing"),
            Violation::MissingCtdAttribute(a) => write!(f, "CTD attribute {a} missing"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.violations.len()
    }

    pub fn is_success(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, category: Category) -> usize {
        self.violations.iter().filter(|v| v.category() == category).count()
    }
}

pub fn validate(dataset: &NcDataset, profile: &ValidationProfile) -> ValidationReport {
    let mut violations = Vec::new();

    // 1. global attributes
    for key in &profile.global_attributes {
        match dataset.global_attributes.get(key) {
            None => violations.push(Violation::MissingGlobalAttribute(key.clone())),
            Some(v) if v.is_empty() => violations.push(Violation::EmptyGlobalAttribute(key.clone())),
            Some(_) => {}
        }
    }

    // 2. dimensions
    for dim in &profile.dimensions {
        if !dataset.has_dimension(dim) {
            violations.push(Violation::MissingDimension(dim.clone()));
        }
    }

    // 3. required variables
    for name in &profile.required_variables {
        if !profile.ignores(name) && dataset.variable(name).is_none() {
            violations.push(Violation::MissingVariable(name.clone()));
        }
    }

    // 4. class attribute sets
    // data variables: not a QC flag, not ignored, more than one value
    let checked: Vec<(&String, &Variable)> = dataset
        .variables
        .iter()
        .filter(|(name, _)| !name.ends_with("qc") && !profile.ignores(name))
        .filter(|(name, _)| dataset.variable_size(name).unwrap_or(0) >= 2)
        .collect();

    for (name, var) in &checked {
        for attr in &profile.variable_attributes {
            if !var.attributes.contains_key(attr) {
                violations.push(Violation::MissingVariableAttribute {
                    variable:  (*name).clone(),
                    attribute: attr.clone(),
                });
            }
        }
    }

    if profile.check_qc_variables {
        for (name, _) in &checked {
            if dataset.variable(&format!("{name}_qc")).is_none() {
                violations.push(Violation::MissingQcVariable((*name).clone()));
            }
        }
    }

    if let Some(platform) = dataset.variable(PLATFORM_VARIABLE) {
        for attr in &profile.platform_attributes {
            if !platform.attributes.contains_key(attr) {
                violations.push(Violation::MissingPlatformAttribute(attr.clone()));
            }
        }
    }

    if let Some(ctd) = dataset.variable(CTD_VARIABLE) {
        for attr in &profile.ctd_attributes {
            if !ctd.attributes.contains_key(attr) {
                violations.push(Violation::MissingCtdAttribute(attr.clone()));
            }
        }
    }

    ValidationReport { violations }
}
