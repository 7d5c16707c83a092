//! Analysis options read from the workspace manifest or the command line.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validation::VisibilityValidator;

/// How visibility violations are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityMode {
    #[default]
    Error,
    Warn,
    Off,
}

/// Whether sources from other packages are errors or warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SrcsPackageCheck {
    Error,
    Warn,
}

impl SrcsPackageCheck {
    pub fn only_warn(self) -> bool {
        self == SrcsPackageCheck::Warn
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    #[serde(default)]
    pub visibility: VisibilityMode,
    #[serde(default)]
    pub srcs_same_package: Option<SrcsPackageCheck>,
}

impl AnalysisOptions {
    pub fn validator(&self) -> VisibilityValidator {
        VisibilityValidator::new(self.visibility)
    }
}

fn unknown(kind: &str, value: &str, expected: &str) -> String {
    format!("unknown {kind} '{value}' (expected {expected})")
}

impl FromStr for VisibilityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(VisibilityMode::Error),
            "warn" => Ok(VisibilityMode::Warn),
            "off" => Ok(VisibilityMode::Off),
            other => Err(unknown("visibility mode", other, "error, warn or off")),
        }
    }
}

impl fmt::Display for VisibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VisibilityMode::Error => "error",
            VisibilityMode::Warn => "warn",
            VisibilityMode::Off => "off",
        })
    }
}

impl FromStr for SrcsPackageCheck {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(SrcsPackageCheck::Error),
            "warn" => Ok(SrcsPackageCheck::Warn),
            other => Err(unknown("srcs package check", other, "error or warn")),
        }
    }
}
