//! Target labels and visibility package specifications.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Result, RuleViewError};

static PACKAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[A-Za-z0-9_.+\-]+(?:/[A-Za-z0-9_.+\-]+)*)?$").expect("static package regex")
});

static TARGET_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.+\-=,@~#%^&!]+(?:/[A-Za-z0-9_.+\-=,@~#%^&!]+)*$")
        .expect("static target name regex")
});

fn invalid(label: &str, reason: impl Into<String>) -> RuleViewError {
    RuleViewError::InvalidLabel {
        label: label.to_string(),
        reason: reason.into(),
    }
}

fn check_components(raw: &str, part: &str, what: &str) -> Result<()> {
    if part.split('/').any(|c| c == "." || c == "..") {
        return Err(invalid(raw, format!("{what} contains '.' or '..' components")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// The identity of a target: a package path plus a target name, `//pkg:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Label {
    package: String,
    name: String,
}

impl Label {
    /// Build a label from an already split package and name, validating both.
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let package = package.into();
        let name = name.into();
        let raw = format!("//{package}:{name}");
        if !PACKAGE_RE.is_match(&package) {
            return Err(invalid(&raw, "invalid package name"));
        }
        check_components(&raw, &package, "package name")?;
        if name.is_empty() {
            return Err(invalid(&raw, "empty target name"));
        }
        if !TARGET_NAME_RE.is_match(&name) {
            return Err(invalid(&raw, "invalid target name"));
        }
        check_components(&raw, &name, "target name")?;
        Ok(Self { package, name })
    }

    /// Parse an absolute label: `//pkg:name`, or `//pkg` meaning `//pkg:<last component>`.
    pub fn parse(raw: &str) -> Result<Self> {
        let rest = raw
            .strip_prefix("//")
            .ok_or_else(|| invalid(raw, "absolute labels must start with '//'"))?;
        match rest.split_once(':') {
            Some((package, name)) => {
                if name.contains(':') {
                    return Err(invalid(raw, "multiple colons"));
                }
                Self::new(package, name).map_err(|_| invalid(raw, "invalid package or target name"))
            }
            None => {
                let name = rest.rsplit('/').next().unwrap_or_default();
                if name.is_empty() {
                    return Err(invalid(raw, "missing target name"));
                }
                Self::new(rest, name).map_err(|_| invalid(raw, "invalid package name"))
            }
        }
    }

    /// Parse a label written inside `base_package`: `:name`, `name`, or an absolute label.
    pub fn parse_relative(base_package: &str, raw: &str) -> Result<Self> {
        if raw.starts_with("//") {
            return Self::parse(raw);
        }
        let name = raw.strip_prefix(':').unwrap_or(raw);
        if name.contains(':') {
            return Err(invalid(raw, "multiple colons"));
        }
        Self::new(base_package, name).map_err(|_| invalid(raw, "invalid target name"))
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Another target in the same package.
    pub fn sibling(&self, name: impl Into<String>) -> Result<Self> {
        Self::new(self.package.clone(), name)
    }

    /// The workspace-relative path of the file this label would name: `pkg/name`.
    pub fn workspace_relative_path(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.package, self.name)
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "//{}:{}", self.package, self.name)
    }
}

impl std::str::FromStr for Label {
    type Err = RuleViewError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Label {
    type Error = RuleViewError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.to_string()
    }
}

// ---------------------------------------------------------------------------
// PackageSpecification
// ---------------------------------------------------------------------------

/// One entry of a target's visibility: the set of packages allowed to depend on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PackageSpecification {
    /// `//visibility:public`
    Everything,
    /// `//visibility:private`
    Nothing,
    /// `//pkg:__pkg__`
    Package(String),
    /// `//pkg:__subpackages__` or `//pkg/...`
    Subpackages(String),
}

impl PackageSpecification {
    pub fn parse(raw: &str) -> Result<Self> {
        let bad = |reason: &str| RuleViewError::InvalidPackageSpec {
            spec: raw.to_string(),
            reason: reason.to_string(),
        };
        match raw {
            "//visibility:public" => return Ok(Self::Everything),
            "//visibility:private" => return Ok(Self::Nothing),
            _ => {}
        }
        let rest = raw
            .strip_prefix("//")
            .ok_or_else(|| bad("must start with '//'"))?;
        let checked = |package: &str| -> Result<String> {
            if PACKAGE_RE.is_match(package) {
                Ok(package.to_string())
            } else {
                Err(bad("invalid package name"))
            }
        };
        if let Some(package) = rest.strip_suffix(":__pkg__") {
            return Ok(Self::Package(checked(package)?));
        }
        if let Some(package) = rest.strip_suffix(":__subpackages__") {
            return Ok(Self::Subpackages(checked(package)?));
        }
        if rest == "..." {
            return Ok(Self::Subpackages(String::new()));
        }
        if let Some(package) = rest.strip_suffix("/...") {
            return Ok(Self::Subpackages(checked(package)?));
        }
        Err(bad("expected //visibility:public, //visibility:private, //pkg:__pkg__ or //pkg:__subpackages__"))
    }

    /// Does this specification admit `package`?
    pub fn contains_package(&self, package: &str) -> bool {
        match self {
            Self::Everything => true,
            Self::Nothing => false,
            Self::Package(p) => p == package,
            Self::Subpackages(prefix) => {
                prefix.is_empty()
                    || package == prefix
                    || package
                        .strip_prefix(prefix.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

impl fmt::Display for PackageSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everything => write!(f, "//visibility:public"),
            Self::Nothing => write!(f, "//visibility:private"),
            Self::Package(p) => write!(f, "//{p}:__pkg__"),
            Self::Subpackages(p) => write!(f, "//{p}:__subpackages__"),
        }
    }
}

impl TryFrom<String> for PackageSpecification {
    type Error = RuleViewError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<PackageSpecification> for String {
    fn from(spec: PackageSpecification) -> Self {
        spec.to_string()
    }
}
