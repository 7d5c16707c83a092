//! Build configurations.
//!
//! A [`Configuration`] is compared by value. Its output roots are derived from
//! its mnemonic, and its short cache key is a truncated SHA-256 over every field
//! that affects analysis.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::artifact::Root;

/// Directory under which every derived root lives.
pub const OUTPUT_BASE: &str = "ruleview-out";

/// Number of digest bytes kept in [`Configuration::short_cache_key`].
const CACHE_KEY_BYTES: usize = 8;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Configuration {
    name: String,
    mnemonic: String,
    #[serde(default, rename = "host")]
    is_host: bool,
    #[serde(default = "default_true")]
    build_runfiles: bool,
    #[serde(default)]
    make_variables: BTreeMap<String, String>,
}

impl Configuration {
    pub fn new(name: impl Into<String>, mnemonic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mnemonic: mnemonic.into(),
            is_host: false,
            build_runfiles: true,
            make_variables: BTreeMap::new(),
        }
    }

    /// A configuration for tools that run during the build.
    pub fn host(name: impl Into<String>, mnemonic: impl Into<String>) -> Self {
        Self {
            is_host: true,
            ..Self::new(name, mnemonic)
        }
    }

    pub fn with_make_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.make_variables.insert(name.into(), value.into());
        self
    }

    pub fn with_build_runfiles(mut self, build_runfiles: bool) -> Self {
        self.build_runfiles = build_runfiles;
        self
    }

    pub fn short_name(&self) -> &str {
        &self.name
    }

    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    pub fn is_host_configuration(&self) -> bool {
        self.is_host
    }

    pub fn build_runfiles(&self) -> bool {
        self.build_runfiles
    }

    pub fn make_variable(&self, name: &str) -> Option<&str> {
        self.make_variables.get(name).map(String::as_str)
    }

    pub fn make_variables(&self) -> &BTreeMap<String, String> {
        &self.make_variables
    }

    /// Stable hex key identifying this configuration in output paths and action owners.
    pub fn short_cache_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update([0]);
        hasher.update(self.mnemonic.as_bytes());
        hasher.update([0, u8::from(self.is_host), u8::from(self.build_runfiles)]);
        for (name, value) in &self.make_variables {
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
            hasher.update([0]);
        }
        let digest = hasher.finalize();
        hex::encode(&digest[..CACHE_KEY_BYTES])
    }

    pub fn bin_directory(&self) -> Root {
        Root::bin(format!("{OUTPUT_BASE}/{}/bin", self.mnemonic))
    }

    pub fn genfiles_directory(&self) -> Root {
        Root::genfiles(format!("{OUTPUT_BASE}/{}/genfiles", self.mnemonic))
    }
}

impl std::fmt::Display for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.mnemonic)
    }
}
