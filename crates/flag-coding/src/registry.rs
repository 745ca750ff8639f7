//! Flag-coding registry.
//!
//! Descriptors name their vocabulary through `flag_coding_name`. The registry
//! maps those names to the canonical flag tables so a descriptor found in a
//! cube can be checked against what the producing processor defines.
//!
//! Registries are YAML documents:
//!
//! ```yaml
//! codings:
//!   c2rcc_flags:
//!     long_name: C2RCC quality flags
//!     flags:
//!       - name: Rtosa_OOS
//!         mask: 1
//!         description: The input spectrum ...
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::decode::{Flag, FlagCoding};
use crate::descriptor::FlagBandDescriptor;
use crate::error::{FlagError, Result};
use crate::mask::FlagMask;

const BUILTIN_REGISTRY: &str = include_str!("../data/flag_codings.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    codings: BTreeMap<String, CodingEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CodingEntry {
    #[serde(default)]
    long_name: Option<String>,
    flags: Vec<FlagEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlagEntry {
    name: String,
    mask: i64,
    #[serde(default)]
    description: String,
}

/// Named flag vocabularies.
#[derive(Debug, Clone, Default)]
pub struct FlagCodingRegistry {
    codings: BTreeMap<String, FlagCoding>,
}

impl FlagCodingRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry shipped with this crate.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_REGISTRY)
    }

    /// Parse a registry document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        let mut registry = Self::new();
        for (name, entry) in file.codings {
            let coding = build_coding(&name, entry)?;
            registry.insert(coding);
        }
        Ok(registry)
    }

    /// Load a registry file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| FlagError::Io(format!("{}: {}", path.display(), e)))?;
        let registry = Self::from_yaml_str(&yaml)?;
        tracing::info!(
            path = %path.display(),
            codings = registry.len(),
            "Loaded flag-coding registry"
        );
        Ok(registry)
    }

    /// Add or replace a coding.
    pub fn insert(&mut self, coding: FlagCoding) {
        self.codings.insert(coding.name().to_string(), coding);
    }

    /// Merge another registry into this one; entries of `other` win.
    pub fn extend(&mut self, other: FlagCodingRegistry) {
        self.codings.extend(other.codings);
    }

    /// Look up a coding by name.
    pub fn get(&self, name: &str) -> Option<&FlagCoding> {
        self.codings.get(name)
    }

    /// Registered coding names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codings.keys().map(String::as_str)
    }

    /// Number of registered codings.
    pub fn len(&self) -> usize {
        self.codings.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.codings.is_empty()
    }

    /// Compare a descriptor with the registered vocabulary of the same name.
    ///
    /// Returns a list of issues, which is empty if the descriptor agrees with
    /// the registry.
    pub fn check(&self, descriptor: &FlagBandDescriptor) -> Vec<String> {
        let mut report = Vec::new();

        let Some(registered) = self.get(&descriptor.flag_coding_name) else {
            report.push(format!(
                "flag coding '{}' is not registered",
                descriptor.flag_coding_name
            ));
            return report;
        };

        let coding = match descriptor.coding() {
            Ok(coding) => coding,
            Err(e) => {
                report.push(e.to_string());
                return report;
            }
        };

        for flag in coding.flags() {
            match registered.flag(&flag.meaning) {
                None => report.push(format!(
                    "flag '{}' is not defined by coding '{}'",
                    flag.meaning,
                    registered.name()
                )),
                Some(expected) if expected.mask.bit() != flag.mask.bit() => report.push(format!(
                    "flag '{}' uses mask {} but coding '{}' defines {}",
                    flag.meaning,
                    flag.mask,
                    registered.name(),
                    expected.mask
                )),
                Some(_) => {}
            }
        }

        for expected in registered.flags() {
            if coding.flag(&expected.meaning).is_none() {
                report.push(format!(
                    "flag '{}' of coding '{}' is missing",
                    expected.meaning,
                    registered.name()
                ));
            }
        }

        report
    }
}

fn build_coding(name: &str, entry: CodingEntry) -> Result<FlagCoding> {
    if entry.flags.is_empty() {
        return Err(FlagError::registry(format!("coding '{name}' defines no flags")));
    }

    let mut bits = HashSet::new();
    let mut meanings = HashSet::new();
    let mut flags = Vec::with_capacity(entry.flags.len());

    for (index, f) in entry.flags.into_iter().enumerate() {
        let mask = FlagMask::new(f.mask)
            .map_err(|e| FlagError::registry(format!("coding '{name}', flag '{}': {e}", f.name)))?;
        if f.name.is_empty() || f.name.contains(char::is_whitespace) {
            return Err(FlagError::registry(format!(
                "coding '{name}': invalid flag name '{}'",
                f.name
            )));
        }
        if !bits.insert(mask.bit()) || !meanings.insert(f.name.clone()) {
            return Err(FlagError::registry(format!(
                "coding '{name}': duplicate flag '{}'",
                f.name
            )));
        }
        flags.push(Flag {
            index,
            mask,
            meaning: f.name,
            description: f.description,
        });
    }

    Ok(FlagCoding::new(
        name.to_string(),
        entry.long_name.unwrap_or_else(|| name.to_string()),
        flags,
    ))
}
