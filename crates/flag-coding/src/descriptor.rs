//! Flag-band descriptors.
//!
//! A flag-band descriptor is the attribute document attached to an integer
//! variable of a data cube. It carries three parallel sequences that together
//! form one table keyed by position:
//!
//! - `flag_masks`: a JSON array of integers
//! - `flag_meanings`: a single string, one token per flag, split on `' '`
//! - `flag_descriptions`: a single string, one segment per flag, split on `'\t'`
//!
//! ```json
//! {
//!   "_ARRAY_DIMENSIONS": ["time", "lat", "lon"],
//!   "flag_coding_name": "c2rcc_flags",
//!   "flag_masks": [1, 2, -2147483648],
//!   "flag_meanings": "Rtosa_OOS Rtosa_OOR Valid_PE",
//!   "flag_descriptions": "...\t...\t...",
//!   "long_name": "C2RCC quality flags"
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decode::{Flag, FlagCoding};
use crate::error::{FlagError, Result};
use crate::mask::FlagMask;

/// Attribute holding the dimension names of a Zarr v2 array.
pub const ARRAY_DIMENSIONS: &str = "_ARRAY_DIMENSIONS";
/// Attribute holding the flag vocabulary identifier.
pub const FLAG_CODING_NAME: &str = "flag_coding_name";
/// Attribute holding the bitmask per flag.
pub const FLAG_MASKS: &str = "flag_masks";
/// Attribute holding the space-separated flag names.
pub const FLAG_MEANINGS: &str = "flag_meanings";
/// Attribute holding the tab-separated flag descriptions.
pub const FLAG_DESCRIPTIONS: &str = "flag_descriptions";
/// Attribute holding the display name of the band.
pub const LONG_NAME: &str = "long_name";

/// Separator between tokens of `flag_meanings`.
pub const MEANINGS_SEPARATOR: char = ' ';
/// Separator between segments of `flag_descriptions`.
pub const DESCRIPTIONS_SEPARATOR: char = '\t';

/// Metadata describing the bit semantics of one flag band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagBandDescriptor {
    /// Names of the array's axes in storage order.
    #[serde(rename = "_ARRAY_DIMENSIONS", default, skip_serializing_if = "Vec::is_empty")]
    pub dimensions: Vec<String>,

    /// Identifier of the flag vocabulary.
    pub flag_coding_name: String,

    /// Raw bitmask values, one per flag.
    pub flag_masks: Vec<i64>,

    /// Space-separated flag names.
    pub flag_meanings: String,

    /// Tab-separated flag descriptions.
    pub flag_descriptions: String,

    /// Display name of the band.
    pub long_name: String,

    /// Any other attributes of the variable, kept verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FlagBandDescriptor {
    /// Parse a descriptor from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse a descriptor from a variable's attribute map.
    ///
    /// Each missing required attribute is reported by name.
    pub fn from_attributes(attrs: &Map<String, Value>) -> Result<Self> {
        for name in [
            FLAG_CODING_NAME,
            FLAG_MASKS,
            FLAG_MEANINGS,
            FLAG_DESCRIPTIONS,
            LONG_NAME,
        ] {
            if !attrs.contains_key(name) {
                return Err(FlagError::invalid_attribute(name, "attribute is missing"));
            }
        }
        Ok(serde_json::from_value(Value::Object(attrs.clone()))?)
    }

    /// Read a descriptor from a JSON file such as a Zarr `.zattrs` sidecar.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| FlagError::Io(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "Read flag descriptor");
        Self::from_json_str(&json)
    }

    /// Whether an attribute map looks like a flag-band descriptor.
    pub fn is_flag_band(attrs: &Map<String, Value>) -> bool {
        attrs.contains_key(FLAG_MASKS)
    }

    /// Flag names, in mask order.
    pub fn meanings(&self) -> Vec<&str> {
        self.flag_meanings.split(MEANINGS_SEPARATOR).collect()
    }

    /// Flag descriptions, in mask order.
    pub fn descriptions(&self) -> Vec<&str> {
        self.flag_descriptions.split(DESCRIPTIONS_SEPARATOR).collect()
    }

    /// Number of flags, as given by `flag_masks`.
    pub fn len(&self) -> usize {
        self.flag_masks.len()
    }

    /// Whether the descriptor defines no flags.
    pub fn is_empty(&self) -> bool {
        self.flag_masks.is_empty()
    }

    /// Validated masks.
    pub fn masks(&self) -> Result<Vec<FlagMask>> {
        self.flag_masks
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                FlagMask::new(value).map_err(|_| {
                    FlagError::malformed(format!(
                        "flag_masks[{i}] = {value} is not a single-bit mask"
                    ))
                })
            })
            .collect()
    }

    /// Check every invariant that can be judged without the enclosing cube.
    pub fn validate(&self) -> Result<()> {
        if self.flag_coding_name.is_empty() {
            return Err(FlagError::malformed("flag_coding_name must not be empty"));
        }
        if self.long_name.is_empty() {
            return Err(FlagError::malformed("long_name must not be empty"));
        }
        if self.flag_masks.is_empty() {
            return Err(FlagError::malformed("flag_masks must not be empty"));
        }

        let meanings = self.meanings();
        let descriptions = self.descriptions();
        if meanings.len() != self.flag_masks.len() || descriptions.len() != self.flag_masks.len()
        {
            return Err(FlagError::malformed(format!(
                "parallel sequences disagree in length: {} flag_masks, {} flag_meanings, {} flag_descriptions",
                self.flag_masks.len(),
                meanings.len(),
                descriptions.len()
            )));
        }

        let masks = self.masks()?;
        let mut bits = HashSet::new();
        for (i, mask) in masks.iter().enumerate() {
            if !bits.insert(mask.bit()) {
                return Err(FlagError::malformed(format!(
                    "flag_masks[{i}] = {mask} duplicates bit {}",
                    mask.bit()
                )));
            }
        }

        let mut names = HashSet::new();
        for (i, meaning) in meanings.iter().enumerate() {
            if meaning.is_empty() {
                return Err(FlagError::malformed(format!(
                    "flag_meanings token {i} is empty"
                )));
            }
            if !names.insert(*meaning) {
                return Err(FlagError::malformed(format!(
                    "flag_meanings token '{meaning}' is not unique"
                )));
            }
        }

        Ok(())
    }

    /// Check `_ARRAY_DIMENSIONS` against the array rank and the cube's dimensions.
    pub fn validate_dimensions(&self, rank: usize, is_known: impl Fn(&str) -> bool) -> Result<()> {
        if self.dimensions.len() != rank {
            return Err(FlagError::malformed(format!(
                "_ARRAY_DIMENSIONS has {} names but the array has rank {}",
                self.dimensions.len(),
                rank
            )));
        }
        if let Some(unknown) = self.dimensions.iter().find(|dim| !is_known(dim.as_str())) {
            return Err(FlagError::malformed(format!(
                "dimension '{unknown}' is not defined in the cube"
            )));
        }
        Ok(())
    }

    /// Validate and build the positional flag table.
    pub fn coding(&self) -> Result<FlagCoding> {
        self.validate()?;
        let flags = self
            .masks()?
            .into_iter()
            .zip(self.meanings())
            .zip(self.descriptions())
            .enumerate()
            .map(|(index, ((mask, meaning), description))| Flag {
                index,
                mask,
                meaning: meaning.to_string(),
                description: description.to_string(),
            })
            .collect();
        Ok(FlagCoding::new(
            self.flag_coding_name.clone(),
            self.long_name.clone(),
            flags,
        ))
    }

    /// Decode a pixel value into the names of the flags it sets.
    pub fn decode(&self, value: i64) -> Result<Vec<String>> {
        let coding = self.coding()?;
        Ok(coding
            .decode(value)
            .names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Serialize back to the attribute layout.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Serialize to an indented JSON document.
    pub fn to_json_string_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl From<&FlagCoding> for FlagBandDescriptor {
    fn from(coding: &FlagCoding) -> Self {
        let flags = coding.flags();
        Self {
            dimensions: Vec::new(),
            flag_coding_name: coding.name().to_string(),
            flag_masks: flags.iter().map(|f| f.mask.value()).collect(),
            flag_meanings: flags
                .iter()
                .map(|f| f.meaning.as_str())
                .collect::<Vec<_>>()
                .join(&MEANINGS_SEPARATOR.to_string()),
            flag_descriptions: flags
                .iter()
                .map(|f| f.description.as_str())
                .collect::<Vec<_>>()
                .join(&DESCRIPTIONS_SEPARATOR.to_string()),
            long_name: coding.long_name().to_string(),
            extra: Map::new(),
        }
    }
}
