//! Positional flag tables and pixel decoding.

use serde::{Deserialize, Serialize};

use crate::error::{FlagError, Result};
use crate::mask::FlagMask;

/// One row of a flag table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    /// Position in the descriptor's parallel sequences.
    pub index: usize,
    /// Bitmask selecting this flag.
    pub mask: FlagMask,
    /// Short symbolic name.
    pub meaning: String,
    /// Human-readable explanation.
    pub description: String,
}

impl Flag {
    /// Whether this flag is set in a pixel value.
    pub fn is_set(&self, value: i64) -> bool {
        self.mask.matches(value)
    }
}

/// A validated flag vocabulary: the positional table of one descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagCoding {
    name: String,
    long_name: String,
    flags: Vec<Flag>,
}

impl FlagCoding {
    /// Create a coding from an already validated flag table.
    pub(crate) fn new(name: String, long_name: String, flags: Vec<Flag>) -> Self {
        Self {
            name,
            long_name,
            flags,
        }
    }

    /// Identifier of the vocabulary.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display name.
    pub fn long_name(&self) -> &str {
        &self.long_name
    }

    /// All flags in descriptor order.
    pub fn flags(&self) -> &[Flag] {
        &self.flags
    }

    /// Number of flags.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether the coding has no flags.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Look up a flag by its meaning.
    pub fn flag(&self, meaning: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.meaning == meaning)
    }

    /// Decode one pixel value.
    pub fn decode(&self, value: i64) -> FlagSet<'_> {
        FlagSet {
            value,
            flags: self.flags.iter().filter(|f| f.is_set(value)).collect(),
        }
    }

    /// Decode a slice of pixel values.
    pub fn decode_many(&self, values: &[i64]) -> Vec<FlagSet<'_>> {
        values.iter().map(|&v| self.decode(v)).collect()
    }

    /// Build the pixel value that sets exactly the named flags.
    pub fn encode<S: AsRef<str>>(&self, meanings: &[S]) -> Result<i64> {
        meanings.iter().try_fold(0i64, |value, meaning| {
            let meaning = meaning.as_ref();
            self.flag(meaning)
                .map(|f| value | f.mask.value())
                .ok_or_else(|| FlagError::UnknownFlag(meaning.to_string()))
        })
    }

    /// Count, per flag, how many of the values have it set.
    ///
    /// The result is indexed like [`FlagCoding::flags`].
    pub fn tally(&self, values: &[i64]) -> Vec<u64> {
        let mut counts = vec![0u64; self.flags.len()];
        for &value in values {
            for (count, flag) in counts.iter_mut().zip(&self.flags) {
                if flag.is_set(value) {
                    *count += 1;
                }
            }
        }
        counts
    }
}

/// The flags set in one pixel value, in descriptor order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSet<'a> {
    value: i64,
    flags: Vec<&'a Flag>,
}

impl<'a> FlagSet<'a> {
    /// The decoded pixel value.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Names of the matched flags.
    pub fn names(&self) -> Vec<&'a str> {
        self.flags.iter().map(|f| f.meaning.as_str()).collect()
    }

    /// Whether the named flag is set.
    pub fn contains(&self, meaning: &str) -> bool {
        self.flags.iter().any(|f| f.meaning == meaning)
    }

    /// Number of matched flags.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether no flag is set.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Iterate over matched flags.
    pub fn iter(&self) -> impl Iterator<Item = &'a Flag> + '_ {
        self.flags.iter().copied()
    }
}

impl<'a> IntoIterator for FlagSet<'a> {
    type Item = &'a Flag;
    type IntoIter = std::vec::IntoIter<&'a Flag>;

    fn into_iter(self) -> Self::IntoIter {
        self.flags.into_iter()
    }
}

impl std::fmt::Display for FlagSet<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coding() -> FlagCoding {
        let flags = [(1, "LAND"), (2, "CLOUD"), (i32::MIN as i64, "VALID")]
            .into_iter()
            .enumerate()
            .map(|(index, (mask, meaning))| Flag {
                index,
                mask: FlagMask::new(mask).unwrap(),
                meaning: meaning.to_string(),
                description: format!("{meaning} flag"),
            })
            .collect();
        FlagCoding::new("test".into(), "Test".into(), flags)
    }

    #[test]
    fn test_decode_zero_is_empty() {
        assert!(coding().decode(0).is_empty());
    }

    #[test]
    fn test_decode_preserves_descriptor_order() {
        let coding = coding();
        let set = coding.decode(i32::MIN as i64 | 3);
        assert_eq!(set.names(), vec!["LAND", "CLOUD", "VALID"]);
        assert_eq!(set.to_string(), "LAND CLOUD VALID");
    }

    #[test]
    fn test_encode_is_inverse_of_decode() {
        let coding = coding();
        let value = coding.encode(&["CLOUD", "VALID"]).unwrap();
        assert_eq!(value, i32::MIN as i64 | 2);
        assert_eq!(coding.decode(value).names(), vec!["CLOUD", "VALID"]);
        assert_eq!(coding.encode::<&str>(&[]).unwrap(), 0);
    }

    #[test]
    fn test_encode_unknown_flag() {
        assert!(matches!(
            coding().encode(&["SNOW"]),
            Err(FlagError::UnknownFlag(name)) if name == "SNOW"
        ));
    }

    #[test]
    fn test_tally() {
        let coding = coding();
        let counts = coding.tally(&[0, 1, 3, i32::MIN as i64, 2]);
        assert_eq!(counts, vec![2, 2, 1]);
    }

    #[test]
    fn test_decode_many() {
        let coding = coding();
        let sets = coding.decode_many(&[0, 1]);
        assert_eq!(sets.len(), 2);
        assert!(sets[0].is_empty());
        assert!(sets[1].contains("LAND"));
    }
}
