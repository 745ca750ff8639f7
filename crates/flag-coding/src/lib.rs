//! Flag-band metadata for data cubes.
//!
//! Integer variables of a data cube often pack several boolean conditions
//! into the bits of each element. The meaning of each bit is recorded in the
//! variable's attributes as a *flag-band descriptor*:
//!
//! ```text
//! flag_masks         [1, 2, 4, ..., -2147483648]
//! flag_meanings      "Rtosa_OOS Rtosa_OOR ... Valid_PE"        (space-separated)
//! flag_descriptions  "...\t...\t..."                            (tab-separated)
//! ```
//!
//! This crate parses and validates those descriptors, decodes pixel values
//! into flag names, and checks descriptors against a registry of known flag
//! codings.
//!
//! # Example
//!
//! ```ignore
//! use flag_coding::FlagBandDescriptor;
//!
//! let descriptor = FlagBandDescriptor::from_path("cube.zarr/c2rcc_flags/.zattrs")?;
//! let coding = descriptor.coding()?;
//! assert_eq!(coding.decode(3).names(), vec!["Rtosa_OOS", "Rtosa_OOR"]);
//! ```

pub mod decode;
pub mod descriptor;
pub mod error;
pub mod mask;
pub mod registry;

pub use decode::{Flag, FlagCoding, FlagSet};
pub use descriptor::FlagBandDescriptor;
pub use error::{FlagError, Result};
pub use mask::{FlagMask, SIGN_BIT_MASK_I32};
pub use registry::FlagCodingRegistry;
