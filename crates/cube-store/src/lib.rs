//! Read-only inspection of Zarr data-cube stores.
//!
//! This crate reads the JSON metadata of a local Zarr store and builds a
//! structural view of the cube on top of it:
//!
//! - **Store reader**: consolidated v2, plain v2 and v3 layouts
//! - **Descriptors**: dataset/variable summaries and a text dump
//! - **Verification**: checks the cube conventions (time/y/x coordinates and
//!   their values, data variable dimensions and chunking)
//! - **Flag bands**: discovery, validation against the cube's dimensions, and
//!   per-flag pixel statistics read through `zarrs`
//!
//! # Architecture
//!
//! ```text
//! CubeStore::open(path)
//!      │
//!      ├─► .zmetadata present? ──► read consolidated metadata
//!      │
//!      └─► walk tree for .zarray/.zattrs and zarr.json
//!               │
//!               ▼
//!        ArrayMetadata per array
//!               │
//!      ┌────────┼─────────────────┐
//!      ▼        ▼                 ▼
//! DatasetDescriptor   resolve_flag_band   flag_statistics
//!      │                                  (zarrs + rayon)
//!      ▼
//! verify_cube
//! ```
//!
//! # Example
//!
//! ```ignore
//! use cube_store::{CubeStore, DatasetDescriptor, verify_cube, flag_statistics};
//!
//! let store = CubeStore::open("demo/cube-1-250-250.zarr")?;
//! let dataset = DatasetDescriptor::from_store(&store)?;
//! for issue in verify_cube(&dataset) {
//!     println!("{issue}");
//! }
//! let stats = flag_statistics(&store, "c2rcc_flags")?;
//! println!("{:?}", stats.count("Cloud_risk"));
//! ```

pub mod descriptor;
pub mod error;
pub mod flags;
pub mod stats;
pub mod store;
pub mod values;
pub mod verify;

// Re-export commonly used types at crate root
pub use descriptor::{DatasetDescriptor, VariableDescriptor};
pub use error::{CubeStoreError, Result};
pub use flags::{find_flag_bands, resolve_flag_band, resolve_flag_bands, FlagBand};
pub use stats::{flag_statistics, FlagCount, FlagStatistics};
pub use store::{ArrayMetadata, CubeStore, OpenOptions, ZarrFormat};
pub use values::{read_coordinate_values, read_flag_values};
pub use verify::{assert_cube, verify_cube};
