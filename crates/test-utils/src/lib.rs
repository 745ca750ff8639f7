//! Shared test utilities for the cubeflags workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Test data path helpers
//! - The example flag-band descriptor
//! - A writer for small Zarr v2 cubes in temporary directories
//! - Flag pixel generators
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{CubeFixture, EXAMPLE_FLAG_DESCRIPTOR};
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

// Re-export commonly used items at the crate root
pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Assert that decoding a pixel value yields exactly the given flag names,
/// in descriptor order.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_decodes;
///
/// let coding = descriptor.coding().unwrap();
/// assert_decodes!(coding, 3, ["Rtosa_OOS", "Rtosa_OOR"]);
/// assert_decodes!(coding, 0, []);
/// ```
#[macro_export]
macro_rules! assert_decodes {
    ($coding:expr, $value:expr, [$($name:expr),* $(,)?]) => {{
        let expected: Vec<&str> = vec![$($name),*];
        let decoded = $coding.decode($value);
        assert_eq!(
            decoded.names(),
            expected,
            "decoding pixel value {} gave unexpected flags",
            $value
        );
    }};
}
