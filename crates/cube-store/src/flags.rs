//! Flag-band discovery and resolution.
//!
//! A flag band is any array whose attributes carry `flag_masks`. Resolving a
//! band parses its descriptor, validates it, and checks its dimension names
//! against the rest of the cube.

use serde::Serialize;

use flag_coding::{FlagBandDescriptor, FlagCoding, FlagError};

use crate::error::{CubeStoreError, Result};
use crate::store::{ArrayMetadata, CubeStore};

/// A validated flag band of a cube.
#[derive(Debug, Clone, Serialize)]
pub struct FlagBand {
    /// Array path.
    pub name: String,
    /// Normalized data type.
    pub dtype: String,
    /// Array shape.
    pub shape: Vec<u64>,
    /// The descriptor as stored.
    pub descriptor: FlagBandDescriptor,
    /// The validated flag table.
    pub coding: FlagCoding,
}

/// Arrays that carry flag metadata.
pub fn find_flag_bands(store: &CubeStore) -> Vec<&ArrayMetadata> {
    store
        .arrays()
        .filter(|a| FlagBandDescriptor::is_flag_band(&a.attributes))
        .collect()
}

/// Parse and validate the flag band stored at `name`.
pub fn resolve_flag_band(store: &CubeStore, name: &str) -> Result<FlagBand> {
    let array = store.array(name)?;
    let band_error = |e: FlagError| CubeStoreError::flag_band(&array.path, e);

    if !FlagBandDescriptor::is_flag_band(&array.attributes) {
        return Err(band_error(FlagError::invalid_attribute(
            flag_coding::descriptor::FLAG_MASKS,
            "attribute is missing",
        )));
    }
    if !array.is_integer() {
        return Err(CubeStoreError::UnsupportedDataType(format!(
            "{} has data type {}",
            array.path, array.dtype
        )));
    }

    let mut descriptor = FlagBandDescriptor::from_attributes(&array.attributes).map_err(band_error)?;
    // Zarr v3 arrays carry their dimension names outside the attributes.
    if descriptor.dimensions.is_empty() {
        descriptor.dimensions = array.dimensions.clone();
    }

    let coding = descriptor.coding().map_err(band_error)?;

    // Every dimension must also be used by some other array of the cube.
    let is_known = |dim: &str| {
        store
            .arrays()
            .filter(|other| other.path != array.path)
            .any(|other| other.dimensions.iter().any(|d| d == dim))
    };
    descriptor
        .validate_dimensions(array.rank(), is_known)
        .map_err(band_error)?;

    tracing::debug!(
        band = %array.path,
        coding = %coding.name(),
        flags = coding.len(),
        "Resolved flag band"
    );

    Ok(FlagBand {
        name: array.path.clone(),
        dtype: array.dtype.clone(),
        shape: array.shape.clone(),
        descriptor,
        coding,
    })
}

/// Resolve every flag band of the cube, keeping failures per band.
pub fn resolve_flag_bands(store: &CubeStore) -> Vec<(String, Result<FlagBand>)> {
    find_flag_bands(store)
        .into_iter()
        .map(|array| {
            let result = resolve_flag_band(store, &array.path);
            if let Err(e) = &result {
                tracing::warn!(band = %array.path, error = %e, "Invalid flag band");
            }
            (array.path.clone(), result)
        })
        .collect()
}
