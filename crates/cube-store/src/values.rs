//! Pixel reads through `zarrs`.
//!
//! Flag values are widened to 64 bits keeping their storage bit pattern, so a
//! value with bit 31 set in an `int32` band reads as `2147483648`. Coordinate
//! values are read as `f64`.

use std::sync::Arc;

use zarrs::array::{Array, DataType};
use zarrs::array_subset::ArraySubset;
use zarrs_filesystem::FilesystemStore;

use crate::error::{CubeStoreError, Result};
use crate::store::CubeStore;

/// Open one array of the store for reading.
fn open_array(store: &CubeStore, path: &str) -> Result<Array<FilesystemStore>> {
    let storage = FilesystemStore::new(store.root())
        .map_err(|e| CubeStoreError::zarr(e.to_string()))?;
    Array::open(Arc::new(storage), &format!("/{path}"))
        .map_err(|e| CubeStoreError::zarr(e.to_string()))
}

/// Read a whole array, converting every element with `$convert`.
macro_rules! retrieve {
    ($array:expr, $subset:expr, $ty:ty, $convert:expr) => {
        $array
            .retrieve_array_subset_elements::<$ty>($subset)
            .map_err(|e| CubeStoreError::zarr(e.to_string()))?
            .into_iter()
            .map($convert)
            .collect()
    };
}

/// Read a whole integer array as 64-bit values holding the stored bit pattern.
///
/// Signed types are zero-extended from their storage width, so only the bits
/// the band can hold are ever set.
pub fn read_flag_values(store: &CubeStore, variable: &str) -> Result<Vec<i64>> {
    let metadata = store.array(variable)?;
    let array = open_array(store, &metadata.path)?;
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());

    let values: Vec<i64> = match array.data_type() {
        DataType::Int8 => retrieve!(array, &subset, i8, |v: i8| v as u8 as i64),
        DataType::Int16 => retrieve!(array, &subset, i16, |v: i16| v as u16 as i64),
        DataType::Int32 => retrieve!(array, &subset, i32, |v: i32| v as u32 as i64),
        DataType::Int64 => retrieve!(array, &subset, i64, |v: i64| v),
        DataType::UInt8 => retrieve!(array, &subset, u8, |v: u8| v as i64),
        DataType::UInt16 => retrieve!(array, &subset, u16, |v: u16| v as i64),
        DataType::UInt32 => retrieve!(array, &subset, u32, |v: u32| v as i64),
        // Bit 63 wraps to the sign bit; the bit pattern is what matters.
        DataType::UInt64 => retrieve!(array, &subset, u64, |v: u64| v as i64),
        other => {
            return Err(CubeStoreError::UnsupportedDataType(format!(
                "{} has data type {:?}",
                metadata.path, other
            )))
        }
    };

    tracing::debug!(variable = %metadata.path, pixels = values.len(), "Read flag values");
    Ok(values)
}

/// Read a whole numeric array as `f64`.
pub fn read_coordinate_values(store: &CubeStore, variable: &str) -> Result<Vec<f64>> {
    let metadata = store.array(variable)?;
    let array = open_array(store, &metadata.path)?;
    let subset = ArraySubset::new_with_shape(array.shape().to_vec());

    let values: Vec<f64> = match array.data_type() {
        DataType::Float32 => retrieve!(array, &subset, f32, |v: f32| v as f64),
        DataType::Float64 => retrieve!(array, &subset, f64, |v: f64| v),
        DataType::Int8 => retrieve!(array, &subset, i8, |v: i8| v as f64),
        DataType::Int16 => retrieve!(array, &subset, i16, |v: i16| v as f64),
        DataType::Int32 => retrieve!(array, &subset, i32, |v: i32| v as f64),
        DataType::Int64 => retrieve!(array, &subset, i64, |v: i64| v as f64),
        DataType::UInt8 => retrieve!(array, &subset, u8, |v: u8| v as f64),
        DataType::UInt16 => retrieve!(array, &subset, u16, |v: u16| v as f64),
        DataType::UInt32 => retrieve!(array, &subset, u32, |v: u32| v as f64),
        DataType::UInt64 => retrieve!(array, &subset, u64, |v: u64| v as f64),
        other => {
            return Err(CubeStoreError::UnsupportedDataType(format!(
                "{} has data type {:?}",
                metadata.path, other
            )))
        }
    };

    tracing::debug!(variable = %metadata.path, len = values.len(), "Read coordinate values");
    Ok(values)
}

/// Whether a normalized dtype name is one `read_coordinate_values` handles.
pub fn is_numeric_dtype(dtype: &str) -> bool {
    crate::store::is_integer_dtype(dtype) || matches!(dtype, "float32" | "float64")
}
