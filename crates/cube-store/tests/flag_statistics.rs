//! Integration test: write a flag band with known pixels and count flags.
//!
//! 1. Create a synthetic flag grid with a predictable pattern
//! 2. Write it to a Zarr V3 cube together with its coordinate arrays
//! 3. Read it back through `CubeStore` and `flag_statistics`
//! 4. Verify per-flag counts against the generator's expectations

use std::path::Path;
use std::sync::Arc;

use cube_store::{flag_statistics, read_flag_values, resolve_flag_band, CubeStore, ZarrFormat};
use serde_json::{json, Map, Value};
use test_utils::{
    create_flag_grid, example_flag_attrs, expected_flag_counts, temp_test_dir, CubeFixture,
    C2RCC_FLAG_MEANINGS,
};
use zarrs::array::{ArrayBuilder, DataType, Element, FillValue};
use zarrs::array_subset::ArraySubset;
use zarrs::group::GroupBuilder;
use zarrs_filesystem::FilesystemStore;

const TIME: u64 = 2;
const LAT: u64 = 4;
const LON: u64 = 8;

fn dims_attr(dims: &[&str]) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(dims));
    attrs
}

/// Write a V3 cube whose `int32` `c2rcc_flags` band holds `pixels`.
fn write_v3_cube(path: &Path, pixels: &[i32]) -> Result<(), Box<dyn std::error::Error>> {
    write_v3_band(path, DataType::Int32, FillValue::from(0i32), pixels)
}

/// Write a V3 cube whose `c2rcc_flags` band has `data_type` and holds
/// `pixels` (no compression).
fn write_v3_band<T: Element>(
    path: &Path,
    data_type: DataType,
    fill_value: FillValue,
    pixels: &[T],
) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::create_dir_all(path)?;
    let store = Arc::new(FilesystemStore::new(path)?);

    GroupBuilder::new()
        .attributes({
            let mut attrs = Map::new();
            attrs.insert("title".to_string(), json!("Flag statistics cube"));
            attrs
        })
        .build(store.clone(), "/")?
        .store_metadata()?;

    for (name, size) in [("time", TIME), ("lat", LAT), ("lon", LON)] {
        ArrayBuilder::new(
            vec![size],
            DataType::Float64,
            vec![size].try_into()?,
            FillValue::from(f64::NAN),
        )
        .attributes(dims_attr(&[name]))
        .build(store.clone(), &format!("/{name}"))?
        .store_metadata()?;
    }

    let shape = vec![TIME, LAT, LON];
    let array = ArrayBuilder::new(
        shape.clone(),
        data_type,
        vec![1, LAT, LON].try_into()?,
        fill_value,
    )
    .attributes({
        let mut attrs = dims_attr(&["time", "lat", "lon"]);
        attrs.extend(example_flag_attrs());
        attrs
    })
    .build(store.clone(), "/c2rcc_flags")?;

    array.store_metadata()?;
    let subset = ArraySubset::new_with_shape(shape);
    array.store_array_subset_elements(&subset, pixels)?;

    Ok(())
}

#[test]
fn test_flag_statistics_v3() {
    let masks = [1, 2, 8, i32::MIN];
    let len = (TIME * LAT * LON) as usize;
    let stride = 5;
    let pixels = create_flag_grid(&masks, len, stride);

    let dir = temp_test_dir();
    let path = dir.path().join("flags.zarr");
    write_v3_cube(&path, &pixels).expect("Failed to write V3 cube");

    let store = CubeStore::open(&path).unwrap();
    assert_eq!(store.format(), ZarrFormat::V3);
    assert_eq!(store.attributes()["title"], json!("Flag statistics cube"));

    let band = resolve_flag_band(&store, "c2rcc_flags").unwrap();
    assert_eq!(band.dtype, "int32");

    let values = read_flag_values(&store, "c2rcc_flags").unwrap();
    assert_eq!(values.len(), len);
    // Bit 31 of an int32 band reads back as the unsigned bit pattern.
    assert!(values.contains(&0x8000_0000));
    assert!(values.iter().all(|&v| (0..1 << 32).contains(&v)));

    let stats = flag_statistics(&store, "c2rcc_flags").unwrap();
    let expected = expected_flag_counts(&masks, len, stride);
    assert_eq!(stats.total, len as u64);
    assert_eq!(stats.coding, "c2rcc_flags");
    assert_eq!(stats.count("Rtosa_OOS"), Some(expected[0]));
    assert_eq!(stats.count("Rtosa_OOR"), Some(expected[1]));
    assert_eq!(stats.count("Cloud_risk"), Some(expected[2]));
    assert_eq!(stats.count("Valid_PE"), Some(expected[3]));
    assert_eq!(stats.count("Rhow_OOR"), Some(0));
    assert_eq!(stats.count("Not_a_flag"), None);

    let unflagged = (0..len).filter(|i| i % stride == 0).count() as u64;
    assert_eq!(stats.unflagged, unflagged);

    let fraction = stats.fraction("Valid_PE").unwrap();
    assert!((fraction - expected[3] as f64 / len as f64).abs() < 1e-12);
}

fn pixel_count() -> usize {
    (TIME * LAT * LON) as usize
}

#[test]
fn test_flag_statistics_int16_keeps_storage_width() {
    let mut pixels = vec![0i16; pixel_count()];
    pixels[0] = i16::MIN;
    pixels[1] = i16::MIN | 1;
    pixels[2] = 8;

    let dir = temp_test_dir();
    let path = dir.path().join("int16.zarr");
    write_v3_band(&path, DataType::Int16, FillValue::from(0i16), &pixels).unwrap();
    let store = CubeStore::open(&path).unwrap();

    let values = read_flag_values(&store, "c2rcc_flags").unwrap();
    assert_eq!(values[0], 0x8000);
    assert_eq!(values[1], 0x8001);

    // Bit 15 only; no sign extension into Kd489_OOR (bit 16) or Valid_PE (bit 31).
    let stats = flag_statistics(&store, "c2rcc_flags").unwrap();
    assert_eq!(stats.count("Rhow_OOS"), Some(2));
    assert_eq!(stats.count("Rtosa_OOS"), Some(1));
    assert_eq!(stats.count("Cloud_risk"), Some(1));
    assert_eq!(stats.count("Kd489_OOR"), Some(0));
    assert_eq!(stats.count("Kdmin_at_max"), Some(0));
    assert_eq!(stats.count("Valid_PE"), Some(0));
    assert_eq!(stats.unflagged, pixel_count() as u64 - 3);
}

#[test]
fn test_flag_statistics_int8_keeps_storage_width() {
    let mut pixels = vec![0i8; pixel_count()];
    pixels[0] = -1;

    let dir = temp_test_dir();
    let path = dir.path().join("int8.zarr");
    write_v3_band(&path, DataType::Int8, FillValue::from(0i8), &pixels).unwrap();
    let store = CubeStore::open(&path).unwrap();

    let stats = flag_statistics(&store, "c2rcc_flags").unwrap();
    for meaning in &C2RCC_FLAG_MEANINGS[..8] {
        assert_eq!(stats.count(meaning), Some(1), "{meaning}");
    }
    for meaning in &C2RCC_FLAG_MEANINGS[8..] {
        assert_eq!(stats.count(meaning), Some(0), "{meaning}");
    }
}

#[test]
fn test_flag_statistics_uint32_sign_bit() {
    let mut pixels = vec![0u32; pixel_count()];
    pixels[0] = 0x8000_0000;
    pixels[1] = 0x8000_0008;

    let dir = temp_test_dir();
    let path = dir.path().join("uint32.zarr");
    write_v3_band(&path, DataType::UInt32, FillValue::from(0u32), &pixels).unwrap();
    let store = CubeStore::open(&path).unwrap();

    let stats = flag_statistics(&store, "c2rcc_flags").unwrap();
    assert_eq!(stats.count("Valid_PE"), Some(2));
    assert_eq!(stats.count("Cloud_risk"), Some(1));
    assert_eq!(stats.unflagged, pixel_count() as u64 - 2);
}

#[test]
fn test_flag_statistics_uint64_high_bits_are_unflagged() {
    let mut pixels = vec![0u64; pixel_count()];
    pixels[0] = 1 << 32;
    pixels[1] = 1 << 40;
    pixels[2] = (1 << 40) | 8;
    pixels[3] = 1 << 31;

    let dir = temp_test_dir();
    let path = dir.path().join("uint64.zarr");
    write_v3_band(&path, DataType::UInt64, FillValue::from(0u64), &pixels).unwrap();
    let store = CubeStore::open(&path).unwrap();

    let stats = flag_statistics(&store, "c2rcc_flags").unwrap();
    assert_eq!(stats.count("Valid_PE"), Some(1));
    assert_eq!(stats.count("Cloud_risk"), Some(1));
    assert_eq!(stats.unflagged, pixel_count() as u64 - 2);
}

#[test]
fn test_flag_statistics_unwritten_chunks_use_fill_value() {
    let (_dir, path) = CubeFixture::standard(TIME, LAT, LON).write_temp();
    let store = CubeStore::open(&path).unwrap();

    let stats = flag_statistics(&store, "c2rcc_flags").unwrap();
    assert_eq!(stats.total, TIME * LAT * LON);
    assert_eq!(stats.unflagged, stats.total);
    assert!(stats.counts.iter().all(|c| c.count == 0));
    assert_eq!(stats.counts.len(), 21);
}

#[test]
fn test_flag_statistics_rejects_float_band() {
    let (_dir, path) = CubeFixture::standard(1, 2, 2).write_temp();
    let store = CubeStore::open(&path).unwrap();
    assert!(read_flag_values(&store, "conc_chl").is_err());
    assert!(flag_statistics(&store, "conc_chl").is_err());
}
