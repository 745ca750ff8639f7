//! Common test fixtures for cubeflags tests.
//!
//! This module provides the example flag-band descriptor and a small writer
//! that lays out Zarr v2 cubes (`.zgroup`, `.zattrs`, `.zarray`, and
//! optionally a consolidated `.zmetadata`) in a directory. Chunk data is
//! written only for arrays given explicit values, as one uncompressed
//! little-endian chunk; other arrays read as their fill value.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

/// The example flag-band descriptor, as stored in `c2rcc_flags/.zattrs`.
pub const EXAMPLE_FLAG_DESCRIPTOR: &str = include_str!("../data/c2rcc_flags.zattrs");

/// Flag names of the example descriptor, in mask order.
pub const C2RCC_FLAG_MEANINGS: [&str; 21] = [
    "Rtosa_OOS",
    "Rtosa_OOR",
    "Rhow_OOR",
    "Cloud_risk",
    "Iop_OOR",
    "Apig_at_max",
    "Adet_at_max",
    "Agelb_at_max",
    "Bpart_at_max",
    "Bwit_at_max",
    "Apig_at_min",
    "Adet_at_min",
    "Agelb_at_min",
    "Bpart_at_min",
    "Bwit_at_min",
    "Rhow_OOS",
    "Kd489_OOR",
    "Kdmin_OOR",
    "Kd489_at_max",
    "Kdmin_at_max",
    "Valid_PE",
];

/// Attributes of the example descriptor without `_ARRAY_DIMENSIONS`.
pub fn example_flag_attrs() -> Map<String, Value> {
    let mut attrs: Map<String, Value> =
        serde_json::from_str(EXAMPLE_FLAG_DESCRIPTOR).expect("example descriptor is valid JSON");
    attrs.remove("_ARRAY_DIMENSIONS");
    attrs
}

/// Metadata of one array in a fixture cube.
#[derive(Debug, Clone)]
pub struct ArrayFixture {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<u64>,
    pub chunks: Vec<u64>,
    pub dtype: String,
    pub fill_value: Value,
    pub attrs: Map<String, Value>,
    /// Values written as the single chunk `0`, if any.
    pub values: Option<Vec<f64>>,
}

impl ArrayFixture {
    /// An unchunked array (one chunk spanning the whole shape).
    pub fn new(name: &str, dims: &[&str], shape: &[u64], dtype: &str) -> Self {
        Self {
            name: name.to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            shape: shape.to_vec(),
            chunks: shape.to_vec(),
            dtype: dtype.to_string(),
            fill_value: Value::Null,
            attrs: Map::new(),
            values: None,
        }
    }

    /// Override the chunk shape.
    pub fn chunks(mut self, chunks: &[u64]) -> Self {
        self.chunks = chunks.to_vec();
        self
    }

    /// Set one attribute.
    pub fn attr(mut self, key: &str, value: Value) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    /// Merge a map of attributes.
    pub fn attrs(mut self, attrs: Map<String, Value>) -> Self {
        self.attrs.extend(attrs);
        self
    }

    /// Set the fill value.
    pub fn fill_value(mut self, value: Value) -> Self {
        self.fill_value = value;
        self
    }

    /// Set the values of an unchunked 1-D array.
    pub fn values(mut self, values: &[f64]) -> Self {
        self.values = Some(values.to_vec());
        self
    }

    /// Encode `values` as the raw bytes of chunk `0`.
    ///
    /// Panics on dtypes other than `<f8`, `<f4`, `<i8` and `<i4`.
    pub fn chunk_bytes(&self) -> Option<Vec<u8>> {
        let values = self.values.as_ref()?;
        let bytes = match self.dtype.as_str() {
            "<f8" => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
            "<f4" => values.iter().flat_map(|&v| (v as f32).to_le_bytes()).collect(),
            "<i8" => values.iter().flat_map(|&v| (v as i64).to_le_bytes()).collect(),
            "<i4" => values.iter().flat_map(|&v| (v as i32).to_le_bytes()).collect(),
            other => panic!("no chunk encoding for dtype {other}"),
        };
        Some(bytes)
    }

    /// The `.zarray` document.
    pub fn zarray(&self) -> Value {
        json!({
            "chunks": self.chunks,
            "compressor": null,
            "dtype": self.dtype,
            "fill_value": self.fill_value,
            "filters": null,
            "order": "C",
            "shape": self.shape,
            "zarr_format": 2
        })
    }

    /// The `.zattrs` document, including `_ARRAY_DIMENSIONS`.
    pub fn zattrs(&self) -> Value {
        let mut attrs = Map::new();
        attrs.insert("_ARRAY_DIMENSIONS".to_string(), json!(self.dims));
        attrs.extend(self.attrs.clone());
        Value::Object(attrs)
    }
}

/// A Zarr v2 cube layout written into a directory.
#[derive(Debug, Clone, Default)]
pub struct CubeFixture {
    attrs: Map<String, Value>,
    arrays: Vec<ArrayFixture>,
    consolidated: bool,
}

impl CubeFixture {
    /// An empty group.
    pub fn new() -> Self {
        Self::default()
    }

    /// A valid cube with `time`, `lat`, `lon` coordinates, a `conc_chl`
    /// data variable and the `c2rcc_flags` flag band.
    ///
    /// Days count up from 2016-07-19 (day 17000). The grid starts at
    /// 50°N 10°E with a 0.25° step; latitude decreases.
    pub fn standard(time: u64, lat: u64, lon: u64) -> Self {
        let days: Vec<f64> = (0..time).map(|i| 17000.0 + i as f64).collect();
        let lats: Vec<f64> = (0..lat).map(|i| 50.0 - 0.25 * i as f64).collect();
        let lons: Vec<f64> = (0..lon).map(|i| 10.0 + 0.25 * i as f64).collect();
        Self::new()
            .attr("title", json!("Test Cube"))
            .attr("time_coverage_start", json!("2017-01-16T10:09:22"))
            .array(
                ArrayFixture::new("time", &["time"], &[time], "<i8")
                    .fill_value(json!(0))
                    .values(&days)
                    .attr("units", json!("days since 1970-01-01"))
                    .attr("calendar", json!("gregorian")),
            )
            .array(
                ArrayFixture::new("lat", &["lat"], &[lat], "<f8")
                    .fill_value(json!("NaN"))
                    .values(&lats)
                    .attr("units", json!("degrees_north")),
            )
            .array(
                ArrayFixture::new("lon", &["lon"], &[lon], "<f8")
                    .fill_value(json!("NaN"))
                    .values(&lons)
                    .attr("units", json!("degrees_east")),
            )
            .array(
                ArrayFixture::new("conc_chl", &["time", "lat", "lon"], &[time, lat, lon], "<f4")
                    .chunks(&[1, lat, lon])
                    .fill_value(json!("NaN"))
                    .attr("long_name", json!("Chlorophyll concentration"))
                    .attr("units", json!("mg m^-3")),
            )
            .array(
                ArrayFixture::new("c2rcc_flags", &["time", "lat", "lon"], &[time, lat, lon], "<i4")
                    .chunks(&[1, lat, lon])
                    .fill_value(json!(0))
                    .attrs(example_flag_attrs()),
            )
    }

    /// Set a group attribute.
    pub fn attr(mut self, key: &str, value: Value) -> Self {
        self.attrs.insert(key.to_string(), value);
        self
    }

    /// Add an array, replacing one with the same name.
    pub fn array(mut self, array: ArrayFixture) -> Self {
        self.arrays.retain(|a| a.name != array.name);
        self.arrays.push(array);
        self
    }

    /// Remove an array by name.
    pub fn without(mut self, name: &str) -> Self {
        self.arrays.retain(|a| a.name != name);
        self
    }

    /// Modify an array in place.
    pub fn with_array(mut self, name: &str, f: impl FnOnce(ArrayFixture) -> ArrayFixture) -> Self {
        if let Some(pos) = self.arrays.iter().position(|a| a.name == name) {
            let array = self.arrays.remove(pos);
            self.arrays.insert(pos, f(array));
        }
        self
    }

    /// Also write a consolidated `.zmetadata` document.
    pub fn consolidated(mut self, consolidated: bool) -> Self {
        self.consolidated = consolidated;
        self
    }

    /// Write the cube below `root`, creating it if needed.
    pub fn write(&self, root: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(root)?;
        let zgroup = json!({ "zarr_format": 2 });
        let zattrs = Value::Object(self.attrs.clone());
        write_json(&root.join(".zgroup"), &zgroup)?;
        write_json(&root.join(".zattrs"), &zattrs)?;

        let mut consolidated = Map::new();
        consolidated.insert(".zgroup".to_string(), zgroup);
        consolidated.insert(".zattrs".to_string(), zattrs);

        for array in &self.arrays {
            let dir = root.join(&array.name);
            fs::create_dir_all(&dir)?;
            write_json(&dir.join(".zarray"), &array.zarray())?;
            write_json(&dir.join(".zattrs"), &array.zattrs())?;
            if let Some(bytes) = array.chunk_bytes() {
                fs::write(dir.join("0"), bytes)?;
            }
            consolidated.insert(format!("{}/.zarray", array.name), array.zarray());
            consolidated.insert(format!("{}/.zattrs", array.name), array.zattrs());
        }

        if self.consolidated {
            let zmetadata = json!({
                "metadata": consolidated,
                "zarr_consolidated_format": 1
            });
            write_json(&root.join(".zmetadata"), &zmetadata)?;
        }

        Ok(root.to_path_buf())
    }

    /// Write the cube into a fresh temporary directory as `cube.zarr`.
    pub fn write_temp(&self) -> (tempfile::TempDir, PathBuf) {
        let dir = crate::temp_test_dir_with_prefix("cube_test_");
        let path = self
            .write(&dir.path().join("cube.zarr"))
            .expect("Failed to write fixture cube");
        (dir, path)
    }
}

fn write_json(path: &Path, value: &Value) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_flag_attrs() {
        let attrs = example_flag_attrs();
        assert!(!attrs.contains_key("_ARRAY_DIMENSIONS"));
        assert_eq!(attrs["flag_masks"].as_array().unwrap().len(), 21);
        assert_eq!(
            attrs["flag_meanings"].as_str().unwrap(),
            C2RCC_FLAG_MEANINGS.join(" ")
        );
    }

    #[test]
    fn test_write_standard_cube() {
        let (_dir, path) = CubeFixture::standard(2, 4, 8).consolidated(true).write_temp();
        assert!(path.join(".zgroup").is_file());
        assert!(path.join(".zmetadata").is_file());
        assert!(path.join("c2rcc_flags/.zarray").is_file());

        let zattrs: Value =
            serde_json::from_slice(&fs::read(path.join("c2rcc_flags/.zattrs")).unwrap()).unwrap();
        assert_eq!(zattrs["_ARRAY_DIMENSIONS"], json!(["time", "lat", "lon"]));
        assert_eq!(zattrs["flag_coding_name"], "c2rcc_flags");

        let lat = fs::read(path.join("lat/0")).unwrap();
        assert_eq!(lat.len(), 4 * 8);
        assert_eq!(&lat[..8], &50.0f64.to_le_bytes());
        assert!(!path.join("c2rcc_flags/0.0.0").exists());
    }

    #[test]
    fn test_array_replace_and_remove() {
        let cube = CubeFixture::standard(1, 2, 2)
            .without("conc_chl")
            .with_array("lat", |a| a.attr("units", json!("m")));
        assert!(cube.arrays.iter().all(|a| a.name != "conc_chl"));
        let lat = cube.arrays.iter().find(|a| a.name == "lat").unwrap();
        assert_eq!(lat.attrs["units"], "m");
    }
}
