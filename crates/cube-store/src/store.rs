//! Zarr store metadata reader.
//!
//! Reads the JSON metadata of a local directory store without touching chunk
//! data. Three layouts are understood:
//!
//! - consolidated Zarr v2 (`.zmetadata` at the root)
//! - plain Zarr v2 (`.zgroup`, `.zarray`, `.zattrs` per node)
//! - Zarr v3 (`zarr.json` per node)

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use walkdir::WalkDir;

use flag_coding::descriptor::ARRAY_DIMENSIONS;

use crate::error::{CubeStoreError, Result};

const ZGROUP: &str = ".zgroup";
const ZARRAY: &str = ".zarray";
const ZATTRS: &str = ".zattrs";
const ZMETADATA: &str = ".zmetadata";
const ZARR_JSON: &str = "zarr.json";

/// Zarr format version of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZarrFormat {
    V2,
    V3,
}

/// Options controlling how a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Read `.zmetadata` instead of walking the tree when it is present.
    pub use_consolidated: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            use_consolidated: true,
        }
    }
}

/// Metadata of one array in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMetadata {
    /// Path relative to the store root, `/`-separated.
    pub path: String,
    /// Format of the array's metadata.
    pub zarr_format: ZarrFormat,
    /// Array shape.
    pub shape: Vec<u64>,
    /// Regular chunk shape, if the chunk grid is regular.
    pub chunks: Option<Vec<u64>>,
    /// Normalized data type name (`int32`, `float64`, ...).
    pub dtype: String,
    /// Fill value as written in the metadata.
    pub fill_value: Value,
    /// Dimension names in storage order.
    pub dimensions: Vec<String>,
    /// Array attributes as stored.
    pub attributes: Map<String, Value>,
}

impl ArrayMetadata {
    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn size(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Whether the data type holds integers.
    pub fn is_integer(&self) -> bool {
        is_integer_dtype(&self.dtype)
    }
}

/// Read-only view of a store's metadata.
#[derive(Debug, Clone)]
pub struct CubeStore {
    root: PathBuf,
    format: ZarrFormat,
    consolidated: bool,
    attributes: Map<String, Value>,
    arrays: BTreeMap<String, ArrayMetadata>,
}

impl CubeStore {
    /// Open a store with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, OpenOptions::default())
    }

    /// Open a store.
    pub fn open_with(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.exists() {
            return Err(CubeStoreError::NotFound(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(CubeStoreError::NotAStore(root.display().to_string()));
        }

        let zmetadata = root.join(ZMETADATA);
        let store = if options.use_consolidated && zmetadata.is_file() {
            Self::read_consolidated(&root, &zmetadata)?
        } else {
            Self::read_tree(&root)?
        };

        tracing::debug!(
            root = %store.root.display(),
            format = ?store.format,
            consolidated = store.consolidated,
            arrays = store.arrays.len(),
            "Opened cube store"
        );

        Ok(store)
    }

    /// Store root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the store (last component of the root path).
    pub fn id(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.root.display().to_string())
    }

    /// Format of the root node.
    pub fn format(&self) -> ZarrFormat {
        self.format
    }

    /// Whether metadata was read from `.zmetadata`.
    pub fn is_consolidated(&self) -> bool {
        self.consolidated
    }

    /// Root group attributes.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// All arrays, ordered by path.
    pub fn arrays(&self) -> impl Iterator<Item = &ArrayMetadata> {
        self.arrays.values()
    }

    /// Look up an array by path.
    pub fn array(&self, path: &str) -> Result<&ArrayMetadata> {
        self.arrays
            .get(path.trim_matches('/'))
            .ok_or_else(|| CubeStoreError::VariableNotFound(path.to_string()))
    }

    /// Size of every dimension used by any array.
    pub fn dimension_sizes(&self) -> Result<BTreeMap<String, u64>> {
        let mut dims = BTreeMap::new();
        for array in self.arrays.values() {
            for (dim, &size) in array.dimensions.iter().zip(&array.shape) {
                match dims.get(dim) {
                    Some(&first) if first != size => {
                        return Err(CubeStoreError::DimensionConflict {
                            dim: dim.clone(),
                            first,
                            second: size,
                        });
                    }
                    Some(_) => {}
                    None => {
                        dims.insert(dim.clone(), size);
                    }
                }
            }
        }
        Ok(dims)
    }

    fn read_consolidated(root: &Path, zmetadata: &Path) -> Result<Self> {
        let doc = read_json(zmetadata)?;
        let metadata = doc
            .get("metadata")
            .and_then(Value::as_object)
            .ok_or_else(|| {
                CubeStoreError::invalid_metadata(display(zmetadata), "missing 'metadata' object")
            })?;

        let attributes = metadata
            .get(ZATTRS)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let mut arrays = BTreeMap::new();
        for (key, zarray) in metadata {
            let Some(path) = key.strip_suffix(ZARRAY) else {
                continue;
            };
            let path = path.trim_end_matches('/').to_string();
            let attrs = metadata
                .get(&format!("{path}/{ZATTRS}"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let source = format!("{}#{}", display(zmetadata), key);
            let array = parse_v2_array(&source, path.clone(), zarray, attrs)?;
            arrays.insert(path, array);
        }

        Ok(Self {
            root: root.to_path_buf(),
            format: ZarrFormat::V2,
            consolidated: true,
            attributes,
            arrays,
        })
    }

    fn read_tree(root: &Path) -> Result<Self> {
        let mut format = None;
        let mut attributes = Map::new();

        if root.join(ZGROUP).is_file() || root.join(ZARRAY).is_file() {
            format = Some(ZarrFormat::V2);
            let zattrs = root.join(ZATTRS);
            if zattrs.is_file() {
                attributes = as_object(&zattrs, read_json(&zattrs)?)?;
            }
        }

        let mut arrays = BTreeMap::new();
        for entry in WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if file_name != ZARRAY && file_name != ZARR_JSON {
                continue;
            }

            let file = entry.path();
            let node_dir = file.parent().unwrap_or(root);
            let path = relative_path(root, node_dir);
            let doc = read_json(file)?;

            if file_name == ZARRAY {
                let zattrs = node_dir.join(ZATTRS);
                let attrs = if zattrs.is_file() {
                    as_object(&zattrs, read_json(&zattrs)?)?
                } else {
                    Map::new()
                };
                let array = parse_v2_array(&display(file), path.clone(), &doc, attrs)?;
                arrays.insert(path, array);
                continue;
            }

            match doc.get("node_type").and_then(Value::as_str) {
                Some("array") => {
                    let array = parse_v3_array(&display(file), path.clone(), &doc)?;
                    arrays.insert(path, array);
                }
                Some("group") if path.is_empty() => {
                    format = Some(ZarrFormat::V3);
                    attributes = doc
                        .get("attributes")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                }
                Some("group") => {
                    tracing::debug!(group = %path, "Skipping nested group metadata");
                }
                other => {
                    return Err(CubeStoreError::invalid_metadata(
                        display(file),
                        format!("unknown node_type {other:?}"),
                    ));
                }
            }
        }

        // A root array is addressed by the store name rather than "".
        if let Some(mut array) = arrays.remove("") {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            array.path = name.clone();
            arrays.insert(name, array);
        }

        let format = match format {
            Some(format) => format,
            None => arrays
                .values()
                .next()
                .map(|a| a.zarr_format)
                .ok_or_else(|| CubeStoreError::NotAStore(display(root)))?,
        };

        Ok(Self {
            root: root.to_path_buf(),
            format,
            consolidated: false,
            attributes,
            arrays,
        })
    }
}

fn parse_v2_array(
    source: &str,
    path: String,
    zarray: &Value,
    attributes: Map<String, Value>,
) -> Result<ArrayMetadata> {
    let shape = u64_list(zarray.get("shape"))
        .ok_or_else(|| CubeStoreError::invalid_metadata(source, "missing or invalid 'shape'"))?;
    let chunks = u64_list(zarray.get("chunks"));
    let dtype = zarray
        .get("dtype")
        .map(normalize_v2_dtype)
        .ok_or_else(|| CubeStoreError::invalid_metadata(source, "missing 'dtype'"))?;
    let fill_value = zarray.get("fill_value").cloned().unwrap_or(Value::Null);

    let dimensions = string_list(attributes.get(ARRAY_DIMENSIONS)).ok_or_else(|| {
        CubeStoreError::invalid_metadata(source, format!("missing '{ARRAY_DIMENSIONS}' attribute"))
    })?;
    check_rank(source, &shape, &dimensions)?;

    Ok(ArrayMetadata {
        path,
        zarr_format: ZarrFormat::V2,
        shape,
        chunks,
        dtype,
        fill_value,
        dimensions,
        attributes,
    })
}

fn parse_v3_array(source: &str, path: String, doc: &Value) -> Result<ArrayMetadata> {
    let shape = u64_list(doc.get("shape"))
        .ok_or_else(|| CubeStoreError::invalid_metadata(source, "missing or invalid 'shape'"))?;
    let chunks = doc
        .get("chunk_grid")
        .filter(|grid| grid.get("name").and_then(Value::as_str) == Some("regular"))
        .and_then(|grid| u64_list(grid.pointer("/configuration/chunk_shape")));
    let dtype = match doc.get("data_type") {
        Some(Value::String(name)) => name.clone(),
        Some(Value::Object(ext)) => ext
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        _ => return Err(CubeStoreError::invalid_metadata(source, "missing 'data_type'")),
    };
    let fill_value = doc.get("fill_value").cloned().unwrap_or(Value::Null);
    let attributes = doc
        .get("attributes")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let dimensions = string_list(doc.get("dimension_names"))
        .or_else(|| string_list(attributes.get(ARRAY_DIMENSIONS)))
        .ok_or_else(|| {
            CubeStoreError::invalid_metadata(source, "array has no dimension names")
        })?;
    check_rank(source, &shape, &dimensions)?;

    Ok(ArrayMetadata {
        path,
        zarr_format: ZarrFormat::V3,
        shape,
        chunks,
        dtype,
        fill_value,
        dimensions,
        attributes,
    })
}

fn check_rank(source: &str, shape: &[u64], dimensions: &[String]) -> Result<()> {
    if shape.len() != dimensions.len() {
        return Err(CubeStoreError::invalid_metadata(
            source,
            format!(
                "shape has rank {} but {} dimension names are given",
                shape.len(),
                dimensions.len()
            ),
        ));
    }
    Ok(())
}

/// Map a NumPy-style v2 dtype (`<i4`, `|u1`, `<M8[ns]`) to a v3-style name.
pub fn normalize_v2_dtype(dtype: &Value) -> String {
    let Some(raw) = dtype.as_str() else {
        // Structured dtypes are lists of fields.
        return "structured".to_string();
    };
    let code = raw.trim_start_matches(['<', '>', '|', '=']);
    let mut chars = code.chars();
    let kind = chars.next().unwrap_or(' ');
    let rest = chars.as_str();
    let bits = rest.parse::<u32>().map(|bytes| bytes * 8);

    match (kind, bits) {
        ('b', Ok(8)) => "bool".to_string(),
        ('i', Ok(bits)) => format!("int{bits}"),
        ('u', Ok(bits)) => format!("uint{bits}"),
        ('f', Ok(bits)) => format!("float{bits}"),
        ('c', Ok(bits)) => format!("complex{bits}"),
        ('M', _) => format!("datetime64{}", rest.trim_start_matches('8')),
        ('m', _) => format!("timedelta64{}", rest.trim_start_matches('8')),
        _ => raw.to_string(),
    }
}

/// Whether a normalized dtype name denotes an integer type.
pub fn is_integer_dtype(dtype: &str) -> bool {
    matches!(
        dtype,
        "int8" | "int16" | "int32" | "int64" | "uint8" | "uint16" | "uint32" | "uint64"
    )
}

fn read_json(path: &Path) -> Result<Value> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| CubeStoreError::invalid_metadata(display(path), e.to_string()))
}

fn as_object(path: &Path, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(CubeStoreError::invalid_metadata(
            display(path),
            "expected a JSON object",
        )),
    }
}

fn u64_list(value: Option<&Value>) -> Option<Vec<u64>> {
    value?.as_array()?.iter().map(Value::as_u64).collect()
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value?
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

fn relative_path(root: &Path, dir: &Path) -> String {
    dir.strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
