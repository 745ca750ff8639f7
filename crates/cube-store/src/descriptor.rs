//! Dataset and variable descriptors.
//!
//! Descriptors summarize a cube's structure (dimensions, variables, attributes)
//! as plain serializable values, independent of how the store lays out its
//! metadata. A dataset descriptor also carries the cube's spatial and temporal
//! extent, taken from CF/ACDD attributes where present and from coordinate
//! values otherwise.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use flag_coding::descriptor::ARRAY_DIMENSIONS;

use crate::error::Result;
use crate::store::{ArrayMetadata, CubeStore};
use crate::values::{is_numeric_dtype, read_coordinate_values};
use crate::verify::XY_VAR_NAMES;

/// Description of one variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub dtype: String,
    pub dims: Vec<String>,
    pub ndim: usize,
    pub shape: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<u64>>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attrs: Map<String, Value>,
    /// Values of a numeric dimension coordinate, when they could be read.
    #[serde(skip)]
    pub values: Option<Vec<f64>>,
}

impl VariableDescriptor {
    /// Describe an array. `_ARRAY_DIMENSIONS` is dropped from the attributes.
    pub fn from_array(array: &ArrayMetadata) -> Self {
        let mut attrs = array.attributes.clone();
        attrs.remove(ARRAY_DIMENSIONS);
        Self {
            name: array.path.clone(),
            dtype: array.dtype.clone(),
            dims: array.dimensions.clone(),
            ndim: array.dimensions.len(),
            shape: array.shape.clone(),
            chunks: array.chunks.clone(),
            attrs,
            values: None,
        }
    }

    /// Whether this is a dimension coordinate (1-D, named after its dimension).
    pub fn is_dimension_coordinate(&self) -> bool {
        self.ndim == 1 && self.dims[0] == self.name
    }

    /// Total number of elements.
    pub fn size(&self) -> u64 {
        self.shape.iter().product()
    }

    /// A string attribute.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(Value::as_str)
    }
}

/// Description of a whole dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub id: String,
    pub dims: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coords: Vec<VariableDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_vars: Vec<VariableDescriptor>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attrs: Map<String, Value>,
    /// Coordinate reference system name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_crs: Option<String>,
    /// Bounding box as `[x_min, y_min, x_max, y_max]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_coverage: Option<[f64; 4]>,
    /// Grid cell size along x, in CRS units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_resolution: Option<f64>,
    /// Start and end of the time range, either of which may be open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_coverage: Option<(Option<String>, Option<String>)>,
    /// ISO 8601 duration between time steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal_resolution: Option<String>,
}

impl DatasetDescriptor {
    /// Describe the contents of an opened store.
    ///
    /// Dimension coordinates and their bounds variables become `coords`;
    /// everything else is a data variable.
    pub fn from_store(store: &CubeStore) -> Result<Self> {
        let dims = store.dimension_sizes()?;
        let variables: Vec<VariableDescriptor> =
            store.arrays().map(VariableDescriptor::from_array).collect();

        let bounds_names: Vec<String> = variables
            .iter()
            .filter(|v| v.is_dimension_coordinate())
            .map(|v| {
                v.attr_str("bounds")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_bnds", v.name))
            })
            .collect();

        let (mut coords, data_vars): (Vec<_>, Vec<_>) = variables
            .into_iter()
            .partition(|v| v.is_dimension_coordinate() || bounds_names.contains(&v.name));

        for var in coords
            .iter_mut()
            .filter(|v| v.is_dimension_coordinate() && is_numeric_dtype(&v.dtype))
        {
            match read_coordinate_values(store, &var.name) {
                Ok(values) => var.values = Some(values),
                Err(e) => tracing::warn!(
                    variable = %var.name,
                    error = %e,
                    "Cannot read coordinate values"
                ),
            }
        }

        let mut dataset = Self {
            id: store.id(),
            dims,
            coords,
            data_vars,
            attrs: store.attributes().clone(),
            ..Default::default()
        };
        dataset.derive_extent();
        Ok(dataset)
    }

    /// Fill the spatial and temporal extent from attributes and coordinates.
    ///
    /// ACDD attributes (`geospatial_*`, `time_coverage_*`) win over values
    /// computed from the coordinates.
    pub fn derive_extent(&mut self) {
        let attr_f64 = |key: &str| self.attrs.get(key).and_then(Value::as_f64);
        let attr_str = |key: &str| {
            self.attrs
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let xy = XY_VAR_NAMES.into_iter().find_map(|(x, y)| {
            let x = self.coord(x)?;
            let y = self.coord(y)?;
            Some((axis_extent(x)?, axis_extent(y)?, x.name == "lon"))
        });

        let geographic = xy.is_some_and(|(_, _, lon_lat)| lon_lat);
        let spatial_crs = attr_str("crs")
            .or_else(|| attr_str("geospatial_bounds_crs"))
            .or_else(|| geographic.then(|| "WGS84".to_string()));
        let spatial_coverage = attr_bbox(&self.attrs)
            .or_else(|| xy.map(|(x, y, _)| [x.min, y.min, x.max, y.max]));
        let spatial_resolution = attr_f64("geospatial_lon_resolution")
            .or_else(|| xy.map(|(x, _, _)| x.resolution).filter(|r| *r > 0.0));

        let start = attr_str("time_coverage_start");
        let end = attr_str("time_coverage_end");
        let temporal_coverage = (start.is_some() || end.is_some()).then_some((start, end));
        let temporal_resolution = attr_str("time_coverage_resolution");

        self.spatial_crs = spatial_crs;
        self.spatial_coverage = spatial_coverage;
        self.spatial_resolution = spatial_resolution;
        self.temporal_coverage = temporal_coverage;
        self.temporal_resolution = temporal_resolution;
    }

    /// Look up a coordinate variable.
    pub fn coord(&self, name: &str) -> Option<&VariableDescriptor> {
        self.coords.iter().find(|v| v.name == name)
    }

    /// Look up a data variable.
    pub fn data_var(&self, name: &str) -> Option<&VariableDescriptor> {
        self.data_vars.iter().find(|v| v.name == name)
    }

    /// Look up any variable.
    pub fn variable(&self, name: &str) -> Option<&VariableDescriptor> {
        self.coord(name).or_else(|| self.data_var(name))
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Render a human-readable summary.
    ///
    /// ```text
    /// <Dataset 'cube.zarr'>
    /// Dimensions:        (lat: 100, lon: 200, time: 5)
    /// Coordinates:
    ///   * time           (time) int64 ...
    /// Data variables:
    ///     precipitation  (time, lat, lon) float64 ...
    /// Attributes:
    ///     title:  Test Cube
    /// ```
    pub fn dump(&self) -> String {
        let col_width = self
            .coords
            .iter()
            .chain(&self.data_vars)
            .map(|v| v.name.len())
            .max()
            .unwrap_or(0)
            + 6;

        let mut out = String::new();
        let _ = writeln!(out, "<Dataset '{}'>", self.id);

        let dims = self
            .dims
            .iter()
            .map(|(name, size)| format!("{name}: {size}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "{:<col_width$}({dims})", "Dimensions:");

        if !self.coords.is_empty() {
            out.push_str("Coordinates:\n");
            for var in &self.coords {
                let marker = if var.is_dimension_coordinate() { '*' } else { ' ' };
                summarize_variable(&mut out, var, marker, col_width);
            }
        }

        out.push_str("Data variables:\n");
        if self.data_vars.is_empty() {
            out.push_str("    *empty*\n");
        }
        for var in &self.data_vars {
            summarize_variable(&mut out, var, ' ', col_width);
        }

        if !self.attrs.is_empty() {
            out.push_str("Attributes:\n");
            let key_width = self.attrs.keys().map(|k| k.len() + 1).max().unwrap_or(0) + 2;
            for (key, value) in &self.attrs {
                let key = format!("{key}:");
                let _ = writeln!(out, "    {key:<key_width$}{}", attr_to_string(value));
            }
        }

        out
    }
}

/// `[lon_min, lat_min, lon_max, lat_max]` from the ACDD `geospatial_*` attributes.
fn attr_bbox(attrs: &Map<String, Value>) -> Option<[f64; 4]> {
    let get = |key: &str| attrs.get(key).and_then(Value::as_f64);
    Some([
        get("geospatial_lon_min")?,
        get("geospatial_lat_min")?,
        get("geospatial_lon_max")?,
        get("geospatial_lat_max")?,
    ])
}

/// Cell-edge extent of one axis.
#[derive(Debug, Clone, Copy)]
struct AxisExtent {
    min: f64,
    max: f64,
    resolution: f64,
}

/// Extent of a coordinate from its values, widened by half a cell on each
/// side. Non-finite values are ignored.
fn axis_extent(var: &VariableDescriptor) -> Option<AxisExtent> {
    let values = var.values.as_ref()?;
    let (min, max) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })?;
    let resolution = match values.as_slice() {
        [a, b, ..] if (b - a).is_finite() => (b - a).abs(),
        _ => 0.0,
    };
    Some(AxisExtent {
        min: min - resolution / 2.0,
        max: max + resolution / 2.0,
        resolution,
    })
}

fn summarize_variable(out: &mut String, var: &VariableDescriptor, marker: char, col_width: usize) {
    let first = format!("  {marker} {} ", var.name);
    let _ = writeln!(
        out,
        "{first:<col_width$}({}) {} ...",
        var.dims.join(", "),
        var.dtype
    );
}

fn attr_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
