//! Data-cube layout verification.
//!
//! A valid cube
//! - defines two spatial x,y coordinate variables (`lon`/`lat` or `x`/`y`)
//!   that are 1-D, non-empty, and named after their own dimension;
//! - defines a 1-D, non-empty `time` coordinate variable with datetime
//!   encoding and strictly increasing values;
//! - has finite `lon` values within -180..180 and finite `lat` values within
//!   -90..90;
//! - has valid bounds variables for those coordinates, if any;
//! - has data variables that all share the same dimensions, ordered
//!   `(time, ..., y, x)`, and the same chunk sizes.
//!
//! Value checks run only for coordinates whose values were read into the
//! descriptor.

use crate::descriptor::{DatasetDescriptor, VariableDescriptor};
use crate::error::{CubeStoreError, Result};

/// Candidate names of the spatial coordinate variables, as (x, y) pairs.
pub const XY_VAR_NAMES: [(&str, &str); 2] = [("lon", "lat"), ("x", "y")];

/// Name of the time coordinate variable.
pub const TIME_VAR_NAME: &str = "time";

/// Verify a dataset against the cube conventions.
///
/// Returns a list of issues, which is empty if the dataset is a valid cube.
pub fn verify_cube(dataset: &DatasetDescriptor) -> Vec<String> {
    let mut report = Vec::new();

    let xy_var_names = XY_VAR_NAMES
        .into_iter()
        .find(|(x, y)| dataset.variable(x).is_some() && dataset.variable(y).is_some());
    if xy_var_names.is_none() {
        report.push("missing spatial x,y coordinate variables".to_string());
    }

    let time_var_name = dataset.variable(TIME_VAR_NAME).map(|_| TIME_VAR_NAME);
    if time_var_name.is_none() {
        report.push("missing time coordinate variable".to_string());
    }

    if let Some(name) = time_var_name {
        check_time(dataset, name, &mut report);
    }
    if let Some((x, y)) = xy_var_names {
        let x_var = check_coord_var(dataset, x, &mut report);
        let y_var = check_coord_var(dataset, y, &mut report);
        if (x, y) == ("lon", "lat") {
            if let Some(var) = x_var {
                check_lon_or_lat(var, -180.0, 180.0, &mut report);
            }
            if let Some(var) = y_var {
                check_lon_or_lat(var, -90.0, 90.0, &mut report);
            }
        }
    }

    if let (Some((x, y)), Some(time)) = (xy_var_names, time_var_name) {
        check_data_variables(dataset, x, y, time, &mut report);
    }

    report
}

/// Verify a dataset and fail with all issues if it is not a valid cube.
pub fn assert_cube(dataset: &DatasetDescriptor, name: Option<&str>) -> Result<()> {
    let report = verify_cube(dataset);
    if report.is_empty() {
        return Ok(());
    }
    let name = name.unwrap_or(&dataset.id);
    Err(CubeStoreError::InvalidCube(format!(
        "Dataset '{}' is not a valid data cube, because:\n- {}.",
        name,
        report.join(";\n- ")
    )))
}

fn check_data_variables(
    dataset: &DatasetDescriptor,
    x_name: &str,
    y_name: &str,
    time_name: &str,
    report: &mut Vec<String>,
) {
    // Falls back to the variable name when a coordinate has no dimensions.
    let dim_of = |name: &str| {
        dataset
            .variable(name)
            .and_then(|v| v.dims.first())
            .cloned()
            .unwrap_or_else(|| name.to_string())
    };
    let (x_dim, y_dim, time_dim) = (dim_of(x_name), dim_of(y_name), dim_of(time_name));

    let mut first: Option<&VariableDescriptor> = None;
    for var in &dataset.data_vars {
        let dims = &var.dims;
        let n = dims.len();
        if n < 3 || dims[0] != time_dim || dims[n - 2] != y_dim || dims[n - 1] != x_dim {
            report.push(format!(
                "dimensions of data variable '{}' must be ('{}', ..., '{}', '{}'), but were {}",
                var.name,
                time_dim,
                y_dim,
                x_dim,
                format_dims(dims)
            ));
        }

        let Some(first_var) = first else {
            first = Some(var);
            continue;
        };

        if first_var.dims != var.dims {
            report.push(format!(
                "dimensions of all data variables must be same, but found {} for '{}' and {} for '{}'",
                format_dims(&first_var.dims),
                first_var.name,
                format_dims(&var.dims),
                var.name
            ));
        }

        if first_var.chunks != var.chunks {
            report.push(format!(
                "all data variables must have same chunk sizes, but found {} for '{}' and {} for '{}'",
                format_chunks(&first_var.chunks),
                first_var.name,
                format_chunks(&var.chunks),
                var.name
            ));
        }
    }
}

fn check_coord_var<'a>(
    dataset: &'a DatasetDescriptor,
    var_name: &str,
    report: &mut Vec<String>,
) -> Option<&'a VariableDescriptor> {
    let Some(var) = dataset.variable(var_name) else {
        report.push(format!("missing coordinate variable '{var_name}'"));
        return None;
    };

    if var.dims.len() != 1 || var.dims[0] != var_name {
        report.push(format!(
            "coordinate variable '{var_name}' must have a single dimension '{var_name}'"
        ));
        return None;
    }

    if var.size() == 0 {
        report.push(format!("coordinate variable '{var_name}' must not be empty"));
        return None;
    }

    let bnds_name = var
        .attr_str("bounds")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{var_name}_bnds"));
    if let Some(bnds_var) = dataset.variable(&bnds_name) {
        let expected_shape = vec![var.size(), 2];
        if bnds_var.dims.len() != 2 || bnds_var.dims[0] != var_name {
            report.push(format!(
                "bounds coordinate variable '{bnds_name}' must have dimensions ('{var_name}', <bounds_dim>)"
            ));
        }
        if bnds_var.shape != expected_shape {
            report.push(format!(
                "shape of bounds coordinate variable '{bnds_name}' must be {:?} but was {:?}",
                expected_shape, bnds_var.shape
            ));
        }
        if bnds_var.dtype != var.dtype {
            report.push(format!(
                "type of bounds coordinate variable '{bnds_name}' must be {} but was {}",
                var.dtype, bnds_var.dtype
            ));
        }
    }

    Some(var)
}

fn check_time(dataset: &DatasetDescriptor, name: &str, report: &mut Vec<String>) {
    let Some(var) = check_coord_var(dataset, name, report) else {
        return;
    };

    // Zarr stores encode time either natively or as CF "<unit> since <epoch>".
    let cf_encoded = var.attr_str("units").is_some_and(|u| u.contains(" since "));
    if !var.dtype.starts_with("datetime64") && !cf_encoded {
        report.push(format!(
            "type of coordinate variable '{name}' must be datetime64 or carry CF time units"
        ));
    }

    if let Some(values) = &var.values {
        // NaN compares false, so it fails the check too.
        if !values.windows(2).all(|w| w[1] > w[0]) {
            report.push(format!(
                "values of coordinate variable '{name}' must be monotonic increasing"
            ));
        }
    }
}

fn check_lon_or_lat(var: &VariableDescriptor, min: f64, max: f64, report: &mut Vec<String>) {
    let Some(values) = &var.values else {
        return;
    };
    let name = &var.name;

    if !values.iter().all(|v| v.is_finite()) {
        report.push(format!("values of coordinate variable '{name}' must be finite"));
    }
    if values.iter().any(|&v| v < min || v > max) {
        report.push(format!(
            "values of coordinate variable '{name}' must be in the range {min:?} to {max:?}"
        ));
    }
}

fn format_dims(dims: &[String]) -> String {
    let quoted: Vec<String> = dims.iter().map(|d| format!("'{d}'")).collect();
    format!("({})", quoted.join(", "))
}

fn format_chunks(chunks: &Option<Vec<u64>>) -> String {
    match chunks {
        Some(chunks) => format!("{chunks:?}"),
        None => "none".to_string(),
    }
}
