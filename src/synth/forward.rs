use log::{debug, warn};
use ndarray::{Array2, Ix2};

use crate::data::model::{numeric, ArrayMap};
use crate::error::{Error, Result};

/// Keys tried, in order, when no explicit forward-matrix key is configured.
pub const FORWARD_ALIASES: [&str; 4] = ["fwd", "forward", "leadfield", "L"];

/// Project time × region activity to electrodes × time.
pub fn project(forward: &Array2<f64>, combined: &Array2<f64>) -> Result<Array2<f64>> {
    if forward.ncols() != combined.ncols() {
        return Err(Error::ShapeMismatch {
            forward_regions: forward.ncols(),
            source_regions: combined.ncols(),
        });
    }
    Ok(forward.dot(&combined.t()))
}

/// Pick the electrodes × regions forward matrix out of a decoded file.
pub fn resolve_forward(arrays: &ArrayMap, key: Option<&str>) -> Result<Array2<f64>> {
    let name = match key {
        Some(k) => k,
        None => FORWARD_ALIASES
            .iter()
            .copied()
            .find(|k| arrays.contains_key(*k))
            .ok_or_else(|| {
                let available: Vec<&str> = arrays.keys().map(String::as_str).collect();
                Error::MissingVariable {
                    name: format!("forward matrix (tried {FORWARD_ALIASES:?}, found {available:?})"),
                }
            })?,
    };
    let forward = numeric(arrays, name)?
        .clone()
        .into_dimensionality::<Ix2>()
        .map_err(|e| Error::InvalidMetadata(format!("forward matrix '{name}': {e}")))?;
    debug!("forward matrix '{name}' has shape {:?}", forward.dim());
    if forward.ncols() <= forward.nrows() {
        warn!(
            "forward matrix {:?} has no more regions than electrodes; it may need transposing",
            forward.dim()
        );
    }
    Ok(forward)
}
