use std::collections::BTreeMap;

use ndarray::{s, Array1, Array2, Array3, ArrayD, ArrayView1, Axis, Dimension, Ix2, Ix3, IxDyn};

use crate::error::{Error, Result};

/// Raw region values at or above this bound are padding.
pub const PADDING_LIMIT: f64 = 10_000.0;

// ---------------------------------------------------------------------------
// Variable – one named entry of a decoded file
// ---------------------------------------------------------------------------

/// An entry decoded from one of the supported interchange formats.
///
/// Every numeric dtype is widened to `f64`; scalars are 0-d arrays.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Numeric(ArrayD<f64>),
    /// Object-typed container member, kept byte-for-byte.
    Opaque(OpaqueEntry),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpaqueEntry {
    /// dtype descriptor as written in the member header (e.g. `|O`).
    pub descr: String,
    pub bytes: Vec<u8>,
}

impl Variable {
    pub fn scalar(value: f64) -> Self {
        Variable::Numeric(ArrayD::from_elem(IxDyn(&[]), value))
    }

    pub fn as_array(&self) -> Option<&ArrayD<f64>> {
        match self {
            Variable::Numeric(a) => Some(a),
            Variable::Opaque(_) => None,
        }
    }
}

/// Decoded file contents: variable name → value.
pub type ArrayMap = BTreeMap<String, Variable>;

/// Look up a numeric variable by name.
pub fn numeric<'a>(arrays: &'a ArrayMap, name: &str) -> Result<&'a ArrayD<f64>> {
    match arrays.get(name) {
        Some(Variable::Numeric(a)) => Ok(a),
        Some(Variable::Opaque(_)) => Err(Error::InvalidMetadata(format!(
            "'{name}' is an object entry, expected a numeric array"
        ))),
        None => Err(Error::MissingVariable {
            name: name.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// RegionId – padded region slots
// ---------------------------------------------------------------------------

/// A slot of a padded per-patch region list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionId {
    Region(usize),
    Padding,
}

impl RegionId {
    /// Padding is anything negative, at or above [`PADDING_LIMIT`], or NaN.
    pub fn from_raw(value: f64) -> Self {
        if value.is_nan() || value < 0.0 || value >= PADDING_LIMIT {
            RegionId::Padding
        } else {
            RegionId::Region(value as usize)
        }
    }

    pub fn is_padding(self) -> bool {
        matches!(self, RegionId::Padding)
    }

    pub fn index(self) -> Option<usize> {
        match self {
            RegionId::Region(r) => Some(r),
            RegionId::Padding => None,
        }
    }
}

fn raw_label(value: f64) -> i64 {
    if value.is_nan() {
        -1
    } else {
        value as i64
    }
}

// ---------------------------------------------------------------------------
// Rank-tagged metadata tables
// ---------------------------------------------------------------------------

/// Waveform index table: one index per example or one per source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceIndex {
    PerExample(Array1<i64>),
    PerSource(Array2<i64>),
}

impl SourceIndex {
    pub fn get(&self, example: usize, source: usize) -> i64 {
        match self {
            SourceIndex::PerExample(a) => a[example],
            SourceIndex::PerSource(a) => a[[example, source]],
        }
    }
}

/// A per-example row table, shared by all sources or given per source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceTable {
    PerExample(Array2<f64>),
    PerSource(Array3<f64>),
}

impl SourceTable {
    pub fn row(&self, example: usize, source: usize) -> ArrayView1<'_, f64> {
        match self {
            SourceTable::PerExample(a) => a.row(example),
            SourceTable::PerSource(a) => a.slice(s![example, source, ..]),
        }
    }

    /// Length of each row (levels for scale ratios, slots for decay weights).
    pub fn width(&self) -> usize {
        match self {
            SourceTable::PerExample(a) => a.ncols(),
            SourceTable::PerSource(a) => a.len_of(Axis(2)),
        }
    }

    fn examples(&self) -> usize {
        match self {
            SourceTable::PerExample(a) => a.nrows(),
            SourceTable::PerSource(a) => a.len_of(Axis(0)),
        }
    }

    fn from_array(name: &str, array: &ArrayD<f64>, sources: usize) -> Result<Self> {
        match array.ndim() {
            2 => Ok(SourceTable::PerExample(ranked::<Ix2>(name, array)?)),
            3 => {
                let table = ranked::<Ix3>(name, array)?;
                if table.len_of(Axis(1)) != sources {
                    return Err(Error::InvalidMetadata(format!(
                        "'{name}' has {} sources, selected_region has {sources}",
                        table.len_of(Axis(1))
                    )));
                }
                Ok(SourceTable::PerSource(table))
            }
            n => Err(Error::InvalidMetadata(format!(
                "'{name}' must be 2-D or 3-D, got {n}-D"
            ))),
        }
    }
}

fn ranked<D: Dimension>(name: &str, array: &ArrayD<f64>) -> Result<ndarray::Array<f64, D>> {
    array.clone().into_dimensionality::<D>().map_err(|e| {
        Error::InvalidMetadata(format!("'{name}' with shape {:?}: {e}", array.shape()))
    })
}

// ---------------------------------------------------------------------------
// DatasetMetadata
// ---------------------------------------------------------------------------

pub const SELECTED_REGION: &str = "selected_region";
pub const NMM_IDX: &str = "nmm_idx";
pub const SCALE_RATIO: &str = "scale_ratio";
pub const MAG_CHANGE: &str = "mag_change";
pub const CURRENT_SNR: &str = "current_snr";

/// Per-example synthesis recipe, validated and typed once at load time.
#[derive(Debug, Clone)]
pub struct DatasetMetadata {
    selected_region: Array3<RegionId>,
    labels: Array3<i64>,
    nmm_idx: SourceIndex,
    scale_ratio: SourceTable,
    mag_change: SourceTable,
    current_snr: Array1<f64>,
}

impl DatasetMetadata {
    /// Build typed metadata from a decoded metadata file.
    pub fn from_arrays(arrays: &ArrayMap) -> Result<Self> {
        let raw = numeric(arrays, SELECTED_REGION)?;
        let raw: Array3<f64> = match raw.ndim() {
            3 => ranked::<Ix3>(SELECTED_REGION, raw)?,
            // examples × max_patch_size: one source per example
            2 => ranked::<Ix2>(SELECTED_REGION, raw)?.insert_axis(Axis(1)),
            n => {
                return Err(Error::InvalidMetadata(format!(
                    "'{SELECTED_REGION}' must be 2-D or 3-D, got {n}-D"
                )))
            }
        };
        let (examples, sources, max_patch) = raw.dim();

        let nmm_idx = Self::parse_nmm_idx(numeric(arrays, NMM_IDX)?, examples, sources)?;
        let scale_ratio = SourceTable::from_array(SCALE_RATIO, numeric(arrays, SCALE_RATIO)?, sources)?;
        let mag_change = SourceTable::from_array(MAG_CHANGE, numeric(arrays, MAG_CHANGE)?, sources)?;
        if mag_change.width() != max_patch {
            return Err(Error::InvalidMetadata(format!(
                "'{MAG_CHANGE}' has {} slots per patch, '{SELECTED_REGION}' has {max_patch}",
                mag_change.width()
            )));
        }

        let snr = numeric(arrays, CURRENT_SNR)?;
        if snr.ndim() > 2 || snr.len() != examples {
            return Err(Error::InvalidMetadata(format!(
                "'{CURRENT_SNR}' with shape {:?} does not hold one value per example",
                snr.shape()
            )));
        }
        let current_snr: Array1<f64> = snr.iter().copied().collect();

        for (name, rows) in [
            (SCALE_RATIO, scale_ratio.examples()),
            (MAG_CHANGE, mag_change.examples()),
        ] {
            if rows != examples {
                return Err(Error::InvalidMetadata(format!(
                    "'{name}' has {rows} examples, '{SELECTED_REGION}' has {examples}"
                )));
            }
        }

        Ok(DatasetMetadata {
            selected_region: raw.mapv(RegionId::from_raw),
            labels: raw.mapv(raw_label),
            nmm_idx,
            scale_ratio,
            mag_change,
            current_snr,
        })
    }

    fn parse_nmm_idx(array: &ArrayD<f64>, examples: usize, sources: usize) -> Result<SourceIndex> {
        let to_index = |v: f64| if v.is_nan() { -1 } else { v as i64 };
        let index = match array.ndim() {
            0 | 1 => SourceIndex::PerExample(array.iter().copied().map(to_index).collect()),
            2 => {
                let table = ranked::<Ix2>(NMM_IDX, array)?;
                if table.ncols() == sources {
                    SourceIndex::PerSource(table.mapv(to_index))
                } else if table.ncols() == 1 {
                    SourceIndex::PerExample(table.column(0).mapv(to_index))
                } else {
                    return Err(Error::InvalidMetadata(format!(
                        "'{NMM_IDX}' has {} columns, expected 1 or {sources}",
                        table.ncols()
                    )));
                }
            }
            n => {
                return Err(Error::InvalidMetadata(format!(
                    "'{NMM_IDX}' must be 1-D or 2-D, got {n}-D"
                )))
            }
        };
        let rows = match &index {
            SourceIndex::PerExample(a) => a.len(),
            SourceIndex::PerSource(a) => a.nrows(),
        };
        if rows != examples {
            return Err(Error::InvalidMetadata(format!(
                "'{NMM_IDX}' has {rows} examples, '{SELECTED_REGION}' has {examples}"
            )));
        }
        Ok(index)
    }

    pub fn num_examples(&self) -> usize {
        self.selected_region.len_of(Axis(0))
    }

    pub fn num_sources(&self) -> usize {
        self.selected_region.len_of(Axis(1))
    }

    pub fn max_patch_size(&self) -> usize {
        self.selected_region.len_of(Axis(2))
    }

    /// Largest unpadded region id across every patch.
    pub fn max_region(&self) -> Option<usize> {
        self.selected_region.iter().filter_map(|id| id.index()).max()
    }

    /// Padded region slots of one patch, center first.
    pub fn patch(&self, example: usize, source: usize) -> ArrayView1<'_, RegionId> {
        self.selected_region.slice(s![example, source, ..])
    }

    /// `(slot, region)` pairs of the unpadded entries of one patch, in slot order.
    pub fn unpadded(&self, example: usize, source: usize) -> Vec<(usize, usize)> {
        self.patch(example, source)
            .iter()
            .enumerate()
            .filter_map(|(slot, id)| id.index().map(|r| (slot, r)))
            .collect()
    }

    /// Raw padded ids of one example (sources × max_patch_size).
    pub fn labels(&self, example: usize) -> Array2<i64> {
        self.labels.index_axis(Axis(0), example).to_owned()
    }

    pub fn nmm_index(&self, example: usize, source: usize) -> i64 {
        self.nmm_idx.get(example, source)
    }

    pub fn scale_levels(&self, example: usize, source: usize) -> ArrayView1<'_, f64> {
        self.scale_ratio.row(example, source)
    }

    /// Decay weights of one patch, slot-aligned with [`Self::patch`].
    pub fn decay(&self, example: usize, source: usize) -> ArrayView1<'_, f64> {
        self.mag_change.row(example, source)
    }

    pub fn snr(&self, example: usize) -> f64 {
        self.current_snr[example]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array};

    fn dyn_array<D: Dimension>(a: Array<f64, D>) -> Variable {
        Variable::Numeric(a.into_dyn())
    }

    fn two_source_arrays() -> ArrayMap {
        let mut m = ArrayMap::new();
        m.insert(
            SELECTED_REGION.into(),
            dyn_array(
                Array::from_shape_vec(
                    (1, 2, 3),
                    vec![5.0, 12.0, -1.0, 15213.0, 15213.0, 15213.0],
                )
                .unwrap(),
            ),
        );
        m.insert(NMM_IDX.into(), dyn_array(arr2(&[[3.0, 7.0]])));
        m.insert(SCALE_RATIO.into(), dyn_array(arr2(&[[20.0, 25.0]])));
        m.insert(
            MAG_CHANGE.into(),
            dyn_array(
                Array::from_shape_vec((1, 2, 3), vec![1.0, 0.5, -1.0, 1.0, 1.0, 1.0]).unwrap(),
            ),
        );
        m.insert(CURRENT_SNR.into(), dyn_array(arr2(&[[15.0]])));
        m
    }

    #[test]
    fn padding_is_negative_or_at_least_ten_thousand() {
        let raw = arr1(&[-1.0, 0.0, 5.0, 9999.0, 10000.0, 15213.0, f64::NAN]);
        let kept: Vec<usize> = raw.iter().filter_map(|&v| RegionId::from_raw(v).index()).collect();
        assert_eq!(kept, vec![0, 5, 9999]);
        assert!(RegionId::from_raw(-0.5).is_padding());
        assert_eq!(RegionId::from_raw(42.0), RegionId::Region(42));
    }

    #[test]
    fn resolves_layouts_once() {
        let meta = DatasetMetadata::from_arrays(&two_source_arrays()).unwrap();
        assert_eq!(meta.num_examples(), 1);
        assert_eq!(meta.num_sources(), 2);
        assert_eq!(meta.max_patch_size(), 3);
        assert_eq!(meta.nmm_index(0, 1), 7);
        // 2-D scale_ratio is shared by every source of the example
        assert_eq!(meta.scale_levels(0, 1).to_vec(), vec![20.0, 25.0]);
        assert_eq!(meta.unpadded(0, 0), vec![(0, 5), (1, 12)]);
        assert!(meta.unpadded(0, 1).is_empty());
        assert_eq!(meta.labels(0), arr2(&[[5, 12, -1], [15213, 15213, 15213]]));
        assert_eq!(meta.snr(0), 15.0);
        assert_eq!(meta.max_region(), Some(12));
    }

    #[test]
    fn per_example_nmm_index_is_shared() {
        let mut m = two_source_arrays();
        m.insert(NMM_IDX.into(), dyn_array(arr1(&[9.0])));
        let meta = DatasetMetadata::from_arrays(&m).unwrap();
        assert_eq!(meta.nmm_index(0, 0), 9);
        assert_eq!(meta.nmm_index(0, 1), 9);
    }

    #[test]
    fn rejects_inconsistent_ranks() {
        let mut m = two_source_arrays();
        m.insert(MAG_CHANGE.into(), dyn_array(arr2(&[[1.0, 0.5]])));
        assert!(matches!(
            DatasetMetadata::from_arrays(&m),
            Err(Error::InvalidMetadata(_))
        ));

        let mut m = two_source_arrays();
        m.remove(CURRENT_SNR);
        assert!(matches!(
            DatasetMetadata::from_arrays(&m),
            Err(Error::MissingVariable { .. })
        ));
    }
}
