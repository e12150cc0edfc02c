//! Shared fixtures for unit tests.

use ndarray::{Array, Array2, ArrayD};

use crate::data::model::{
    ArrayMap, DatasetMetadata, Variable, CURRENT_SNR, MAG_CHANGE, NMM_IDX, SCALE_RATIO,
    SELECTED_REGION,
};

/// Metadata arrays for the given tables.
pub fn metadata_arrays(
    selected: ArrayD<f64>,
    nmm_idx: ArrayD<f64>,
    scale_ratio: ArrayD<f64>,
    mag_change: ArrayD<f64>,
    current_snr: ArrayD<f64>,
) -> ArrayMap {
    let mut m = ArrayMap::new();
    m.insert(SELECTED_REGION.into(), Variable::Numeric(selected));
    m.insert(NMM_IDX.into(), Variable::Numeric(nmm_idx));
    m.insert(SCALE_RATIO.into(), Variable::Numeric(scale_ratio));
    m.insert(MAG_CHANGE.into(), Variable::Numeric(mag_change));
    m.insert(CURRENT_SNR.into(), Variable::Numeric(current_snr));
    m
}

/// One example, one source: patch `[5, 12, pad]`, decay `[1.0, 0.5, pad]`.
pub fn single_patch(scale: f64) -> DatasetMetadata {
    let arrays = metadata_arrays(
        Array::from_shape_vec((1, 1, 3), vec![5.0, 12.0, -1.0]).unwrap().into_dyn(),
        Array::from_shape_vec((1, 1), vec![0.0]).unwrap().into_dyn(),
        Array::from_shape_vec((1, 1, 1), vec![scale]).unwrap().into_dyn(),
        Array::from_shape_vec((1, 1, 3), vec![1.0, 0.5, -1.0]).unwrap().into_dyn(),
        Array::from_shape_vec(1, vec![20.0]).unwrap().into_dyn(),
    );
    DatasetMetadata::from_arrays(&arrays).unwrap()
}

/// A waveform whose every region carries `trace`.
pub fn broadcast_waveform(trace: &[f64], regions: usize) -> Array2<f64> {
    Array2::from_shape_fn((trace.len(), regions), |(t, _)| trace[t])
}
