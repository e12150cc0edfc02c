use ndarray::{Array2, Axis};

/// Turn electrodes × time sensor data into de-meaned, max-abs scaled time × electrodes.
pub fn normalize_sensor(eeg: &Array2<f64>) -> Array2<f32> {
    let mut data = eeg.t().to_owned();
    if data.is_empty() {
        return data.mapv(|v| v as f32);
    }

    // per time point, across electrodes
    if let Some(mean) = data.mean_axis(Axis(1)) {
        data -= &mean.insert_axis(Axis(1));
    }
    // per electrode, across time
    if let Some(mean) = data.mean_axis(Axis(0)) {
        data -= &mean.insert_axis(Axis(0));
    }

    let max_abs = data.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    if max_abs > 0.0 {
        data.mapv(|v| (v / max_abs) as f32)
    } else {
        Array2::zeros(data.raw_dim())
    }
}

/// Keep only `active` region columns and scale by the global maximum.
pub fn normalize_source(combined: &Array2<f64>, active: &[usize]) -> Array2<f32> {
    let mut map = Array2::<f64>::zeros(combined.raw_dim());
    for &region in active {
        map.column_mut(region).assign(&combined.column(region));
    }

    let max = map.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 {
        map.mapv(|v| (v / max) as f32)
    } else {
        Array2::zeros(map.raw_dim())
    }
}
