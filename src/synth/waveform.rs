use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::{debug, warn};
use ndarray::{s, Array2, Axis, Ix2};
use serde::{Deserialize, Serialize};

use crate::data::loader::FormatResolvingLoader;
use crate::data::model::numeric;

/// Time points of a canonical waveform.
pub const TIME_POINTS: usize = 500;
/// Cortical regions of a canonical waveform.
pub const REGIONS: usize = 994;

/// Length of a raw simulation run; decimated by stride rather than interpolated.
const RAW_TIME_POINTS: usize = 20_000;
const WAVEFORM_KEY: &str = "data";

/// Number of pre-extracted spike files in the `a0` and `a1` directories.
const SPIKE_FILES_A0: usize = 3;
const SPIKE_FILES_A1: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformShape {
    pub time_points: usize,
    pub regions: usize,
}

impl Default for WaveformShape {
    fn default() -> Self {
        WaveformShape {
            time_points: TIME_POINTS,
            regions: REGIONS,
        }
    }
}

impl WaveformShape {
    pub fn zeros(&self) -> Array2<f64> {
        Array2::zeros((self.time_points, self.regions))
    }
}

// ---------------------------------------------------------------------------
// Resolver contract
// ---------------------------------------------------------------------------

/// Maps a waveform index to a canonical time × region matrix.
///
/// Implementations never fail: an unresolvable index yields zeros.
pub trait ResolveWaveform {
    fn resolve(&self, index: i64) -> Array2<f64>;
}

impl<F> ResolveWaveform for F
where
    F: Fn(i64) -> Array2<f64>,
{
    fn resolve(&self, index: i64) -> Array2<f64> {
        self(index)
    }
}

/// Which on-disk waveform collection an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveformLayout {
    /// `raw_nmm/a{a}/mean_iter_{iter}_a_iter_{a}_{file}.mat` simulation output.
    #[default]
    RawNmm,
    /// `nmm_spikes/a{0,1}/nmm_{n}.mat` pre-extracted waveforms.
    Spikes,
}

// ---------------------------------------------------------------------------
// File-backed resolver
// ---------------------------------------------------------------------------

/// Resolves waveform indices to files under `root`, re-reading on every call.
pub struct NmmWaveformResolver {
    root: PathBuf,
    layout: WaveformLayout,
    shape: WaveformShape,
    loader: FormatResolvingLoader,
}

impl NmmWaveformResolver {
    pub fn new(root: impl Into<PathBuf>, layout: WaveformLayout, shape: WaveformShape) -> Self {
        NmmWaveformResolver {
            root: root.into(),
            layout,
            shape,
            loader: FormatResolvingLoader::default(),
        }
    }

    /// Files that may hold waveform `index`, in the order they are tried.
    pub fn candidates(&self, index: usize) -> Vec<PathBuf> {
        match self.layout {
            WaveformLayout::RawNmm => raw_nmm_candidates(&self.root, index),
            WaveformLayout::Spikes => vec![spikes_path(&self.root, index)],
        }
    }

    fn load_canonical(&self, path: &Path) -> Result<Array2<f64>> {
        let arrays = self.loader.load(path)?;
        let data = numeric(&arrays, WAVEFORM_KEY)?
            .clone()
            .into_dimensionality::<Ix2>()
            .context("waveform 'data' must be 2-D (time × regions)")?;
        canonicalize(data, self.shape)
    }
}

impl ResolveWaveform for NmmWaveformResolver {
    fn resolve(&self, index: i64) -> Array2<f64> {
        let Ok(idx) = usize::try_from(index) else {
            warn!("negative waveform index {index}; substituting zeros");
            return self.shape.zeros();
        };
        for path in self.candidates(idx) {
            match self.load_canonical(&path) {
                Ok(waveform) => {
                    debug!("waveform {index} loaded from {}", path.display());
                    return waveform;
                }
                Err(e) => debug!("waveform {index}: {} unusable: {e:#}", path.display()),
            }
        }
        warn!("could not resolve waveform {index}; substituting zeros");
        self.shape.zeros()
    }
}

/// Candidate raw simulation files for `index`.
///
/// These mappings are provisional guesses at the upstream file naming; they
/// are tried in order and the first readable file wins.
pub fn raw_nmm_candidates(root: &Path, index: usize) -> Vec<PathBuf> {
    let a = index % 4 + 1;
    let iter = (index / 4) % 3;
    let file = index % 20;
    [(a, iter), (a, (index / 4 + 1) % 3), (a % 4 + 1, iter)]
        .into_iter()
        .map(|(a, iter)| {
            root.join("raw_nmm")
                .join(format!("a{a}"))
                .join(format!("mean_iter_{iter}_a_iter_{a}_{file}.mat"))
        })
        .collect()
}

/// The pre-extracted file for `index`, cycling through every available file.
pub fn spikes_path(root: &Path, index: usize) -> PathBuf {
    let k = index % (SPIKE_FILES_A0 + SPIKE_FILES_A1);
    let (dir, n) = if k < SPIKE_FILES_A0 {
        ("a0", k + 1)
    } else {
        ("a1", k - SPIKE_FILES_A0 + 1)
    };
    root.join("nmm_spikes").join(dir).join(format!("nmm_{n}.mat"))
}

// ---------------------------------------------------------------------------
// Canonicalization
// ---------------------------------------------------------------------------

/// Bring a time × region array to `shape`.
///
/// Regions are truncated or zero-padded. A raw 20000-point run is decimated
/// by stride; any other length is linearly interpolated.
pub fn canonicalize(data: Array2<f64>, shape: WaveformShape) -> Result<Array2<f64>> {
    let (rows, cols) = data.dim();
    let data = if cols >= shape.regions {
        data.slice(s![.., ..shape.regions]).to_owned()
    } else {
        let mut padded = Array2::zeros((rows, shape.regions));
        padded.slice_mut(s![.., ..cols]).assign(&data);
        padded
    };

    if rows == shape.time_points {
        return Ok(data);
    }
    if shape.time_points == 0 {
        bail!("canonical time axis is empty");
    }
    if rows == RAW_TIME_POINTS && rows % shape.time_points == 0 {
        let stride = (rows / shape.time_points) as isize;
        return Ok(data.slice(s![..;stride, ..]).to_owned());
    }
    if rows < 2 {
        bail!("cannot resample {rows} time points to {}", shape.time_points);
    }
    Ok(interpolate_time(&data, shape.time_points))
}

/// Linear interpolation between evenly spaced grids on [0, 1].
fn interpolate_time(data: &Array2<f64>, time_points: usize) -> Array2<f64> {
    let rows = data.nrows();
    let mut out = Array2::zeros((time_points, data.ncols()));
    let span = time_points.saturating_sub(1).max(1) as f64;
    for (j, mut row) in out.axis_iter_mut(Axis(0)).enumerate() {
        let pos = j as f64 * (rows - 1) as f64 / span;
        let lo = (pos.floor() as usize).min(rows - 2);
        let frac = pos - lo as f64;
        row.assign(&data.row(lo));
        row *= 1.0 - frac;
        row.scaled_add(frac, &data.row(lo + 1));
    }
    out
}
