use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::synth::waveform::{WaveformLayout, WaveformShape, REGIONS, TIME_POINTS};

/// Everything needed to open a dataset, typically read from a JSON file.
///
/// ```json
/// {
///   "metadata_path": "source/train_sample_source1.mat",
///   "forward_path": "anatomy/leadfield_75_20k.mat",
///   "waveform_root": "source",
///   "waveform_layout": "spikes",
///   "dataset_len": 100
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub metadata_path: PathBuf,
    pub forward_path: PathBuf,
    /// Explicit forward-matrix variable; aliases are tried when absent.
    pub forward_key: Option<String>,
    /// Directory holding `raw_nmm/` or `nmm_spikes/`.
    pub waveform_root: PathBuf,
    pub waveform_layout: WaveformLayout,
    /// Number of examples to expose; defaults to all of them.
    pub dataset_len: Option<usize>,
    /// Number of scale-ratio levels to draw from; defaults to all of them.
    pub num_scale_ratio: Option<usize>,
    pub seed: u64,
    pub time_points: usize,
    pub regions: usize,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            metadata_path: PathBuf::from("source/train_sample_source1.mat"),
            forward_path: PathBuf::from("anatomy/leadfield_75_20k.mat"),
            forward_key: None,
            waveform_root: PathBuf::from("source"),
            waveform_layout: WaveformLayout::default(),
            dataset_len: None,
            num_scale_ratio: None,
            seed: 0,
            time_points: TIME_POINTS,
            regions: REGIONS,
        }
    }
}

impl DatasetConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: DatasetConfig =
            serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_points == 0 || self.regions == 0 {
            return Err(Error::Config(format!(
                "canonical waveform shape must be non-empty, got {} × {}",
                self.time_points, self.regions
            )));
        }
        Ok(())
    }

    pub fn shape(&self) -> WaveformShape {
        WaveformShape {
            time_points: self.time_points,
            regions: self.regions,
        }
    }
}
