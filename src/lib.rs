//! Synthetic EEG source-imaging training pairs.
//!
//! Each example places a few cortical source patches, drives them with a
//! neural-mass waveform, projects through a forward matrix to the sensors
//! and adds white noise at a per-example SNR.

pub mod config;
pub mod data;
pub mod dataset;
pub mod error;
pub mod synth;

#[cfg(test)]
mod testing;

pub use config::DatasetConfig;
pub use data::loader::{load_file, FormatResolvingLoader};
pub use data::model::{ArrayMap, DatasetMetadata, RegionId, Variable};
pub use dataset::{DatasetOptions, Sample, SourceImagingDataset};
pub use error::{Error, Result};
pub use synth::waveform::{NmmWaveformResolver, ResolveWaveform, WaveformLayout, WaveformShape};
