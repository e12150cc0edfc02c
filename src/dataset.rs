use log::info;
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::DatasetConfig;
use crate::data::loader::FormatResolvingLoader;
use crate::data::model::DatasetMetadata;
use crate::error::{Error, Result};
use crate::synth::forward::{project, resolve_forward};
use crate::synth::noise::add_white_noise;
use crate::synth::normalize::{normalize_sensor, normalize_source};
use crate::synth::patch::PatchAssembler;
use crate::synth::waveform::{NmmWaveformResolver, ResolveWaveform, WaveformShape};

// ---------------------------------------------------------------------------
// Sample – one training pair
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub index: usize,
    /// time × electrodes, de-meaned, max |v| = 1 unless all zero.
    pub sensor_data: Array2<f32>,
    /// time × regions, non-zero only at active regions, max = 1 unless all zero.
    pub source_map: Array2<f32>,
    /// sources × max_patch_size raw ids, padding included.
    pub labels: Array2<i64>,
    pub active_regions: Vec<usize>,
    /// Sensor SNR in dB.
    pub snr: f64,
}

// ---------------------------------------------------------------------------
// SourceImagingDataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct DatasetOptions {
    /// Expose only the first `n` examples.
    pub dataset_len: Option<usize>,
    pub num_scale_ratio: Option<usize>,
    pub shape: WaveformShape,
}

/// Synthesizes samples on demand from read-only metadata and forward matrix.
///
/// Retrieval takes `&self` and an explicit RNG, so one dataset can serve
/// several threads as long as the waveform resolver is `Sync`.
pub struct SourceImagingDataset<W> {
    metadata: DatasetMetadata,
    forward: Array2<f64>,
    waveforms: W,
    len: usize,
    options: DatasetOptions,
}

impl<W: ResolveWaveform> SourceImagingDataset<W> {
    pub fn new(
        metadata: DatasetMetadata,
        forward: Array2<f64>,
        waveforms: W,
        options: DatasetOptions,
    ) -> Result<Self> {
        if forward.ncols() != options.shape.regions {
            return Err(Error::ShapeMismatch {
                forward_regions: forward.ncols(),
                source_regions: options.shape.regions,
            });
        }
        if let Some(region) = metadata.max_region().filter(|&r| r >= options.shape.regions) {
            return Err(Error::InvalidMetadata(format!(
                "region {region} outside the {} regions of the forward matrix",
                options.shape.regions
            )));
        }
        let total = metadata.num_examples();
        let len = options.dataset_len.map_or(total, |n| n.min(total));
        info!(
            "dataset: {len} of {total} examples, {} sources, {} electrodes × {} regions",
            metadata.num_sources(),
            forward.nrows(),
            forward.ncols()
        );
        Ok(SourceImagingDataset {
            metadata,
            forward,
            waveforms,
            len,
            options,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    pub fn forward(&self) -> &Array2<f64> {
        &self.forward
    }

    /// Synthesize example `index`, drawing scale ratios and noise from `rng`.
    pub fn get<R: Rng + ?Sized>(&self, index: usize, rng: &mut R) -> Result<Sample> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            });
        }

        let assembly = PatchAssembler::new(&self.metadata, self.options.shape)
            .with_scale_levels(self.options.num_scale_ratio)
            .assemble(index, &self.waveforms, rng)?;

        let mut eeg = project(&self.forward, &assembly.combined)?;
        let snr = self.metadata.snr(index);
        add_white_noise(&mut eeg, snr, rng);

        Ok(Sample {
            index,
            sensor_data: normalize_sensor(&eeg),
            source_map: normalize_source(&assembly.combined, &assembly.active_regions),
            labels: self.metadata.labels(index),
            active_regions: assembly.active_regions,
            snr,
        })
    }

    /// Like [`Self::get`] with a per-index RNG stream derived from `seed`.
    pub fn get_seeded(&self, index: usize, seed: u64) -> Result<Sample> {
        self.get(index, &mut sample_rng(seed, index))
    }

    pub fn iter_seeded(&self, seed: u64) -> impl Iterator<Item = Result<Sample>> + '_ {
        (0..self.len).map(move |i| self.get_seeded(i, seed))
    }
}

impl SourceImagingDataset<NmmWaveformResolver> {
    /// Load metadata and forward matrix from disk and resolve waveforms from files.
    pub fn from_config(config: &DatasetConfig) -> Result<Self> {
        config.validate()?;
        let loader = FormatResolvingLoader::default();
        let metadata = DatasetMetadata::from_arrays(&loader.load(&config.metadata_path)?)?;
        let forward = resolve_forward(
            &loader.load(&config.forward_path)?,
            config.forward_key.as_deref(),
        )?;
        let waveforms = NmmWaveformResolver::new(
            &config.waveform_root,
            config.waveform_layout,
            config.shape(),
        );
        Self::new(
            metadata,
            forward,
            waveforms,
            DatasetOptions {
                dataset_len: config.dataset_len,
                num_scale_ratio: config.num_scale_ratio,
                shape: config.shape(),
            },
        )
    }
}

/// Independent, reproducible RNG for one example.
pub fn sample_rng(seed: u64, index: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    rng.set_stream(index as u64);
    rng
}
