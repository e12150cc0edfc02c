use std::collections::BTreeMap;

use log::{debug, warn};
use ndarray::{Array2, ArrayView1};
use rand::Rng;

use super::waveform::{ResolveWaveform, WaveformShape};
use crate::data::model::DatasetMetadata;
use crate::error::{Error, Result};

/// Scale ratio used when the metadata value is undefined.
pub const DEFAULT_SCALE_RATIO: f64 = 30.0;

/// What happened to one source of an example.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceOutcome {
    /// Every slot of the patch was padding.
    Empty,
    /// The center-region prototype never rose above zero.
    NonPositive,
    /// The source was added with its prototype peak rescaled to `scale`.
    Contributed { scale: f64 },
}

/// Combined source activity of one example.
#[derive(Debug, Clone)]
pub struct PatchAssembly {
    /// time × region, zero wherever no patch reaches.
    pub combined: Array2<f64>,
    /// Unpadded ids of every source, concatenated in source order.
    pub active_regions: Vec<usize>,
    pub outcomes: Vec<SourceOutcome>,
}

/// Builds the combined source matrix of an example from its patches.
pub struct PatchAssembler<'a> {
    metadata: &'a DatasetMetadata,
    shape: WaveformShape,
    num_scale_ratio: Option<usize>,
}

impl<'a> PatchAssembler<'a> {
    pub fn new(metadata: &'a DatasetMetadata, shape: WaveformShape) -> Self {
        PatchAssembler {
            metadata,
            shape,
            num_scale_ratio: None,
        }
    }

    /// Draw scale ratios only among the first `levels` entries.
    pub fn with_scale_levels(mut self, levels: Option<usize>) -> Self {
        self.num_scale_ratio = levels;
        self
    }

    pub fn assemble<W, R>(&self, example: usize, waveforms: &W, rng: &mut R) -> Result<PatchAssembly>
    where
        W: ResolveWaveform + ?Sized,
        R: Rng + ?Sized,
    {
        let meta = self.metadata;
        let mut combined = self.shape.zeros();
        let mut active_regions = Vec::new();
        let mut outcomes = Vec::with_capacity(meta.num_sources());

        for source in 0..meta.num_sources() {
            let slots = meta.unpadded(example, source);
            let Some(&(_, center)) = slots.first() else {
                debug!("example {example}: source {source} is all padding");
                outcomes.push(SourceOutcome::Empty);
                continue;
            };
            if let Some(&(_, region)) = slots.iter().find(|(_, r)| *r >= self.shape.regions) {
                return Err(Error::InvalidMetadata(format!(
                    "example {example}, source {source}: region {region} outside {} regions",
                    self.shape.regions
                )));
            }
            active_regions.extend(slots.iter().map(|&(_, r)| r));

            let waveform = waveforms.resolve(meta.nmm_index(example, source));
            let expected = (self.shape.time_points, self.shape.regions);
            if waveform.dim() != expected {
                return Err(Error::WaveformShape {
                    expected,
                    found: waveform.dim(),
                });
            }

            let prototype = waveform.column(center);
            let peak = peak(prototype);
            if !(peak > 0.0) {
                debug!("example {example}: source {source} has non-positive peak {peak}");
                outcomes.push(SourceOutcome::NonPositive);
                continue;
            }

            let scale = self.pick_scale(example, source, rng);
            let rescaled = prototype.mapv(|v| v / peak * scale);

            // duplicated ids keep the last slot's weight
            let decay = meta.decay(example, source);
            let weights: BTreeMap<usize, f64> =
                slots.iter().map(|&(slot, region)| (region, decay[slot])).collect();
            for (region, weight) in weights {
                combined.column_mut(region).scaled_add(weight, &rescaled);
            }
            outcomes.push(SourceOutcome::Contributed { scale });
        }

        Ok(PatchAssembly {
            combined,
            active_regions,
            outcomes,
        })
    }

    fn pick_scale<R: Rng + ?Sized>(&self, example: usize, source: usize, rng: &mut R) -> f64 {
        let levels = self.metadata.scale_levels(example, source);
        let available = self
            .num_scale_ratio
            .map_or(levels.len(), |n| n.min(levels.len()));
        let value = if available == 0 {
            f64::NAN
        } else {
            levels[rng.gen_range(0..available)]
        };
        if value.is_nan() {
            warn!(
                "scale ratio undefined for example {example}, source {source}; using {DEFAULT_SCALE_RATIO}"
            );
            DEFAULT_SCALE_RATIO
        } else {
            value
        }
    }
}

/// Maximum of a signal; NaN if any sample is NaN.
fn peak(signal: ArrayView1<'_, f64>) -> f64 {
    signal.iter().fold(f64::NEG_INFINITY, |m, &v| {
        if v.is_nan() || m.is_nan() {
            f64::NAN
        } else {
            m.max(v)
        }
    })
}
