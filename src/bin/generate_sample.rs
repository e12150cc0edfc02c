//! Writes a small self-contained demo dataset plus a `config.json` that
//! the main binary can open.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use eeg_source_synth::data::writer::{write_npz, write_octave_text, write_parquet};
use eeg_source_synth::synth::waveform::spikes_path;
use eeg_source_synth::{ArrayMap, DatasetConfig, Variable, WaveformLayout};
use ndarray::{Array1, Array2, Array3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

const EXAMPLES: usize = 24;
const SOURCES: usize = 2;
const PATCH: usize = 4;
const SCALE_LEVELS: usize = 3;
const ELECTRODES: usize = 16;
const REGIONS: usize = 64;
const TIME_POINTS: usize = 100;
/// Stored waveforms are longer than canonical and get resampled on load.
const STORED_TIME_POINTS: usize = 200;
const WAVEFORM_FILES: usize = 16;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

/// One spike per region, jittered around a shared onset.
fn spike_waveform(rng: &mut ChaCha8Rng) -> Result<Array2<f64>> {
    let onset = rng.gen_range(40.0..160.0);
    let jitter = Normal::new(0.0, 4.0)?;
    let background = Normal::new(0.0, 0.02)?;
    let spikes: Vec<(f64, f64)> = (0..REGIONS)
        .map(|_| (onset + jitter.sample(rng), rng.gen_range(0.5..2.0)))
        .collect();
    Ok(Array2::from_shape_fn((STORED_TIME_POINTS, REGIONS), |(t, r)| {
        let (mu, amp) = spikes[r];
        gaussian(t as f64, mu, 6.0, amp) + background.sample(rng)
    }))
}

/// Patch of up to `PATCH` neighbouring regions, padded with a mix of sentinels.
fn patch_row(rng: &mut ChaCha8Rng) -> Vec<f64> {
    let size = rng.gen_range(1..=PATCH);
    let center = rng.gen_range(0..REGIONS - PATCH);
    (0..PATCH)
        .map(|k| match k {
            _ if k < size => (center + k) as f64,
            _ if rng.gen_bool(0.5) => -1.0,
            _ => 15213.0,
        })
        .collect()
}

fn metadata(rng: &mut ChaCha8Rng) -> Result<ArrayMap> {
    let mut selected = Vec::with_capacity(EXAMPLES * SOURCES * PATCH);
    let mut decay = Vec::with_capacity(EXAMPLES * SOURCES * PATCH);
    for _ in 0..EXAMPLES * SOURCES {
        let row = patch_row(rng);
        decay.extend(row.iter().enumerate().map(|(k, &id)| {
            if (0.0..10_000.0).contains(&id) {
                0.7_f64.powi(k as i32)
            } else {
                -1.0
            }
        }));
        selected.extend(row);
    }

    let nmm_idx = Array2::from_shape_fn((EXAMPLES, SOURCES), |_| {
        rng.gen_range(0..WAVEFORM_FILES) as f64
    });
    let scale_ratio = Array3::from_shape_fn((EXAMPLES, SOURCES, SCALE_LEVELS), |(_, _, k)| {
        10.0 * (k + 1) as f64 + rng.gen_range(0.0..5.0)
    });
    let snr = Array1::from_shape_fn(EXAMPLES, |_| rng.gen_range(5.0..25.0));

    let mut arrays = ArrayMap::new();
    let shaped = |data: Vec<f64>| {
        Array3::from_shape_vec((EXAMPLES, SOURCES, PATCH), data).map(|a| a.into_dyn())
    };
    arrays.insert("selected_region".into(), Variable::Numeric(shaped(selected)?));
    arrays.insert("mag_change".into(), Variable::Numeric(shaped(decay)?));
    arrays.insert("nmm_idx".into(), Variable::Numeric(nmm_idx.into_dyn()));
    arrays.insert("scale_ratio".into(), Variable::Numeric(scale_ratio.into_dyn()));
    arrays.insert("current_snr".into(), Variable::Numeric(snr.into_dyn()));
    Ok(arrays)
}

fn forward(rng: &mut ChaCha8Rng) -> ArrayMap {
    // each electrode sees nearby regions most strongly
    let fwd = Array2::from_shape_fn((ELECTRODES, REGIONS), |(e, r)| {
        let center = e as f64 * REGIONS as f64 / ELECTRODES as f64;
        gaussian(r as f64, center, 6.0, 1.0) + rng.gen_range(-0.01..0.01)
    });
    let mut arrays = ArrayMap::new();
    arrays.insert("fwd".into(), Variable::Numeric(fwd.into_dyn()));
    arrays
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let out = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| "demo_data".into()));
    let mut rng = ChaCha8Rng::seed_from_u64(42);

    let metadata_path = out.join("source").join("train_sample_source1.mat");
    create_parent(&metadata_path)?;
    write_parquet(&metadata_path, &metadata(&mut rng)?)?;

    let forward_path = out.join("anatomy").join("leadfield.mat");
    create_parent(&forward_path)?;
    write_npz(&forward_path, &forward(&mut rng))?;

    let waveform_root = out.join("source");
    for index in 0..WAVEFORM_FILES {
        let path = spikes_path(&waveform_root, index);
        create_parent(&path)?;
        let mut arrays = ArrayMap::new();
        arrays.insert("data".into(), Variable::Numeric(spike_waveform(&mut rng)?.into_dyn()));
        // alternate formats so both waveform decoders are exercised
        if index % 2 == 0 {
            write_octave_text(&path, &arrays)?;
        } else {
            write_npz(&path, &arrays)?;
        }
    }

    let config = DatasetConfig {
        metadata_path,
        forward_path,
        forward_key: None,
        waveform_root,
        waveform_layout: WaveformLayout::Spikes,
        dataset_len: None,
        num_scale_ratio: None,
        seed: 7,
        time_points: TIME_POINTS,
        regions: REGIONS,
    };
    let config_path = out.join("config.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!(
        "Wrote {EXAMPLES} examples, {WAVEFORM_FILES} waveforms and a {ELECTRODES} × {REGIONS} forward matrix to {}",
        out.display()
    );
    Ok(())
}
