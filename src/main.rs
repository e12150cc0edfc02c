use std::path::PathBuf;

use anyhow::Context;
use eeg_source_synth::{DatasetConfig, SourceImagingDataset};
use log::info;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "config.json".into()));
    let count: Option<usize> = args
        .next()
        .map(|s| s.parse().context("sample count must be a non-negative integer"))
        .transpose()?;

    let config = DatasetConfig::from_json_file(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    let dataset = SourceImagingDataset::from_config(&config)?;
    let count = count.map_or(dataset.len(), |n| n.min(dataset.len()));

    for index in 0..count {
        let sample = dataset.get_seeded(index, config.seed)?;
        let (time_points, electrodes) = sample.sensor_data.dim();
        let peak = sample.sensor_data.iter().fold(0.0_f32, |m, v| m.max(v.abs()));
        info!(
            "sample {index}: {time_points} × {electrodes} sensors (max |v| {peak}), {} active regions, snr {} dB",
            sample.active_regions.len(),
            sample.snr
        );
    }

    println!("Synthesized {count} of {} samples", dataset.len());
    Ok(())
}
