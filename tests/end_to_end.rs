use std::path::{Path, PathBuf};

use approx::assert_abs_diff_eq;
use eeg_source_synth::data::writer::{write_npz, write_octave_text, write_parquet};
use eeg_source_synth::dataset::sample_rng;
use eeg_source_synth::synth::forward::project;
use eeg_source_synth::synth::patch::PatchAssembler;
use eeg_source_synth::synth::waveform::spikes_path;
use eeg_source_synth::{
    load_file, ArrayMap, DatasetConfig, DatasetMetadata, DatasetOptions, Error,
    NmmWaveformResolver, SourceImagingDataset, Variable, WaveformLayout, WaveformShape,
};
use ndarray::{arr1, Array, Array1, Array2, ArrayD};
use tempfile::{tempdir, TempDir};

const TIME_POINTS: usize = 500;
const REGIONS: usize = 994;
/// Stored waveforms carry fewer regions and are zero-padded on load.
const STORED_REGIONS: usize = 20;

fn numeric(a: ArrayD<f64>) -> Variable {
    Variable::Numeric(a)
}

/// Gaussian bump peaking at exactly 4.0 on t = 250.
fn trace() -> Array1<f64> {
    Array1::from_shape_fn(TIME_POINTS, |t| {
        4.0 * (-((t as f64 - 250.0) / 30.0).powi(2) / 2.0).exp()
    })
}

/// One example, one source: patch [5, 12], decay [1, 0.5], scale ratio 20.
fn single_patch_metadata(snr: f64) -> ArrayMap {
    let mut m = ArrayMap::new();
    m.insert(
        "selected_region".into(),
        numeric(Array::from_shape_vec((1, 1, 3), vec![5.0, 12.0, -1.0]).unwrap().into_dyn()),
    );
    m.insert("nmm_idx".into(), numeric(Array::from_elem((1, 1), 0.0).into_dyn()));
    m.insert("scale_ratio".into(), numeric(Array::from_elem((1, 1, 1), 20.0).into_dyn()));
    m.insert(
        "mag_change".into(),
        numeric(Array::from_shape_vec((1, 1, 3), vec![1.0, 0.5, -1.0]).unwrap().into_dyn()),
    );
    m.insert("current_snr".into(), numeric(arr1(&[snr]).into_dyn()));
    m
}

/// Two electrodes, each seeing exactly one of the patch regions.
fn forward_arrays() -> ArrayMap {
    let mut fwd = Array2::<f64>::zeros((2, REGIONS));
    fwd[[0, 5]] = 1.0;
    fwd[[1, 12]] = 1.0;
    let mut m = ArrayMap::new();
    m.insert("leadfield".into(), numeric(fwd.into_dyn()));
    m
}

struct Fixture {
    _dir: TempDir,
    config: DatasetConfig,
}

fn fixture(metadata: &ArrayMap, with_waveform: bool) -> Fixture {
    let dir = tempdir().unwrap();
    let root = dir.path().to_path_buf();

    let metadata_path = root.join("train_sample_source1.mat");
    write_parquet(&metadata_path, metadata).unwrap();
    let forward_path = root.join("leadfield_75_20k.mat");
    write_npz(&forward_path, &forward_arrays()).unwrap();

    if with_waveform {
        let path = spikes_path(&root, 0);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let t = trace();
        let data = Array2::from_shape_fn((TIME_POINTS, STORED_REGIONS), |(i, _)| t[i]);
        let mut arrays = ArrayMap::new();
        arrays.insert("data".into(), numeric(data.into_dyn()));
        write_npz(&path, &arrays).unwrap();
    }

    let config = DatasetConfig {
        metadata_path,
        forward_path,
        forward_key: None,
        waveform_root: root,
        waveform_layout: WaveformLayout::Spikes,
        seed: 3,
        ..DatasetConfig::default()
    };
    Fixture { _dir: dir, config }
}

#[test]
fn single_patch_through_files() {
    let fx = fixture(&single_patch_metadata(300.0), true);
    let dataset = SourceImagingDataset::from_config(&fx.config).unwrap();
    assert_eq!(dataset.len(), 1);

    let sample = dataset.get_seeded(0, fx.config.seed).unwrap();
    assert_eq!(sample.active_regions, vec![5, 12]);
    assert_eq!(sample.labels.row(0).to_vec(), vec![5, 12, -1]);
    assert_eq!(sample.snr, 300.0);

    // prototype peak 4 rescaled to 20, then divided by the map maximum of 20
    assert_eq!(sample.source_map.dim(), (TIME_POINTS, REGIONS));
    let t = trace();
    for i in 0..TIME_POINTS {
        assert_abs_diff_eq!(sample.source_map[[i, 5]], (t[i] / 4.0) as f32, epsilon = 1e-6);
        assert_abs_diff_eq!(sample.source_map[[i, 12]], (t[i] / 8.0) as f32, epsilon = 1e-6);
    }
    let outside = sample
        .source_map
        .columns()
        .into_iter()
        .enumerate()
        .filter(|(r, _)| *r != 5 && *r != 12)
        .all(|(_, col)| col.iter().all(|&v| v == 0.0));
    assert!(outside);

    // before noise each electrode sees one patch region: 5·trace and 2.5·trace
    let resolver = NmmWaveformResolver::new(
        &fx.config.waveform_root,
        fx.config.waveform_layout,
        fx.config.shape(),
    );
    let assembly = PatchAssembler::new(dataset.metadata(), fx.config.shape())
        .assemble(0, &resolver, &mut sample_rng(fx.config.seed, 0))
        .unwrap();
    let eeg = project(dataset.forward(), &assembly.combined).unwrap();
    assert_eq!(eeg.dim(), (2, TIME_POINTS));
    for i in 0..TIME_POINTS {
        assert_abs_diff_eq!(eeg[[0, i]], 5.0 * t[i], epsilon = 1e-9);
        assert_abs_diff_eq!(eeg[[1, i]], 2.5 * t[i], epsilon = 1e-9);
    }

    // de-meaning leaves the two electrodes mirrored
    assert_eq!(sample.sensor_data.dim(), (TIME_POINTS, 2));
    let peak = sample.sensor_data.iter().fold(0.0_f32, |m, v| m.max(v.abs()));
    assert_eq!(peak, 1.0);
    for row in sample.sensor_data.rows() {
        assert_abs_diff_eq!(row[0], -row[1], epsilon = 1e-5);
    }
}

#[test]
fn metadata_format_does_not_change_samples() {
    let mut metadata = single_patch_metadata(15.0);
    metadata.insert(
        "scale_ratio".into(),
        numeric(Array::from_shape_vec((1, 1, 3), vec![10.0, 20.0, 30.0]).unwrap().into_dyn()),
    );

    let dir = tempdir().unwrap();
    let writers: [(&str, fn(&Path, &ArrayMap) -> anyhow::Result<()>); 3] = [
        ("parquet.mat", write_parquet),
        ("npz.mat", write_npz),
        ("text.mat", write_octave_text),
    ];
    let t = trace();
    let waveform = move |_: i64| Array2::from_shape_fn((TIME_POINTS, REGIONS), |(i, _)| t[i]);

    let samples: Vec<_> = writers
        .iter()
        .map(|(name, write)| {
            let path: PathBuf = dir.path().join(name);
            write(&path, &metadata).unwrap();
            let meta = DatasetMetadata::from_arrays(&load_file(&path).unwrap()).unwrap();
            let fwd = forward_arrays()["leadfield"]
                .as_array()
                .unwrap()
                .clone()
                .into_dimensionality()
                .unwrap();
            let dataset = SourceImagingDataset::new(
                meta,
                fwd,
                waveform.clone(),
                DatasetOptions::default(),
            )
            .unwrap();
            dataset.get_seeded(0, 99).unwrap()
        })
        .collect();

    assert_eq!(samples[0], samples[1]);
    assert_eq!(samples[1], samples[2]);
}

#[test]
fn mat_v5_metadata_drives_the_same_sample() {
    let mut fx = fixture(&single_patch_metadata(300.0), true);
    let expected = SourceImagingDataset::from_config(&fx.config)
        .unwrap()
        .get_seeded(0, fx.config.seed)
        .unwrap();

    // same example saved by MATLAB, plus an unrelated int32 table
    fx.config.metadata_path =
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/single_patch_v5.mat");
    let dataset = SourceImagingDataset::from_config(&fx.config).unwrap();
    let sample = dataset.get_seeded(0, fx.config.seed).unwrap();

    assert_eq!(sample.active_regions, vec![5, 12]);
    assert_eq!(sample.labels.row(0).to_vec(), vec![5, 12, -1]);
    assert_eq!(sample.snr, 300.0);
    assert_eq!(sample, expected);
}

#[test]
fn missing_waveform_gives_a_silent_sample() {
    let fx = fixture(&single_patch_metadata(10.0), false);
    let dataset = SourceImagingDataset::from_config(&fx.config).unwrap();
    let sample = dataset.get_seeded(0, 0).unwrap();

    assert!(sample.sensor_data.iter().all(|&v| v == 0.0));
    assert!(sample.source_map.iter().all(|&v| v == 0.0));
    assert_eq!(sample.active_regions, vec![5, 12]);
}

#[test]
fn config_length_is_clamped_and_checked() {
    let mut fx = fixture(&single_patch_metadata(10.0), true);
    fx.config.dataset_len = Some(40);
    let dataset = SourceImagingDataset::from_config(&fx.config).unwrap();
    assert_eq!(dataset.len(), 1);
    assert!(matches!(
        dataset.get_seeded(1, 0),
        Err(Error::IndexOutOfRange { index: 1, len: 1 })
    ));
}

#[test]
fn unreadable_metadata_reports_every_format() {
    let mut fx = fixture(&single_patch_metadata(10.0), true);
    let bogus = fx.config.waveform_root.join("bogus.mat");
    std::fs::write(&bogus, b"\x00\x01 not a container").unwrap();
    fx.config.metadata_path = bogus;

    match SourceImagingDataset::from_config(&fx.config) {
        Err(Error::Format { failures, .. }) => assert_eq!(failures.len(), 4),
        Err(other) => panic!("expected a format error, got {other}"),
        Ok(_) => panic!("bogus metadata was accepted"),
    }
}

#[test]
fn forward_with_wrong_region_count_is_rejected() {
    let mut fx = fixture(&single_patch_metadata(10.0), true);
    fx.config.regions = 100;
    assert!(matches!(
        SourceImagingDataset::from_config(&fx.config),
        Err(Error::ShapeMismatch {
            forward_regions: REGIONS,
            source_regions: 100
        })
    ));
}

#[test]
fn shorter_canonical_shape_resamples_stored_waveforms() {
    let mut fx = fixture(&single_patch_metadata(300.0), true);
    fx.config.time_points = 50;
    let dataset = SourceImagingDataset::from_config(&fx.config).unwrap();
    let sample = dataset.get_seeded(0, 0).unwrap();
    let shape = WaveformShape {
        time_points: 50,
        regions: REGIONS,
    };
    assert_eq!(sample.source_map.dim(), (shape.time_points, shape.regions));
    assert_eq!(sample.sensor_data.dim(), (shape.time_points, 2));
}
