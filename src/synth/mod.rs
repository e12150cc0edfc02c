/// Per-example synthesis engine.
///
/// ```text
///  nmm_idx ──► waveform ──► canonical time × region waveform
///                                   │
///   selected_region / scale_ratio   ▼
///   mag_change ───────────────► patch      combined time × region
///                                   │
///                                   ▼
///                               forward    electrodes × time
///                                   │
///                                   ▼
///                               noise      + white noise @ current_snr
///                                   │
///                                   ▼
///                               normalize  f32 sensor / source maps
/// ```

pub mod forward;
pub mod noise;
pub mod normalize;
pub mod patch;
pub mod waveform;
