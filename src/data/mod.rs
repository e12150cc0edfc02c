/// Data layer: decoded arrays, typed metadata, and the format loaders.
///
/// Architecture:
/// ```text
///  MAT v5 / .parquet / .npz / octave text   (any extension, usually .mat)
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  probe formats in order → ArrayMap
///   └──────────┘
///        │
///        ▼
///   ┌────────────────┐
///   │ DatasetMetadata │  RegionId slots, per-example / per-source tables
///   └────────────────┘
/// ```
///
/// `writer` produces the Parquet, NPZ and Octave text formats for fixtures
/// and demo data; MAT v5 is read only.

pub mod loader;
pub mod model;
pub mod octave;
pub mod writer;
