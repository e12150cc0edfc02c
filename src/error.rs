use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// One failed decode attempt inside the format-resolving loader.
#[derive(Debug)]
pub struct ProbeFailure {
    /// Human-readable probe name (`mat-v5`, `parquet`, `npz`, `octave-text`).
    pub format: &'static str,
    pub cause: anyhow::Error,
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.format, self.cause)
    }
}

/// Errors that abort synthesis of a sample (or construction of a dataset).
///
/// Anomalies local to one source (missing waveform, undefined scale ratio,
/// degenerate patch) are recovered in place and never show up here.
#[derive(Error, Debug)]
pub enum Error {
    /// Every format probe rejected the file.
    #[error("could not decode {}: {}", path.display(), join_failures(failures))]
    Format {
        path: PathBuf,
        failures: Vec<ProbeFailure>,
    },

    /// Forward matrix region count disagrees with the combined source matrix.
    #[error("forward matrix has {forward_regions} regions but source matrix has {source_regions}")]
    ShapeMismatch {
        forward_regions: usize,
        source_regions: usize,
    },

    /// A waveform resolver returned something other than the canonical shape.
    #[error("waveform has shape {found:?}, expected {expected:?}")]
    WaveformShape {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("variable '{name}' not found")]
    MissingVariable { name: String },

    #[error("invalid dataset metadata: {0}")]
    InvalidMetadata(String),

    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join_failures(failures: &[ProbeFailure]) -> String {
    failures
        .iter()
        .map(ProbeFailure::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
