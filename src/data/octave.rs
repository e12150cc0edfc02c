//! Parser for the line-oriented Octave text format (`save -text`).
//!
//! ```text
//! # name: scale_ratio
//! # type: matrix
//! # ndims: 3
//!  1 2 3
//!  20
//!  ...
//! ```
//!
//! Matrix values are listed in column-major order.

use anyhow::{Context, Result, bail};
use log::debug;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use super::model::{ArrayMap, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekingHeader,
    ReadingDimensions,
    ReadingValues,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarType {
    Matrix,
    Scalar,
    Other,
}

/// The variable currently being accumulated.
#[derive(Debug)]
struct Pending {
    name: String,
    kind: Option<VarType>,
    dims: Option<Vec<usize>>,
    values: Vec<f64>,
}

impl Pending {
    fn new(name: &str) -> Self {
        Pending {
            name: name.to_string(),
            kind: None,
            dims: None,
            values: Vec::new(),
        }
    }

    fn finish(self) -> Result<Option<(String, Variable)>> {
        match self.kind {
            Some(VarType::Scalar) => {
                let v = self.values.first().copied().unwrap_or(0.0);
                Ok(Some((self.name, Variable::scalar(v))))
            }
            Some(VarType::Matrix) => {
                let array = match self.dims {
                    Some(dims) => {
                        let expected: usize = dims.iter().product();
                        if expected != self.values.len() {
                            bail!(
                                "variable '{}': dimensions {dims:?} need {expected} values, found {}",
                                self.name,
                                self.values.len()
                            );
                        }
                        ArrayD::from_shape_vec(IxDyn(&dims).f(), self.values)
                            .with_context(|| format!("reshaping '{}'", self.name))?
                            .as_standard_layout()
                            .into_owned()
                    }
                    None => ArrayD::from_shape_vec(IxDyn(&[self.values.len()]), self.values)
                        .with_context(|| format!("building '{}'", self.name))?,
                };
                Ok(Some((self.name, Variable::Numeric(array))))
            }
            _ => {
                debug!("skipping octave variable '{}' of unsupported type", self.name);
                Ok(None)
            }
        }
    }
}

fn parse_integers(line: &str) -> Option<Vec<usize>> {
    line.split_whitespace()
        .map(|tok| tok.parse::<usize>().ok())
        .collect::<Option<Vec<_>>>()
        .filter(|dims| !dims.is_empty())
}

fn parse_numbers(line: &str) -> Option<Vec<f64>> {
    line.split_whitespace()
        .map(|tok| tok.parse::<f64>().ok())
        .collect()
}

/// Parse Octave text into named arrays.
///
/// Fails when no `# name:` header is present or a matrix cannot be reshaped
/// to its declared dimensions.
pub fn parse(text: &str) -> Result<ArrayMap> {
    let mut out = ArrayMap::new();
    let mut state = State::SeekingHeader;
    let mut pending: Option<Pending> = None;
    let mut headers = 0usize;

    for (line_no, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            if let Some((_, name)) = comment.split_once("name:") {
                if let Some(prev) = pending.take() {
                    if let Some((k, v)) = prev.finish()? {
                        out.insert(k, v);
                    }
                }
                pending = Some(Pending::new(name.trim()));
                headers += 1;
                state = State::ReadingDimensions;
            } else if let Some((_, kind)) = comment.split_once("type:") {
                if let Some(p) = pending.as_mut() {
                    p.kind = Some(match kind.trim() {
                        "matrix" => VarType::Matrix,
                        "scalar" => VarType::Scalar,
                        _ => VarType::Other,
                    });
                }
            }
            continue;
        }

        let Some(p) = pending.as_mut() else {
            // Data before any header belongs to no variable.
            continue;
        };

        if state == State::ReadingDimensions && p.kind == Some(VarType::Matrix) {
            if let Some(dims) = parse_integers(line) {
                p.dims = Some(dims);
                state = State::ReadingValues;
                continue;
            }
        }

        match parse_numbers(line) {
            Some(values) => {
                p.values.extend(values);
                state = State::ReadingValues;
            }
            None => debug!("octave text line {}: skipping non-numeric '{line}'", line_no + 1),
        }
    }

    if let Some(last) = pending.take() {
        if let Some((k, v)) = last.finish()? {
            out.insert(k, v);
        }
    }

    if headers == 0 {
        bail!("no '# name:' header found");
    }
    Ok(out)
}
