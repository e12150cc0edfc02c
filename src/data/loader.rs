use std::fs::File;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{DataType, Float64Type};
use log::debug;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use ndarray_npy::{ReadNpyExt, ReadableElement};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{ArrayMap, OpaqueEntry, Variable};
use super::octave;
use crate::error::{Error, ProbeFailure};

/// Field-metadata key holding a column's row-major shape (`"2,3,70"`; empty = scalar).
pub const SHAPE_KEY: &str = "shape";

// ---------------------------------------------------------------------------
// Probe contract
// ---------------------------------------------------------------------------

/// One on-disk format the loader knows how to decode.
pub trait FormatProbe: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, path: &Path) -> Result<ArrayMap>;
}

/// Tries each probe in priority order and returns the first success.
pub struct FormatResolvingLoader {
    probes: Vec<Box<dyn FormatProbe>>,
}

impl Default for FormatResolvingLoader {
    fn default() -> Self {
        Self::with_probes(vec![
            Box::new(MatV5Probe),
            Box::new(ParquetProbe),
            Box::new(NpzProbe),
            Box::new(OctaveTextProbe),
        ])
    }
}

impl FormatResolvingLoader {
    pub fn with_probes(probes: Vec<Box<dyn FormatProbe>>) -> Self {
        FormatResolvingLoader { probes }
    }

    /// Decode `path`, failing only when every probe fails.
    pub fn load(&self, path: &Path) -> crate::error::Result<ArrayMap> {
        let mut failures = Vec::with_capacity(self.probes.len());
        for probe in &self.probes {
            match probe.decode(path) {
                Ok(arrays) => {
                    debug!(
                        "decoded {} as {} ({} variables)",
                        path.display(),
                        probe.name(),
                        arrays.len()
                    );
                    return Ok(arrays);
                }
                Err(cause) => {
                    debug!("{} probe rejected {}: {cause:#}", probe.name(), path.display());
                    failures.push(ProbeFailure {
                        format: probe.name(),
                        cause,
                    });
                }
            }
        }
        Err(Error::Format {
            path: path.to_path_buf(),
            failures,
        })
    }
}

/// Load a file with the default probe order: MAT v5, Parquet, NPZ, Octave text.
pub fn load_file(path: &Path) -> crate::error::Result<ArrayMap> {
    FormatResolvingLoader::default().load(path)
}

// ---------------------------------------------------------------------------
// MATLAB level 5
// ---------------------------------------------------------------------------

/// Level-5 MAT-file, as written by MATLAB up to `-v7` or `scipy.io.savemat`.
///
/// Only numeric arrays are kept. MAT-files store data column-major, so each
/// array is reshaped into row-major with its dimensions unchanged; note that
/// MATLAB keeps at least two dimensions and drops trailing singleton ones.
/// Version 7.3 files are HDF5 containers and fail here.
pub struct MatV5Probe;

impl FormatProbe for MatV5Probe {
    fn name(&self) -> &'static str {
        "mat-v5"
    }

    fn decode(&self, path: &Path) -> Result<ArrayMap> {
        let file = File::open(path).context("opening MAT-file")?;
        let mat = matfile::MatFile::parse(std::io::BufReader::new(file))
            .map_err(|e| anyhow!("not a level-5 MAT-file: {e:?}"))?;

        let mut out = ArrayMap::new();
        for array in mat.arrays() {
            let name = array.name();
            // reserved for globals and MATLAB's own bookkeeping
            if name.starts_with("__") {
                continue;
            }
            let values =
                mat_values(array.data()).with_context(|| format!("variable '{name}'"))?;
            let dims = array.size().to_vec();
            let data = ArrayD::from_shape_vec(IxDyn(&dims).f(), values)
                .with_context(|| format!("variable '{name}': bad dimensions {dims:?}"))?;
            out.insert(
                name.to_string(),
                Variable::Numeric(data.as_standard_layout().into_owned()),
            );
        }
        if out.is_empty() {
            bail!("MAT-file holds no numeric arrays");
        }
        Ok(out)
    }
}

fn mat_values(data: &matfile::NumericData) -> Result<Vec<f64>> {
    use matfile::NumericData as N;

    fn real_only<T: Copy>(
        real: &[T],
        imag: &Option<Vec<T>>,
        f: impl Fn(T) -> f64,
    ) -> Result<Vec<f64>> {
        if imag.is_some() {
            bail!("complex arrays are not supported");
        }
        Ok(real.iter().map(|&v| f(v)).collect())
    }

    #[allow(unreachable_patterns)]
    match data {
        N::Double { real, imag } => real_only(real, imag, |v| v),
        N::Single { real, imag } => real_only(real, imag, f64::from),
        N::Int8 { real, imag } => real_only(real, imag, f64::from),
        N::UInt8 { real, imag } => real_only(real, imag, f64::from),
        N::Int16 { real, imag } => real_only(real, imag, f64::from),
        N::UInt16 { real, imag } => real_only(real, imag, f64::from),
        N::Int32 { real, imag } => real_only(real, imag, f64::from),
        N::UInt32 { real, imag } => real_only(real, imag, f64::from),
        N::Int64 { real, imag } => real_only(real, imag, |v| v as f64),
        N::UInt64 { real, imag } => real_only(real, imag, |v| v as f64),
        _ => bail!("unsupported numeric class"),
    }
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

/// Columnar table: one column per variable.
///
/// A column is a primitive numeric column or a (large / fixed-size) list of
/// numbers. Rows are concatenated in order; nulls inside lists become NaN.
/// The optional [`SHAPE_KEY`] field metadata reshapes the values row-major,
/// otherwise the variable stays one-dimensional.
pub struct ParquetProbe;

impl FormatProbe for ParquetProbe {
    fn name(&self) -> &'static str {
        "parquet"
    }

    fn decode(&self, path: &Path) -> Result<ArrayMap> {
        let file = File::open(path).context("opening parquet file")?;
        let builder =
            ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
        let schema = builder.schema().clone();
        let reader = builder.build().context("building parquet reader")?;

        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); schema.fields().len()];
        for batch_result in reader {
            let batch = batch_result.context("reading parquet record batch")?;
            for (i, col) in batch.columns().iter().enumerate() {
                append_values(col, &mut columns[i])
                    .with_context(|| format!("column '{}'", schema.field(i).name()))?;
            }
        }

        let mut out = ArrayMap::new();
        for (field, values) in schema.fields().iter().zip(columns) {
            let shape = match field.metadata().get(SHAPE_KEY) {
                Some(spec) => parse_shape(spec)
                    .with_context(|| format!("column '{}': bad shape '{spec}'", field.name()))?,
                None => vec![values.len()],
            };
            let count = values.len();
            let array = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(|_| {
                anyhow!(
                    "column '{}': shape {shape:?} does not fit {count} values",
                    field.name()
                )
            })?;
            out.insert(field.name().clone(), Variable::Numeric(array));
        }
        Ok(out)
    }
}

fn parse_shape(spec: &str) -> Result<Vec<usize>> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Ok(Vec::new());
    }
    spec.split(',')
        .map(|d| d.trim().parse::<usize>().context("dimension is not an integer"))
        .collect()
}

/// Flatten a numeric or list-of-numeric Arrow column into `out`.
fn append_values(col: &ArrayRef, out: &mut Vec<f64>) -> Result<()> {
    match col.data_type() {
        DataType::List(_) => {
            let list = col.as_list::<i32>();
            for row in 0..list.len() {
                if list.is_null(row) {
                    bail!("null value in list column at row {row}");
                }
                append_values(&list.value(row), out)?;
            }
        }
        DataType::LargeList(_) => {
            let list = col.as_list::<i64>();
            for row in 0..list.len() {
                if list.is_null(row) {
                    bail!("null value in list column at row {row}");
                }
                append_values(&list.value(row), out)?;
            }
        }
        DataType::FixedSizeList(_, _) => {
            let list = col.as_fixed_size_list();
            for row in 0..list.len() {
                if list.is_null(row) {
                    bail!("null value in list column at row {row}");
                }
                append_values(&list.value(row), out)?;
            }
        }
        dt if dt.is_numeric() || *dt == DataType::Boolean => {
            let cast = arrow::compute::cast(col.as_ref(), &DataType::Float64)
                .with_context(|| format!("casting {dt:?} to Float64"))?;
            let values = cast.as_primitive::<Float64Type>();
            out.extend(values.iter().map(|v| v.unwrap_or(f64::NAN)));
        }
        other => bail!("unsupported column type {other:?}"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// NPZ
// ---------------------------------------------------------------------------

/// Zip container of `.npy` members, one variable per member.
///
/// Member paths may nest (`group/name.npy`); the variable keeps the full
/// path without the suffix. Each member's `fortran_order` flag decides its
/// memory layout, so arrays come back with the shape they were saved with.
/// Object-typed members pass through as [`Variable::Opaque`].
pub struct NpzProbe;

impl FormatProbe for NpzProbe {
    fn name(&self) -> &'static str {
        "npz"
    }

    fn decode(&self, path: &Path) -> Result<ArrayMap> {
        let file = File::open(path).context("opening npz archive")?;
        let mut archive = zip::ZipArchive::new(file).context("reading zip directory")?;

        let mut out = ArrayMap::new();
        for i in 0..archive.len() {
            let mut member = archive
                .by_index(i)
                .with_context(|| format!("opening zip member {i}"))?;
            if member.is_dir() {
                continue;
            }
            let name = member.name().to_string();
            let key = name.strip_suffix(".npy").unwrap_or(&name).to_string();
            if key.starts_with("__") {
                continue;
            }
            let mut bytes = Vec::new();
            member
                .read_to_end(&mut bytes)
                .with_context(|| format!("reading member '{name}'"))?;
            let var = decode_npy(bytes).with_context(|| format!("decoding member '{name}'"))?;
            out.insert(key, var);
        }
        Ok(out)
    }
}

/// Extract the `descr` entry of an `.npy` header.
fn npy_descr(bytes: &[u8]) -> Result<String> {
    if bytes.len() < 10 || &bytes[..6] != b"\x93NUMPY" {
        bail!("not an npy member");
    }
    let (len, start) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 if bytes.len() >= 12 => (
            u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
            12,
        ),
        v => bail!("unsupported npy version {v}"),
    };
    let header = bytes
        .get(start..start + len)
        .context("truncated npy header")?;
    let header = String::from_utf8_lossy(header);
    let after = header
        .split_once("'descr'")
        .map(|(_, rest)| rest)
        .context("npy header has no descr")?;
    let after = after.trim_start().trim_start_matches(':').trim_start();
    let quote = after.chars().next().context("empty descr")?;
    let body = &after[quote.len_utf8()..];
    let end = body.find(quote).context("unterminated descr")?;
    Ok(body[..end].to_string())
}

fn widen<A: ReadableElement + Clone>(bytes: &[u8], f: impl Fn(A) -> f64) -> Result<ArrayD<f64>> {
    let array = ArrayD::<A>::read_npy(bytes).map_err(|e| anyhow!("{e}"))?;
    Ok(array.mapv(f))
}

fn decode_npy(bytes: Vec<u8>) -> Result<Variable> {
    let descr = npy_descr(&bytes)?;
    let mut chars = descr.trim_start_matches(['<', '>', '|', '=']).chars();
    let kind = chars.next().context("empty dtype")?;
    let size: String = chars.collect();

    let array = match (kind, size.as_str()) {
        ('O', _) => {
            return Ok(Variable::Opaque(OpaqueEntry { descr, bytes }));
        }
        ('f', "8") => widen::<f64>(&bytes, |v| v)?,
        ('f', "4") => widen::<f32>(&bytes, f64::from)?,
        ('i', "8") => widen::<i64>(&bytes, |v| v as f64)?,
        ('i', "4") => widen::<i32>(&bytes, f64::from)?,
        ('i', "2") => widen::<i16>(&bytes, f64::from)?,
        ('i', "1") => widen::<i8>(&bytes, f64::from)?,
        ('u', "8") => widen::<u64>(&bytes, |v| v as f64)?,
        ('u', "4") => widen::<u32>(&bytes, f64::from)?,
        ('u', "2") => widen::<u16>(&bytes, f64::from)?,
        ('u', "1") => widen::<u8>(&bytes, f64::from)?,
        ('b', "1") => widen::<bool>(&bytes, |v| if v { 1.0 } else { 0.0 })?,
        _ => bail!("unsupported dtype '{descr}'"),
    };

    Ok(Variable::Numeric(array))
}

// ---------------------------------------------------------------------------
// Octave text
// ---------------------------------------------------------------------------

pub struct OctaveTextProbe;

impl FormatProbe for OctaveTextProbe {
    fn name(&self) -> &'static str {
        "octave-text"
    }

    fn decode(&self, path: &Path) -> Result<ArrayMap> {
        let text = std::fs::read_to_string(path).context("reading octave text file")?;
        octave::parse(&text)
    }
}
