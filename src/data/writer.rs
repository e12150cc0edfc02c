//! Encoders for the three formats the loader reads.
//!
//! Used to produce demo inputs and fixtures; synthesized samples are never
//! written by this crate.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{ArrayRef, Float64Builder, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use ndarray::ArrayD;
use ndarray_npy::WriteNpyExt;
use parquet::arrow::ArrowWriter;

use super::loader::SHAPE_KEY;
use super::model::{ArrayMap, Variable};

fn numeric_only<'a>(arrays: &'a ArrayMap, format: &str) -> Result<Vec<(&'a String, &'a ArrayD<f64>)>> {
    arrays
        .iter()
        .map(|(name, var)| match var {
            Variable::Numeric(a) => Ok((name, a)),
            Variable::Opaque(_) => bail!("'{name}': object entries cannot be written as {format}"),
        })
        .collect()
}

/// One single-row `List<Float64>` column per variable, shape in field metadata.
pub fn write_parquet(path: &Path, arrays: &ArrayMap) -> Result<()> {
    let vars = numeric_only(arrays, "parquet")?;
    if vars.is_empty() {
        bail!("nothing to write");
    }

    let mut fields = Vec::with_capacity(vars.len());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(vars.len());
    for (name, array) in vars {
        let shape = array
            .shape()
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let item = Arc::new(Field::new("item", DataType::Float64, true));
        fields.push(
            Field::new(name.as_str(), DataType::List(item), false)
                .with_metadata(HashMap::from([(SHAPE_KEY.to_string(), shape)])),
        );

        let mut builder = ListBuilder::new(Float64Builder::new());
        let values = builder.values();
        for &v in array.iter() {
            values.append_value(v);
        }
        builder.append(true);
        columns.push(Arc::new(builder.finish()));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), columns).context("building record batch")?;
    let file = File::create(path).context("creating parquet file")?;
    let mut writer = ArrowWriter::try_new(file, schema, None).context("creating parquet writer")?;
    writer.write(&batch).context("writing record batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

/// Zip of `.npy` members, one per variable, as `numpy.savez` lays them out.
pub fn write_npz(path: &Path, arrays: &ArrayMap) -> Result<()> {
    let file = File::create(path).context("creating npz archive")?;
    let mut zip = zip::ZipWriter::new(file);

    for (name, var) in arrays {
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        let bytes = match var {
            Variable::Numeric(array) => {
                let mut buf = Vec::new();
                array
                    .write_npy(&mut buf)
                    .with_context(|| format!("encoding '{name}'"))?;
                buf
            }
            Variable::Opaque(entry) => entry.bytes.clone(),
        };
        zip.start_file(format!("{name}.npy"), options)
            .with_context(|| format!("adding member '{name}'"))?;
        zip.write_all(&bytes)
            .with_context(|| format!("writing member '{name}'"))?;
    }
    zip.finish().context("finishing npz archive")?;
    Ok(())
}

/// Octave `save -text` layout with an explicit dimension line per matrix.
pub fn write_octave_text(path: &Path, arrays: &ArrayMap) -> Result<()> {
    let vars = numeric_only(arrays, "octave text")?;
    let mut text = String::from("# Created by eeg-source-synth\n");
    for (name, array) in vars {
        writeln!(text, "# name: {name}")?;
        if array.ndim() == 0 {
            writeln!(text, "# type: scalar")?;
            writeln!(text, "{}", array.iter().next().copied().unwrap_or(0.0))?;
        } else {
            writeln!(text, "# type: matrix")?;
            writeln!(text, "# ndims: {}", array.ndim())?;
            let dims: Vec<String> = array.shape().iter().map(usize::to_string).collect();
            writeln!(text, " {}", dims.join(" "))?;
            // reversed axes iterate the original in column-major order
            for v in array.t().iter() {
                writeln!(text, " {v}")?;
            }
        }
        text.push('\n');
    }
    std::fs::write(path, text).context("writing octave text file")?;
    Ok(())
}
