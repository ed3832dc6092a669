use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::array::{Array, Float32Array, Float64Array, LargeListArray, ListArray};
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use super::model::{LearningSet, RawSample};
use crate::labels::LabelTuple;

/// Fixed column key holding the learning matrix in parquet files.
pub const MATRIX_KEY: &str = "m";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a learning file and decompose it into axis, features, and labels.
/// Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – binary table with a `m` List<Float64> column, one matrix
///   row per record
/// * `.npy`     – binary 2-D array container (little-endian f64/f32, C order)
/// * anything else – dense text matrix, whitespace or comma delimited
///
/// The matrix layout is: row 0 holds `label_columns` placeholder values
/// followed by the energy axis; every other row holds the sample's label
/// value(s) followed by its intensities.
pub fn read_learn_file(path: &Path, label_columns: usize) -> Result<LearningSet> {
    log::info!("opening learning file {}", path.display());
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let matrix = match ext.as_str() {
        "parquet" | "pq" => load_parquet_matrix(path),
        "npy" => load_npy_matrix(path),
        _ => load_text_matrix(path),
    }
    .with_context(|| format!("loading learning file {}", path.display()))?;

    split_matrix(matrix, label_columns)
}

/// Read a two-row sample file (axis row, intensity row) for prediction.
pub fn read_test_file(path: &Path) -> Result<RawSample> {
    log::info!("opening sample file {}", path.display());
    let matrix = load_text_matrix(path)
        .with_context(|| format!("loading sample file {}", path.display()))?;

    if matrix.len() != 2 {
        bail!(
            "sample file {} must have exactly 2 rows (axis, intensity), found {}",
            path.display(),
            matrix.len()
        );
    }
    let mut rows = matrix.into_iter();
    let axis = rows.next().unwrap_or_default();
    let intensity = rows.next().unwrap_or_default();
    if axis.len() != intensity.len() {
        bail!(
            "sample file {}: axis has {} points but intensity has {}",
            path.display(),
            axis.len(),
            intensity.len()
        );
    }
    Ok(RawSample { axis, intensity })
}

// ---------------------------------------------------------------------------
// Matrix decomposition
// ---------------------------------------------------------------------------

/// Split a raw matrix into axis row, feature rows, and label columns.
fn split_matrix(matrix: Vec<Vec<f64>>, label_columns: usize) -> Result<LearningSet> {
    if matrix.len() < 2 {
        bail!(
            "learning matrix needs an axis row plus at least one sample row, found {} row(s)",
            matrix.len()
        );
    }
    let width = matrix[0].len();
    if width <= label_columns {
        bail!(
            "learning matrix rows have {width} column(s), need more than the {label_columns} label column(s)"
        );
    }
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != width {
            bail!("row {i} has {} columns, expected {width}", row.len());
        }
    }

    let axis: Vec<f64> = matrix[0][label_columns..].to_vec();
    let mut features = Vec::with_capacity(matrix.len() - 1);
    let mut labels = Vec::with_capacity(matrix.len() - 1);
    for row in &matrix[1..] {
        labels.push(LabelTuple(row[..label_columns].to_vec()));
        features.push(row[label_columns..].to_vec());
    }

    Ok(LearningSet {
        axis,
        features,
        labels,
    })
}

// ---------------------------------------------------------------------------
// Text loader
// ---------------------------------------------------------------------------

/// Dense text matrix: one row per line, values separated by whitespace or
/// commas. Blank lines and `#` comment lines are skipped.
fn load_text_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let text = std::fs::read_to_string(path).context("reading text matrix")?;
    let mut matrix = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row: Vec<f64> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<f64>()
                    .with_context(|| format!("line {}: '{tok}' is not a number", line_no + 1))
            })
            .collect::<Result<_>>()?;
        matrix.push(row);
    }

    if matrix.is_empty() {
        bail!("no numeric rows found");
    }
    Ok(matrix)
}

// ---------------------------------------------------------------------------
// NPY loader
// ---------------------------------------------------------------------------

/// Minimal NPY (v1/v2) reader for 2-D little-endian float arrays in C order.
fn load_npy_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let data = std::fs::read(path).context("reading npy file")?;

    const MAGIC: &[u8] = b"\x93NUMPY";
    if data.len() < 10 || &data[..6] != MAGIC {
        bail!("not an NPY file (bad magic)");
    }
    let major = data[6];
    let (header_start, header_len) = match major {
        1 => (10, u16::from_le_bytes([data[8], data[9]]) as usize),
        2 | 3 => {
            if data.len() < 12 {
                bail!("truncated NPY v{major} header");
            }
            (
                12,
                u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize,
            )
        }
        other => bail!("unsupported NPY version {other}"),
    };
    if data.len() < header_start + header_len {
        bail!("truncated NPY header");
    }
    let header = std::str::from_utf8(&data[header_start..header_start + header_len])
        .context("NPY header is not valid UTF-8")?;

    let descr = npy_header_field(header, "descr")?;
    let item_size = match descr.trim_matches(&['\'', '"'][..]) {
        "<f8" => 8,
        "<f4" => 4,
        other => bail!("unsupported NPY dtype {other}, expected <f8 or <f4"),
    };
    let fortran = npy_header_field(header, "fortran_order")?;
    if fortran != "False" {
        bail!("Fortran-ordered NPY arrays are not supported");
    }
    let (rows, cols) = npy_header_shape(header)?;

    let payload = &data[header_start + header_len..];
    let expected = rows * cols * item_size;
    if payload.len() < expected {
        bail!(
            "NPY payload is {} bytes, expected {expected} for a {rows}x{cols} array",
            payload.len()
        );
    }

    let mut matrix = Vec::with_capacity(rows);
    for r in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for c in 0..cols {
            let offset = (r * cols + c) * item_size;
            let value = if item_size == 8 {
                f64::from_le_bytes(payload[offset..offset + 8].try_into().unwrap_or_default())
            } else {
                f32::from_le_bytes(payload[offset..offset + 4].try_into().unwrap_or_default())
                    as f64
            };
            row.push(value);
        }
        matrix.push(row);
    }
    Ok(matrix)
}

/// Pull a single `'key': value` entry out of the NPY header dict literal.
fn npy_header_field(header: &str, key: &str) -> Result<String> {
    let needle = format!("'{key}':");
    let start = header
        .find(&needle)
        .with_context(|| format!("NPY header missing '{key}'"))?
        + needle.len();
    let rest = header[start..].trim_start();
    let end = rest
        .find(',')
        .with_context(|| format!("NPY header '{key}' entry is not terminated"))?;
    Ok(rest[..end].trim().to_string())
}

fn npy_header_shape(header: &str) -> Result<(usize, usize)> {
    let start = header
        .find("'shape':")
        .context("NPY header missing 'shape'")?;
    let open = header[start..]
        .find('(')
        .context("NPY shape is not a tuple")?
        + start;
    let close = header[open..].find(')').context("NPY shape is not a tuple")? + open;
    let dims: Vec<usize> = header[open + 1..close]
        .split(',')
        .filter(|tok| !tok.trim().is_empty())
        .map(|tok| {
            tok.trim()
                .parse::<usize>()
                .with_context(|| format!("bad NPY shape entry '{}'", tok.trim()))
        })
        .collect::<Result<_>>()?;
    if dims.len() != 2 {
        bail!("expected a 2-D NPY array, shape has {} dimension(s)", dims.len());
    }
    Ok((dims[0], dims[1]))
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Binary table container: a parquet file whose `m` column holds the matrix
/// as List<Float64> (or LargeList / Float32), one row per record.
fn load_parquet_matrix(path: &Path) -> Result<Vec<Vec<f64>>> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut matrix = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let m_idx = batch
            .schema()
            .index_of(MATRIX_KEY)
            .map_err(|_| anyhow::anyhow!("parquet file missing '{MATRIX_KEY}' column"))?;
        let m_col = batch.column(m_idx);

        for row in 0..batch.num_rows() {
            let values = extract_f64_list(m_col, row)
                .with_context(|| format!("row {row}: failed to read '{MATRIX_KEY}'"))?;
            matrix.push(values);
        }
    }

    if matrix.is_empty() {
        bail!("parquet file holds no matrix rows");
    }
    Ok(matrix)
}

/// Extract a `Vec<f64>` from a List or LargeList column at the given row.
fn extract_f64_list(col: &Arc<dyn Array>, row: usize) -> Result<Vec<f64>> {
    if col.is_null(row) {
        bail!("null value in list column");
    }

    let values_array = match col.data_type() {
        DataType::List(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<ListArray>()
                .context("expected ListArray")?;
            list_arr.value(row)
        }
        DataType::LargeList(_) => {
            let list_arr = col
                .as_any()
                .downcast_ref::<LargeListArray>()
                .context("expected LargeListArray")?;
            list_arr.value(row)
        }
        other => bail!("Expected List or LargeList column, got {other:?}"),
    };

    // The inner array can be Float64 or Float32
    if let Some(f64_arr) = values_array.as_any().downcast_ref::<Float64Array>() {
        Ok(f64_arr.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    } else if let Some(f32_arr) = values_array.as_any().downcast_ref::<Float32Array>() {
        Ok(f32_arr.iter().map(|v| v.unwrap_or(f32::NAN) as f64).collect())
    } else {
        bail!(
            "List inner type is {:?}, expected Float64 or Float32",
            values_array.data_type()
        )
    }
}
