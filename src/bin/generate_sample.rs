//! Generates a synthetic Raman learning set for trying the tool end to end:
//! a labeled learning matrix (text and parquet encodings) plus a few
//! two-row sample files for `--predict` / `--batch`.

use std::fmt::Write as _;
use std::sync::Arc;

use arrow::array::{Float64Builder, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use spectral_mlp::data::loader::MATRIX_KEY;
use spectral_mlp::rng::SimpleRng;

fn gaussian(x: f64, mu: f64, sigma: f64, amplitude: f64) -> f64 {
    amplitude * (-(x - mu).powi(2) / (2.0 * sigma.powi(2))).exp()
}

fn generate_spectrum(
    wavenumbers: &[f64],
    peaks: &[(f64, f64, f64)],
    noise_level: f64,
    rng: &mut SimpleRng,
) -> Vec<f64> {
    wavenumbers
        .iter()
        .map(|&wn| {
            let signal: f64 = peaks
                .iter()
                .map(|&(mu, sigma, amp)| gaussian(wn, mu, sigma, amp))
                .sum();
            signal + rng.gauss(0.0, noise_level)
        })
        .collect()
}

fn main() {
    let mut rng = SimpleRng::new(42);

    // Wavenumbers: 4000 → 2002, step 2
    let wavenumbers: Vec<f64> = (0..1000).map(|i| 4000.0 - i as f64 * 2.0).collect();

    // One class per substance, a few repeats each.
    let class_peaks: Vec<(f64, Vec<(f64, f64, f64)>)> = vec![
        (1.0, vec![(3400.0, 80.0, 0.8), (2900.0, 40.0, 0.5), (2350.0, 30.0, 0.3)]),
        (2.0, vec![(3200.0, 60.0, 0.6), (2800.0, 50.0, 0.7), (2500.0, 35.0, 0.4)]),
        (3.0, vec![(3600.0, 70.0, 0.9), (3000.0, 45.0, 0.4), (2200.0, 25.0, 0.5)]),
    ];
    let repeats = 8;

    // Matrix layout: row 0 = [0, axis...]; sample rows = [label, intensities...].
    let mut matrix: Vec<Vec<f64>> = Vec::new();
    let mut axis_row = vec![0.0];
    axis_row.extend_from_slice(&wavenumbers);
    matrix.push(axis_row);

    for (label, peaks) in &class_peaks {
        for _ in 0..repeats {
            let y = generate_spectrum(&wavenumbers, peaks, 0.01, &mut rng);
            let mut row = vec![*label];
            row.extend_from_slice(&y);
            matrix.push(row);
        }
    }

    write_text_matrix("learn_data.txt", &matrix);
    write_parquet_matrix("learn_data.parquet", &matrix);

    // Sample files on a shorter axis so prediction exercises resampling.
    let short_axis: Vec<f64> = (0..500).map(|i| 4000.0 - i as f64 * 4.0).collect();
    for (label, peaks) in &class_peaks {
        let y = generate_spectrum(&short_axis, peaks, 0.01, &mut rng);
        let name = format!("sample_{}.txt", *label as i64);
        write_two_row_file(&name, &short_axis, &y);
    }

    println!(
        "Wrote {} spectra ({} wavenumbers each) to learn_data.txt / learn_data.parquet",
        matrix.len() - 1,
        wavenumbers.len()
    );
    println!("Wrote {} sample files for --predict / --batch", class_peaks.len());
}

fn write_text_matrix(path: &str, matrix: &[Vec<f64>]) {
    let mut text = String::new();
    for row in matrix {
        let mut first = true;
        for v in row {
            if !first {
                text.push(' ');
            }
            let _ = write!(text, "{v}");
            first = false;
        }
        text.push('\n');
    }
    std::fs::write(path, text).expect("Failed to write text matrix");
}

fn write_two_row_file(path: &str, axis: &[f64], intensity: &[f64]) {
    let mut text = String::new();
    for row in [axis, intensity] {
        let joined: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        text.push_str(&joined.join(" "));
        text.push('\n');
    }
    std::fs::write(path, text).expect("Failed to write sample file");
}

fn write_parquet_matrix(path: &str, matrix: &[Vec<f64>]) {
    let mut m_builder = ListBuilder::new(Float64Builder::new());
    for row in matrix {
        let values = m_builder.values();
        for &v in row {
            values.append_value(v);
        }
        m_builder.append(true);
    }
    let m_array = m_builder.finish();

    let schema = Arc::new(Schema::new(vec![Field::new(
        MATRIX_KEY,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )]));

    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(m_array)])
        .expect("Failed to create RecordBatch");

    let file = std::fs::File::create(path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");
}
