//! End-to-end checks over the train → persist → predict pipeline, using a
//! temporary working directory per test.

use std::path::Path;
use std::sync::Arc;

use arrow::array::{Float64Builder, ListBuilder};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use spectral_mlp::config::{CONFIG_FILE, Config};
use spectral_mlp::data::loader::{self, MATRIX_KEY};
use spectral_mlp::labels::LabelTuple;
use spectral_mlp::nn::{Head, Mlp};
use spectral_mlp::predict;
use spectral_mlp::preprocess::{load_axis, resample};
use spectral_mlp::train;

/// Learning matrix from the classifier scenario: axis [0,1,2,3] and two
/// labeled rows.
const LEARN_FILE: &str = "\
0 0 1 2 3
1 0.1 0.2 0.3 0.4
2 0.4 0.3 0.2 0.1
";

fn tiny_config() -> Config {
    let mut config = Config::default();
    config.parameters.hidden_layers = vec![8];
    config.parameters.learning_rate = 0.01;
    config.parameters.epochs = 300;
    config.parameters.full_size_batch = true;
    config.parameters.validation_split = 0.0;
    config.parameters.l2 = 0.0;
    config
}

fn train_tiny_classifier(dir: &Path) -> Config {
    let config = tiny_config();
    let learn_path = dir.join("learn.txt");
    std::fs::write(&learn_path, LEARN_FILE).unwrap();
    train::train(&config, dir, &learn_path, None).unwrap();
    config
}

#[test]
fn config_file_created_with_defaults_and_reloaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE);

    let first = Config::load_or_create(&path).unwrap();
    let second = Config::load_or_create(&path).unwrap();
    assert_eq!(first, Config::default());
    assert_eq!(first, second);
}

#[test]
fn training_persists_model_codec_and_axis() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_tiny_classifier(dir.path());

    assert!(config.model_path(dir.path()).exists());
    assert!(config.codec_path(dir.path()).exists());
    assert!(config.axis_path(dir.path()).exists());

    let axis = load_axis(&config.axis_path(dir.path())).unwrap();
    assert_eq!(axis, vec![0.0, 1.0, 2.0, 3.0]);

    // Two distinct labels plus the reserved unknown slot.
    let mlp = Mlp::load(&config.model_path(dir.path())).unwrap();
    assert_eq!(mlp.head(), Head::Classification { classes: 3 });
    assert_eq!(mlp.input_width(), 4);
}

#[test]
fn trained_classifier_separates_the_two_spectra() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_tiny_classifier(dir.path());
    let mlp = Mlp::load(&config.model_path(dir.path())).unwrap();
    let codec = spectral_mlp::labels::LabelCodec::load(&config.codec_path(dir.path())).unwrap();

    let rising = mlp.predict(&[0.1, 0.2, 0.3, 0.4]).unwrap();
    let falling = mlp.predict(&[0.4, 0.3, 0.2, 0.1]).unwrap();

    let rising_class = codec.decode(spectral_mlp::nn::argmax(&rising)).unwrap();
    let falling_class = codec.decode(spectral_mlp::nn::argmax(&falling)).unwrap();
    assert_eq!(rising_class, &LabelTuple(vec![1.0]));
    assert_eq!(falling_class, &LabelTuple(vec![2.0]));
}

#[test]
fn prediction_resamples_a_sample_with_a_different_axis() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_tiny_classifier(dir.path());

    // Six points over the same range: must be interpolated down to four.
    let axis = load_axis(&config.axis_path(dir.path())).unwrap();
    let sample_axis: Vec<f64> = (0..6).map(|i| i as f64 * 0.6).collect();
    let sample_intensity: Vec<f64> = (0..6).map(|i| 0.1 + i as f64 * 0.06).collect();
    let resampled = resample(&sample_axis, &sample_intensity, &axis).unwrap();
    assert_eq!(resampled.len(), 4);

    // The full predict path accepts the same sample from disk.
    let sample_path = dir.path().join("unseen.txt");
    let rows = [
        sample_axis
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(" "),
        sample_intensity
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(" "),
    ];
    std::fs::write(&sample_path, rows.join("\n")).unwrap();
    predict::predict(&config, dir.path(), &sample_path).unwrap();
}

#[test]
fn unreadable_sample_file_reports_and_returns_ok() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_tiny_classifier(dir.path());
    let missing = dir.path().join("no_such_sample.txt");
    predict::predict(&config, dir.path(), &missing).unwrap();
}

#[test]
fn batch_prediction_writes_one_row_per_txt_file_plus_headers() {
    let dir = tempfile::tempdir().unwrap();
    let config = train_tiny_classifier(dir.path());

    // learn.txt plus two fresh samples: three *.txt inputs in total.
    for (name, row) in [("s1.txt", "0.1 0.2 0.3 0.4"), ("s2.txt", "0.4 0.3 0.2 0.1")] {
        std::fs::write(dir.path().join(name), format!("0 1 2 3\n{row}\n")).unwrap();
    }
    predict::batch_predict(&config, dir.path()).unwrap();

    let summary = config.summary_path(dir.path());
    assert!(summary.exists());
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(&summary)
        .unwrap();
    let rows: Vec<Vec<String>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
        .collect();

    // learn.txt is skipped (not a two-row sample), s1/s2 predicted.
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0][1], "Classifier");
    assert_eq!(rows[1][0], "File name");
}

#[test]
fn regression_mode_trains_and_predicts_a_scalar() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = tiny_config();
    config.parameters.regressor = true;
    config.parameters.epochs = 300;

    // Target value equals the mean intensity of the row.
    let mut learn = String::from("0 0 1 2 3\n");
    for i in 0..8 {
        let base = 0.1 * i as f64;
        let row: Vec<f64> = (0..4).map(|j| base + j as f64 * 0.05).collect();
        let target: f64 = row.iter().sum::<f64>() / 4.0;
        learn.push_str(&format!(
            "{target} {} {} {} {}\n",
            row[0], row[1], row[2], row[3]
        ));
    }
    let learn_path = dir.path().join("learn.txt");
    std::fs::write(&learn_path, &learn).unwrap();

    let history = train::train(&config, dir.path(), &learn_path, None).unwrap();
    assert!(history.loss.last().unwrap() < history.loss.first().unwrap());
    assert!(config.model_path(dir.path()).ends_with("mlp_model_regressor.json"));

    let mlp = Mlp::load(&config.model_path(dir.path())).unwrap();
    let out = mlp.predict(&[0.1, 0.15, 0.2, 0.25]).unwrap();
    assert_eq!(out.len(), 1);
}

#[test]
fn explicit_validation_file_feeds_the_codec_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let config = tiny_config();

    let learn_path = dir.path().join("learn.txt");
    std::fs::write(&learn_path, LEARN_FILE).unwrap();
    // Validation brings a third class the training file never saw.
    let val_path = dir.path().join("validation.txt");
    std::fs::write(&val_path, "0 0 1 2 3\n3 0.2 0.2 0.2 0.2\n").unwrap();

    let history = train::train(&config, dir.path(), &learn_path, Some(&val_path)).unwrap();
    assert_eq!(history.val_loss.len(), config.parameters.epochs);

    let codec = spectral_mlp::labels::LabelCodec::load(&config.codec_path(dir.path())).unwrap();
    assert_eq!(codec.len(), 3);
    let mlp = Mlp::load(&config.model_path(dir.path())).unwrap();
    assert_eq!(mlp.head(), Head::Classification { classes: 4 });
}

#[test]
fn parquet_learning_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learn.parquet");

    let matrix = vec![
        vec![0.0, 0.0, 1.0, 2.0, 3.0],
        vec![1.0, 0.1, 0.2, 0.3, 0.4],
        vec![2.0, 0.4, 0.3, 0.2, 0.1],
    ];

    let mut m_builder = ListBuilder::new(Float64Builder::new());
    for row in &matrix {
        let values = m_builder.values();
        for &v in row {
            values.append_value(v);
        }
        m_builder.append(true);
    }
    let schema = Arc::new(Schema::new(vec![Field::new(
        MATRIX_KEY,
        DataType::List(Arc::new(Field::new("item", DataType::Float64, true))),
        false,
    )]));
    let batch = RecordBatch::try_new(schema.clone(), vec![Arc::new(m_builder.finish())]).unwrap();
    let file = std::fs::File::create(&path).unwrap();
    let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let set = loader::read_learn_file(&path, 1).unwrap();
    assert_eq!(set.axis, vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(set.len(), 2);
    assert_eq!(set.labels[0], LabelTuple(vec![1.0]));
    assert_eq!(set.features[1], vec![0.4, 0.3, 0.2, 0.1]);
}

#[test]
fn npy_learning_file_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("learn.npy");

    let matrix: [[f64; 5]; 2] = [
        [0.0, 0.0, 1.0, 2.0, 3.0],
        [1.0, 0.1, 0.2, 0.3, 0.4],
    ];
    let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (2, 5), }";
    let mut padded = header.to_string();
    while (10 + padded.len()) % 64 != 0 {
        padded.push(' ');
    }
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"\x93NUMPY\x01\x00");
    bytes.extend_from_slice(&(padded.len() as u16).to_le_bytes());
    bytes.extend_from_slice(padded.as_bytes());
    for row in &matrix {
        for v in row {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
    }
    std::fs::write(&path, bytes).unwrap();

    let set = loader::read_learn_file(&path, 1).unwrap();
    assert_eq!(set.axis, vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(set.labels[0], LabelTuple(vec![1.0]));
}
