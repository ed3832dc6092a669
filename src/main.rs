use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Result;
use clap::{ArgGroup, Parser};

use spectral_mlp::config::{self, Config};
use spectral_mlp::{predict, train};

/// Train and run an MLP classifier/regressor over 1-D spectral data.
///
/// Hyperparameters live in `spectral_mlp.toml` in the working directory;
/// the file is created with documented defaults on first run.
#[derive(Debug, Parser)]
#[command(name = "spectral-mlp", version, about)]
#[command(group = ArgGroup::new("mode").required(true))]
struct Cli {
    /// Train on a learning file, optionally against an explicit
    /// validation file (otherwise a random split is held out)
    #[arg(
        short = 't',
        long = "train",
        num_args = 1..=2,
        value_names = ["LEARN_FILE", "VALIDATION_FILE"],
        group = "mode"
    )]
    train: Option<Vec<PathBuf>>,

    /// Predict a single two-row sample file (axis row, intensity row)
    #[arg(short = 'p', long = "predict", value_name = "SAMPLE_FILE", group = "mode")]
    predict: Option<PathBuf>,

    /// Predict every *.txt sample in the working directory and write a
    /// summary table
    #[arg(short = 'b', long = "batch", group = "mode")]
    batch: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let start = Instant::now();

    if let Err(err) = run(&cli) {
        log::error!("{err:#}");
        eprintln!(" Error: {err:#}");
        eprintln!(" See --help for usage.");
        return ExitCode::from(2);
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        " Total time: {elapsed:.1}s or {:.1}m or {:.1}h\n",
        elapsed / 60.0,
        elapsed / 3600.0
    );
    ExitCode::SUCCESS
}

fn run(cli: &Cli) -> Result<()> {
    let workdir = Path::new(".");
    let config = Config::load_or_create(&workdir.join(config::CONFIG_FILE))?;

    if let Some(paths) = &cli.train {
        let learn = &paths[0];
        let validation = paths.get(1).map(PathBuf::as_path);
        train::train(&config, workdir, learn, validation)?;
    } else if let Some(sample) = &cli.predict {
        predict::predict(&config, workdir, sample)?;
    } else if cli.batch {
        predict::batch_predict(&config, workdir)?;
    }
    Ok(())
}
