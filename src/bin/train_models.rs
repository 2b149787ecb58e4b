use std::time::Instant;

use anyhow::{Context, Result, bail};
use rayon::prelude::*;

use matchcast::args::{has_flag, parse_db_path_arg, parse_list_arg, parse_models_dir_arg};
use matchcast::error::ForecastError;
use matchcast::training::TrainingPipeline;
use matchcast::{ForecastConfig, history, persist};

enum Outcome {
    Saved { path: String, test_accuracy: f64, samples: usize },
    Skipped(String),
    Failed(String),
}

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let db_path = parse_db_path_arg()
        .or_else(history::default_db_path)
        .context("unable to resolve sqlite path")?;
    let models_dir = parse_models_dir_arg()
        .or_else(persist::default_models_dir)
        .context("unable to resolve models directory")?;
    let dry_run = has_flag("--dry-run");

    let conn = history::open_db(&db_path)?;
    let store = history::load_store(&conn)?;
    drop(conn);

    let competitions = parse_list_arg("--competitions").unwrap_or_else(|| store.competitions());
    if competitions.is_empty() {
        bail!("no competitions in {}", db_path.display());
    }

    let config = ForecastConfig::from_env();
    let pipeline = TrainingPipeline::new(&store, config);
    let started = Instant::now();

    // One competition failing never stops the others.
    let results = competitions
        .par_iter()
        .map(|competition| {
            let outcome = match pipeline.train(competition) {
                Ok(model) if dry_run => Outcome::Saved {
                    path: "(dry run)".to_string(),
                    test_accuracy: model.test_accuracy,
                    samples: model.sample_count,
                },
                Ok(model) => match persist::save_model(&models_dir, &model) {
                    Ok(path) => Outcome::Saved {
                        path: path.display().to_string(),
                        test_accuracy: model.test_accuracy,
                        samples: model.sample_count,
                    },
                    Err(err) => Outcome::Failed(format!("{err:#}")),
                },
                Err(err @ ForecastError::EmptyDataset { .. }) => Outcome::Skipped(err.to_string()),
                Err(err) => Outcome::Failed(err.to_string()),
            };
            (competition.clone(), outcome)
        })
        .collect::<Vec<_>>();

    let mut failed = 0usize;
    for (competition, outcome) in &results {
        match outcome {
            Outcome::Saved {
                path,
                test_accuracy,
                samples,
            } => println!(
                "{competition:<24} ok       samples={samples:<6} test_acc={test_accuracy:.3} {path}"
            ),
            Outcome::Skipped(reason) => println!("{competition:<24} skipped  {reason}"),
            Outcome::Failed(reason) => {
                failed += 1;
                println!("{competition:<24} FAILED   {reason}");
            }
        }
    }
    log::info!(
        "trained {} competitions in {:.1}s",
        results.len(),
        started.elapsed().as_secs_f64()
    );
    if failed > 0 {
        bail!("{failed} competitions failed to train");
    }
    Ok(())
}
