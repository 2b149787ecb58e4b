use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use matchcast::args::{
    has_flag, parse_db_path_arg, parse_models_dir_arg, parse_string_arg, parse_u64_arg,
    parse_usize_arg,
};
use matchcast::simulation::CancellationToken;
use matchcast::{ForecastConfig, ModelRegistry, PredictionService, history, persist};

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let competition = parse_string_arg("--competition")
        .context("usage: simulate_season --competition <key> [--runs N] [--seed N] [--json]")?;
    let db_path = parse_db_path_arg()
        .or_else(history::default_db_path)
        .context("unable to resolve sqlite path")?;
    let models_dir = parse_models_dir_arg()
        .or_else(persist::default_models_dir)
        .context("unable to resolve models directory")?;

    let conn = history::open_db(&db_path)?;
    let store = Arc::new(history::load_store(&conn)?);
    drop(conn);

    let registry = Arc::new(ModelRegistry::new());
    let model = persist::load_model(&persist::model_path(&models_dir, &competition))?;
    let roster = store.get(&competition)?.roster();
    registry.install(model, &roster)?;

    let config = ForecastConfig::from_env();
    let runs = parse_usize_arg("--runs");
    let seed = parse_u64_arg("--seed").unwrap_or(config.simulation.seed);
    let service = PredictionService::new(store, registry, config);

    let started = Instant::now();
    let result = service
        .simulate_season_with(&competition, runs, seed, &CancellationToken::new())?;

    if has_flag("--json") {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!(
        "{} {} | runs={} ok={} failed={} | fixtures={} (fallback {}) | seed={} | {:.2}s",
        result.competition,
        result.season.as_deref().unwrap_or("-"),
        result.runs_requested,
        result.completed_runs,
        result.failed_runs,
        result.remaining_fixtures,
        result.fallback_fixtures,
        result.seed,
        started.elapsed().as_secs_f64()
    );
    println!(
        "{:<28} {:>5} {:>7} {:>5} {:>5} {:>6} {:>6} {:>7}",
        "team", "now", "mean", "min", "max", "sd", "pos", "title%"
    );
    for t in &result.teams {
        println!(
            "{:<28} {:>5} {:>7.2} {:>5} {:>5} {:>6.2} {:>6.2} {:>7.2}",
            t.team,
            t.current_points,
            t.mean_points,
            t.min_points,
            t.max_points,
            t.std_points,
            t.mean_position,
            100.0 * t.title_probability
        );
    }
    for f in &result.failures {
        println!("run {} failed: {}", f.run_index, f.message);
    }
    Ok(())
}
