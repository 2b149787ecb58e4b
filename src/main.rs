use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};

use matchcast::api::{FailureReport, ForecastRequest, ForecastResponse};
use matchcast::args::{has_flag, parse_db_path_arg, parse_models_dir_arg};
use matchcast::error::ForecastError;
use matchcast::{ForecastConfig, PredictionService, history, persist, registry};

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

    let conn = history::open_db(&db_path)?;
    let store = Arc::new(history::load_store(&conn)?);
    drop(conn);
    if store.is_empty() {
        log::warn!("no match history in {}", db_path.display());
    }

    let registry = registry::global();
    let summary = registry.load_dir(&models_dir, &store)?;
    log::info!(
        "models: {} loaded, {} blocked, {} failed ({})",
        summary.loaded.len(),
        summary.blocked.len(),
        summary.failed.len(),
        models_dir.display()
    );
    for competition in &summary.blocked {
        log::error!("{competition}: serving disabled until the model is retrained");
    }

    let service = PredictionService::new(store, registry, ForecastConfig::from_env());
    let pretty = has_flag("--pretty");

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("read request")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ForecastRequest>(&line) {
            Ok(request) => match service.handle(request) {
                Ok(response) => response,
                Err(err) => {
                    log::error!("{err}");
                    ForecastResponse::Failure(FailureReport::from(&err))
                }
            },
            Err(err) => {
                let err = ForecastError::InvalidRequest(err.to_string());
                ForecastResponse::Failure(FailureReport::from(&err))
            }
        };
        let encoded = if pretty {
            serde_json::to_string_pretty(&response)
        } else {
            serde_json::to_string(&response)
        }
        .context("encode response")?;
        writeln!(stdout, "{encoded}").context("write response")?;
        stdout.flush().context("flush response")?;
    }
    Ok(())
}
