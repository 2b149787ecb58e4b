#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;

use matchcast::config::ForecastConfig;
use matchcast::fake_feed::{LeagueSpec, generate_league, team_names};
use matchcast::history::{MatchHistoryStore, MatchRecord};
use matchcast::model::TrainedModel;
use matchcast::registry::ModelRegistry;
use matchcast::training::TrainingPipeline;
use matchcast::PredictionService;

pub const HOME_LEAGUE: &str = "test_premier";
pub const AWAY_LEAGUE: &str = "test_liga";

/// Ten teams, four seasons, the last one ten rounds in. The last fixture
/// played is on 2024-10-10 and the first scheduled one on 2024-10-17.
pub fn spec(competition: &str, seed: u64, name_offset: usize) -> LeagueSpec {
    let mut spec = LeagueSpec::new(competition, seed);
    spec.name_offset = name_offset;
    spec.id_offset = name_offset as u64 * 100_000;
    spec
}

pub fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 12).expect("date")
}

pub fn small_config() -> ForecastConfig {
    let mut cfg = ForecastConfig::default();
    cfg.training.forest.n_trees = 30;
    cfg.training.forest.max_depth = 8;
    cfg.simulation.default_runs = 500;
    cfg
}

pub fn rows() -> Vec<MatchRecord> {
    let mut rows = generate_league(&spec(HOME_LEAGUE, 11, 0));
    let mut other = spec(AWAY_LEAGUE, 23, 10);
    other.goals_per_team = 1.1;
    rows.extend(generate_league(&other));
    rows
}

pub fn top_team(name_offset: usize) -> String {
    team_names(1, name_offset).remove(0)
}

pub fn bottom_team(name_offset: usize) -> String {
    team_names(10, name_offset).remove(9)
}

pub static STORE: Lazy<Arc<MatchHistoryStore>> =
    Lazy::new(|| Arc::new(MatchHistoryStore::from_records(rows())));

pub static MODELS: Lazy<Vec<TrainedModel>> = Lazy::new(|| {
    let pipeline = TrainingPipeline::new(&STORE, small_config());
    [HOME_LEAGUE, AWAY_LEAGUE]
        .iter()
        .map(|c| pipeline.train(c).expect("train"))
        .collect()
});

pub fn model(competition: &str) -> TrainedModel {
    MODELS
        .iter()
        .find(|m| m.competition == competition)
        .cloned()
        .expect("model")
}

/// Fresh registry with both test leagues installed.
pub fn registry() -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::new());
    for m in MODELS.iter() {
        let roster = STORE.get(&m.competition).expect("history").roster();
        registry.install(m.clone(), &roster).expect("install");
    }
    registry
}

pub fn service() -> PredictionService {
    PredictionService::new(Arc::clone(&STORE), registry(), small_config()).with_as_of(as_of())
}
