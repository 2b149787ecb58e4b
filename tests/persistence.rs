mod common;

use std::sync::Arc;

use rusqlite::Connection;

use matchcast::api::ForecastRequest;
use matchcast::error::ForecastError;
use matchcast::features::build_features;
use matchcast::history;
use matchcast::persist;
use matchcast::registry::ModelRegistry;
use matchcast::PredictionService;

#[test]
fn saved_model_reloads_with_identical_predictions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let model = common::model(common::HOME_LEAGUE);
    let path = persist::save_model(dir.path(), &model).expect("save");
    assert_eq!(path, persist::model_path(dir.path(), common::HOME_LEAGUE));
    assert!(!path.with_extension("json.tmp").exists());

    let loaded = persist::load_model(&path).expect("load");
    loaded.ensure_schema().expect("schema");
    assert_eq!(loaded.evaluation, model.evaluation);
    assert_eq!(loaded.feature_names, model.feature_names);

    let history = common::STORE.get(common::HOME_LEAGUE).expect("history");
    let fv = build_features(
        &history,
        &common::top_team(0),
        &common::bottom_team(0),
        common::as_of(),
        &model.feature_config,
    )
    .expect("features");
    assert_eq!(model.predict(&fv).expect("p"), loaded.predict(&fv).expect("p"));
}

#[test]
fn schema_mismatch_blocks_the_competition_until_retrained() {
    let registry = Arc::new(ModelRegistry::new());
    let roster = common::STORE
        .get(common::HOME_LEAGUE)
        .expect("history")
        .roster();

    let mut stale = common::model(common::HOME_LEAGUE);
    stale.feature_names.push("legacy_elo_rating".to_string());
    let err = registry.install(stale, &roster).expect_err("mismatch");
    assert!(matches!(err, ForecastError::ModelSchemaMismatch { .. }));
    assert!(registry.is_blocked(common::HOME_LEAGUE));

    let service = PredictionService::new(
        Arc::clone(&common::STORE),
        Arc::clone(&registry),
        common::small_config(),
    );
    let fatal = service
        .handle(ForecastRequest::UpcomingFixtures {
            competition: common::HOME_LEAGUE.to_string(),
        })
        .expect_err("blocked competition is fatal");
    assert!(matches!(fatal, ForecastError::ModelSchemaMismatch { .. }));
    assert!(!fatal.is_recoverable());

    registry
        .install(common::model(common::HOME_LEAGUE), &roster)
        .expect("compatible model");
    assert!(!registry.is_blocked(common::HOME_LEAGUE));
    assert!(registry.get(common::HOME_LEAGUE).is_ok());
}

#[test]
fn replacing_a_model_leaves_in_flight_readers_untouched() {
    let registry = common::registry();
    let before = registry.get(common::HOME_LEAGUE).expect("entry");
    let mut retrained = common::model(common::HOME_LEAGUE);
    retrained.training_timestamp = "later".to_string();
    let roster = before.resolver.teams().to_vec();
    registry.install(retrained, &roster).expect("install");

    let after = registry.get(common::HOME_LEAGUE).expect("entry");
    assert_eq!(after.model.training_timestamp, "later");
    assert_ne!(before.model.training_timestamp, "later");
}

#[test]
fn load_dir_skips_bad_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    persist::save_model(dir.path(), &common::model(common::HOME_LEAGUE)).expect("save");
    persist::save_model(dir.path(), &common::model(common::AWAY_LEAGUE)).expect("save");
    std::fs::write(dir.path().join("broken.model.json"), b"{not json").expect("write");
    std::fs::write(dir.path().join("notes.txt"), b"ignored").expect("write");

    let registry = ModelRegistry::new();
    let summary = registry.load_dir(dir.path(), &common::STORE).expect("scan");
    assert_eq!(summary.loaded.len(), 2);
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.blocked.is_empty());
    assert_eq!(
        registry.competitions(),
        vec![common::AWAY_LEAGUE.to_string(), common::HOME_LEAGUE.to_string()]
    );
}

#[test]
fn generated_history_survives_sqlite() {
    let mut conn = Connection::open_in_memory().expect("db");
    history::init_schema(&conn).expect("schema");
    let rows = common::rows();
    let written = history::upsert_matches(&mut conn, &rows).expect("upsert");
    assert_eq!(written, rows.len());
    // Upserting again replaces rather than duplicates.
    history::upsert_matches(&mut conn, &rows).expect("upsert");

    let store = history::load_store(&conn).expect("load");
    assert_eq!(
        store.competitions(),
        vec![common::AWAY_LEAGUE.to_string(), common::HOME_LEAGUE.to_string()]
    );
    let loaded = store.get(common::HOME_LEAGUE).expect("history");
    let original = common::STORE.get(common::HOME_LEAGUE).expect("history");
    assert_eq!(loaded.matches(), original.matches());
}
