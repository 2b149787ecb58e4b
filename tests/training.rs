mod common;

use matchcast::calibration::{Outcome, mean_probs};
use matchcast::config::ClassWeights;
use matchcast::error::ForecastError;
use matchcast::fake_feed::{LeagueSpec, generate_league};
use matchcast::forest::ProbabilisticClassifier;
use matchcast::history::{CompetitionHistory, MatchHistoryStore};
use matchcast::training::{TrainingPipeline, build_training_set, train_history};

#[test]
fn retraining_with_a_fixed_seed_is_deterministic() {
    let history = common::STORE.get(common::HOME_LEAGUE).expect("history");
    let cfg = common::small_config();
    let a = train_history(&history, &cfg).expect("train");
    let b = train_history(&history, &cfg).expect("train");

    assert_eq!(a.evaluation, b.evaluation);
    assert_eq!(a.training_accuracy, b.training_accuracy);
    assert_eq!(a.test_accuracy, b.test_accuracy);
    assert_eq!(a.feature_importance, b.feature_importance);
    assert_eq!(a.sample_count, b.sample_count);
}

#[test]
fn in_progress_season_is_left_out_of_training() {
    let model = common::model(common::HOME_LEAGUE);
    assert_eq!(model.seasons, vec!["2021/22", "2022/23", "2023/24"]);
    assert_eq!(model.train_samples + model.test_samples, model.sample_count);
    assert!(model.skipped_rows > 0, "early rounds lack history");
    assert_eq!(model.class_labels, Outcome::ALL.to_vec());
    assert_eq!(model.hyperparameters.n_trees, 30);
    model.ensure_schema().expect("schema matches this build");
}

#[test]
fn discounted_draw_weight_lowers_predicted_draws() {
    let history = common::STORE.get(common::HOME_LEAGUE).expect("history");
    let weighted_cfg = common::small_config();
    let mut flat_cfg = common::small_config();
    flat_cfg.training.weighting.class_weights = ClassWeights::uniform();
    assert!(weighted_cfg.training.weighting.class_weights.draw < 1.0);

    let weighted = train_history(&history, &weighted_cfg).expect("train");
    let flat = train_history(&history, &flat_cfg).expect("train");

    let set = build_training_set(&history, &weighted_cfg).expect("rows");
    let predict_all = |model: &matchcast::model::TrainedModel| {
        set.rows
            .iter()
            .map(|r| model.classifier.predict_proba(r.features.values()).expect("predict"))
            .collect::<Vec<_>>()
    };
    let weighted_draw = mean_probs(&predict_all(&weighted)).draw;
    let flat_draw = mean_probs(&predict_all(&flat)).draw;
    assert!(
        weighted_draw < flat_draw,
        "draw weight 0.6 gave {weighted_draw:.4}, unweighted {flat_draw:.4}"
    );
}

#[test]
fn small_competition_is_an_empty_dataset_and_others_still_train() {
    let mut tiny = LeagueSpec::new("tiny_cup", 3);
    tiny.teams = 4;
    tiny.seasons = 1;
    tiny.current_season_played_rounds = None;
    let mut rows = generate_league(&tiny);
    rows.extend(
        common::rows()
            .into_iter()
            .filter(|m| m.competition == common::HOME_LEAGUE),
    );
    let store = MatchHistoryStore::from_records(rows);
    let pipeline = TrainingPipeline::new(&store, common::small_config());

    match pipeline.train("tiny_cup") {
        Err(ForecastError::EmptyDataset {
            usable, required, ..
        }) => {
            assert!(usable < required);
        }
        other => panic!("expected EmptyDataset, got {:?}", other.map(|m| m.sample_count)),
    }
    let ok = pipeline.train(common::HOME_LEAGUE).expect("unaffected");
    assert!(ok.sample_count >= common::small_config().training.min_training_matches);
}

#[test]
fn training_rows_are_walk_forward() {
    let history: std::sync::Arc<CompetitionHistory> =
        common::STORE.get(common::HOME_LEAGUE).expect("history");
    let set = build_training_set(&history, &common::small_config()).expect("rows");
    assert!(set.rows.windows(2).all(|w| w[0].date <= w[1].date));
    assert_eq!(set.excluded_season.as_deref(), Some("2024/25"));
    assert!(set.rows.iter().all(|r| r.weight > 0.0));
    let newest = set.rows.last().expect("rows");
    let oldest = set.rows.first().expect("rows");
    if newest.label == oldest.label {
        assert!(newest.weight > oldest.weight);
    }
}
