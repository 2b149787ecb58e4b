use std::collections::HashSet;

use chrono::{NaiveDate, Utc};

use crate::calibration::Outcome;
use crate::config::{ForecastConfig, RecencyCurve, WeightingConfig};
use crate::error::{ForecastError, Result};
use crate::features::{self, FeatureEngineer, FeatureVector};
use crate::forest::{ClassifierArtifact, ProbabilisticClassifier, RandomForest};
use crate::history::{CompetitionHistory, MatchHistoryStore};
use crate::model::{FeatureImportance, MODEL_FORMAT_VERSION, ModelEvaluation, TrainedModel};
use crate::report::EvaluationReport;

#[derive(Debug, Clone)]
pub struct TrainingRow {
    pub match_id: u64,
    pub date: NaiveDate,
    pub season: String,
    pub features: FeatureVector,
    pub label: Outcome,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub competition: String,
    /// Chronological.
    pub rows: Vec<TrainingRow>,
    pub seasons: Vec<String>,
    pub excluded_season: Option<String>,
    pub skipped: usize,
}

impl TrainingSet {
    pub fn distinct_labels(&self) -> usize {
        self.rows.iter().map(|r| r.label).collect::<HashSet<_>>().len()
    }
}

/// Recency weight per retained season, oldest first; the newest season gets
/// `ratio` times the weight of the oldest.
pub fn season_weights(seasons: usize, curve: RecencyCurve, ratio: f64) -> Vec<f64> {
    if seasons == 0 {
        return Vec::new();
    }
    if seasons == 1 {
        return vec![1.0];
    }
    let ratio = ratio.max(1.0);
    let span = (seasons - 1) as f64;
    (0..seasons)
        .map(|s| {
            let t = s as f64 / span;
            match curve {
                RecencyCurve::Exponential => ratio.powf(t),
                RecencyCurve::Linear => 1.0 + (ratio - 1.0) * t,
            }
        })
        .collect()
}

pub fn sample_weight(weighting: &WeightingConfig, season_weight: f64, label: Outcome) -> f64 {
    season_weight * weighting.class_weights.weight(label)
}

/// First index of the held-out tail.
pub fn train_split_index(n: usize, holdout_fraction: f64) -> usize {
    if n <= 2 {
        return 1;
    }
    let idx = ((n as f64) * (1.0 - holdout_fraction)).round() as usize;
    idx.clamp(1, n - 1)
}

pub struct TrainingPipeline<'a> {
    store: &'a MatchHistoryStore,
    config: ForecastConfig,
}

impl<'a> TrainingPipeline<'a> {
    pub fn new(store: &'a MatchHistoryStore, config: ForecastConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn train(&self, competition: &str) -> Result<TrainedModel> {
        let history = self.store.get(competition)?;
        train_history(&history, &self.config)
    }
}

/// Walk-forward feature rows for every played match of the retained seasons.
/// The current season is left out while it still has scheduled fixtures.
pub fn build_training_set(
    history: &CompetitionHistory,
    config: &ForecastConfig,
) -> Result<TrainingSet> {
    let mut seasons = history.seasons().to_vec();
    let excluded_season = match seasons.last() {
        Some(last) if history.season_in_progress(last) => seasons.pop(),
        _ => None,
    };
    let keep_from = seasons
        .len()
        .saturating_sub(config.training.max_seasons.max(1));
    let seasons = seasons.split_off(keep_from);
    let weights = season_weights(
        seasons.len(),
        config.training.weighting.recency_curve,
        config.training.weighting.recency_ratio,
    );

    let mut engineer = FeatureEngineer::new(history, config.features);
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for m in history.matches() {
        let Some(season_idx) = seasons.iter().position(|s| *s == m.season) else {
            continue;
        };
        let Some(label) = m.outcome() else {
            continue;
        };
        match engineer.build(&m.home_team, &m.away_team, m.date) {
            Ok(features) => rows.push(TrainingRow {
                match_id: m.id,
                date: m.date,
                season: m.season.clone(),
                features,
                label,
                weight: sample_weight(&config.training.weighting, weights[season_idx], label),
            }),
            Err(ForecastError::InsufficientHistory { .. }) => skipped += 1,
            Err(err) => return Err(err),
        }
    }

    Ok(TrainingSet {
        competition: history.competition().to_string(),
        rows,
        seasons,
        excluded_season,
        skipped,
    })
}

pub fn train_history(history: &CompetitionHistory, config: &ForecastConfig) -> Result<TrainedModel> {
    let set = build_training_set(history, config)?;
    let competition = set.competition.clone();
    let required = config.training.min_training_matches;

    if set.rows.len() < required || set.distinct_labels() < 3 {
        return Err(ForecastError::EmptyDataset {
            competition,
            usable: set.rows.len(),
            required,
        });
    }

    let split = train_split_index(set.rows.len(), config.training.holdout_fraction);
    let (train_rows, test_rows) = set.rows.split_at(split);

    let x_train = train_rows
        .iter()
        .map(|r| r.features.values().to_vec())
        .collect::<Vec<_>>();
    let y_train = train_rows.iter().map(|r| r.label).collect::<Vec<_>>();
    let w_train = train_rows.iter().map(|r| r.weight).collect::<Vec<_>>();

    let mut classifier =
        ClassifierArtifact::RandomForest(RandomForest::new(config.training.forest));
    classifier.fit(&x_train, &y_train, &w_train)?;

    let evaluate = |rows: &[TrainingRow]| -> Result<EvaluationReport> {
        let mut preds = Vec::with_capacity(rows.len());
        for r in rows {
            preds.push(classifier.predict_proba(r.features.values())?);
        }
        let outcomes = rows.iter().map(|r| r.label).collect::<Vec<_>>();
        Ok(EvaluationReport::evaluate(&preds, &outcomes))
    };
    let train_report = evaluate(train_rows)?;
    let test_report = evaluate(test_rows)?;

    let names = features::feature_names();
    let mut importance = names
        .iter()
        .zip(classifier.feature_importances())
        .map(|(feature, importance)| FeatureImportance {
            feature: feature.clone(),
            importance,
        })
        .collect::<Vec<_>>();
    importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    log::info!(
        "{competition}: trained on {} rows ({} train / {} test, {} skipped), accuracy train={:.3} test={:.3} log_loss={:.4}",
        set.rows.len(),
        train_rows.len(),
        test_rows.len(),
        set.skipped,
        train_report.accuracy,
        test_report.accuracy,
        test_report.log_loss
    );
    if let Some(season) = &set.excluded_season {
        log::debug!("{competition}: season {season} in progress, excluded from training");
    }

    Ok(TrainedModel {
        format_version: MODEL_FORMAT_VERSION,
        competition,
        classifier,
        schema_fingerprint: features::schema_fingerprint(&names),
        feature_names: names,
        class_labels: Outcome::ALL.to_vec(),
        training_accuracy: train_report.accuracy,
        test_accuracy: test_report.accuracy,
        evaluation: ModelEvaluation {
            train: train_report,
            test: test_report,
        },
        sample_count: set.rows.len(),
        train_samples: train_rows.len(),
        test_samples: test_rows.len(),
        skipped_rows: set.skipped,
        seasons: set.seasons,
        hyperparameters: config.training.forest,
        weighting: config.training.weighting,
        feature_config: config.features,
        feature_importance: importance,
        training_timestamp: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_weights_favour_recent_seasons() {
        for curve in [RecencyCurve::Exponential, RecencyCurve::Linear] {
            let w = season_weights(5, curve, 8.0);
            assert_eq!(w.len(), 5);
            assert!(w.windows(2).all(|p| p[1] > p[0]));
            assert!((w[0] - 1.0).abs() < 1e-12);
            assert!((w[4] / w[0] - 8.0).abs() < 1e-9);
        }
        assert_eq!(season_weights(1, RecencyCurve::Linear, 8.0), vec![1.0]);
        assert!(season_weights(0, RecencyCurve::Linear, 8.0).is_empty());
    }

    #[test]
    fn draw_weight_is_discounted() {
        let cfg = WeightingConfig::default();
        assert!(sample_weight(&cfg, 2.0, Outcome::Draw) < sample_weight(&cfg, 2.0, Outcome::Home));
    }

    #[test]
    fn split_keeps_both_sides_non_empty() {
        assert_eq!(train_split_index(100, 0.2), 80);
        assert_eq!(train_split_index(3, 0.5), 2);
        assert_eq!(train_split_index(2, 0.2), 1);
        assert_eq!(train_split_index(10, 0.0), 9);
    }
}
