use serde::{Deserialize, Serialize};

use crate::calibration::{Outcome, Prob3};
use crate::config::{FeatureConfig, ForestParams, WeightingConfig};
use crate::error::{ForecastError, Result};
use crate::features::{self, FeatureVector};
use crate::forest::{ClassifierArtifact, ProbabilisticClassifier};
use crate::report::EvaluationReport;

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEvaluation {
    pub train: EvaluationReport,
    pub test: EvaluationReport,
}

/// Immutable per-competition model. Retraining produces a new value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub format_version: u32,
    pub competition: String,
    pub classifier: ClassifierArtifact,
    pub feature_names: Vec<String>,
    pub schema_fingerprint: String,
    pub class_labels: Vec<Outcome>,
    pub training_accuracy: f64,
    pub test_accuracy: f64,
    pub evaluation: ModelEvaluation,
    pub sample_count: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub skipped_rows: usize,
    pub seasons: Vec<String>,
    pub hyperparameters: ForestParams,
    pub weighting: WeightingConfig,
    pub feature_config: FeatureConfig,
    pub feature_importance: Vec<FeatureImportance>,
    pub training_timestamp: String,
}

impl TrainedModel {
    /// Fails when the model was trained on a different feature layout than
    /// the one this build produces.
    pub fn ensure_schema(&self) -> Result<()> {
        let current = features::feature_names();
        if self.feature_names != current || self.schema_fingerprint != features::current_fingerprint()
        {
            return Err(ForecastError::ModelSchemaMismatch {
                competition: self.competition.clone(),
                expected: self.feature_names.clone(),
                found: current,
            });
        }
        Ok(())
    }

    pub fn predict(&self, features: &FeatureVector) -> Result<Prob3> {
        if features.values().len() != self.feature_names.len() {
            return Err(ForecastError::ModelSchemaMismatch {
                competition: self.competition.clone(),
                expected: self.feature_names.clone(),
                found: features::feature_names(),
            });
        }
        let raw = self.classifier.predict_proba(features.values())?;
        raw.validated(&format!("{} model", self.competition))
    }

    pub fn top_features(&self, n: usize) -> &[FeatureImportance] {
        &self.feature_importance[..n.min(self.feature_importance.len())]
    }
}

/// Compact view of a model for clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub competition: String,
    pub training_accuracy: f64,
    pub test_accuracy: f64,
    pub test_log_loss: f64,
    pub test_brier: f64,
    pub test_ece: f64,
    pub macro_f1: f64,
    pub sample_count: usize,
    pub seasons: Vec<String>,
    pub training_timestamp: String,
    pub top_features: Vec<FeatureImportance>,
}

impl From<&TrainedModel> for ModelSummary {
    fn from(m: &TrainedModel) -> Self {
        Self {
            competition: m.competition.clone(),
            training_accuracy: m.training_accuracy,
            test_accuracy: m.test_accuracy,
            test_log_loss: m.evaluation.test.log_loss,
            test_brier: m.evaluation.test.brier,
            test_ece: m.evaluation.test.ece,
            macro_f1: m.evaluation.test.classes.macro_f1,
            sample_count: m.sample_count,
            seasons: m.seasons.clone(),
            training_timestamp: m.training_timestamp.clone(),
            top_features: m.top_features(10).to_vec(),
        }
    }
}
