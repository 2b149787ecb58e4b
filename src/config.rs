use serde::{Deserialize, Serialize};

use crate::calibration::Outcome;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Rolling form window (any venue).
    pub form_window: usize,
    /// Venue-specific window for the home/away splits.
    pub venue_window: usize,
    /// Longer window used for the season-strength features.
    pub long_window: usize,
    /// Minimum played matches before the as-of date, per team.
    pub min_prior_matches: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            form_window: 6,
            venue_window: 10,
            long_window: 38,
            min_prior_matches: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecencyCurve {
    Exponential,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
}

impl ClassWeights {
    pub fn uniform() -> Self {
        Self {
            home_win: 1.0,
            draw: 1.0,
            away_win: 1.0,
        }
    }

    pub fn weight(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home_win,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away_win,
        }
    }
}

impl Default for ClassWeights {
    fn default() -> Self {
        // Draws are discounted: unweighted fits over-predict them.
        Self {
            home_win: 1.0,
            draw: 0.6,
            away_win: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightingConfig {
    pub recency_curve: RecencyCurve,
    /// Weight of the newest retained season relative to the oldest one.
    pub recency_ratio: f64,
    pub class_weights: ClassWeights,
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            recency_curve: RecencyCurve::Exponential,
            recency_ratio: 8.0,
            class_weights: ClassWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Candidate features per split; `None` means sqrt(feature count).
    pub max_features: Option<usize>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 12,
            min_samples_split: 10,
            min_samples_leaf: 5,
            max_features: None,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub min_training_matches: usize,
    pub max_seasons: usize,
    pub holdout_fraction: f64,
    pub weighting: WeightingConfig,
    pub forest: ForestParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_training_matches: 50,
            max_seasons: 10,
            holdout_fraction: 0.2,
            weighting: WeightingConfig::default(),
            forest: ForestParams::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScorelineConfig {
    /// How strongly the win-probability gap tilts the expected goals.
    pub bias_strength: f64,
    /// Probability gap beyond which the favourite must be ahead on goals.
    pub favourite_gap: f64,
    /// Seasons of history used for the scoring/conceding rates.
    pub recent_seasons: usize,
}

impl Default for ScorelineConfig {
    fn default() -> Self {
        Self {
            bias_strength: 0.5,
            favourite_gap: 0.15,
            recent_seasons: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub default_runs: usize,
    pub max_runs: usize,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            default_runs: 10_000,
            max_runs: 200_000,
            seed: 7,
        }
    }
}

/// Independent stream seed for run/tree `stream` under `base` (splitmix64).
pub fn derive_seed(base: u64, stream: u64) -> u64 {
    let mut z = base ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonFrame {
    /// Accuracy-weighted average of both competitions' models.
    Ensemble,
    /// Always score with this competition's model.
    Competition(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossCompetitionConfig {
    pub frame: ComparisonFrame,
}

impl Default for CrossCompetitionConfig {
    fn default() -> Self {
        Self {
            frame: ComparisonFrame::Ensemble,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ForecastConfig {
    pub features: FeatureConfig,
    pub training: TrainingConfig,
    pub scoreline: ScorelineConfig,
    pub simulation: SimulationConfig,
    pub cross: CrossCompetitionConfig,
}

impl ForecastConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Applies `MATCHCAST_*` overrides from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<f64>().ok());
        let int = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(v) = int("MATCHCAST_FORM_WINDOW") {
            cfg.features.form_window = (v as usize).clamp(1, 38);
        }
        if let Some(v) = int("MATCHCAST_VENUE_WINDOW") {
            cfg.features.venue_window = (v as usize).clamp(1, 38);
        }
        if let Some(v) = int("MATCHCAST_LONG_WINDOW") {
            cfg.features.long_window = (v as usize).clamp(1, 120);
        }
        if let Some(v) = int("MATCHCAST_MIN_PRIOR_MATCHES") {
            cfg.features.min_prior_matches = (v as usize).clamp(1, 50);
        }

        if let Some(v) = int("MATCHCAST_MIN_TRAINING_MATCHES") {
            cfg.training.min_training_matches = (v as usize).max(10);
        }
        if let Some(v) = int("MATCHCAST_MAX_SEASONS") {
            cfg.training.max_seasons = (v as usize).clamp(1, 40);
        }
        if let Some(v) = num("MATCHCAST_HOLDOUT_FRACTION") {
            cfg.training.holdout_fraction = v.clamp(0.05, 0.5);
        }
        if let Some(v) = num("MATCHCAST_RECENCY_RATIO") {
            cfg.training.weighting.recency_ratio = v.clamp(1.0, 20.0);
        }
        if let Some(raw) = lookup("MATCHCAST_RECENCY_CURVE") {
            match raw.trim().to_ascii_lowercase().as_str() {
                "linear" => cfg.training.weighting.recency_curve = RecencyCurve::Linear,
                "exponential" | "exp" => {
                    cfg.training.weighting.recency_curve = RecencyCurve::Exponential
                }
                other => log::warn!("ignoring unknown MATCHCAST_RECENCY_CURVE={other}"),
            }
        }
        if let Some(v) = num("MATCHCAST_DRAW_CLASS_WEIGHT") {
            cfg.training.weighting.class_weights.draw = v.clamp(0.05, 2.0);
        }

        if let Some(v) = int("MATCHCAST_TREES") {
            cfg.training.forest.n_trees = (v as usize).clamp(1, 2000);
        }
        if let Some(v) = int("MATCHCAST_MAX_DEPTH") {
            cfg.training.forest.max_depth = (v as usize).clamp(1, 64);
        }
        if let Some(v) = int("MATCHCAST_MIN_SAMPLES_SPLIT") {
            cfg.training.forest.min_samples_split = (v as usize).max(2);
        }
        if let Some(v) = int("MATCHCAST_MIN_SAMPLES_LEAF") {
            cfg.training.forest.min_samples_leaf = (v as usize).max(1);
        }
        if let Some(v) = int("MATCHCAST_SEED") {
            cfg.training.forest.seed = v;
        }

        if let Some(v) = int("MATCHCAST_SIM_RUNS") {
            cfg.simulation.default_runs = (v as usize).max(1);
        }
        if let Some(v) = int("MATCHCAST_MAX_SIM_RUNS") {
            cfg.simulation.max_runs = (v as usize).max(1);
        }
        if let Some(v) = int("MATCHCAST_SIM_SEED") {
            cfg.simulation.seed = v;
        }
        cfg.simulation.default_runs = cfg.simulation.default_runs.min(cfg.simulation.max_runs);

        if let Some(raw) = lookup("MATCHCAST_CROSS_FRAME") {
            let raw = raw.trim();
            cfg.cross.frame = if raw.is_empty() || raw.eq_ignore_ascii_case("ensemble") {
                ComparisonFrame::Ensemble
            } else {
                ComparisonFrame::Competition(raw.to_string())
            };
        }

        cfg
    }
}
