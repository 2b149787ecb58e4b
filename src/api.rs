use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ForecastError;
use crate::league_stats::{LeagueOverview, SeasonTrend};
use crate::model::ModelSummary;
use crate::simulation::SeasonSimulationResult;
use crate::standings::StandingRow;

/// Outcome probabilities and expected scoreline for one fixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub competition: String,
    pub home_team: String,
    pub away_team: String,
    pub probability_home_win: f64,
    pub probability_draw: f64,
    pub probability_away_win: f64,
    pub predicted_home_goals: f64,
    pub predicted_away_goals: f64,
}

impl PredictionResult {
    pub fn probability_sum(&self) -> f64 {
        self.probability_home_win + self.probability_draw + self.probability_away_win
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingFixture {
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionStatus {
    pub competition: String,
    pub model_loaded: bool,
    pub blocked: bool,
}

/// Typed failure handed back to callers instead of an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub kind: String,
    pub recoverable: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl From<&ForecastError> for FailureReport {
    fn from(err: &ForecastError) -> Self {
        let kind = match err {
            ForecastError::TeamNotFound { .. } => "team_not_found",
            ForecastError::InsufficientHistory { .. } => "insufficient_history",
            ForecastError::EmptyDataset { .. } => "empty_dataset",
            ForecastError::ModelSchemaMismatch { .. } => "model_schema_mismatch",
            ForecastError::DegenerateProbability { .. } => "degenerate_probability",
            ForecastError::ModelNotLoaded { .. } => "model_not_loaded",
            ForecastError::UnknownCompetition { .. } => "unknown_competition",
            ForecastError::InvalidRequest(_) => "invalid_request",
        };
        let suggestions = match err {
            ForecastError::TeamNotFound { suggestions, .. } => suggestions.clone(),
            _ => Vec::new(),
        };
        Self {
            kind: kind.to_string(),
            recoverable: err.is_recoverable(),
            message: err.to_string(),
            suggestions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForecastRequest {
    HeadToHead {
        competition: String,
        home_team: String,
        away_team: String,
    },
    CrossCompetition {
        competition_a: String,
        team_a: String,
        competition_b: String,
        team_b: String,
    },
    SeasonSimulation {
        competition: String,
        #[serde(default)]
        num_simulations: Option<usize>,
        #[serde(default)]
        seed: Option<u64>,
    },
    UpcomingFixtures {
        competition: String,
    },
    Teams {
        competition: String,
    },
    Standings {
        competition: String,
    },
    LeagueOverview {
        competition: String,
    },
    SeasonTrends {
        competition: String,
    },
    ModelMetrics {
        competition: String,
    },
    Competitions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ForecastResponse {
    Prediction(PredictionResult),
    Simulation(SeasonSimulationResult),
    UpcomingFixtures {
        competition: String,
        fixtures: Vec<UpcomingFixture>,
    },
    Teams {
        competition: String,
        teams: Vec<String>,
    },
    Standings {
        competition: String,
        season: Option<String>,
        table: Vec<StandingRow>,
    },
    LeagueOverview(LeagueOverview),
    SeasonTrends {
        competition: String,
        seasons: Vec<SeasonTrend>,
    },
    ModelMetrics(ModelSummary),
    Competitions {
        competitions: Vec<CompetitionStatus>,
    },
    Failure(FailureReport),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_from_tagged_json() {
        let raw = r#"{"type":"season_simulation","competition":"premier_league","num_simulations":500}"#;
        let req: ForecastRequest = serde_json::from_str(raw).expect("parse");
        assert_eq!(
            req,
            ForecastRequest::SeasonSimulation {
                competition: "premier_league".to_string(),
                num_simulations: Some(500),
                seed: None,
            }
        );
        let bare: ForecastRequest = serde_json::from_str(r#"{"type":"competitions"}"#).expect("parse");
        assert_eq!(bare, ForecastRequest::Competitions);
    }

    #[test]
    fn failure_report_carries_suggestions() {
        let err = ForecastError::TeamNotFound {
            competition: "x".to_string(),
            query: "Arsnal".to_string(),
            suggestions: vec!["Arsenal".to_string()],
        };
        let report = FailureReport::from(&err);
        assert_eq!(report.kind, "team_not_found");
        assert!(report.recoverable);
        assert_eq!(report.suggestions, vec!["Arsenal".to_string()]);

        let json = serde_json::to_value(ForecastResponse::Failure(report)).expect("json");
        assert_eq!(json["type"], "failure");
        assert_eq!(json["kind"], "team_not_found");
    }
}
