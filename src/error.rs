use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("team '{query}' not found in {competition}{}", suggestion_suffix(.suggestions))]
    TeamNotFound {
        competition: String,
        query: String,
        suggestions: Vec<String>,
    },

    #[error(
        "not enough data for {team} in {competition}: {found} prior matches, need {required}"
    )]
    InsufficientHistory {
        competition: String,
        team: String,
        found: usize,
        required: usize,
    },

    #[error("no usable training rows for {competition}: {usable} usable, need {required}")]
    EmptyDataset {
        competition: String,
        usable: usize,
        required: usize,
    },

    #[error(
        "model for {competition} expects {} features ({expected_hash}), current schema has {} ({found_hash}); retrain required",
        .expected.len(),
        .found.len(),
        expected_hash = short_hash(.expected),
        found_hash = short_hash(.found)
    )]
    ModelSchemaMismatch {
        competition: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("degenerate probabilities from {context}: home={home} draw={draw} away={away}")]
    DegenerateProbability {
        context: String,
        home: f64,
        draw: f64,
        away: f64,
    },

    #[error("no trained model loaded for {competition}")]
    ModelNotLoaded { competition: String },

    #[error("unknown competition {competition}")]
    UnknownCompetition { competition: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ForecastError {
    /// Recoverable errors are turned into typed failure responses; the rest
    /// block the affected competition until an operator intervenes.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ForecastError::TeamNotFound { .. }
                | ForecastError::InsufficientHistory { .. }
                | ForecastError::UnknownCompetition { .. }
                | ForecastError::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

fn suggestion_suffix(suggestions: &[String]) -> String {
    if suggestions.is_empty() {
        String::new()
    } else {
        format!(" (did you mean: {})", suggestions.join(", "))
    }
}

fn short_hash(names: &[String]) -> String {
    let fp = crate::features::schema_fingerprint(names);
    fp.chars().take(12).collect()
}
