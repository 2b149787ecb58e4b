use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::baseline::CompetitionBaseline;
use crate::calibration::Prob3;
use crate::config::ScorelineConfig;
use crate::form::Venue;
use crate::history::CompetitionHistory;

const MAX_EXPECTED_GOALS: f64 = 8.0;
// Minimum lead given to a clear favourite that the rates had level or behind.
const FAVOURITE_MARGIN: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpectedGoals {
    pub home: f64,
    pub away: f64,
}

/// Scoring and conceding rates of one team over its recent seasons.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoringProfile {
    pub venue_scored: Option<f64>,
    pub venue_conceded: Option<f64>,
    pub overall_scored: Option<f64>,
    pub overall_conceded: Option<f64>,
}

impl ScoringProfile {
    pub fn compute(
        history: &CompetitionHistory,
        team: &str,
        venue: Venue,
        as_of: NaiveDate,
        recent_seasons: usize,
    ) -> Self {
        let seasons = history.recent_seasons_before(as_of, recent_seasons);
        let mut all = (0.0, 0.0, 0usize);
        let mut split = (0.0, 0.0, 0usize);
        for m in history.team_played_before(team, as_of) {
            if !seasons.iter().any(|s| *s == m.season) {
                continue;
            }
            let Some((gf, ga)) = m.goals_for_against(team) else {
                continue;
            };
            all = (all.0 + gf as f64, all.1 + ga as f64, all.2 + 1);
            let at_venue = match venue {
                Venue::Home => m.home_team == team,
                Venue::Away => m.away_team == team,
                Venue::Neutral => false,
            };
            if at_venue {
                split = (split.0 + gf as f64, split.1 + ga as f64, split.2 + 1);
            }
        }
        let avg = |sum: f64, n: usize| (n > 0).then(|| sum / n as f64);
        Self {
            venue_scored: avg(split.0, split.2),
            venue_conceded: avg(split.1, split.2),
            overall_scored: avg(all.0, all.2),
            overall_conceded: avg(all.1, all.2),
        }
    }

    pub fn scored(&self) -> Option<f64> {
        self.venue_scored.or(self.overall_scored)
    }

    pub fn conceded(&self) -> Option<f64> {
        self.venue_conceded.or(self.overall_conceded)
    }

    pub fn scaled(&self, factor: f64) -> Self {
        let s = |v: Option<f64>| v.map(|x| x * factor);
        Self {
            venue_scored: s(self.venue_scored),
            venue_conceded: s(self.venue_conceded),
            overall_scored: s(self.overall_scored),
            overall_conceded: s(self.overall_conceded),
        }
    }
}

/// Expected goals from each side's scoring/conceding rates, tilted toward
/// the more probable result. Draw probability does not tilt.
pub fn estimate_scoreline(
    probs: Prob3,
    home: &ScoringProfile,
    away: &ScoringProfile,
    baseline: &CompetitionBaseline,
    neutral: bool,
    cfg: &ScorelineConfig,
) -> ExpectedGoals {
    let (home_default, away_default) = if neutral {
        (baseline.goals_per_team_match, baseline.goals_per_team_match)
    } else {
        (baseline.home_goals, baseline.away_goals)
    };
    let base_home = 0.5
        * (home.scored().unwrap_or(home_default) + away.conceded().unwrap_or(home_default));
    let base_away = 0.5
        * (away.scored().unwrap_or(away_default) + home.conceded().unwrap_or(away_default));

    let d = probs.home - probs.away;
    let mut xg_home = base_home * (1.0 + cfg.bias_strength * d);
    let mut xg_away = base_away * (1.0 - cfg.bias_strength * d);

    if d > cfg.favourite_gap && xg_home <= xg_away {
        xg_home = xg_away + FAVOURITE_MARGIN;
    } else if -d > cfg.favourite_gap && xg_away <= xg_home {
        xg_away = xg_home + FAVOURITE_MARGIN;
    }

    ExpectedGoals {
        home: xg_home.clamp(0.0, MAX_EXPECTED_GOALS),
        away: xg_away.clamp(0.0, MAX_EXPECTED_GOALS),
    }
}
