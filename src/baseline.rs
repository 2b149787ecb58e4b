use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calibration::Outcome;
use crate::history::CompetitionHistory;

const DEFAULT_GOALS_PER_TEAM: f64 = 1.35;
const DEFAULT_HOME_GOALS: f64 = 1.50;
const DEFAULT_AWAY_GOALS: f64 = 1.20;
const DEFAULT_DRAW_RATE: f64 = 0.25;
const DEFAULT_HOME_WIN_RATE: f64 = 0.45;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompetitionBaseline {
    pub sample_matches: usize,
    pub goals_per_team_match: f64,
    pub home_goals: f64,
    pub away_goals: f64,
    pub points_per_team_match: f64,
    pub draw_rate: f64,
    pub home_win_rate: f64,
}

impl CompetitionBaseline {
    pub fn defaults() -> Self {
        Self {
            sample_matches: 0,
            goals_per_team_match: DEFAULT_GOALS_PER_TEAM,
            home_goals: DEFAULT_HOME_GOALS,
            away_goals: DEFAULT_AWAY_GOALS,
            points_per_team_match: points_per_team_match(DEFAULT_DRAW_RATE),
            draw_rate: DEFAULT_DRAW_RATE,
            home_win_rate: DEFAULT_HOME_WIN_RATE,
        }
    }

    pub fn away_win_rate(&self) -> f64 {
        (1.0 - self.home_win_rate - self.draw_rate).max(0.0)
    }

    /// Factor that maps goal rates from `self`'s scoring environment into `target`'s.
    pub fn goal_scale_to(&self, target: &CompetitionBaseline) -> f64 {
        ratio(target.goals_per_team_match, self.goals_per_team_match)
    }

    pub fn ppg_scale_to(&self, target: &CompetitionBaseline) -> f64 {
        ratio(target.points_per_team_match, self.points_per_team_match)
    }

    /// Average of two baselines, used as the neutral scale for cross-competition scorelines.
    pub fn blend(&self, other: &CompetitionBaseline) -> Self {
        let mid = |a: f64, b: f64| 0.5 * (a + b);
        Self {
            sample_matches: self.sample_matches + other.sample_matches,
            goals_per_team_match: mid(self.goals_per_team_match, other.goals_per_team_match),
            home_goals: mid(self.home_goals, other.home_goals),
            away_goals: mid(self.away_goals, other.away_goals),
            points_per_team_match: mid(self.points_per_team_match, other.points_per_team_match),
            draw_rate: mid(self.draw_rate, other.draw_rate),
            home_win_rate: mid(self.home_win_rate, other.home_win_rate),
        }
    }
}

// 3 points shared out per decisive match, 2 per draw; per team-match that is 1.5 - d/2.
fn points_per_team_match(draw_rate: f64) -> f64 {
    1.5 - 0.5 * draw_rate
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 1e-9 && num.is_finite() {
        (num / den).clamp(0.25, 4.0)
    } else {
        1.0
    }
}

/// Scoring environment of a competition from played matches before `as_of`
/// in its last `seasons` seasons, shrunk toward defaults on small samples.
pub fn compute_baseline(
    history: &CompetitionHistory,
    as_of: NaiveDate,
    seasons: usize,
) -> CompetitionBaseline {
    let keep = history.recent_seasons_before(as_of, seasons);

    let mut home_goals = 0.0;
    let mut away_goals = 0.0;
    let mut draws = 0usize;
    let mut home_wins = 0usize;
    let mut n = 0usize;

    for m in history.played_before(as_of) {
        if !keep.iter().any(|s| *s == m.season) {
            continue;
        }
        let Some((h, a)) = m.score() else {
            continue;
        };
        home_goals += h as f64;
        away_goals += a as f64;
        match m.outcome() {
            Some(Outcome::Draw) => draws += 1,
            Some(Outcome::Home) => home_wins += 1,
            _ => {}
        }
        n += 1;
    }

    let d = CompetitionBaseline::defaults();
    let mut out = d;
    out.sample_matches = n;
    if n == 0 {
        return out;
    }

    let nf = n as f64;
    let observed_home = home_goals / nf;
    let observed_away = away_goals / nf;
    let observed_draw = draws as f64 / nf;
    let observed_home_win = home_wins as f64 / nf;

    // Shrink small samples toward defaults to avoid wild swings.
    const MIN_N: f64 = 200.0;
    let w = (nf / MIN_N).clamp(0.0, 1.0);
    let mix = |default: f64, observed: f64| (1.0 - w) * default + w * observed;

    out.home_goals = mix(d.home_goals, observed_home);
    out.away_goals = mix(d.away_goals, observed_away);
    out.goals_per_team_match = 0.5 * (out.home_goals + out.away_goals);
    out.draw_rate = mix(d.draw_rate, observed_draw);
    out.home_win_rate = mix(d.home_win_rate, observed_home_win);
    out.points_per_team_match = points_per_team_match(out.draw_rate);
    out
}
