use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::calibration::Outcome;
use crate::history::{CompetitionHistory, MatchRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeAwayPerformance {
    pub home_wins: usize,
    pub draws: usize,
    pub away_wins: usize,
}

impl HomeAwayPerformance {
    pub fn total(&self) -> usize {
        self.home_wins + self.draws + self.away_wins
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalsBucket {
    pub goals: u32,
    pub matches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeagueOverview {
    pub competition: String,
    pub total_matches: usize,
    pub played_matches: usize,
    pub scheduled_matches: usize,
    pub seasons: usize,
    pub teams: usize,
    pub avg_goals_per_match: f64,
    pub home_win_pct: f64,
    pub draw_pct: f64,
    pub away_win_pct: f64,
    pub results: HomeAwayPerformance,
    pub goals_distribution: Vec<GoalsBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonTrend {
    pub season: String,
    pub matches: usize,
    pub avg_goals: f64,
    pub draw_rate: f64,
    pub home_win_rate: f64,
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

fn tally<'a>(matches: impl IntoIterator<Item = &'a MatchRecord>) -> (HomeAwayPerformance, u64, usize) {
    let mut perf = HomeAwayPerformance::default();
    let mut goals = 0u64;
    let mut played = 0usize;
    for m in matches {
        let Some((h, a)) = m.score() else {
            continue;
        };
        played += 1;
        goals += (h + a) as u64;
        match m.outcome() {
            Some(Outcome::Home) => perf.home_wins += 1,
            Some(Outcome::Draw) => perf.draws += 1,
            Some(Outcome::Away) => perf.away_wins += 1,
            None => {}
        }
    }
    (perf, goals, played)
}

pub fn home_away_performance(history: &CompetitionHistory) -> HomeAwayPerformance {
    tally(history.matches()).0
}

/// Played matches keyed by total goals scored.
pub fn goals_distribution(history: &CompetitionHistory) -> BTreeMap<u32, usize> {
    let mut out = BTreeMap::new();
    for (h, a) in history.matches().iter().filter_map(MatchRecord::score) {
        *out.entry(h + a).or_insert(0) += 1;
    }
    out
}

pub fn league_overview(history: &CompetitionHistory) -> LeagueOverview {
    let results = home_away_performance(history);
    let played = results.total();
    let distribution = goals_distribution(history);
    let goals: u64 = distribution
        .iter()
        .map(|(g, n)| *g as u64 * *n as u64)
        .sum();
    let total = history.len();
    LeagueOverview {
        competition: history.competition().to_string(),
        total_matches: total,
        played_matches: played,
        scheduled_matches: history.scheduled().len(),
        seasons: history.seasons().len(),
        teams: history.roster().len(),
        avg_goals_per_match: if played == 0 {
            0.0
        } else {
            goals as f64 / played as f64
        },
        home_win_pct: pct(results.home_wins, played),
        draw_pct: pct(results.draws, played),
        away_win_pct: pct(results.away_wins, played),
        results,
        goals_distribution: distribution
            .into_iter()
            .map(|(goals, matches)| GoalsBucket { goals, matches })
            .collect(),
    }
}

/// Per-season scoring and result rates, oldest season first. Seasons with no
/// played matches yet are left out.
pub fn season_trends(history: &CompetitionHistory) -> Vec<SeasonTrend> {
    history
        .seasons()
        .iter()
        .filter_map(|season| {
            let (perf, goals, played) = tally(history.season_matches(season));
            if played == 0 {
                return None;
            }
            let n = played as f64;
            Some(SeasonTrend {
                season: season.clone(),
                matches: played,
                avg_goals: goals as f64 / n,
                draw_rate: perf.draws as f64 / n,
                home_win_rate: perf.home_wins as f64 / n,
            })
        })
        .collect()
}
