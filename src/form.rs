use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::FeatureConfig;
use crate::history::{CompetitionHistory, MatchRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Home,
    Away,
    Neutral,
}

/// Per-match averages over one window of a team's played matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub matches: usize,
    pub ppg: f64,
    pub win_rate: f64,
    pub draw_rate: f64,
    pub goals_for: f64,
    pub goals_against: f64,
    pub xg_for: f64,
    pub xg_against: f64,
}

impl WindowStats {
    pub fn from_matches(team: &str, matches: &[&MatchRecord]) -> Self {
        let mut out = Self::default();
        let (mut pts, mut wins, mut draws) = (0u32, 0usize, 0usize);
        let (mut gf, mut ga, mut xf, mut xa) = (0.0, 0.0, 0.0, 0.0);
        for m in matches {
            let (Some((f, a)), Some((xgf, xga)), Some(p)) = (
                m.goals_for_against(team),
                m.xg_for_against(team),
                m.points_for(team),
            ) else {
                continue;
            };
            out.matches += 1;
            pts += p;
            match p {
                3 => wins += 1,
                1 => draws += 1,
                _ => {}
            }
            gf += f as f64;
            ga += a as f64;
            xf += xgf;
            xa += xga;
        }
        if out.matches == 0 {
            return out;
        }
        let n = out.matches as f64;
        out.ppg = pts as f64 / n;
        out.win_rate = wins as f64 / n;
        out.draw_rate = draws as f64 / n;
        out.goals_for = gf / n;
        out.goals_against = ga / n;
        out.xg_for = xf / n;
        out.xg_against = xa / n;
        out
    }

    pub fn goal_diff(&self) -> f64 {
        self.goals_for - self.goals_against
    }

    pub fn is_empty(&self) -> bool {
        self.matches == 0
    }

    /// This window if it has data, otherwise `fallback`.
    pub fn or(self, fallback: WindowStats) -> WindowStats {
        if self.is_empty() { fallback } else { self }
    }

    fn rescaled(mut self, goal_factor: f64, ppg_factor: f64) -> Self {
        self.ppg *= ppg_factor;
        self.goals_for *= goal_factor;
        self.goals_against *= goal_factor;
        self.xg_for *= goal_factor;
        self.xg_against *= goal_factor;
        self
    }
}

fn tail<'m>(items: &[&'m MatchRecord], k: usize) -> Vec<&'m MatchRecord> {
    items[items.len().saturating_sub(k)..].to_vec()
}

/// A team's recent performance as of a date, never including that date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamFormSnapshot {
    pub team: String,
    pub as_of: NaiveDate,
    pub prior_matches: usize,
    pub form: WindowStats,
    pub home_split: WindowStats,
    pub away_split: WindowStats,
    pub long: WindowStats,
}

impl TeamFormSnapshot {
    pub fn compute(
        history: &CompetitionHistory,
        team: &str,
        as_of: NaiveDate,
        cfg: &FeatureConfig,
    ) -> Self {
        let played = history.team_played_before(team, as_of);
        let home_only = played
            .iter()
            .copied()
            .filter(|m| m.home_team == team)
            .collect::<Vec<_>>();
        let away_only = played
            .iter()
            .copied()
            .filter(|m| m.away_team == team)
            .collect::<Vec<_>>();

        Self {
            team: team.to_string(),
            as_of,
            prior_matches: played.len(),
            form: WindowStats::from_matches(team, &tail(&played, cfg.form_window)),
            home_split: WindowStats::from_matches(team, &tail(&home_only, cfg.venue_window)),
            away_split: WindowStats::from_matches(team, &tail(&away_only, cfg.venue_window)),
            long: WindowStats::from_matches(team, &tail(&played, cfg.long_window)),
        }
    }

    pub fn venue_split(&self, venue: Venue) -> WindowStats {
        match venue {
            Venue::Home => self.home_split.or(self.form),
            Venue::Away => self.away_split.or(self.form),
            Venue::Neutral => self.long.or(self.form),
        }
    }

    /// Same snapshot expressed in another competition's scoring environment.
    pub fn rescaled(&self, goal_factor: f64, ppg_factor: f64) -> Self {
        Self {
            team: self.team.clone(),
            as_of: self.as_of,
            prior_matches: self.prior_matches,
            form: self.form.rescaled(goal_factor, ppg_factor),
            home_split: self.home_split.rescaled(goal_factor, ppg_factor),
            away_split: self.away_split.rescaled(goal_factor, ppg_factor),
            long: self.long.rescaled(goal_factor, ppg_factor),
        }
    }
}

/// Snapshots memoised per (team, as-of date); lives for one request or one
/// training pass and is never shared.
pub struct FormCache<'a> {
    history: &'a CompetitionHistory,
    config: FeatureConfig,
    entries: HashMap<(String, NaiveDate), TeamFormSnapshot>,
}

impl<'a> FormCache<'a> {
    pub fn new(history: &'a CompetitionHistory, config: FeatureConfig) -> Self {
        Self {
            history,
            config,
            entries: HashMap::new(),
        }
    }

    pub fn history(&self) -> &'a CompetitionHistory {
        self.history
    }

    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    pub fn snapshot(&mut self, team: &str, as_of: NaiveDate) -> &TeamFormSnapshot {
        let history = self.history;
        let config = self.config;
        self.entries
            .entry((team.to_string(), as_of))
            .or_insert_with(|| TeamFormSnapshot::compute(history, team, as_of, &config))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MatchStatus;

    fn played(id: u64, day: u32, home: &str, away: &str, h: u32, a: u32) -> MatchRecord {
        MatchRecord {
            id,
            competition: "x".to_string(),
            season: "2024/25".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 9, day).expect("date"),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: Some(h),
            away_goals: Some(a),
            status: MatchStatus::Played,
            stats: None,
        }
    }

    #[test]
    fn venue_splits_only_use_matching_venue() {
        let h = CompetitionHistory::new(
            "x",
            vec![
                played(1, 1, "A", "B", 3, 0),
                played(2, 2, "B", "A", 2, 0),
                played(3, 3, "A", "C", 1, 1),
            ],
        );
        let cfg = FeatureConfig::default();
        let s = TeamFormSnapshot::compute(
            &h,
            "A",
            NaiveDate::from_ymd_opt(2024, 9, 10).expect("date"),
            &cfg,
        );
        assert_eq!(s.prior_matches, 3);
        assert_eq!(s.home_split.matches, 2);
        assert_eq!(s.away_split.matches, 1);
        assert!((s.home_split.goals_for - 2.0).abs() < 1e-12);
        assert!((s.away_split.goals_for - 0.0).abs() < 1e-12);
        assert!((s.away_split.goals_against - 2.0).abs() < 1e-12);
        assert!((s.form.ppg - 4.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn form_window_keeps_latest_matches() {
        let rows = (1..=10)
            .map(|d| played(d as u64, d, "A", "B", if d > 7 { 2 } else { 0 }, 1))
            .collect();
        let h = CompetitionHistory::new("x", rows);
        let cfg = FeatureConfig {
            form_window: 3,
            ..FeatureConfig::default()
        };
        let s = TeamFormSnapshot::compute(
            &h,
            "A",
            NaiveDate::from_ymd_opt(2024, 9, 11).expect("date"),
            &cfg,
        );
        assert_eq!(s.form.matches, 3);
        assert!((s.form.win_rate - 1.0).abs() < 1e-12);
        assert_eq!(s.long.matches, 10);
    }

    #[test]
    fn cache_reuses_snapshots() {
        let h = CompetitionHistory::new("x", vec![played(1, 1, "A", "B", 1, 0)]);
        let mut cache = FormCache::new(&h, FeatureConfig::default());
        let d = NaiveDate::from_ymd_opt(2024, 9, 2).expect("date");
        let first = cache.snapshot("A", d).clone();
        let second = cache.snapshot("A", d).clone();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }
}
