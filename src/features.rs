use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::config::FeatureConfig;
use crate::error::{ForecastError, Result};
use crate::form::{FormCache, TeamFormSnapshot, Venue, WindowStats};
use crate::history::CompetitionHistory;

const SIDE_FEATURES: usize = 11;
const H2H_FEATURES: usize = 5;
pub const FEATURE_COUNT: usize = 3 * SIDE_FEATURES + H2H_FEATURES;

/// Column order shared by training and inference. Changing it invalidates
/// every persisted model.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "home_form_ppg",
    "home_form_win_rate",
    "home_form_goals_for",
    "home_form_goals_against",
    "home_form_xg_for",
    "home_form_xg_against",
    "home_venue_ppg",
    "home_venue_goals_for",
    "home_venue_goals_against",
    "home_long_ppg",
    "home_long_goal_diff",
    "away_form_ppg",
    "away_form_win_rate",
    "away_form_goals_for",
    "away_form_goals_against",
    "away_form_xg_for",
    "away_form_xg_against",
    "away_venue_ppg",
    "away_venue_goals_for",
    "away_venue_goals_against",
    "away_long_ppg",
    "away_long_goal_diff",
    "diff_form_ppg",
    "diff_form_win_rate",
    "diff_form_goals_for",
    "diff_form_goals_against",
    "diff_form_xg_for",
    "diff_form_xg_against",
    "diff_venue_ppg",
    "diff_venue_goals_for",
    "diff_venue_goals_against",
    "diff_long_ppg",
    "diff_long_goal_diff",
    "h2h_meetings",
    "h2h_home_win_rate",
    "h2h_draw_rate",
    "h2h_away_win_rate",
    "h2h_avg_margin",
];

pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
}

/// Hex sha256 over the ordered feature names.
pub fn schema_fingerprint(names: &[String]) -> String {
    let mut hasher = Sha256::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            hasher.update(b"\n");
        }
        hasher.update(name.as_bytes());
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub fn current_fingerprint() -> String {
    schema_fingerprint(&feature_names())
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        FEATURE_NAMES.iter().copied().zip(self.values.iter().copied())
    }
}

/// Prior meetings summarised from the current home team's perspective.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HeadToHead {
    pub meetings: usize,
    pub home_wins: usize,
    pub draws: usize,
    pub away_wins: usize,
    pub margin_sum: f64,
}

impl HeadToHead {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn between(
        history: &CompetitionHistory,
        home: &str,
        away: &str,
        as_of: NaiveDate,
    ) -> Self {
        let mut out = Self::default();
        for m in history.meetings_before(home, away, as_of) {
            let Some((gf, ga)) = m.goals_for_against(home) else {
                continue;
            };
            out.meetings += 1;
            out.margin_sum += gf as f64 - ga as f64;
            match gf.cmp(&ga) {
                std::cmp::Ordering::Greater => out.home_wins += 1,
                std::cmp::Ordering::Equal => out.draws += 1,
                std::cmp::Ordering::Less => out.away_wins += 1,
            }
        }
        out
    }

    /// The same meetings seen from the other side.
    pub fn mirrored(&self) -> Self {
        Self {
            meetings: self.meetings,
            home_wins: self.away_wins,
            draws: self.draws,
            away_wins: self.home_wins,
            margin_sum: -self.margin_sum,
        }
    }

    fn rates(&self) -> [f64; H2H_FEATURES] {
        if self.meetings == 0 {
            return [0.0; H2H_FEATURES];
        }
        let n = self.meetings as f64;
        [
            n,
            self.home_wins as f64 / n,
            self.draws as f64 / n,
            self.away_wins as f64 / n,
            self.margin_sum / n,
        ]
    }
}

fn side_values(snapshot: &TeamFormSnapshot, venue: Venue) -> [f64; SIDE_FEATURES] {
    let f = snapshot.form;
    let v: WindowStats = snapshot.venue_split(venue);
    let l = snapshot.long;
    [
        f.ppg,
        f.win_rate,
        f.goals_for,
        f.goals_against,
        f.xg_for,
        f.xg_against,
        v.ppg,
        v.goals_for,
        v.goals_against,
        l.ppg,
        l.goal_diff(),
    ]
}

/// Lays out raw per-side values, home-minus-away differentials and the
/// head-to-head block in `FEATURE_NAMES` order.
pub fn assemble(
    home: &TeamFormSnapshot,
    away: &TeamFormSnapshot,
    home_venue: Venue,
    away_venue: Venue,
    h2h: &HeadToHead,
) -> FeatureVector {
    let h = side_values(home, home_venue);
    let a = side_values(away, away_venue);
    let mut values = [0.0; FEATURE_COUNT];
    for i in 0..SIDE_FEATURES {
        values[i] = h[i];
        values[SIDE_FEATURES + i] = a[i];
        values[2 * SIDE_FEATURES + i] = h[i] - a[i];
    }
    values[3 * SIDE_FEATURES..].copy_from_slice(&h2h.rates());
    FeatureVector { values }
}

/// Builds fixture features from one competition's history, caching form
/// snapshots for the lifetime of the engineer.
pub struct FeatureEngineer<'a> {
    cache: FormCache<'a>,
}

impl<'a> FeatureEngineer<'a> {
    pub fn new(history: &'a CompetitionHistory, config: FeatureConfig) -> Self {
        Self {
            cache: FormCache::new(history, config),
        }
    }

    pub fn history(&self) -> &'a CompetitionHistory {
        self.cache.history()
    }

    /// Fails with `InsufficientHistory` when `team` has fewer prior played
    /// matches than the configured floor.
    pub fn snapshot(&mut self, team: &str, as_of: NaiveDate) -> Result<TeamFormSnapshot> {
        let required = self.cache.config().min_prior_matches;
        let snap = self.cache.snapshot(team, as_of).clone();
        if snap.prior_matches < required {
            return Err(ForecastError::InsufficientHistory {
                competition: self.cache.history().competition().to_string(),
                team: team.to_string(),
                found: snap.prior_matches,
                required,
            });
        }
        Ok(snap)
    }

    pub fn build(&mut self, home: &str, away: &str, as_of: NaiveDate) -> Result<FeatureVector> {
        let home_snap = self.snapshot(home, as_of)?;
        let away_snap = self.snapshot(away, as_of)?;
        let h2h = HeadToHead::between(self.history(), home, away, as_of);
        Ok(assemble(
            &home_snap,
            &away_snap,
            Venue::Home,
            Venue::Away,
            &h2h,
        ))
    }
}

/// One-shot feature build using only matches strictly before `as_of`.
pub fn build_features(
    history: &CompetitionHistory,
    home: &str,
    away: &str,
    as_of: NaiveDate,
    config: &FeatureConfig,
) -> Result<FeatureVector> {
    FeatureEngineer::new(history, *config).build(home, away, as_of)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{MatchRecord, MatchStatus};

    fn played(id: u64, day: u32, home: &str, away: &str, h: u32, a: u32) -> MatchRecord {
        MatchRecord {
            id,
            competition: "x".to_string(),
            season: "2024/25".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 10, day).expect("date"),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: Some(h),
            away_goals: Some(a),
            status: MatchStatus::Played,
            stats: None,
        }
    }

    #[test]
    fn names_are_unique_and_fingerprint_is_stable() {
        let mut names = feature_names();
        assert_eq!(schema_fingerprint(&names), current_fingerprint());
        assert_eq!(current_fingerprint().len(), 64);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
    }

    #[test]
    fn head_to_head_is_from_home_perspective() {
        let h = CompetitionHistory::new(
            "x",
            vec![
                played(1, 1, "A", "B", 2, 0),
                played(2, 2, "B", "A", 1, 1),
                played(3, 3, "B", "A", 3, 1),
            ],
        );
        let as_of = NaiveDate::from_ymd_opt(2024, 10, 4).expect("date");
        let ab = HeadToHead::between(&h, "A", "B", as_of);
        assert_eq!((ab.meetings, ab.home_wins, ab.draws, ab.away_wins), (3, 1, 1, 1));
        assert!((ab.margin_sum - 0.0).abs() < 1e-12);
        assert_eq!(HeadToHead::between(&h, "B", "A", as_of), ab.mirrored());
    }

    #[test]
    fn differentials_are_home_minus_away() {
        let mut rows = Vec::new();
        for d in 1..=12u32 {
            rows.push(played(d as u64, d, "A", "C", 3, 0));
            rows.push(played(100 + d as u64, d, "D", "B", 1, 1));
        }
        let h = CompetitionHistory::new("x", rows);
        let as_of = NaiveDate::from_ymd_opt(2024, 10, 20).expect("date");
        let fv = build_features(&h, "A", "B", as_of, &FeatureConfig::default())
            .expect("enough history");
        let home = fv.get("home_form_ppg").expect("feature");
        let away = fv.get("away_form_ppg").expect("feature");
        assert!((home - 3.0).abs() < 1e-12);
        assert!((away - 1.0).abs() < 1e-12);
        assert!((fv.get("diff_form_ppg").expect("feature") - 2.0).abs() < 1e-12);
        assert_eq!(fv.get("h2h_meetings"), Some(0.0));
    }

    #[test]
    fn insufficient_history_is_reported() {
        let h = CompetitionHistory::new("x", vec![played(1, 1, "A", "B", 1, 0)]);
        let as_of = NaiveDate::from_ymd_opt(2024, 10, 2).expect("date");
        let err = build_features(&h, "A", "B", as_of, &FeatureConfig::default())
            .expect_err("one match is not enough");
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory {
                found: 1,
                required: 5,
                ..
            }
        ));
    }
}
