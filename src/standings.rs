use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::history::{CompetitionHistory, MatchRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingRow {
    pub team: String,
    pub played: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub points: u32,
}

impl StandingRow {
    pub fn new(team: impl Into<String>) -> Self {
        Self {
            team: team.into(),
            ..Self::default()
        }
    }

    pub fn goal_difference(&self) -> i32 {
        self.goals_for as i32 - self.goals_against as i32
    }

    fn record(&mut self, scored: u32, conceded: u32) {
        self.played += 1;
        self.goals_for += scored;
        self.goals_against += conceded;
        match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => {
                self.wins += 1;
                self.points += 3;
            }
            std::cmp::Ordering::Equal => {
                self.draws += 1;
                self.points += 1;
            }
            std::cmp::Ordering::Less => self.losses += 1,
        }
    }
}

/// Points, then goal difference, then wins, then name.
pub fn sort_table(rows: &mut [StandingRow]) {
    rows.sort_by(|a, b| {
        b.points
            .cmp(&a.points)
            .then_with(|| b.goal_difference().cmp(&a.goal_difference()))
            .then_with(|| b.wins.cmp(&a.wins))
            .then_with(|| a.team.cmp(&b.team))
    });
}

/// Table over the played matches in `matches`; every team in `teams` gets a
/// row even before its first result.
pub fn compute_table<'a>(
    matches: impl IntoIterator<Item = &'a MatchRecord>,
    teams: impl IntoIterator<Item = String>,
) -> Vec<StandingRow> {
    let mut rows: HashMap<String, StandingRow> = teams
        .into_iter()
        .map(|t| (t.clone(), StandingRow::new(t)))
        .collect();
    for m in matches {
        let Some((h, a)) = m.score() else {
            continue;
        };
        rows.entry(m.home_team.clone())
            .or_insert_with(|| StandingRow::new(m.home_team.clone()))
            .record(h, a);
        rows.entry(m.away_team.clone())
            .or_insert_with(|| StandingRow::new(m.away_team.clone()))
            .record(a, h);
    }
    let mut out = rows.into_values().collect::<Vec<_>>();
    sort_table(&mut out);
    out
}

/// Actual table of the latest season, including teams with only fixtures left.
pub fn current_standings(history: &CompetitionHistory) -> Vec<StandingRow> {
    let Some(season) = history.current_season() else {
        return Vec::new();
    };
    let mut teams = Vec::new();
    for m in history.season_matches(season) {
        teams.push(m.home_team.clone());
        teams.push(m.away_team.clone());
    }
    teams.sort();
    teams.dedup();
    compute_table(history.season_matches(season), teams)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::history::MatchStatus;

    fn m(id: u64, home: &str, away: &str, score: Option<(u32, u32)>) -> MatchRecord {
        MatchRecord {
            id,
            competition: "x".to_string(),
            season: "2025/26".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 8, 1 + id as u32).expect("date"),
            home_team: home.to_string(),
            away_team: away.to_string(),
            home_goals: score.map(|s| s.0),
            away_goals: score.map(|s| s.1),
            status: if score.is_some() {
                MatchStatus::Played
            } else {
                MatchStatus::Scheduled
            },
            stats: None,
        }
    }

    #[test]
    fn table_orders_by_points_then_goal_difference() {
        let h = CompetitionHistory::new(
            "x",
            vec![
                m(1, "A", "B", Some((1, 0))),
                m(2, "C", "B", Some((4, 0))),
                m(3, "A", "C", Some((0, 0))),
                m(4, "B", "D", None),
            ],
        );
        let table = current_standings(&h);
        let order = table.iter().map(|r| r.team.as_str()).collect::<Vec<_>>();
        assert_eq!(order, vec!["C", "A", "D", "B"]);
        assert_eq!(table[0].points, 4);
        assert_eq!(table[0].goal_difference(), 4);
        assert_eq!(table[2].played, 0);
    }
}
