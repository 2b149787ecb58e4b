use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result as AnyResult, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};

use crate::calibration::{Outcome, classify_outcome};
use crate::error::{ForecastError, Result};
use crate::persist::app_cache_dir;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Played,
    Scheduled,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Played => "played",
            MatchStatus::Scheduled => "scheduled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "played" | "finished" | "ft" => Some(MatchStatus::Played),
            "scheduled" | "fixture" | "upcoming" => Some(MatchStatus::Scheduled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedStats {
    pub home_shots: Option<u32>,
    pub away_shots: Option<u32>,
    pub home_possession: Option<f64>,
    pub away_possession: Option<f64>,
    pub home_xg: Option<f64>,
    pub away_xg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: u64,
    pub competition: String,
    pub season: String,
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: Option<u32>,
    pub away_goals: Option<u32>,
    pub status: MatchStatus,
    #[serde(default)]
    pub stats: Option<AdvancedStats>,
}

impl MatchRecord {
    pub fn is_played(&self) -> bool {
        self.status == MatchStatus::Played
    }

    pub fn score(&self) -> Option<(u32, u32)> {
        if !self.is_played() {
            return None;
        }
        Some((self.home_goals?, self.away_goals?))
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.score().map(|(h, a)| classify_outcome(h, a))
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home_team == team || self.away_team == team
    }

    /// Goals scored and conceded by `team`, if it played in this match.
    pub fn goals_for_against(&self, team: &str) -> Option<(u32, u32)> {
        let (h, a) = self.score()?;
        if self.home_team == team {
            Some((h, a))
        } else if self.away_team == team {
            Some((a, h))
        } else {
            None
        }
    }

    /// Expected goals for/against `team`, falling back to actual goals.
    pub fn xg_for_against(&self, team: &str) -> Option<(f64, f64)> {
        let (gf, ga) = self.goals_for_against(team)?;
        let stats = self.stats.unwrap_or_default();
        let (xf, xa) = if self.home_team == team {
            (stats.home_xg, stats.away_xg)
        } else {
            (stats.away_xg, stats.home_xg)
        };
        Some((xf.unwrap_or(gf as f64), xa.unwrap_or(ga as f64)))
    }

    pub fn points_for(&self, team: &str) -> Option<u32> {
        let (gf, ga) = self.goals_for_against(team)?;
        Some(match gf.cmp(&ga) {
            std::cmp::Ordering::Greater => 3,
            std::cmp::Ordering::Equal => 1,
            std::cmp::Ordering::Less => 0,
        })
    }

    fn dedup_key(&self) -> (NaiveDate, String, String) {
        (
            self.date,
            self.home_team.trim().to_lowercase(),
            self.away_team.trim().to_lowercase(),
        )
    }
}

/// Leading four-digit year of a season label ("2023/24" -> 2023).
pub fn parse_leading_year(raw: &str) -> Option<i32> {
    let mut buf = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_digit() {
            buf.push(ch);
            if buf.len() == 4 {
                return buf.parse::<i32>().ok();
            }
        } else if !buf.is_empty() {
            break;
        }
    }
    None
}

fn season_order(a: &str, b: &str) -> std::cmp::Ordering {
    parse_leading_year(a)
        .cmp(&parse_leading_year(b))
        .then_with(|| a.cmp(b))
}

/// Chronologically ordered matches of one competition.
#[derive(Debug, Clone)]
pub struct CompetitionHistory {
    competition: String,
    matches: Vec<MatchRecord>,
    by_team: HashMap<String, Vec<usize>>,
    seasons: Vec<String>,
}

impl CompetitionHistory {
    pub fn new(competition: impl Into<String>, mut rows: Vec<MatchRecord>) -> Self {
        let competition = competition.into();
        rows.retain(|m| {
            if m.home_team.trim().is_empty() || m.away_team.trim().is_empty() {
                return false;
            }
            if m.is_played() && m.score().is_none() {
                log::warn!(
                    "{competition}: dropping played match {} without a score",
                    m.id
                );
                return false;
            }
            true
        });
        rows.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));

        let mut by_team: HashMap<String, Vec<usize>> = HashMap::new();
        let mut season_set = HashSet::new();
        for (idx, m) in rows.iter().enumerate() {
            by_team.entry(m.home_team.clone()).or_default().push(idx);
            by_team.entry(m.away_team.clone()).or_default().push(idx);
            season_set.insert(m.season.clone());
        }
        let mut seasons = season_set.into_iter().collect::<Vec<_>>();
        seasons.sort_by(|a, b| season_order(a, b));

        Self {
            competition,
            matches: rows,
            by_team,
            seasons,
        }
    }

    pub fn competition(&self) -> &str {
        &self.competition
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Played matches strictly before `as_of`, oldest first.
    pub fn played_before(&self, as_of: NaiveDate) -> impl Iterator<Item = &MatchRecord> {
        let end = self.matches.partition_point(|m| m.date < as_of);
        self.matches[..end].iter().filter(|m| m.is_played())
    }

    /// Played matches of `team` strictly before `as_of`, oldest first.
    pub fn team_played_before(&self, team: &str, as_of: NaiveDate) -> Vec<&MatchRecord> {
        let Some(indices) = self.by_team.get(team) else {
            return Vec::new();
        };
        indices
            .iter()
            .map(|&i| &self.matches[i])
            .take_while(|m| m.date < as_of)
            .filter(|m| m.is_played())
            .collect()
    }

    pub fn team_played_count_before(&self, team: &str, as_of: NaiveDate) -> usize {
        self.by_team.get(team).map_or(0, |indices| {
            indices
                .iter()
                .map(|&i| &self.matches[i])
                .take_while(|m| m.date < as_of)
                .filter(|m| m.is_played())
                .count()
        })
    }

    /// Prior played meetings between two teams, either venue.
    pub fn meetings_before(&self, a: &str, b: &str, as_of: NaiveDate) -> Vec<&MatchRecord> {
        self.team_played_before(a, as_of)
            .into_iter()
            .filter(|m| m.involves(b))
            .collect()
    }

    /// Scheduled fixtures, de-duplicated on (date, home, away) and in date order.
    pub fn scheduled(&self) -> Vec<&MatchRecord> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for m in &self.matches {
            if m.is_played() {
                continue;
            }
            if seen.insert(m.dedup_key()) {
                out.push(m);
            }
        }
        out.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.home_team.cmp(&b.home_team))
        });
        out
    }

    pub fn roster(&self) -> Vec<String> {
        let mut teams = self.by_team.keys().cloned().collect::<Vec<_>>();
        teams.sort();
        teams
    }

    pub fn has_team(&self, team: &str) -> bool {
        self.by_team.contains_key(team)
    }

    /// Season labels, oldest first.
    pub fn seasons(&self) -> &[String] {
        &self.seasons
    }

    pub fn current_season(&self) -> Option<&str> {
        self.seasons.last().map(String::as_str)
    }

    pub fn season_in_progress(&self, season: &str) -> bool {
        self.matches
            .iter()
            .any(|m| m.season == season && !m.is_played())
    }

    pub fn season_matches<'a>(&'a self, season: &'a str) -> impl Iterator<Item = &'a MatchRecord> {
        self.matches.iter().filter(move |m| m.season == season)
    }

    /// The last `n` seasons that have played matches before `as_of`.
    pub fn recent_seasons_before(&self, as_of: NaiveDate, n: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        for m in self.played_before(as_of) {
            seen.insert(m.season.as_str());
        }
        let ordered = self
            .seasons
            .iter()
            .filter(|s| seen.contains(s.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        let skip = ordered.len().saturating_sub(n.max(1));
        ordered.into_iter().skip(skip).collect()
    }
}

/// Read-only match log across competitions.
#[derive(Debug, Clone, Default)]
pub struct MatchHistoryStore {
    competitions: HashMap<String, Arc<CompetitionHistory>>,
}

impl MatchHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(rows: Vec<MatchRecord>) -> Self {
        let mut grouped: BTreeMap<String, Vec<MatchRecord>> = BTreeMap::new();
        for row in rows {
            grouped.entry(row.competition.clone()).or_default().push(row);
        }
        let mut store = Self::new();
        for (competition, rows) in grouped {
            store.insert(CompetitionHistory::new(competition, rows));
        }
        store
    }

    pub fn insert(&mut self, history: CompetitionHistory) {
        self.competitions
            .insert(history.competition().to_string(), Arc::new(history));
    }

    pub fn get(&self, competition: &str) -> Result<Arc<CompetitionHistory>> {
        if let Some(h) = self.competitions.get(competition) {
            return Ok(Arc::clone(h));
        }
        let wanted = competition.trim();
        self.competitions
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
            .map(|(_, h)| Arc::clone(h))
            .ok_or_else(|| ForecastError::UnknownCompetition {
                competition: competition.to_string(),
            })
    }

    pub fn competitions(&self) -> Vec<String> {
        let mut keys = self.competitions.keys().cloned().collect::<Vec<_>>();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.competitions.is_empty()
    }
}

pub fn default_db_path() -> Option<PathBuf> {
    if let Ok(raw) = std::env::var("MATCHCAST_DB")
        && !raw.trim().is_empty()
    {
        return Some(PathBuf::from(raw.trim()));
    }
    app_cache_dir().map(|dir| dir.join("history.sqlite"))
}

pub fn open_db(path: &Path) -> AnyResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let conn =
        Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> AnyResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS matches (
            match_id INTEGER PRIMARY KEY,
            competition TEXT NOT NULL,
            season TEXT NOT NULL,
            match_date TEXT NOT NULL,
            home_team TEXT NOT NULL,
            away_team TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            status TEXT NOT NULL,
            home_shots INTEGER NULL,
            away_shots INTEGER NULL,
            home_possession REAL NULL,
            away_possession REAL NULL,
            home_xg REAL NULL,
            away_xg REAL NULL,
            outcome TEXT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_matches_competition ON matches(competition);
        CREATE INDEX IF NOT EXISTS idx_matches_season ON matches(season);
        CREATE INDEX IF NOT EXISTS idx_matches_date ON matches(match_date);
        CREATE INDEX IF NOT EXISTS idx_matches_status ON matches(status);
        "#,
    )
    .context("create sqlite schema")?;
    Ok(())
}

/// Inserts or replaces rows by id inside one transaction.
pub fn upsert_matches(conn: &mut Connection, rows: &[MatchRecord]) -> AnyResult<usize> {
    let tx = conn.transaction().context("begin upsert transaction")?;
    let now = Utc::now().to_rfc3339();
    for m in rows {
        let stats = m.stats.unwrap_or_default();
        tx.execute(
            r#"
            INSERT INTO matches (
                match_id, competition, season, match_date, home_team, away_team,
                home_goals, away_goals, status,
                home_shots, away_shots, home_possession, away_possession, home_xg, away_xg,
                outcome, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17
            )
            ON CONFLICT(match_id) DO UPDATE SET
                competition = excluded.competition,
                season = excluded.season,
                match_date = excluded.match_date,
                home_team = excluded.home_team,
                away_team = excluded.away_team,
                home_goals = excluded.home_goals,
                away_goals = excluded.away_goals,
                status = excluded.status,
                home_shots = excluded.home_shots,
                away_shots = excluded.away_shots,
                home_possession = excluded.home_possession,
                away_possession = excluded.away_possession,
                home_xg = excluded.home_xg,
                away_xg = excluded.away_xg,
                outcome = excluded.outcome,
                updated_at = excluded.updated_at
            "#,
            params![
                m.id as i64,
                m.competition,
                m.season,
                m.date.format("%Y-%m-%d").to_string(),
                m.home_team,
                m.away_team,
                m.home_goals,
                m.away_goals,
                m.status.as_str(),
                stats.home_shots,
                stats.away_shots,
                stats.home_possession,
                stats.away_possession,
                stats.home_xg,
                stats.away_xg,
                m.outcome().map(|o| o.label()),
                now,
            ],
        )
        .with_context(|| format!("upsert match {}", m.id))?;
    }
    tx.commit().context("commit upsert transaction")?;
    Ok(rows.len())
}

struct RawRow {
    id: i64,
    competition: String,
    season: String,
    date: String,
    home_team: String,
    away_team: String,
    home_goals: Option<u32>,
    away_goals: Option<u32>,
    status: String,
    stats: AdvancedStats,
}

impl RawRow {
    fn into_record(self) -> AnyResult<MatchRecord> {
        let date = NaiveDate::parse_from_str(self.date.trim(), "%Y-%m-%d")
            .with_context(|| format!("match {}: bad date {:?}", self.id, self.date))?;
        let status = MatchStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("match {}: unknown status {:?}", self.id, self.status))?;
        let has_stats = self.stats != AdvancedStats::default();
        Ok(MatchRecord {
            id: u64::try_from(self.id).context("negative match id")?,
            competition: self.competition,
            season: self.season,
            date,
            home_team: self.home_team,
            away_team: self.away_team,
            home_goals: self.home_goals,
            away_goals: self.away_goals,
            status,
            stats: has_stats.then_some(self.stats),
        })
    }
}

pub fn load_competition(conn: &Connection, competition: &str) -> AnyResult<CompetitionHistory> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT
                match_id, competition, season, match_date, home_team, away_team,
                home_goals, away_goals, status,
                home_shots, away_shots, home_possession, away_possession, home_xg, away_xg
            FROM matches
            WHERE competition = ?1
            ORDER BY match_date ASC, match_id ASC
            "#,
        )
        .context("prepare load matches query")?;

    let rows = stmt
        .query_map(params![competition], |row| {
            Ok(RawRow {
                id: row.get(0)?,
                competition: row.get(1)?,
                season: row.get(2)?,
                date: row.get(3)?,
                home_team: row.get(4)?,
                away_team: row.get(5)?,
                home_goals: row.get(6)?,
                away_goals: row.get(7)?,
                status: row.get(8)?,
                stats: AdvancedStats {
                    home_shots: row.get(9)?,
                    away_shots: row.get(10)?,
                    home_possession: row.get(11)?,
                    away_possession: row.get(12)?,
                    home_xg: row.get(13)?,
                    away_xg: row.get(14)?,
                },
            })
        })
        .context("query load matches")?;

    let mut out = Vec::new();
    for row in rows {
        let raw = row.context("decode match row")?;
        out.push(raw.into_record()?);
    }
    Ok(CompetitionHistory::new(competition, out))
}

pub fn list_competitions(conn: &Connection) -> AnyResult<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT competition FROM matches ORDER BY competition ASC")
        .context("prepare competitions query")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query competitions")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row.context("decode competition")?);
    }
    Ok(out)
}

pub fn load_store(conn: &Connection) -> AnyResult<MatchHistoryStore> {
    let mut store = MatchHistoryStore::new();
    for competition in list_competitions(conn)? {
        let history = load_competition(conn, &competition)?;
        log::info!(
            "loaded {} matches for {} ({} seasons)",
            history.len(),
            competition,
            history.seasons().len()
        );
        store.insert(history);
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64, date: &str, home: &str, away: &str, score: Option<(u32, u32)>) -> MatchRecord {
        MatchRecord {
            id,
            competition: "test_league".to_string(),
            season: "2024/25".to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("date"),
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
    fn parse_leading_year_works() {
        assert_eq!(parse_leading_year("2023/24"), Some(2023));
        assert_eq!(parse_leading_year("Season 2019-2020"), Some(2019));
        assert_eq!(parse_leading_year("abc"), None);
    }

    #[test]
    fn played_before_is_strict() {
        let h = CompetitionHistory::new(
            "test_league",
            vec![
                row(2, "2024-08-10", "A", "B", Some((1, 0))),
                row(1, "2024-08-03", "B", "C", Some((2, 2))),
                row(3, "2024-08-17", "C", "A", None),
            ],
        );
        let as_of = NaiveDate::parse_from_str("2024-08-10", "%Y-%m-%d").expect("date");
        let ids = h.played_before(as_of).map(|m| m.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1]);
        assert_eq!(h.team_played_count_before("B", as_of), 1);
        assert_eq!(h.scheduled().len(), 1);
        assert!(h.season_in_progress("2024/25"));
    }

    #[test]
    fn scheduled_fixtures_are_deduplicated() {
        let h = CompetitionHistory::new(
            "test_league",
            vec![
                row(5, "2024-09-01", "A", "B", None),
                row(6, "2024-09-01", "a ", "b", None),
                row(4, "2024-08-25", "C", "A", None),
            ],
        );
        let ids = h.scheduled().iter().map(|m| m.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![4, 5]);
    }

    #[test]
    fn sqlite_round_trip_keeps_status_and_stats() {
        let mut conn = Connection::open_in_memory().expect("in-memory db");
        init_schema(&conn).expect("schema");
        let mut played = row(1, "2024-08-03", "A", "B", Some((3, 1)));
        played.stats = Some(AdvancedStats {
            home_xg: Some(2.1),
            away_xg: Some(0.7),
            ..AdvancedStats::default()
        });
        let rows = vec![played, row(2, "2024-08-10", "B", "A", None)];
        assert_eq!(upsert_matches(&mut conn, &rows).expect("upsert"), 2);
        assert_eq!(upsert_matches(&mut conn, &rows).expect("re-upsert"), 2);

        let store = load_store(&conn).expect("load");
        let h = store.get("TEST_LEAGUE").expect("case-insensitive lookup");
        assert_eq!(h.len(), 2);
        assert_eq!(h.matches()[0], rows[0]);
        assert_eq!(h.matches()[1].status, MatchStatus::Scheduled);
        assert!(matches!(
            store.get("other"),
            Err(ForecastError::UnknownCompetition { .. })
        ));
    }
}
