use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::calibration::{Outcome, Prob3};
use crate::config::derive_seed;
use crate::error::{ForecastError, Result};
use crate::scoreline::ExpectedGoals;
use crate::standings::StandingRow;

const MAX_REPORTED_FAILURES: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFixture {
    pub index: usize,
    pub date: NaiveDate,
    pub home_team: String,
    pub away_team: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixtureForecast {
    pub probabilities: Prob3,
    pub expected_goals: ExpectedGoals,
}

/// Supplies outcome distributions for remaining fixtures. Called from many
/// runs at once, so implementations must be read-only.
pub trait FixtureOutcomeSource: Sync {
    fn forecast(&self, run_index: usize, fixture: &ScheduledFixture) -> Result<FixtureForecast>;
}

/// Forecasts computed once per batch, indexed by `ScheduledFixture::index`.
#[derive(Debug, Clone)]
pub struct PrecomputedForecasts {
    forecasts: Vec<FixtureForecast>,
}

impl PrecomputedForecasts {
    pub fn new(forecasts: Vec<FixtureForecast>) -> Self {
        Self { forecasts }
    }

    pub fn len(&self) -> usize {
        self.forecasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forecasts.is_empty()
    }
}

impl FixtureOutcomeSource for PrecomputedForecasts {
    fn forecast(&self, _run_index: usize, fixture: &ScheduledFixture) -> Result<FixtureForecast> {
        self.forecasts.get(fixture.index).copied().ok_or_else(|| {
            ForecastError::InvalidRequest(format!(
                "no forecast for fixture {} ({} v {})",
                fixture.index, fixture.home_team, fixture.away_team
            ))
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Tally {
    points: u32,
    wins: u32,
    draws: u32,
    losses: u32,
    goal_difference: i32,
}

impl Tally {
    fn from_row(row: &StandingRow) -> Self {
        Self {
            points: row.points,
            wins: row.wins,
            draws: row.draws,
            losses: row.losses,
            goal_difference: row.goal_difference(),
        }
    }
}

/// Final table of one simulated season, in team-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub run_index: usize,
    pub points: Vec<u32>,
    pub goal_difference: Vec<i32>,
    pub wins: Vec<u32>,
    pub draws: Vec<u32>,
    pub losses: Vec<u32>,
    /// 1-based finishing position per team.
    pub positions: Vec<usize>,
}

impl RunOutcome {
    pub fn champion(&self) -> Option<usize> {
        self.positions.iter().position(|p| *p == 1)
    }
}

enum RunState {
    NotStarted,
    InProgress { next_fixture: usize, tally: Vec<Tally> },
    Complete(RunOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub run_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamProjection {
    pub team: String,
    pub current_points: u32,
    pub mean_points: f64,
    pub min_points: u32,
    pub max_points: u32,
    pub std_points: f64,
    pub mean_position: f64,
    pub mean_goal_difference: f64,
    pub title_probability: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonSimulationResult {
    pub competition: String,
    pub season: Option<String>,
    pub runs_requested: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    pub failures: Vec<RunFailure>,
    pub seed: u64,
    pub remaining_fixtures: usize,
    pub fallback_fixtures: usize,
    /// Sorted by mean points, best first.
    pub teams: Vec<TeamProjection>,
}

impl SeasonSimulationResult {
    pub fn team(&self, name: &str) -> Option<&TeamProjection> {
        self.teams.iter().find(|t| t.team == name)
    }
}

enum RunResult {
    Completed(RunOutcome),
    Failed(RunFailure),
    Cancelled,
}

/// Replays the remaining fixtures of one season from the current table.
pub struct SeasonSimulator<'a, S: FixtureOutcomeSource> {
    competition: String,
    season: Option<String>,
    teams: Vec<String>,
    initial: Vec<Tally>,
    fixtures: Vec<(ScheduledFixture, usize, usize)>,
    source: &'a S,
    seed: u64,
    fallback_fixtures: usize,
}

impl<'a, S: FixtureOutcomeSource> SeasonSimulator<'a, S> {
    pub fn new(
        competition: impl Into<String>,
        standings: &[StandingRow],
        fixtures: Vec<ScheduledFixture>,
        source: &'a S,
        seed: u64,
    ) -> Self {
        let mut teams = Vec::new();
        let mut initial = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for row in standings {
            if index.contains_key(&row.team) {
                continue;
            }
            index.insert(row.team.clone(), teams.len());
            teams.push(row.team.clone());
            initial.push(Tally::from_row(row));
        }
        let mut slot = |name: &str| -> usize {
            if let Some(i) = index.get(name) {
                return *i;
            }
            index.insert(name.to_string(), teams.len());
            teams.push(name.to_string());
            initial.push(Tally::default());
            teams.len() - 1
        };

        let mut ordered = fixtures;
        ordered.sort_by(|a, b| a.date.cmp(&b.date).then(a.index.cmp(&b.index)));
        let fixtures = ordered
            .into_iter()
            .map(|f| {
                let h = slot(&f.home_team);
                let a = slot(&f.away_team);
                (f, h, a)
            })
            .collect();

        Self {
            competition: competition.into(),
            season: None,
            teams,
            initial,
            fixtures,
            source,
            seed,
            fallback_fixtures: 0,
        }
    }

    pub fn with_season(mut self, season: Option<String>) -> Self {
        self.season = season;
        self
    }

    pub fn with_fallback_count(mut self, fallback_fixtures: usize) -> Self {
        self.fallback_fixtures = fallback_fixtures;
        self
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    pub fn remaining_fixtures(&self) -> usize {
        self.fixtures.len()
    }

    /// One full season; the same `run_index` and seed always replay the
    /// same season.
    pub fn run_single(&self, run_index: usize) -> Result<RunOutcome> {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(self.seed, run_index as u64));
        let mut state = RunState::NotStarted;
        loop {
            state = match state {
                RunState::NotStarted => RunState::InProgress {
                    next_fixture: 0,
                    tally: self.initial.clone(),
                },
                RunState::InProgress {
                    next_fixture,
                    mut tally,
                } => match self.fixtures.get(next_fixture) {
                    Some((fixture, h, a)) => {
                        let forecast = self.source.forecast(run_index, fixture)?;
                        play_fixture(&mut tally, *h, *a, &forecast, &mut rng, fixture)?;
                        RunState::InProgress {
                            next_fixture: next_fixture + 1,
                            tally,
                        }
                    }
                    None => RunState::Complete(finish(run_index, &tally, &mut rng)),
                },
                RunState::Complete(outcome) => return Ok(outcome),
            };
        }
    }

    /// Runs are independent and spread over the rayon pool; cancellation is
    /// checked before each run starts.
    pub fn run_batch(&self, runs: usize, cancel: &CancellationToken) -> SeasonSimulationResult {
        let results = (0..runs)
            .into_par_iter()
            .map(|i| {
                if cancel.is_cancelled() {
                    return RunResult::Cancelled;
                }
                match self.run_single(i) {
                    Ok(outcome) => RunResult::Completed(outcome),
                    Err(err) => RunResult::Failed(RunFailure {
                        run_index: i,
                        message: err.to_string(),
                    }),
                }
            })
            .collect::<Vec<_>>();
        self.aggregate(runs, results)
    }

    fn aggregate(&self, runs: usize, results: Vec<RunResult>) -> SeasonSimulationResult {
        let n_teams = self.teams.len();
        let mut sum = vec![0.0f64; n_teams];
        let mut sum_sq = vec![0.0f64; n_teams];
        let mut min = vec![u32::MAX; n_teams];
        let mut max = vec![0u32; n_teams];
        let mut pos_sum = vec![0.0f64; n_teams];
        let mut gd_sum = vec![0.0f64; n_teams];
        let mut titles = vec![0usize; n_teams];

        let mut completed = 0usize;
        let mut failed = 0usize;
        let mut cancelled = 0usize;
        let mut failures = Vec::new();

        for result in results {
            match result {
                RunResult::Completed(o) => {
                    completed += 1;
                    for t in 0..n_teams {
                        let p = o.points[t];
                        sum[t] += p as f64;
                        sum_sq[t] += (p as f64) * (p as f64);
                        min[t] = min[t].min(p);
                        max[t] = max[t].max(p);
                        pos_sum[t] += o.positions[t] as f64;
                        gd_sum[t] += o.goal_difference[t] as f64;
                    }
                    if let Some(c) = o.champion() {
                        titles[c] += 1;
                    }
                }
                RunResult::Failed(f) => {
                    failed += 1;
                    if failures.len() < MAX_REPORTED_FAILURES {
                        failures.push(f);
                    }
                }
                RunResult::Cancelled => cancelled += 1,
            }
        }

        if failed > 0 {
            log::warn!(
                "{}: {failed} of {runs} simulated seasons failed and were excluded",
                self.competition
            );
        }
        if cancelled > 0 {
            log::info!(
                "{}: simulation cancelled after {completed} completed runs",
                self.competition
            );
        }

        let mut teams = (0..n_teams)
            .map(|t| {
                let current = self.initial[t].points;
                if completed == 0 {
                    return TeamProjection {
                        team: self.teams[t].clone(),
                        current_points: current,
                        mean_points: current as f64,
                        min_points: current,
                        max_points: current,
                        std_points: 0.0,
                        mean_position: 0.0,
                        mean_goal_difference: self.initial[t].goal_difference as f64,
                        title_probability: 0.0,
                    };
                }
                let n = completed as f64;
                let mean = sum[t] / n;
                let var = (sum_sq[t] / n - mean * mean).max(0.0);
                TeamProjection {
                    team: self.teams[t].clone(),
                    current_points: current,
                    mean_points: mean,
                    min_points: min[t],
                    max_points: max[t],
                    std_points: var.sqrt(),
                    mean_position: pos_sum[t] / n,
                    mean_goal_difference: gd_sum[t] / n,
                    title_probability: titles[t] as f64 / n,
                }
            })
            .collect::<Vec<_>>();
        teams.sort_by(|a, b| {
            b.mean_points
                .total_cmp(&a.mean_points)
                .then_with(|| a.team.cmp(&b.team))
        });

        SeasonSimulationResult {
            competition: self.competition.clone(),
            season: self.season.clone(),
            runs_requested: runs,
            completed_runs: completed,
            failed_runs: failed,
            cancelled_runs: cancelled,
            failures,
            seed: self.seed,
            remaining_fixtures: self.fixtures.len(),
            fallback_fixtures: self.fallback_fixtures,
            teams,
        }
    }
}

/// Categorical draw over the three outcomes, never the argmax.
pub fn sample_outcome(p: &Prob3, rng: &mut impl Rng) -> Outcome {
    let u: f64 = rng.gen_range(0.0..1.0);
    if u < p.home {
        Outcome::Home
    } else if u < p.home + p.draw {
        Outcome::Draw
    } else {
        Outcome::Away
    }
}

/// Goal-difference swing of a result: decisive results move it by the rounded
/// expected-goals gap, at least one; draws leave it unchanged.
pub fn goal_swing(outcome: Outcome, expected: &ExpectedGoals) -> i32 {
    match outcome {
        Outcome::Draw => 0,
        _ => ((expected.home - expected.away).abs().round() as i32).max(1),
    }
}

fn play_fixture(
    tally: &mut [Tally],
    h: usize,
    a: usize,
    forecast: &FixtureForecast,
    rng: &mut ChaCha8Rng,
    fixture: &ScheduledFixture,
) -> Result<()> {
    let probs = forecast.probabilities.validated(&format!(
        "fixture {} v {}",
        fixture.home_team, fixture.away_team
    ))?;
    let outcome = sample_outcome(&probs, rng);
    let swing = goal_swing(outcome, &forecast.expected_goals);
    match outcome {
        Outcome::Home => {
            tally[h].points += 3;
            tally[h].wins += 1;
            tally[a].losses += 1;
            tally[h].goal_difference += swing;
            tally[a].goal_difference -= swing;
        }
        Outcome::Away => {
            tally[a].points += 3;
            tally[a].wins += 1;
            tally[h].losses += 1;
            tally[a].goal_difference += swing;
            tally[h].goal_difference -= swing;
        }
        Outcome::Draw => {
            tally[h].points += 1;
            tally[a].points += 1;
            tally[h].draws += 1;
            tally[a].draws += 1;
        }
    }
    Ok(())
}

// Points, goal difference, wins, then a lot drawn from the run's own generator.
fn finish(run_index: usize, tally: &[Tally], rng: &mut ChaCha8Rng) -> RunOutcome {
    let lots = (0..tally.len()).map(|_| rng.r#gen::<u64>()).collect::<Vec<_>>();
    let mut order = (0..tally.len()).collect::<Vec<_>>();
    order.sort_by(|&x, &y| {
        tally[y]
            .points
            .cmp(&tally[x].points)
            .then_with(|| tally[y].goal_difference.cmp(&tally[x].goal_difference))
            .then_with(|| tally[y].wins.cmp(&tally[x].wins))
            .then_with(|| lots[y].cmp(&lots[x]))
    });
    let mut positions = vec![0usize; tally.len()];
    for (rank, &team) in order.iter().enumerate() {
        positions[team] = rank + 1;
    }
    RunOutcome {
        run_index,
        points: tally.iter().map(|t| t.points).collect(),
        goal_difference: tally.iter().map(|t| t.goal_difference).collect(),
        wins: tally.iter().map(|t| t.wins).collect(),
        draws: tally.iter().map(|t| t.draws).collect(),
        losses: tally.iter().map(|t| t.losses).collect(),
        positions,
    }
}
