use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rayon::prelude::*;

use crate::api::{
    CompetitionStatus, FailureReport, ForecastRequest, ForecastResponse, PredictionResult,
    UpcomingFixture,
};
use crate::baseline::{CompetitionBaseline, compute_baseline};
use crate::calibration::Prob3;
use crate::config::{ComparisonFrame, ForecastConfig};
use crate::error::{ForecastError, Result};
use crate::features::{FeatureEngineer, HeadToHead, assemble, build_features};
use crate::form::{TeamFormSnapshot, Venue};
use crate::history::{CompetitionHistory, MatchHistoryStore};
use crate::league_stats::{self, LeagueOverview, SeasonTrend};
use crate::model::{ModelSummary, TrainedModel};
use crate::registry::{CompetitionModel, ModelRegistry};
use crate::scoreline::{ExpectedGoals, ScoringProfile, estimate_scoreline};
use crate::simulation::{
    CancellationToken, FixtureForecast, PrecomputedForecasts, ScheduledFixture,
    SeasonSimulationResult, SeasonSimulator,
};
use crate::standings::{StandingRow, current_standings};

/// Answers forecast requests from read-only history and the loaded models.
/// Holds no mutable state, so one instance can serve many callers at once.
#[derive(Clone)]
pub struct PredictionService {
    history: Arc<MatchHistoryStore>,
    registry: Arc<ModelRegistry>,
    config: ForecastConfig,
    as_of: Option<NaiveDate>,
}

/// One model of a cross-competition frame with the scale it scores in.
struct FrameMember {
    model: Arc<TrainedModel>,
    baseline: CompetitionBaseline,
}

impl PredictionService {
    pub fn new(
        history: Arc<MatchHistoryStore>,
        registry: Arc<ModelRegistry>,
        config: ForecastConfig,
    ) -> Self {
        Self {
            history,
            registry,
            config,
            as_of: None,
        }
    }

    /// Pins "now" for reproducible answers.
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Features are built from matches strictly before this date, so
    /// today's finished matches count.
    pub fn as_of(&self) -> NaiveDate {
        self.as_of
            .unwrap_or_else(|| Utc::now().date_naive() + Duration::days(1))
    }

    fn serving(&self, competition: &str) -> Result<(CompetitionModel, Arc<CompetitionHistory>)> {
        let entry = self.registry.get(competition)?;
        let history = self.history.get(&entry.model.competition)?;
        Ok((entry, history))
    }

    pub fn predict_head_to_head(
        &self,
        competition: &str,
        home_team: &str,
        away_team: &str,
    ) -> Result<PredictionResult> {
        let (entry, history) = self.serving(competition)?;
        let home = entry.resolver.resolve(home_team)?;
        let away = entry.resolver.resolve(away_team)?;
        if home == away {
            return Err(ForecastError::InvalidRequest(format!(
                "{home} cannot play itself"
            )));
        }
        let forecast = self.forecast_fixture(&entry.model, &history, &home, &away, self.as_of())?;
        Ok(result(history.competition(), &home, &away, &forecast))
    }

    /// Outcome distribution and expected goals for a home/away fixture
    /// within one competition.
    fn forecast_fixture(
        &self,
        model: &TrainedModel,
        history: &CompetitionHistory,
        home: &str,
        away: &str,
        as_of: NaiveDate,
    ) -> Result<FixtureForecast> {
        let features = build_features(history, home, away, as_of, &model.feature_config)?;
        let probabilities = model.predict(&features)?;
        let recent = self.config.scoreline.recent_seasons;
        let baseline = compute_baseline(history, as_of, recent);
        let home_profile = ScoringProfile::compute(history, home, Venue::Home, as_of, recent);
        let away_profile = ScoringProfile::compute(history, away, Venue::Away, as_of, recent);
        let expected_goals = estimate_scoreline(
            probabilities,
            &home_profile,
            &away_profile,
            &baseline,
            false,
            &self.config.scoreline,
        );
        Ok(FixtureForecast {
            probabilities,
            expected_goals,
        })
    }

    /// Hypothetical meeting of teams from two competitions on neutral ground.
    /// Both orientations are scored and averaged, so swapping the teams
    /// mirrors the answer exactly.
    pub fn predict_cross_competition(
        &self,
        competition_a: &str,
        team_a: &str,
        competition_b: &str,
        team_b: &str,
    ) -> Result<PredictionResult> {
        let (entry_a, hist_a) = self.serving(competition_a)?;
        let (entry_b, hist_b) = self.serving(competition_b)?;
        let a = entry_a.resolver.resolve(team_a)?;
        let b = entry_b.resolver.resolve(team_b)?;
        let same_competition = hist_a.competition() == hist_b.competition();
        if same_competition && a == b {
            return Err(ForecastError::InvalidRequest(format!("{a} cannot play itself")));
        }

        let as_of = self.as_of();
        let recent = self.config.scoreline.recent_seasons;
        let base_a = compute_baseline(&hist_a, as_of, recent);
        let base_b = compute_baseline(&hist_b, as_of, recent);
        let h2h = if same_competition {
            HeadToHead::between(&hist_a, &a, &b, as_of)
        } else {
            HeadToHead::none()
        };

        let members = self.frame_members(&entry_a, &entry_b, as_of)?;
        let total_weight: f64 = members.iter().map(|m| frame_weight(&m.model)).sum();
        let mut blended = [0.0f64; 3];
        for member in &members {
            let cfg = member.model.feature_config;
            let snap_a = FeatureEngineer::new(&hist_a, cfg)
                .snapshot(&a, as_of)?
                .rescaled(
                    base_a.goal_scale_to(&member.baseline),
                    base_a.ppg_scale_to(&member.baseline),
                );
            let snap_b = FeatureEngineer::new(&hist_b, cfg)
                .snapshot(&b, as_of)?
                .rescaled(
                    base_b.goal_scale_to(&member.baseline),
                    base_b.ppg_scale_to(&member.baseline),
                );
            let p = neutral_probabilities(&member.model, &snap_a, &snap_b, &h2h)?;
            let w = frame_weight(&member.model) / total_weight;
            blended[0] += w * p.home;
            blended[1] += w * p.draw;
            blended[2] += w * p.away;
        }
        let probabilities = Prob3::from_array(blended).validated("cross-competition frame")?;

        let neutral = base_a.blend(&base_b);
        let profile_a = ScoringProfile::compute(&hist_a, &a, Venue::Neutral, as_of, recent)
            .scaled(base_a.goal_scale_to(&neutral));
        let profile_b = ScoringProfile::compute(&hist_b, &b, Venue::Neutral, as_of, recent)
            .scaled(base_b.goal_scale_to(&neutral));
        let expected_goals = estimate_scoreline(
            probabilities,
            &profile_a,
            &profile_b,
            &neutral,
            true,
            &self.config.scoreline,
        );

        Ok(PredictionResult {
            competition: format!("{} v {}", hist_a.competition(), hist_b.competition()),
            home_team: a,
            away_team: b,
            probability_home_win: probabilities.home,
            probability_draw: probabilities.draw,
            probability_away_win: probabilities.away,
            predicted_home_goals: expected_goals.home,
            predicted_away_goals: expected_goals.away,
        })
    }

    fn frame_members(
        &self,
        entry_a: &CompetitionModel,
        entry_b: &CompetitionModel,
        as_of: NaiveDate,
    ) -> Result<Vec<FrameMember>> {
        let models = match &self.config.cross.frame {
            ComparisonFrame::Competition(name) => vec![self.registry.get(name)?.model],
            ComparisonFrame::Ensemble => {
                let mut models = vec![Arc::clone(&entry_a.model), Arc::clone(&entry_b.model)];
                // Sorted so argument order never changes the summation order.
                models.sort_by(|x, y| x.competition.cmp(&y.competition));
                models.dedup_by(|x, y| x.competition == y.competition);
                models
            }
        };
        models
            .into_iter()
            .map(|model| {
                let history = self.history.get(&model.competition)?;
                let baseline =
                    compute_baseline(&history, as_of, self.config.scoreline.recent_seasons);
                Ok(FrameMember { model, baseline })
            })
            .collect()
    }

    /// Predictions for every scheduled fixture, in date order. A fixture
    /// that cannot be priced carries its failure instead.
    pub fn upcoming_fixtures(&self, competition: &str) -> Result<Vec<UpcomingFixture>> {
        let (entry, history) = self.serving(competition)?;
        let scheduled = history.scheduled();
        scheduled
            .par_iter()
            .map(|m| {
                let priced = self.forecast_fixture(
                    &entry.model,
                    &history,
                    &m.home_team,
                    &m.away_team,
                    m.date,
                );
                let (prediction, failure) = match priced {
                    Ok(f) => (
                        Some(result(history.competition(), &m.home_team, &m.away_team, &f)),
                        None,
                    ),
                    Err(err) if err.is_recoverable() => {
                        log::debug!("{} v {}: {err}", m.home_team, m.away_team);
                        (None, Some(FailureReport::from(&err)))
                    }
                    Err(err) => return Err(err),
                };
                Ok(UpcomingFixture {
                    date: m.date,
                    home_team: m.home_team.clone(),
                    away_team: m.away_team.clone(),
                    prediction,
                    failure,
                })
            })
            .collect()
    }

    pub fn simulate_season(
        &self,
        competition: &str,
        num_simulations: Option<usize>,
    ) -> Result<SeasonSimulationResult> {
        self.simulate_season_with(
            competition,
            num_simulations,
            self.config.simulation.seed,
            &CancellationToken::new(),
        )
    }

    /// Monte Carlo replay of the current season's remaining fixtures. Each
    /// fixture is priced once; runs only sample.
    pub fn simulate_season_with(
        &self,
        competition: &str,
        num_simulations: Option<usize>,
        seed: u64,
        cancel: &CancellationToken,
    ) -> Result<SeasonSimulationResult> {
        let runs = num_simulations.unwrap_or(self.config.simulation.default_runs);
        let max_runs = self.config.simulation.max_runs;
        if runs == 0 || runs > max_runs {
            return Err(ForecastError::InvalidRequest(format!(
                "num_simulations must be between 1 and {max_runs}, got {runs}"
            )));
        }
        let (entry, history) = self.serving(competition)?;
        let season = history.current_season().map(str::to_string);
        let standings = current_standings(&history);

        let fixtures = history
            .scheduled()
            .into_iter()
            .filter(|m| season.as_deref() == Some(m.season.as_str()))
            .enumerate()
            .map(|(index, m)| ScheduledFixture {
                index,
                date: m.date,
                home_team: m.home_team.clone(),
                away_team: m.away_team.clone(),
            })
            .collect::<Vec<_>>();

        let priced = fixtures
            .par_iter()
            .map(|f| {
                match self.forecast_fixture(&entry.model, &history, &f.home_team, &f.away_team, f.date)
                {
                    Ok(forecast) => Ok((forecast, false)),
                    Err(err) if err.is_recoverable() => {
                        log::warn!(
                            "{}: pricing {} v {} from league rates: {err}",
                            history.competition(),
                            f.home_team,
                            f.away_team
                        );
                        Ok((self.fallback_forecast(&history, f.date)?, true))
                    }
                    Err(err) => Err(err),
                }
            })
            .collect::<Result<Vec<_>>>()?;
        let fallback = priced.iter().filter(|(_, fell_back)| *fell_back).count();
        let source = PrecomputedForecasts::new(priced.into_iter().map(|(f, _)| f).collect());

        log::info!(
            "{}: simulating {runs} seasons over {} remaining fixtures",
            history.competition(),
            fixtures.len()
        );
        let simulator =
            SeasonSimulator::new(history.competition(), &standings, fixtures, &source, seed)
                .with_season(season)
                .with_fallback_count(fallback);
        Ok(simulator.run_batch(runs, cancel))
    }

    /// Competition-wide result rates and average goals.
    fn fallback_forecast(
        &self,
        history: &CompetitionHistory,
        as_of: NaiveDate,
    ) -> Result<FixtureForecast> {
        let b = compute_baseline(history, as_of, self.config.scoreline.recent_seasons);
        let probabilities = Prob3::from_array([b.home_win_rate, b.draw_rate, b.away_win_rate()])
            .validated("league result rates")?;
        Ok(FixtureForecast {
            probabilities,
            expected_goals: ExpectedGoals {
                home: b.home_goals,
                away: b.away_goals,
            },
        })
    }

    pub fn teams(&self, competition: &str) -> Result<Vec<String>> {
        Ok(self.history.get(competition)?.roster())
    }

    pub fn standings(&self, competition: &str) -> Result<(Option<String>, Vec<StandingRow>)> {
        let history = self.history.get(competition)?;
        let season = history.current_season().map(str::to_string);
        Ok((season, current_standings(&history)))
    }

    pub fn model_metrics(&self, competition: &str) -> Result<ModelSummary> {
        let entry = self.registry.get(competition)?;
        Ok(ModelSummary::from(entry.model.as_ref()))
    }

    pub fn league_overview(&self, competition: &str) -> Result<LeagueOverview> {
        let history = self.history.get(competition)?;
        Ok(league_stats::league_overview(&history))
    }

    pub fn season_trends(&self, competition: &str) -> Result<Vec<SeasonTrend>> {
        let history = self.history.get(competition)?;
        Ok(league_stats::season_trends(&history))
    }

    pub fn competitions(&self) -> Vec<CompetitionStatus> {
        self.history
            .competitions()
            .into_iter()
            .map(|competition| CompetitionStatus {
                model_loaded: self.registry.get(&competition).is_ok(),
                blocked: self.registry.is_blocked(&competition),
                competition,
            })
            .collect()
    }

    /// Recoverable errors come back as `ForecastResponse::Failure`; fatal
    /// ones (missing or incompatible model, degenerate output) are returned
    /// as errors.
    pub fn handle(&self, request: ForecastRequest) -> Result<ForecastResponse> {
        let answer = match request {
            ForecastRequest::HeadToHead {
                competition,
                home_team,
                away_team,
            } => self
                .predict_head_to_head(&competition, &home_team, &away_team)
                .map(ForecastResponse::Prediction),
            ForecastRequest::CrossCompetition {
                competition_a,
                team_a,
                competition_b,
                team_b,
            } => self
                .predict_cross_competition(&competition_a, &team_a, &competition_b, &team_b)
                .map(ForecastResponse::Prediction),
            ForecastRequest::SeasonSimulation {
                competition,
                num_simulations,
                seed,
            } => self
                .simulate_season_with(
                    &competition,
                    num_simulations,
                    seed.unwrap_or(self.config.simulation.seed),
                    &CancellationToken::new(),
                )
                .map(ForecastResponse::Simulation),
            ForecastRequest::UpcomingFixtures { competition } => self
                .upcoming_fixtures(&competition)
                .map(|fixtures| ForecastResponse::UpcomingFixtures {
                    competition,
                    fixtures,
                }),
            ForecastRequest::Teams { competition } => self
                .teams(&competition)
                .map(|teams| ForecastResponse::Teams { competition, teams }),
            ForecastRequest::Standings { competition } => {
                self.standings(&competition)
                    .map(|(season, table)| ForecastResponse::Standings {
                        competition,
                        season,
                        table,
                    })
            }
            ForecastRequest::LeagueOverview { competition } => self
                .league_overview(&competition)
                .map(ForecastResponse::LeagueOverview),
            ForecastRequest::SeasonTrends { competition } => self
                .season_trends(&competition)
                .map(|seasons| ForecastResponse::SeasonTrends {
                    competition,
                    seasons,
                }),
            ForecastRequest::ModelMetrics { competition } => self
                .model_metrics(&competition)
                .map(ForecastResponse::ModelMetrics),
            ForecastRequest::Competitions => Ok(ForecastResponse::Competitions {
                competitions: self.competitions(),
            }),
        };
        match answer {
            Ok(response) => Ok(response),
            Err(err) if err.is_recoverable() => Ok(ForecastResponse::Failure(FailureReport::from(&err))),
            Err(err) => Err(err),
        }
    }
}

fn frame_weight(model: &TrainedModel) -> f64 {
    if model.test_accuracy.is_finite() {
        model.test_accuracy.max(1e-3)
    } else {
        1e-3
    }
}

/// Both orientations on neutral ground, folded back to `a` as the home side.
fn neutral_probabilities(
    model: &TrainedModel,
    a: &TeamFormSnapshot,
    b: &TeamFormSnapshot,
    h2h: &HeadToHead,
) -> Result<Prob3> {
    let forward = model.predict(&assemble(a, b, Venue::Neutral, Venue::Neutral, h2h))?;
    let reverse = model.predict(&assemble(
        b,
        a,
        Venue::Neutral,
        Venue::Neutral,
        &h2h.mirrored(),
    ))?;
    Ok(Prob3 {
        home: 0.5 * (forward.home + reverse.away),
        draw: 0.5 * (forward.draw + reverse.draw),
        away: 0.5 * (forward.away + reverse.home),
    })
}

fn result(competition: &str, home: &str, away: &str, f: &FixtureForecast) -> PredictionResult {
    PredictionResult {
        competition: competition.to_string(),
        home_team: home.to_string(),
        away_team: away.to_string(),
        probability_home_win: f.probabilities.home,
        probability_draw: f.probabilities.draw,
        probability_away_win: f.probabilities.away,
        predicted_home_goals: f.expected_goals.home,
        predicted_away_goals: f.expected_goals.away,
    }
}
