use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use chrono::NaiveDate;

use matchcast::config::{FeatureConfig, ForecastConfig};
use matchcast::fake_feed::{LeagueSpec, generate_league, team_names};
use matchcast::features::build_features;
use matchcast::history::CompetitionHistory;
use matchcast::simulation::{
    CancellationToken, FixtureForecast, PrecomputedForecasts, ScheduledFixture, SeasonSimulator,
};
use matchcast::standings::current_standings;
use matchcast::training::train_history;

fn league() -> CompetitionHistory {
    let mut spec = LeagueSpec::new("bench_league", 9);
    spec.teams = 20;
    spec.seasons = 5;
    spec.current_season_played_rounds = Some(19);
    CompetitionHistory::new("bench_league", generate_league(&spec))
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 20).expect("valid date")
}

fn bench_feature_build(c: &mut Criterion) {
    let history = league();
    let names = team_names(20, 0);
    let cfg = FeatureConfig::default();
    c.bench_function("feature_build", |b| {
        b.iter(|| {
            let fv = build_features(
                black_box(&history),
                &names[0],
                &names[19],
                as_of(),
                &cfg,
            )
            .unwrap();
            black_box(fv.values()[0]);
        })
    });
}

fn bench_forest_inference(c: &mut Criterion) {
    let history = league();
    let mut cfg = ForecastConfig::default();
    cfg.training.forest.n_trees = 100;
    let model = train_history(&history, &cfg).unwrap();
    let names = team_names(20, 0);
    let fv = build_features(&history, &names[3], &names[11], as_of(), &cfg.features).unwrap();
    c.bench_function("forest_inference", |b| {
        b.iter(|| {
            let p = model.predict(black_box(&fv)).unwrap();
            black_box(p.home);
        })
    });
}

fn bench_season_simulation(c: &mut Criterion) {
    let history = league();
    let standings = current_standings(&history);
    let fixtures = history
        .scheduled()
        .into_iter()
        .enumerate()
        .map(|(index, m)| ScheduledFixture {
            index,
            date: m.date,
            home_team: m.home_team.clone(),
            away_team: m.away_team.clone(),
        })
        .collect::<Vec<_>>();
    let source = PrecomputedForecasts::new(
        fixtures
            .iter()
            .map(|_| FixtureForecast {
                probabilities: matchcast::calibration::Prob3::from_array([0.45, 0.27, 0.28]),
                expected_goals: matchcast::scoreline::ExpectedGoals {
                    home: 1.5,
                    away: 1.1,
                },
            })
            .collect(),
    );
    let sim = SeasonSimulator::new("bench_league", &standings, fixtures, &source, 7);
    c.bench_function("season_simulation_1000", |b| {
        b.iter(|| {
            let result = sim.run_batch(black_box(1_000), &CancellationToken::new());
            black_box(result.completed_runs);
        })
    });
}

criterion_group!(
    perf,
    bench_feature_build,
    bench_forest_inference,
    bench_season_simulation
);
criterion_main!(perf);
