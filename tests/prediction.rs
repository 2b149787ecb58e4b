mod common;

use std::sync::Arc;

use matchcast::api::{ForecastRequest, ForecastResponse};
use matchcast::error::ForecastError;
use matchcast::registry::ModelRegistry;
use matchcast::{MatchHistoryStore, PredictionService};

fn assert_distribution(p: &matchcast::PredictionResult) {
    for v in [p.probability_home_win, p.probability_draw, p.probability_away_win] {
        assert!((0.0..=1.0).contains(&v), "probability {v} out of range");
    }
    assert!((p.probability_sum() - 1.0).abs() <= 1e-6);
    assert!(p.predicted_home_goals >= 0.0 && p.predicted_away_goals >= 0.0);
}

#[test]
fn top_team_at_home_is_favoured_over_bottom_team() {
    let service = common::service();
    let top = common::top_team(0);
    let bottom = common::bottom_team(0);
    let p = service
        .predict_head_to_head(common::HOME_LEAGUE, &top, &bottom)
        .expect("prediction");
    assert_distribution(&p);
    assert!(p.probability_home_win > p.probability_away_win, "{p:?}");
    assert!(p.predicted_home_goals > p.predicted_away_goals, "{p:?}");
}

#[test]
fn team_names_resolve_case_insensitively() {
    let service = common::service();
    let top = common::top_team(0);
    let bottom = common::bottom_team(0);
    let exact = service
        .predict_head_to_head(common::HOME_LEAGUE, &top, &bottom)
        .expect("prediction");
    let shouty = service
        .predict_head_to_head(common::HOME_LEAGUE, &top.to_uppercase(), &format!("  {bottom} "))
        .expect("prediction");
    assert_eq!(exact, shouty);
}

#[test]
fn unknown_team_is_not_silently_defaulted() {
    let service = common::service();
    let top = common::top_team(0);
    let err = service
        .predict_head_to_head(common::HOME_LEAGUE, "Nonexistent FC", &top)
        .expect_err("unknown team");
    assert!(matches!(err, ForecastError::TeamNotFound { .. }), "{err}");

    let response = service
        .handle(ForecastRequest::HeadToHead {
            competition: common::HOME_LEAGUE.to_string(),
            home_team: "Nonexistent FC".to_string(),
            away_team: top,
        })
        .expect("recoverable errors become failures");
    match response {
        ForecastResponse::Failure(f) => {
            assert_eq!(f.kind, "team_not_found");
            assert!(f.recoverable);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[test]
fn every_pairing_is_a_valid_distribution() {
    let service = common::service();
    let roster = service.teams(common::HOME_LEAGUE).expect("roster");
    for home in roster.iter().take(4) {
        for away in roster.iter().rev().take(4) {
            if home == away {
                continue;
            }
            let p = service
                .predict_head_to_head(common::HOME_LEAGUE, home, away)
                .expect("prediction");
            assert_distribution(&p);
        }
    }
}

#[test]
fn a_team_cannot_play_itself() {
    let service = common::service();
    let top = common::top_team(0);
    let err = service
        .predict_head_to_head(common::HOME_LEAGUE, &top, &top)
        .expect_err("same team");
    assert!(matches!(err, ForecastError::InvalidRequest(_)));
}

#[test]
fn cross_competition_is_symmetric() {
    let service = common::service();
    let x = common::top_team(0);
    let y = common::top_team(10);
    let xy = service
        .predict_cross_competition(common::HOME_LEAGUE, &x, common::AWAY_LEAGUE, &y)
        .expect("cross");
    let yx = service
        .predict_cross_competition(common::AWAY_LEAGUE, &y, common::HOME_LEAGUE, &x)
        .expect("cross");
    assert_distribution(&xy);
    assert_distribution(&yx);
    assert!((xy.probability_home_win - yx.probability_away_win).abs() < 1e-9);
    assert!((xy.probability_away_win - yx.probability_home_win).abs() < 1e-9);
    assert!((xy.probability_draw - yx.probability_draw).abs() < 1e-9);
    assert!((xy.predicted_home_goals - yx.predicted_away_goals).abs() < 1e-9);
}

#[test]
fn cross_competition_strong_beats_weak() {
    let service = common::service();
    let strong = common::top_team(0);
    let weak = common::bottom_team(10);
    let p = service
        .predict_cross_competition(common::HOME_LEAGUE, &strong, common::AWAY_LEAGUE, &weak)
        .expect("cross");
    assert!(p.probability_home_win > p.probability_away_win, "{p:?}");
}

#[test]
fn upcoming_fixtures_cover_the_schedule_in_date_order() {
    let service = common::service();
    let history = common::STORE.get(common::HOME_LEAGUE).expect("history");
    let fixtures = service.upcoming_fixtures(common::HOME_LEAGUE).expect("fixtures");
    assert_eq!(fixtures.len(), history.scheduled().len());
    assert!(!fixtures.is_empty());
    assert!(fixtures.windows(2).all(|w| w[0].date <= w[1].date));
    for f in &fixtures {
        let p = f.prediction.as_ref().expect("every team has history");
        assert!(f.failure.is_none());
        assert_eq!(p.home_team, f.home_team);
        assert_distribution(p);
    }
}

#[test]
fn missing_model_is_fatal() {
    let service = PredictionService::new(
        Arc::clone(&common::STORE),
        Arc::new(ModelRegistry::new()),
        common::small_config(),
    );
    let err = service
        .handle(ForecastRequest::HeadToHead {
            competition: common::HOME_LEAGUE.to_string(),
            home_team: common::top_team(0),
            away_team: common::bottom_team(0),
        })
        .expect_err("no model loaded");
    assert!(matches!(err, ForecastError::ModelNotLoaded { .. }));
    assert!(!err.is_recoverable());
}

#[test]
fn thin_history_is_reported_as_not_enough_data() {
    // A roster whose teams have only played twice, scored by a borrowed model.
    let mut spec = common::spec("fresh_league", 99, 40);
    spec.teams = 4;
    spec.seasons = 1;
    spec.current_season_played_rounds = Some(2);
    let store = Arc::new(MatchHistoryStore::from_records(
        matchcast::fake_feed::generate_league(&spec),
    ));
    let history = store.get("fresh_league").expect("history");
    let mut model = common::model(common::HOME_LEAGUE);
    model.competition = "fresh_league".to_string();
    let registry = Arc::new(ModelRegistry::new());
    registry.install(model, &history.roster()).expect("install");

    let roster = history.roster();
    let service = PredictionService::new(Arc::clone(&store), registry, common::small_config());
    let response = service
        .handle(ForecastRequest::HeadToHead {
            competition: "fresh_league".to_string(),
            home_team: roster[0].clone(),
            away_team: roster[1].clone(),
        })
        .expect("recoverable");
    match response {
        ForecastResponse::Failure(f) => assert_eq!(f.kind, "insufficient_history"),
        other => panic!("expected failure, got {other:?}"),
    }

    let upcoming = service.upcoming_fixtures("fresh_league").expect("fixtures");
    assert!(!upcoming.is_empty());
    assert!(upcoming.iter().all(|f| f.prediction.is_none() && f.failure.is_some()));
}

#[test]
fn json_requests_round_trip_through_handle() {
    let service = common::service();
    let raw = format!(
        r#"{{"type":"head_to_head","competition":"{}","home_team":"{}","away_team":"{}"}}"#,
        common::HOME_LEAGUE,
        common::top_team(0),
        common::bottom_team(0)
    );
    let request: ForecastRequest = serde_json::from_str(&raw).expect("request");
    let response = service.handle(request).expect("response");
    let json = serde_json::to_value(&response).expect("json");
    assert_eq!(json["type"], "prediction");
    assert!(json["probability_home_win"].as_f64().is_some());

    let listed = service.handle(ForecastRequest::Competitions).expect("competitions");
    match listed {
        ForecastResponse::Competitions { competitions } => {
            assert_eq!(competitions.len(), 2);
            assert!(competitions.iter().all(|c| c.model_loaded && !c.blocked));
        }
        other => panic!("unexpected {other:?}"),
    }
}
