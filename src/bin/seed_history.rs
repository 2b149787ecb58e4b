use anyhow::{Context, Result};

use matchcast::args::{parse_db_path_arg, parse_list_arg, parse_u64_arg, parse_usize_arg};
use matchcast::config::derive_seed;
use matchcast::fake_feed::{LeagueSpec, generate_league};
use matchcast::history;

const DEFAULT_COMPETITIONS: [&str; 2] = ["premier_league", "la_liga"];

fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let db_path = parse_db_path_arg()
        .or_else(history::default_db_path)
        .context("unable to resolve sqlite path")?;
    let competitions = parse_list_arg("--competitions")
        .unwrap_or_else(|| DEFAULT_COMPETITIONS.iter().map(|s| s.to_string()).collect());
    let teams = parse_usize_arg("--teams").unwrap_or(20).clamp(4, 40);
    let seasons = parse_usize_arg("--seasons").unwrap_or(5).clamp(1, 30);
    let played_rounds = parse_usize_arg("--played-rounds");
    let seed = parse_u64_arg("--seed").unwrap_or(2026);

    let mut conn = history::open_db(&db_path)?;
    for (i, competition) in competitions.iter().enumerate() {
        let mut spec = LeagueSpec::new(competition.clone(), derive_seed(seed, i as u64));
        spec.teams = teams;
        spec.seasons = seasons;
        spec.first_season_year = 2025 - seasons as i32 + 1;
        spec.current_season_played_rounds =
            Some(played_rounds.unwrap_or(spec.rounds_per_season() / 2));
        spec.goals_per_team = 1.2 + 0.15 * (i % 3) as f64;
        spec.name_offset = i * teams;
        spec.id_offset = (i as u64 + 1) * 1_000_000;

        let rows = generate_league(&spec);
        let written = history::upsert_matches(&mut conn, &rows)
            .with_context(|| format!("write {competition}"))?;
        let scheduled = rows.iter().filter(|m| !m.is_played()).count();
        log::info!(
            "{competition}: {written} rows ({} played, {scheduled} scheduled) -> {}",
            rows.len() - scheduled,
            db_path.display()
        );
    }
    Ok(())
}
