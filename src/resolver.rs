use crate::error::{ForecastError, Result};

const MAX_SUGGESTIONS: usize = 5;

/// Lowercase, trimmed, inner whitespace collapsed to single spaces.
pub fn normalize(name: &str) -> String {
    name.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Maps free-text team queries onto one competition's canonical roster.
#[derive(Debug, Clone)]
pub struct TeamResolver {
    competition: String,
    teams: Vec<String>,
    normalized: Vec<String>,
}

impl TeamResolver {
    pub fn new(competition: impl Into<String>, roster: &[String]) -> Self {
        let mut teams = roster.to_vec();
        teams.sort();
        teams.dedup();
        let normalized = teams.iter().map(|t| normalize(t)).collect();
        Self {
            competition: competition.into(),
            teams,
            normalized,
        }
    }

    pub fn competition(&self) -> &str {
        &self.competition
    }

    pub fn teams(&self) -> &[String] {
        &self.teams
    }

    /// Exact normalized match, then a unique substring match in either
    /// direction; anything else is `TeamNotFound` with suggestions.
    pub fn resolve(&self, query: &str) -> Result<String> {
        let q = normalize(query);
        if q.is_empty() {
            return Err(self.not_found(query, Vec::new()));
        }
        if let Some(i) = self.normalized.iter().position(|t| *t == q) {
            return Ok(self.teams[i].clone());
        }

        let partial = self
            .normalized
            .iter()
            .enumerate()
            .filter(|(_, t)| t.contains(&q) || q.contains(t.as_str()))
            .map(|(i, _)| i)
            .collect::<Vec<_>>();
        match partial.as_slice() {
            [only] => Ok(self.teams[*only].clone()),
            [] => Err(self.not_found(query, self.nearest(&q))),
            many => {
                let suggestions = many
                    .iter()
                    .take(MAX_SUGGESTIONS)
                    .map(|&i| self.teams[i].clone())
                    .collect();
                Err(self.not_found(query, suggestions))
            }
        }
    }

    fn nearest(&self, q: &str) -> Vec<String> {
        let limit = (q.chars().count() / 3).max(2);
        let mut scored = self
            .normalized
            .iter()
            .enumerate()
            .map(|(i, t)| (edit_distance(q, t), i))
            .filter(|(d, _)| *d <= limit)
            .collect::<Vec<_>>();
        scored.sort();
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, i)| self.teams[i].clone())
            .collect()
    }

    fn not_found(&self, query: &str, suggestions: Vec<String>) -> ForecastError {
        ForecastError::TeamNotFound {
            competition: self.competition.clone(),
            query: query.to_string(),
            suggestions,
        }
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b_chars = b.chars().collect::<Vec<_>>();
    let mut prev = (0..=b_chars.len()).collect::<Vec<_>>();
    let mut cur = vec![0; b_chars.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b_chars.len()]
}
