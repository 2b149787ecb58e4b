use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Tolerance used when checking that a distribution sums to one.
pub const PROB_SUM_TOLERANCE: f64 = 1e-6;
const RENORMALIZE_WARN: f64 = 1e-3;
const LOG_LOSS_FLOOR: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    #[serde(rename = "home_win")]
    Home,
    Draw,
    #[serde(rename = "away_win")]
    Away,
}

impl Outcome {
    pub const ALL: [Outcome; 3] = [Outcome::Home, Outcome::Draw, Outcome::Away];

    pub fn index(self) -> usize {
        match self {
            Outcome::Home => 0,
            Outcome::Draw => 1,
            Outcome::Away => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Outcome::Home => "home_win",
            Outcome::Draw => "draw",
            Outcome::Away => "away_win",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

/// How a batch of forecasts fared against the results that followed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastScore {
    pub fixtures: usize,
    pub brier: f64,
    pub log_loss: f64,
    pub hit_rate: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn from_array(p: [f64; 3]) -> Self {
        Self {
            home: p[0],
            draw: p[1],
            away: p[2],
        }
    }

    pub fn get(&self, outcome: Outcome) -> f64 {
        match outcome {
            Outcome::Home => self.home,
            Outcome::Draw => self.draw,
            Outcome::Away => self.away,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }

    /// Home and away swapped; used when a fixture is scored from the other side.
    pub fn mirrored(&self) -> Self {
        Self {
            home: self.away,
            draw: self.draw,
            away: self.home,
        }
    }

    pub fn argmax(&self) -> Outcome {
        if self.home >= self.draw && self.home >= self.away {
            Outcome::Home
        } else if self.draw >= self.away {
            Outcome::Draw
        } else {
            Outcome::Away
        }
    }

    /// Rejects NaN, infinities, negatives and empty mass; renormalizes small
    /// drift. Large drift is corrected too but logged.
    pub fn validated(self, context: &str) -> Result<Self> {
        let degenerate = || ForecastError::DegenerateProbability {
            context: context.to_string(),
            home: self.home,
            draw: self.draw,
            away: self.away,
        };
        let parts = [self.home, self.draw, self.away];
        if parts.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(degenerate());
        }
        let sum = self.sum();
        if sum <= 1e-12 {
            return Err(degenerate());
        }
        let drift = (sum - 1.0).abs();
        if drift <= PROB_SUM_TOLERANCE * 1e-3 {
            return Ok(self);
        }
        if drift > RENORMALIZE_WARN {
            log::warn!(
                "{context}: probabilities summed to {sum:.6}, renormalizing (home={:.4} draw={:.4} away={:.4})",
                self.home,
                self.draw,
                self.away
            );
        }
        let out = Self {
            home: self.home / sum,
            draw: self.draw / sum,
            away: self.away / sum,
        };
        if (out.sum() - 1.0).abs() > PROB_SUM_TOLERANCE {
            return Err(degenerate());
        }
        Ok(out)
    }
}

pub fn classify_outcome(home_goals: u32, away_goals: u32) -> Outcome {
    match home_goals.cmp(&away_goals) {
        std::cmp::Ordering::Greater => Outcome::Home,
        std::cmp::Ordering::Equal => Outcome::Draw,
        std::cmp::Ordering::Less => Outcome::Away,
    }
}

/// Share of fixtures that ended in each result; uniform when nothing was played.
pub fn outcome_rates(outcomes: &[Outcome]) -> Prob3 {
    if outcomes.is_empty() {
        return Prob3::uniform();
    }
    let mut counts = [0usize; 3];
    for o in outcomes {
        counts[o.index()] += 1;
    }
    let n = outcomes.len() as f64;
    Prob3::from_array(counts.map(|c| c as f64 / n))
}

pub fn mean_probs(predictions: &[Prob3]) -> Prob3 {
    if predictions.is_empty() {
        return Prob3::uniform();
    }
    let mut acc = [0.0f64; 3];
    for p in predictions {
        for outcome in Outcome::ALL {
            acc[outcome.index()] += p.get(outcome);
        }
    }
    let n = predictions.len() as f64;
    Prob3::from_array(acc.map(|v| v / n))
}

/// Three-way Brier score, log loss of the actual result and how often the
/// favourite result came in. Empty or mismatched input scores zero fixtures.
pub fn score_forecasts(predictions: &[Prob3], outcomes: &[Outcome]) -> ForecastScore {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return ForecastScore::default();
    }
    let (brier, log_loss, hits) = predictions.iter().zip(outcomes).fold(
        (0.0f64, 0.0f64, 0usize),
        |(brier, log_loss, hits), (p, &result)| {
            let squared: f64 = Outcome::ALL
                .iter()
                .map(|&o| {
                    let happened = if o == result { 1.0 } else { 0.0 };
                    (p.get(o) - happened).powi(2)
                })
                .sum();
            let surprise = -p.get(result).clamp(LOG_LOSS_FLOOR, 1.0).ln();
            (
                brier + squared,
                log_loss + surprise,
                hits + usize::from(p.argmax() == result),
            )
        },
    );
    let n = predictions.len() as f64;
    ForecastScore {
        fixtures: predictions.len(),
        brier: brier / n,
        log_loss: log_loss / n,
        hit_rate: hits as f64 / n,
    }
}

/// For each of home win, draw and away win, fixtures are bucketed by the
/// probability given to that result and the gap between the forecast mass and
/// the number of times it happened is summed over buckets. The three gaps are
/// averaged.
pub fn expected_calibration_error(predictions: &[Prob3], outcomes: &[Outcome], buckets: usize) -> f64 {
    if predictions.is_empty() || predictions.len() != outcomes.len() || buckets == 0 {
        return 0.0;
    }
    let n = predictions.len() as f64;
    let gap: f64 = Outcome::ALL
        .iter()
        .map(|&class| {
            // (fixtures, forecast mass, times it happened)
            let mut by_bucket = vec![(0usize, 0.0f64, 0.0f64); buckets];
            for (p, &result) in predictions.iter().zip(outcomes) {
                let q = p.get(class).clamp(0.0, 1.0);
                let slot = &mut by_bucket[((q * buckets as f64) as usize).min(buckets - 1)];
                slot.0 += 1;
                slot.1 += q;
                if result == class {
                    slot.2 += 1.0;
                }
            }
            by_bucket
                .iter()
                .filter(|(count, _, _)| *count > 0)
                .map(|(_, mass, happened)| (mass - happened).abs() / n)
                .sum::<f64>()
        })
        .sum();
    gap / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions_have_zero_brier() {
        let preds = vec![
            Prob3 {
                home: 1.0,
                draw: 0.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 1.0,
                away: 0.0,
            },
            Prob3 {
                home: 0.0,
                draw: 0.0,
                away: 1.0,
            },
        ];
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away];
        let m = score_forecasts(&preds, &outcomes);
        assert_eq!(m.fixtures, 3);
        assert!(m.brier < 1e-12);
        assert!((m.hit_rate - 1.0).abs() < 1e-12);
    }

    #[test]
    fn uniform_forecast_scores() {
        let outcomes = vec![Outcome::Home, Outcome::Draw, Outcome::Away, Outcome::Home];
        let preds = vec![Prob3::uniform(); outcomes.len()];
        let m = score_forecasts(&preds, &outcomes);
        assert!((m.brier - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.log_loss - 3.0f64.ln()).abs() < 1e-12);
        assert_eq!(score_forecasts(&preds, &outcomes[..2]), ForecastScore::default());
    }

    #[test]
    fn validated_rejects_nan_and_negative() {
        let nan = Prob3 {
            home: f64::NAN,
            draw: 0.5,
            away: 0.5,
        };
        assert!(matches!(
            nan.validated("test"),
            Err(ForecastError::DegenerateProbability { .. })
        ));
        let neg = Prob3 {
            home: -0.1,
            draw: 0.6,
            away: 0.5,
        };
        assert!(neg.validated("test").is_err());
        let empty = Prob3 {
            home: 0.0,
            draw: 0.0,
            away: 0.0,
        };
        assert!(empty.validated("test").is_err());
    }

    #[test]
    fn validated_renormalizes_drift() {
        let p = Prob3 {
            home: 0.5,
            draw: 0.3,
            away: 0.3,
        };
        let q = p.validated("test").expect("finite and positive");
        assert!((q.sum() - 1.0).abs() < PROB_SUM_TOLERANCE);
        assert!(q.home > q.away);
    }

    #[test]
    fn mirrored_swaps_sides() {
        let p = Prob3 {
            home: 0.6,
            draw: 0.25,
            away: 0.15,
        };
        let m = p.mirrored();
        assert_eq!(m.home, 0.15);
        assert_eq!(m.away, 0.6);
        assert_eq!(m.draw, 0.25);
    }

    #[test]
    fn ece_is_zero_for_calibrated_constant() {
        let outcomes = vec![Outcome::Home, Outcome::Home, Outcome::Away, Outcome::Draw];
        let p = outcome_rates(&outcomes);
        let preds = vec![p; outcomes.len()];
        assert!(expected_calibration_error(&preds, &outcomes, 10) < 1e-12);
    }
}
