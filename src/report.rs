use serde::{Deserialize, Serialize};

use crate::calibration::{self, Outcome, Prob3};

const ECE_BINS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: Outcome,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Precision/recall/F1 of the argmax prediction per outcome class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    /// `confusion[actual][predicted]`, indexed by `Outcome::index`.
    pub confusion: [[usize; 3]; 3],
}

impl ClassificationReport {
    pub fn from_predictions(predictions: &[Prob3], outcomes: &[Outcome]) -> Self {
        let mut confusion = [[0usize; 3]; 3];
        for (p, actual) in predictions.iter().zip(outcomes) {
            confusion[actual.index()][p.argmax().index()] += 1;
        }

        let classes = Outcome::ALL
            .iter()
            .map(|&label| {
                let c = label.index();
                let tp = confusion[c][c] as f64;
                let predicted: usize = (0..3).map(|a| confusion[a][c]).sum();
                let support: usize = confusion[c].iter().sum();
                let precision = safe_div(tp, predicted as f64);
                let recall = safe_div(tp, support as f64);
                let f1 = safe_div(2.0 * precision * recall, precision + recall);
                ClassMetrics {
                    label,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect::<Vec<_>>();

        let mean = |f: fn(&ClassMetrics) -> f64| classes.iter().map(f).sum::<f64>() / 3.0;
        Self {
            macro_precision: mean(|c| c.precision),
            macro_recall: mean(|c| c.recall),
            macro_f1: mean(|c| c.f1),
            classes,
            confusion,
        }
    }

    pub fn class(&self, label: Outcome) -> Option<&ClassMetrics> {
        self.classes.iter().find(|c| c.label == label)
    }
}

fn safe_div(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

/// Held-out (or in-sample) quality of one model over one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub samples: usize,
    pub accuracy: f64,
    pub brier: f64,
    pub log_loss: f64,
    pub ece: f64,
    pub mean_probabilities: Prob3,
    pub observed_rates: Prob3,
    pub classes: ClassificationReport,
}

impl EvaluationReport {
    pub fn evaluate(predictions: &[Prob3], outcomes: &[Outcome]) -> Self {
        let score = calibration::score_forecasts(predictions, outcomes);
        Self {
            samples: score.fixtures,
            accuracy: score.hit_rate,
            brier: score.brier,
            log_loss: score.log_loss,
            ece: calibration::expected_calibration_error(predictions, outcomes, ECE_BINS),
            mean_probabilities: calibration::mean_probs(predictions),
            observed_rates: calibration::outcome_rates(outcomes),
            classes: ClassificationReport::from_predictions(predictions, outcomes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(h: f64, d: f64, a: f64) -> Prob3 {
        Prob3 {
            home: h,
            draw: d,
            away: a,
        }
    }

    #[test]
    fn per_class_scores_match_hand_counts() {
        let preds = vec![
            p(0.6, 0.2, 0.2),
            p(0.6, 0.2, 0.2),
            p(0.2, 0.2, 0.6),
            p(0.2, 0.6, 0.2),
        ];
        let outcomes = vec![Outcome::Home, Outcome::Away, Outcome::Away, Outcome::Home];
        let r = ClassificationReport::from_predictions(&preds, &outcomes);

        let home = r.class(Outcome::Home).expect("home row");
        assert!((home.precision - 0.5).abs() < 1e-12);
        assert!((home.recall - 0.5).abs() < 1e-12);
        assert_eq!(home.support, 2);

        let away = r.class(Outcome::Away).expect("away row");
        assert!((away.precision - 1.0).abs() < 1e-12);
        assert!((away.recall - 0.5).abs() < 1e-12);

        let draw = r.class(Outcome::Draw).expect("draw row");
        assert_eq!(draw.support, 0);
        assert_eq!(draw.f1, 0.0);
        assert_eq!(r.confusion[Outcome::Home.index()][Outcome::Draw.index()], 1);
    }

    #[test]
    fn evaluation_reports_observed_rates() {
        let preds = vec![p(0.5, 0.3, 0.2); 4];
        let outcomes = vec![Outcome::Home, Outcome::Home, Outcome::Draw, Outcome::Away];
        let e = EvaluationReport::evaluate(&preds, &outcomes);
        assert_eq!(e.samples, 4);
        assert!((e.accuracy - 0.5).abs() < 1e-12);
        assert!((e.observed_rates.home - 0.5).abs() < 1e-12);
        assert!((e.mean_probabilities.draw - 0.3).abs() < 1e-12);
    }
}
