//! Aggregate statistics over a batch, always derived from the items.

use super::types::{EvaluationItem, JudgeStatus, Winner};
use serde::Serialize;
use std::collections::BTreeMap;

/// Mean A/B score for one criterion over the items that scored it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CriterionAverage {
    pub a: f64,
    pub b: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub total_evals: usize,
    /// Items with both sides complete.
    pub generated_count: usize,
    pub judged_count: usize,
    pub a_wins: usize,
    pub b_wins: usize,
    pub ties: usize,
    /// Judged, but the reply had no recognizable scores.
    pub unscored: usize,
    pub judge_errors: usize,
    pub can_judge: bool,
    pub avg_score_a: Option<f64>,
    pub avg_score_b: Option<f64>,
    pub criteria: BTreeMap<String, CriterionAverage>,
}

impl RunStats {
    pub fn from_items(items: &[EvaluationItem]) -> Self {
        let mut stats = Self {
            total_evals: items.len(),
            ..Default::default()
        };

        let (mut sum_a, mut sum_b, mut scored) = (0.0, 0.0, 0usize);
        let mut sums: BTreeMap<String, (f64, f64, usize)> = BTreeMap::new();

        for item in items {
            if item.is_generated() {
                stats.generated_count += 1;
            }
            if item.is_judgeable() {
                stats.can_judge = true;
            }
            if item.judge.status == JudgeStatus::Error {
                stats.judge_errors += 1;
            }
            if !item.is_judged() {
                continue;
            }
            stats.judged_count += 1;

            let Some(scores) = &item.judge.scores else {
                stats.unscored += 1;
                continue;
            };
            match scores.winner {
                Some(Winner::A) => stats.a_wins += 1,
                Some(Winner::B) => stats.b_wins += 1,
                Some(Winner::Tie) => stats.ties += 1,
                None => {}
            }
            if let (Some(a), Some(b)) = (scores.score_a, scores.score_b) {
                sum_a += a;
                sum_b += b;
                scored += 1;
            }
            for (id, score) in scores.breakdown.iter().flatten() {
                let entry = sums.entry(id.clone()).or_insert((0.0, 0.0, 0));
                entry.0 += score.a;
                entry.1 += score.b;
                entry.2 += 1;
            }
        }

        if scored > 0 {
            stats.avg_score_a = Some(sum_a / scored as f64);
            stats.avg_score_b = Some(sum_b / scored as f64);
        }
        stats.criteria = sums
            .into_iter()
            .map(|(id, (a, b, n))| {
                let n_f = n as f64;
                (id, CriterionAverage { a: a / n_f, b: b / n_f, samples: n })
            })
            .collect();

        stats
    }

    /// Judged items without an A or B verdict.
    pub fn undecided(&self) -> usize {
        self.judged_count - self.a_wins - self.b_wins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::types::{CriterionScore, GenerationResult, JudgeResult, ParsedScore};

    fn generated(id: u32) -> EvaluationItem {
        let mut item = EvaluationItem::new(id, format!("p{id}"));
        item.result_a = GenerationResult::success("a", 1);
        item.result_b = GenerationResult::success("b", 1);
        item
    }

    fn judged(id: u32, scores: Option<ParsedScore>) -> EvaluationItem {
        let mut item = generated(id);
        item.judge = JudgeResult::complete("reply".into(), scores, 1);
        item
    }

    fn scored(winner: Winner, a: f64, b: f64, x: (f64, f64)) -> ParsedScore {
        ParsedScore {
            winner: Some(winner),
            score_a: Some(a),
            score_b: Some(b),
            breakdown: Some(BTreeMap::from([(
                "x".to_string(),
                CriterionScore { a: x.0, b: x.1 },
            )])),
        }
    }

    #[test]
    fn test_empty() {
        let stats = RunStats::from_items(&[]);
        assert_eq!(stats, RunStats::default());
        assert!(!stats.can_judge);
    }

    #[test]
    fn test_counts_and_averages() {
        let mut a_failed = EvaluationItem::new(6, "p6");
        a_failed.result_a = GenerationResult::failure("down", None);
        a_failed.result_b = GenerationResult::success("b", 1);
        let mut judge_failed = generated(5);
        judge_failed.judge = JudgeResult::failed("timeout", Some(1));

        let items = vec![
            judged(1, Some(scored(Winner::A, 18.0, 14.0, (5.0, 3.0)))),
            judged(2, Some(scored(Winner::B, 10.0, 16.0, (2.0, 4.0)))),
            judged(3, Some(scored(Winner::Tie, 12.0, 12.0, (3.0, 3.0)))),
            judged(4, None),
            judge_failed,
            a_failed,
        ];
        let stats = RunStats::from_items(&items);

        assert_eq!(stats.total_evals, 6);
        assert_eq!(stats.generated_count, 5);
        assert_eq!(stats.judged_count, 4);
        assert_eq!((stats.a_wins, stats.b_wins, stats.ties), (1, 1, 1));
        assert_eq!(stats.unscored, 1);
        assert_eq!(stats.judge_errors, 1);
        assert_eq!(stats.undecided(), 2);
        assert!(stats.can_judge);
        assert_eq!(stats.avg_score_a, Some(40.0 / 3.0));
        assert_eq!(stats.avg_score_b, Some(14.0));
        let x = stats.criteria["x"];
        assert_eq!(x.samples, 3);
        assert!((x.a - 10.0 / 3.0).abs() < 1e-9);
        assert!((x.b - 10.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_winner_only_scores_skip_averages() {
        let stats = RunStats::from_items(&[judged(1, Some(ParsedScore::winner_only(Winner::B)))]);
        assert_eq!(stats.b_wins, 1);
        assert!(stats.avg_score_a.is_none());
        assert!(stats.criteria.is_empty());
        assert!(!stats.can_judge);
    }

    #[test]
    fn test_invariants_hold() {
        let items = vec![
            judged(1, Some(ParsedScore::winner_only(Winner::A))),
            judged(2, None),
            generated(3),
            EvaluationItem::new(4, "pending"),
        ];
        let stats = RunStats::from_items(&items);
        assert!(stats.a_wins + stats.b_wins <= stats.judged_count);
        assert!(stats.judged_count <= stats.generated_count);
        assert!(stats.generated_count <= stats.total_evals);
    }
}
