//! JSON and CSV exports of a finished run.

use super::stats::RunStats;
use super::types::{CriterionScore, EvaluationItem, Winner};
use crate::criteria::{Criterion, EvalConfig};
use crate::error::{Result, SkillEvalError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// `skill-eval-YYYY-MM-DD.<ext>`
    pub fn default_filename(self, now: DateTime<Utc>) -> String {
        format!("skill-eval-{}.{}", now.format("%Y-%m-%d"), self.extension())
    }

    pub fn render(self, config: &EvalConfig, items: &[EvaluationItem], now: DateTime<Utc>) -> Result<String> {
        match self {
            ExportFormat::Json => export_json(config, items, now),
            ExportFormat::Csv => Ok(export_csv(&config.criteria, items)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = SkillEvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(SkillEvalError::InvalidConfig(format!(
                "unknown export format '{}', expected json or csv",
                other
            ))),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
    exported_at: String,
    skill_a: &'a str,
    skill_b: &'a str,
    criteria: &'a [Criterion],
    summary: Summary,
    evaluations: Vec<ExportedItem<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary {
    total: usize,
    judged: usize,
    a_wins: usize,
    b_wins: usize,
    ties: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedItem<'a> {
    id: u32,
    prompt: &'a str,
    result_a: ExportedResult<'a>,
    result_b: ExportedResult<'a>,
    judge: Option<ExportedJudge<'a>>,
}

#[derive(Serialize)]
struct ExportedResult<'a> {
    content: &'a str,
    /// Milliseconds.
    elapsed: Option<u64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportedJudge<'a> {
    winner: Option<Winner>,
    score_a: Option<f64>,
    score_b: Option<f64>,
    breakdown: Option<&'a BTreeMap<String, CriterionScore>>,
    reasoning: &'a str,
}

/// Pretty JSON document: metadata, summary, and one entry per item.
///
/// `judge` is null for items without recognizable scores.
pub fn export_json(config: &EvalConfig, items: &[EvaluationItem], now: DateTime<Utc>) -> Result<String> {
    let stats = RunStats::from_items(items);
    let document = ExportDocument {
        exported_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        skill_a: &config.skill_a.name,
        skill_b: &config.skill_b.name,
        criteria: &config.criteria,
        summary: Summary {
            total: stats.total_evals,
            judged: stats.judged_count,
            a_wins: stats.a_wins,
            b_wins: stats.b_wins,
            ties: stats.ties,
        },
        evaluations: items
            .iter()
            .map(|item| ExportedItem {
                id: item.id,
                prompt: &item.prompt,
                result_a: ExportedResult {
                    content: &item.result_a.content,
                    elapsed: item.result_a.elapsed_ms,
                },
                result_b: ExportedResult {
                    content: &item.result_b.content,
                    elapsed: item.result_b.elapsed_ms,
                },
                judge: item.judge.scores.as_ref().map(|scores| ExportedJudge {
                    winner: scores.winner,
                    score_a: scores.score_a,
                    score_b: scores.score_b,
                    breakdown: scores.breakdown.as_ref(),
                    reasoning: &item.judge.raw_text,
                }),
            })
            .collect(),
    };

    serde_json::to_string_pretty(&document).map_err(|e| SkillEvalError::Serialization(e.to_string()))
}

/// One row per item with per-criterion A and B columns.
pub fn export_csv(criteria: &[Criterion], items: &[EvaluationItem]) -> String {
    let mut header: Vec<String> = ["ID", "Prompt", "Winner", "Score A", "Score B"]
        .iter()
        .map(|h| h.to_string())
        .collect();
    header.extend(criteria.iter().map(|c| quote_if_needed(&format!("{} (A)", c.name))));
    header.extend(criteria.iter().map(|c| quote_if_needed(&format!("{} (B)", c.name))));

    let mut lines = vec![header.join(",")];
    for item in items {
        let scores = item.judge.scores.as_ref();
        let criterion = |id: &str| scores.and_then(|s| s.breakdown.as_ref()).and_then(|b| b.get(id));

        let mut row = vec![
            item.id.to_string(),
            quote(&item.prompt),
            scores.and_then(|s| s.winner).map(|w| w.to_string()).unwrap_or_default(),
            number(scores.and_then(|s| s.score_a)),
            number(scores.and_then(|s| s.score_b)),
        ];
        row.extend(criteria.iter().map(|c| number(criterion(&c.id).map(|s| s.a))));
        row.extend(criteria.iter().map(|c| number(criterion(&c.id).map(|s| s.b))));
        lines.push(row.join(","));
    }

    lines.join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

fn quote_if_needed(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        quote(field)
    } else {
        field.to_string()
    }
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
