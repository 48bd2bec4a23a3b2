//! Judging stage: score every fully generated pair against the criteria.

use super::pool::{call_with_timeout, elapsed_ms, run_bounded, TaskEvent};
use super::types::{
    CriterionScore, EvaluationItem, JudgeResult, JudgeStatus, ParsedScore, Phase, Progress, Winner,
};
use super::StageEvent;
use crate::criteria::{Criterion, OutputType};
use crate::llm::{ContentBlock, GatewayRequest, ModelGateway, Prompts};
use crate::render::Renderer;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

static JSON_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("valid regex"));
static BOLD_WINNER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*\[(A|B)\]\*\*").expect("valid regex"));

/// Display names of the two skills, shown to the judge.
#[derive(Debug, Clone)]
pub struct SkillNames {
    pub a: String,
    pub b: String,
}

impl Default for SkillNames {
    fn default() -> Self {
        Self {
            a: "Skill A".to_string(),
            b: "Skill B".to_string(),
        }
    }
}

/// Inputs for one judging fan-out.
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub api_key: &'a str,
    pub criteria: &'a [Criterion],
    pub output_type: OutputType,
    pub judge_model: &'a str,
    pub max_tokens: u32,
    pub skill_names: &'a SkillNames,
}

/// What one judge task hands back.
#[derive(Debug)]
struct JudgeOutcome {
    judge: JudgeResult,
    screenshot_a: Option<String>,
    screenshot_b: Option<String>,
}

/// Scores completed A/B pairs with a judge model.
pub struct JudgingStage {
    gateway: Arc<dyn ModelGateway>,
    renderer: Arc<dyn Renderer>,
    max_concurrency: usize,
    call_timeout: Duration,
}

impl JudgingStage {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        renderer: Arc<dyn Renderer>,
        max_concurrency: usize,
        call_timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            renderer,
            max_concurrency: max_concurrency.max(1),
            call_timeout,
        }
    }

    /// Judge every eligible item and return the whole collection.
    ///
    /// Only items with both sides complete and no completed judgment are
    /// touched, so re-running is safe.
    pub async fn run(
        &self,
        request: &JudgeRequest<'_>,
        mut items: Vec<EvaluationItem>,
        mut on_event: impl FnMut(StageEvent<'_>),
    ) -> Vec<EvaluationItem> {
        let selected: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_judgeable())
            .map(|(idx, _)| idx)
            .collect();
        let total = selected.len();
        if total == 0 {
            debug!("no items eligible for judging");
            return items;
        }
        info!(items = total, model = request.judge_model, output_type = %request.output_type, "starting judging");

        let system: Arc<str> = Prompts::judge_system(request.criteria, request.output_type).into();
        let jobs = selected
            .iter()
            .map(|&idx| (idx, self.judge_one(request, Arc::clone(&system), &items[idx])))
            .collect();

        let mut settled = 0;
        run_bounded(jobs, self.max_concurrency, |event| match event {
            TaskEvent::Started(idx) => {
                let item = &mut items[idx];
                item.judge.status = JudgeStatus::Running;
                on_event(StageEvent::Started(item));
            }
            TaskEvent::Finished(idx, outcome) => {
                let item = &mut items[idx];
                match outcome.judge.status {
                    JudgeStatus::Error => warn!(id = item.id, error = %outcome.judge.raw_text, "judging failed"),
                    _ if outcome.judge.scores.is_none() => {
                        warn!(id = item.id, "judge reply had no recognizable scores")
                    }
                    _ => debug!(id = item.id, winner = ?outcome.judge.winner(), "judged"),
                }
                item.judge = outcome.judge;
                item.screenshot_a = outcome.screenshot_a;
                item.screenshot_b = outcome.screenshot_b;
                settled += 1;
                on_event(StageEvent::Settled(
                    item,
                    Progress {
                        current: settled,
                        total,
                        phase: Phase::Judging,
                    },
                ));
            }
        })
        .await;

        for &idx in &selected {
            let item = &mut items[idx];
            if matches!(item.judge.status, JudgeStatus::Pending | JudgeStatus::Running) {
                item.judge = JudgeResult::failed("judging task aborted before completion", None);
                settled += 1;
                on_event(StageEvent::Settled(
                    item,
                    Progress {
                        current: settled,
                        total,
                        phase: Phase::Judging,
                    },
                ));
            }
        }

        info!(judged = settled, "judging finished");
        items
    }

    fn judge_one(
        &self,
        request: &JudgeRequest<'_>,
        system: Arc<str>,
        item: &EvaluationItem,
    ) -> impl std::future::Future<Output = JudgeOutcome> + Send + use<> {
        let gateway = Arc::clone(&self.gateway);
        let renderer = Arc::clone(&self.renderer);
        let timeout = self.call_timeout;
        let output_type = request.output_type;
        let names = request.skill_names.clone();
        let api_key = request.api_key.to_string();
        let model = request.judge_model.to_string();
        let max_tokens = request.max_tokens;
        let prompt = item.prompt.clone();
        let content_a = item.result_a.content.clone();
        let content_b = item.result_b.content.clone();

        async move {
            let start = Instant::now();

            let (screenshot_a, screenshot_b) = if output_type.needs_screenshots() {
                let render = |content: &str| {
                    let renderer = Arc::clone(&renderer);
                    let content = content.to_string();
                    async move {
                        tokio::time::timeout(timeout, renderer.render(&content))
                            .await
                            .ok()
                            .flatten()
                    }
                };
                tokio::join!(render(content_a.as_str()), render(content_b.as_str()))
            } else {
                (None, None)
            };

            let message = judge_message(
                &prompt,
                (&content_a, screenshot_a.as_deref()),
                (&content_b, screenshot_b.as_deref()),
                output_type,
                &names,
            );
            let call = GatewayRequest::new(api_key, model, message, max_tokens).with_system(&*system);

            match call_with_timeout(gateway.as_ref(), call, timeout).await {
                Ok(text) => {
                    let scores = parse_judge_response(&text);
                    JudgeOutcome {
                        judge: JudgeResult::complete(text, scores, elapsed_ms(start)),
                        screenshot_a,
                        screenshot_b,
                    }
                }
                Err(e) => JudgeOutcome {
                    judge: JudgeResult::failed(e, Some(elapsed_ms(start))),
                    screenshot_a: None,
                    screenshot_b: None,
                },
            }
        }
    }
}

/// Assemble the judge's user message in its fixed order: prompt context,
/// Result A (screenshot, source), Result B (screenshot, source), closing line.
pub fn judge_message(
    prompt: &str,
    (content_a, screenshot_a): (&str, Option<&str>),
    (content_b, screenshot_b): (&str, Option<&str>),
    output_type: OutputType,
    names: &SkillNames,
) -> Vec<ContentBlock> {
    let include_source = output_type.includes_source();
    let mut blocks = vec![ContentBlock::text(format!(
        "Here is the original user prompt:\n\n\"{}\"\n\n---\n\n## Result A ({})",
        prompt, names.a
    ))];

    if let Some(png) = screenshot_a {
        blocks.push(ContentBlock::text("### Screenshot of Result A:"));
        blocks.push(ContentBlock::png(png));
    }
    if include_source {
        blocks.push(ContentBlock::text(format!(
            "### Source of Result A:\n\n```\n{}\n```",
            content_a
        )));
    }

    blocks.push(ContentBlock::text(format!("\n\n---\n\n## Result B ({})", names.b)));

    if let Some(png) = screenshot_b {
        blocks.push(ContentBlock::text("### Screenshot of Result B:"));
        blocks.push(ContentBlock::png(png));
    }
    if include_source {
        blocks.push(ContentBlock::text(format!(
            "### Source of Result B:\n\n```\n{}\n```",
            content_b
        )));
    }

    blocks.push(ContentBlock::text(Prompts::judge_closing(output_type)));
    blocks
}

/// A score field as a number, tolerating numeric strings.
fn lift_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Per-criterion scores; entries missing either side are skipped.
fn lift_breakdown(value: Option<&Value>) -> Option<BTreeMap<String, CriterionScore>> {
    let entries = value?.as_object()?;
    let breakdown: BTreeMap<String, CriterionScore> = entries
        .iter()
        .filter_map(|(id, scores)| {
            let a = lift_number(scores.get("A"))?;
            let b = lift_number(scores.get("B"))?;
            Some((id.clone(), CriterionScore { a, b }))
        })
        .collect();
    (!breakdown.is_empty()).then_some(breakdown)
}

/// Lift each field of the JSON block on its own, so one malformed field
/// does not discard the rest.
fn lift_score(block: &str) -> Option<ParsedScore> {
    let value: Value = match serde_json::from_str(block) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "judge JSON block did not parse");
            return None;
        }
    };
    let object = value.as_object()?;
    Some(ParsedScore {
        winner: object.get("winner").and_then(Value::as_str).and_then(Winner::parse),
        score_a: lift_number(object.get("scoreA")),
        score_b: lift_number(object.get("scoreB")),
        breakdown: lift_breakdown(object.get("breakdown")),
    })
}

/// Recover structured scores from a judge reply.
///
/// Tries the fenced JSON block first, then a bold `**[A]**` / `**[B]**`
/// marker. Returns `None` when neither is usable; never fails.
pub fn parse_judge_response(response: &str) -> Option<ParsedScore> {
    if response.trim().is_empty() {
        return None;
    }

    if let Some(block) = JSON_BLOCK.captures(response).and_then(|c| c.get(1)) {
        if let Some(score) = lift_score(block.as_str().trim()) {
            return Some(score);
        }
    }

    BOLD_WINNER
        .captures(response)
        .and_then(|c| c.get(1))
        .and_then(|m| Winner::parse(m.as_str()))
        .map(ParsedScore::winner_only)
}
