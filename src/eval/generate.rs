//! Generation stage: every prompt against both skills.

use super::pool::{call_with_timeout, elapsed_ms, run_bounded, TaskEvent};
use super::types::{EvaluationItem, GenStatus, GenerationResult, Phase, Progress, Side};
use super::StageEvent;
use crate::criteria::Skill;
use crate::llm::{GatewayRequest, ModelGateway};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Inputs for one generation fan-out.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub api_key: &'a str,
    pub skill_a: &'a Skill,
    pub skill_b: &'a Skill,
    pub prompts: &'a [String],
    pub model: &'a str,
    pub max_tokens: u32,
    pub base_system_prompt: Option<&'a str>,
}

/// Runs `2 × N` independent generation calls with bounded concurrency.
pub struct GenerationStage {
    gateway: Arc<dyn ModelGateway>,
    max_concurrency: usize,
    call_timeout: Duration,
}

impl GenerationStage {
    pub fn new(gateway: Arc<dyn ModelGateway>, max_concurrency: usize, call_timeout: Duration) -> Self {
        Self {
            gateway,
            max_concurrency: max_concurrency.max(1),
            call_timeout,
        }
    }

    /// Generate outputs for every prompt from both skills.
    ///
    /// Returns one item per prompt, in prompt order, with both results
    /// settled. A failed call only affects its own side.
    pub async fn run(
        &self,
        request: &GenerationRequest<'_>,
        mut on_event: impl FnMut(StageEvent<'_>),
    ) -> Vec<EvaluationItem> {
        let mut items = EvaluationItem::batch(request.prompts);
        let total = items.len() * 2;
        info!(prompts = items.len(), model = request.model, "starting generation");

        let system_a = request.skill_a.system_prompt(request.base_system_prompt);
        let system_b = request.skill_b.system_prompt(request.base_system_prompt);

        let mut jobs = Vec::with_capacity(total);
        for (idx, prompt) in request.prompts.iter().enumerate() {
            for (side, system) in [(Side::A, &system_a), (Side::B, &system_b)] {
                let call = GatewayRequest::new(request.api_key, request.model, prompt.as_str(), request.max_tokens)
                    .with_system(system.as_str());
                jobs.push(((idx, side), self.generate_one(call)));
            }
        }

        let mut settled = 0;
        run_bounded(jobs, self.max_concurrency, |event| match event {
            TaskEvent::Started((idx, side)) => {
                let item = &mut items[idx];
                item.result_mut(side).status = GenStatus::Running;
                on_event(StageEvent::Started(item));
            }
            TaskEvent::Finished((idx, side), result) => {
                let item = &mut items[idx];
                if let Some(error) = &result.error {
                    warn!(id = item.id, %side, %error, "generation failed");
                } else {
                    debug!(id = item.id, %side, elapsed_ms = ?result.elapsed_ms, "generation complete");
                }
                *item.result_mut(side) = result;
                settled += 1;
                on_event(StageEvent::Settled(
                    item,
                    Progress {
                        current: settled,
                        total,
                        phase: Phase::Generating,
                    },
                ));
            }
        })
        .await;

        // Anything still open lost its task; settle it as an error.
        for item in &mut items {
            for side in [Side::A, Side::B] {
                if !item.result(side).is_settled() {
                    *item.result_mut(side) =
                        GenerationResult::failure("generation task aborted before completion", None);
                    settled += 1;
                    on_event(StageEvent::Settled(
                        item,
                        Progress {
                            current: settled,
                            total,
                            phase: Phase::Generating,
                        },
                    ));
                }
            }
        }

        let failed = items
            .iter()
            .flat_map(|i| [&i.result_a, &i.result_b])
            .filter(|r| r.status == GenStatus::Error)
            .count();
        info!(calls = total, failed, "generation finished");

        items
    }

    fn generate_one(
        &self,
        request: GatewayRequest,
    ) -> impl std::future::Future<Output = GenerationResult> + Send + use<> {
        let gateway = Arc::clone(&self.gateway);
        let timeout = self.call_timeout;
        async move {
            let start = Instant::now();
            match call_with_timeout(gateway.as_ref(), request, timeout).await {
                Ok(content) => GenerationResult::success(content, elapsed_ms(start)),
                Err(e) => GenerationResult::failure(e.to_string(), Some(elapsed_ms(start))),
            }
        }
    }
}
