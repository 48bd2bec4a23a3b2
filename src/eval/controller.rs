//! Run controller: owns the canonical run state across both stages.
//!
//! Stages work on their own copies and report per-item updates back here.
//! Every update carries the run id it started under; once `clear` or a newer
//! generation run has bumped the id, late updates are dropped.

use super::generate::{GenerationRequest, GenerationStage};
use super::judge::{JudgeRequest, JudgingStage, SkillNames};
use super::stats::RunStats;
use super::types::{EvaluationItem, GenStatus, Phase, Progress, RunState};
use super::StageEvent;
use crate::config::RunSettings;
use crate::criteria::EvalConfig;
use crate::error::{Result, SkillEvalError};
use crate::llm::ModelGateway;
use crate::persistence::RunStore;
use crate::render::Renderer;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

pub struct RunController {
    gateway: Arc<dyn ModelGateway>,
    renderer: Arc<dyn Renderer>,
    settings: RunSettings,
    store: Option<RunStore>,
    state: Mutex<RunState>,
}

impl RunController {
    /// Controller with in-memory state only.
    pub fn new(gateway: Arc<dyn ModelGateway>, renderer: Arc<dyn Renderer>, settings: RunSettings) -> Self {
        Self {
            gateway,
            renderer,
            settings,
            store: None,
            state: Mutex::new(RunState::default()),
        }
    }

    /// Attach a store, loading whatever it holds.
    ///
    /// A state saved mid-run is brought back to a resumable shape first. An
    /// unreadable state file is logged and replaced by an empty state on the
    /// next save.
    pub fn with_store(mut self, store: RunStore) -> Self {
        let loaded = store.load().unwrap_or_else(|e| {
            warn!(error = %e, path = %store.path().display(), "discarding unreadable run state");
            None
        });
        if let Some(mut state) = loaded {
            if state.recover_interrupted() {
                info!(path = %store.path().display(), "recovered interrupted run");
                if let Err(e) = store.save(&state) {
                    warn!(error = %e, "failed to persist recovered run state");
                }
            }
            debug!(items = state.evaluations.len(), phase = %state.phase, "loaded run state");
            self.state = Mutex::new(state);
        }
        self.store = Some(store);
        self
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> RunState {
        self.lock().clone()
    }

    pub fn stats(&self) -> RunStats {
        RunStats::from_items(&self.lock().evaluations)
    }

    pub fn can_judge(&self) -> bool {
        self.lock().evaluations.iter().any(EvaluationItem::is_judgeable)
    }

    /// Generate fresh outputs for every prompt, discarding any previous results.
    ///
    /// Per-call failures land on their items. The run itself only fails when
    /// no call at all succeeded; settled results are kept either way.
    pub async fn run_generations(
        &self,
        config: &EvalConfig,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<RunStats> {
        let run_id = {
            let mut state = self.lock();
            if state.phase.is_running() {
                return Err(SkillEvalError::RunInProgress(state.phase.to_string()));
            }
            if !self.settings.has_credentials() {
                return Err(self.reject(&mut state, SkillEvalError::MissingApiKey));
            }
            if let Err(e) = config.check_generation() {
                return Err(self.reject(&mut state, e));
            }

            state.run_id += 1;
            state.evaluations = EvaluationItem::batch(&config.prompts);
            state.phase = Phase::Generating;
            state.progress = Progress {
                current: 0,
                total: config.prompts.len() * 2,
                phase: Phase::Generating,
            };
            state.error = None;
            state.started_at = Some(now_ms());
            state.ended_at = None;
            self.persist(&state);
            state.run_id
        };
        info!(run_id, prompts = config.prompts.len(), "generation run started");

        let stage = GenerationStage::new(
            Arc::clone(&self.gateway),
            self.settings.max_concurrency,
            self.settings.call_timeout,
        );
        let request = GenerationRequest {
            api_key: &self.settings.api_key,
            skill_a: &config.skill_a,
            skill_b: &config.skill_b,
            prompts: &config.prompts,
            model: &self.settings.gen_model,
            max_tokens: self.settings.max_tokens,
            base_system_prompt: config.base_system_prompt.as_deref(),
        };
        let items = stage
            .run(&request, |event| self.commit(run_id, event, &mut on_progress))
            .await;

        let mut state = self.lock();
        if state.run_id != run_id {
            debug!(run_id, current = state.run_id, "generation finished after its run was replaced");
            return Err(SkillEvalError::RunFailed("run cleared before completion".to_string()));
        }
        state.merge(&items);
        state.phase = Phase::Idle;
        state.ended_at = Some(now_ms());

        let all_failed = items
            .iter()
            .all(|i| i.result_a.status == GenStatus::Error && i.result_b.status == GenStatus::Error);
        if all_failed {
            let message = format!("All {} generation calls failed", items.len() * 2);
            warn!(run_id, "{}", message);
            state.error = Some(message.clone());
            self.persist(&state);
            return Err(SkillEvalError::RunFailed(message));
        }

        self.persist(&state);
        let stats = RunStats::from_items(&state.evaluations);
        info!(run_id, generated = stats.generated_count, total = stats.total_evals, "generation run finished");
        Ok(stats)
    }

    /// Judge every item whose outputs are complete and not yet judged.
    pub async fn run_judgments(
        &self,
        config: &EvalConfig,
        mut on_progress: impl FnMut(Progress),
    ) -> Result<RunStats> {
        let (run_id, items) = {
            let mut state = self.lock();
            if state.phase.is_running() {
                return Err(SkillEvalError::RunInProgress(state.phase.to_string()));
            }
            if !self.settings.has_credentials() {
                return Err(self.reject(&mut state, SkillEvalError::MissingApiKey));
            }
            if let Err(e) = config.check_judging() {
                return Err(self.reject(&mut state, e));
            }
            let selected = state.evaluations.iter().filter(|i| i.is_judgeable()).count();
            if selected == 0 {
                return Err(self.reject(&mut state, SkillEvalError::NothingToJudge));
            }

            state.phase = Phase::Judging;
            state.progress = Progress {
                current: 0,
                total: selected,
                phase: Phase::Judging,
            };
            state.error = None;
            state.ended_at = None;
            self.persist(&state);
            (state.run_id, state.evaluations.clone())
        };
        info!(run_id, model = %self.settings.judge_model, "judging run started");

        let stage = JudgingStage::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.renderer),
            self.settings.max_concurrency,
            self.settings.call_timeout,
        );
        let names = SkillNames {
            a: config.skill_a.name.clone(),
            b: config.skill_b.name.clone(),
        };
        let request = JudgeRequest {
            api_key: &self.settings.api_key,
            criteria: &config.criteria,
            output_type: config.output_type,
            judge_model: &self.settings.judge_model,
            max_tokens: self.settings.judge_max_tokens,
            skill_names: &names,
        };
        let items = stage
            .run(&request, items, |event| self.commit(run_id, event, &mut on_progress))
            .await;

        let mut state = self.lock();
        if state.run_id != run_id {
            debug!(run_id, current = state.run_id, "judging finished after its run was replaced");
            return Err(SkillEvalError::RunFailed("run cleared before completion".to_string()));
        }
        state.merge(&items);
        state.phase = Phase::Complete;
        state.ended_at = Some(now_ms());
        self.persist(&state);

        let stats = RunStats::from_items(&state.evaluations);
        info!(
            run_id,
            judged = stats.judged_count,
            a_wins = stats.a_wins,
            b_wins = stats.b_wins,
            "judging run finished"
        );
        Ok(stats)
    }

    /// Wipe the run. Work still in flight can no longer commit.
    pub fn clear(&self) -> Result<()> {
        let mut state = self.lock();
        let run_id = state.run_id + 1;
        *state = RunState {
            run_id,
            ..Default::default()
        };
        if let Some(store) = &self.store {
            store.clear()?;
        }
        info!(run_id, "run state cleared");
        Ok(())
    }

    fn commit(&self, run_id: u64, event: StageEvent<'_>, on_progress: &mut impl FnMut(Progress)) {
        {
            let mut state = self.lock();
            if state.run_id != run_id {
                debug!(run_id, current = state.run_id, "dropping stale update");
                return;
            }
            match event {
                StageEvent::Started(item) => state.merge_one(item),
                StageEvent::Settled(item, progress) => {
                    state.merge_one(item);
                    state.progress = progress;
                }
            }
            self.persist(&state);
        }
        if let StageEvent::Settled(_, progress) = event {
            on_progress(progress);
        }
    }

    /// Record a pre-flight failure without leaving the current phase.
    fn reject(&self, state: &mut RunState, error: SkillEvalError) -> SkillEvalError {
        warn!(error = %error, "run rejected");
        state.error = Some(error.to_string());
        self.persist(state);
        error
    }

    fn persist(&self, state: &RunState) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(state) {
                warn!(error = %e, path = %store.path().display(), "failed to persist run state");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
