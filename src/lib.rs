//! Skill Eval - head-to-head evaluation of two LLM skill documents.
//!
//! A skill is a system prompt. Given two skills, a set of test prompts and a
//! rubric, this library runs every prompt through both skills, asks a judge
//! model to score each pair, and aggregates the verdicts.
//!
//! # Overview
//!
//! A run has two stages that share one state:
//! 1. Generation calls the model once per prompt per skill
//! 2. Judging scores every pair whose two outputs both completed, optionally
//!    with screenshots of rendered HTML
//!
//! Per-call failures stay on their item. Judging is idempotent: re-running it
//! only touches pairs that have not been judged yet.
//!
//! # Quick Start
//!
//! ```no_run
//! use skill_eval::{
//!     config::{Config, RunSettings},
//!     criteria::EvalConfig,
//!     eval::RunController,
//!     llm::LlmClient,
//!     persistence::RunStore,
//!     render::NoRenderer,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     let eval = EvalConfig::load(Path::new("eval.yaml"))?;
//!     let controller = RunController::new(
//!         Arc::new(LlmClient::new(config.llm.api_base.clone())),
//!         Arc::new(NoRenderer),
//!         RunSettings::from_config(&config),
//!     )
//!     .with_store(RunStore::new(&config.run.state_path));
//!
//!     controller.run_generations(&eval, |p| println!("{}/{}", p.current, p.total)).await?;
//!     let stats = controller.run_judgments(&eval, |_| {}).await?;
//!     println!("A wins: {}, B wins: {}", stats.a_wins, stats.b_wins);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **LlmClient**: Anthropic Messages API client behind the `ModelGateway` trait
//! - **ScreenshotClient**: screenshot server client behind the `Renderer` trait
//! - **GenerationStage** / **JudgingStage**: bounded fan-out over items
//! - **RunController**: owns the run state, guards stale completions, persists
//! - **ConfigGenerator**: drafts criteria and prompts from the two skills

pub mod autoconfig;
pub mod config;
pub mod criteria;
pub mod error;
pub mod eval;
pub mod llm;
pub mod logging;
pub mod persistence;
pub mod render;

// Re-export commonly used types
pub use autoconfig::{ConfigGenerator, GeneratedConfig, GenerationScope};
pub use config::{Config, RunSettings};
pub use criteria::{Criterion, EvalConfig, OutputType, Skill};
pub use error::{Result, SkillEvalError};
pub use eval::{EvaluationItem, Phase, Progress, RunController, RunState, RunStats, Winner};
pub use llm::{LlmClient, ModelGateway};
pub use persistence::{load_state, save_state, RunStore};
pub use render::{NoRenderer, Renderer, ScreenshotClient};
