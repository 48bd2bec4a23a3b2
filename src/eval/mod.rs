//! A/B evaluation pipeline.
//!
//! This module provides:
//! - Data model for evaluation items and run state
//! - Generation stage: every prompt against both skills, bounded fan-out
//! - Judging stage: LLM-as-judge scoring of completed pairs
//! - Run controller owning the canonical state across both stages
//! - Aggregate statistics and export

pub mod controller;
pub mod export;
pub mod generate;
pub mod judge;
mod pool;
pub mod stats;
pub mod types;

pub use controller::RunController;
pub use export::{export_csv, export_json, ExportFormat};
pub use generate::{GenerationRequest, GenerationStage};
pub use judge::{judge_message, parse_judge_response, JudgeRequest, JudgingStage, SkillNames};
pub use stats::{CriterionAverage, RunStats};
pub use types::{
    CriterionScore, EvaluationItem, GenStatus, GenerationResult, JudgeResult, JudgeStatus,
    ParsedScore, Phase, Progress, RunState, Side, Winner,
};

/// Per-item notification from a running stage.
#[derive(Debug, Clone, Copy)]
pub enum StageEvent<'a> {
    /// A call for this item acquired a slot and is now running.
    Started(&'a EvaluationItem),
    /// A call for this item settled; progress counts settled calls.
    Settled(&'a EvaluationItem, Progress),
}
