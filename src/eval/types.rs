//! Evaluation items and run state.
//!
//! Everything here is plain data: it serializes to the persisted run file
//! (JSON or bincode) and is cloned freely between the controller and stages.

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which skill a generation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub enum Side {
    A,
    B,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

/// Lifecycle of one generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum GenStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Error,
}

/// Lifecycle of one judge call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum JudgeStatus {
    #[default]
    Pending,
    Running,
    Complete,
    Error,
}

/// Output of one skill for one prompt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct GenerationResult {
    pub content: String,
    pub error: Option<String>,
    pub elapsed_ms: Option<u64>,
    pub status: GenStatus,
}

impl GenerationResult {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn success(content: impl Into<String>, elapsed_ms: u64) -> Self {
        Self {
            content: content.into(),
            error: None,
            elapsed_ms: Some(elapsed_ms),
            status: GenStatus::Complete,
        }
    }

    /// A failed call. Content is always empty.
    pub fn failure(error: impl Into<String>, elapsed_ms: Option<u64>) -> Self {
        let error = error.into();
        Self {
            content: String::new(),
            error: Some(if error.is_empty() { "unknown error".to_string() } else { error }),
            elapsed_ms,
            status: GenStatus::Error,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == GenStatus::Complete
    }

    pub fn is_settled(&self) -> bool {
        matches!(self.status, GenStatus::Complete | GenStatus::Error)
    }
}

/// The judge's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub enum Winner {
    A,
    B,
    #[serde(rename = "tie")]
    Tie,
}

impl Winner {
    /// Lenient parse of a judge's winner field.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "A" => Some(Winner::A),
            "B" => Some(Winner::B),
            "TIE" | "DRAW" => Some(Winner::Tie),
            _ => None,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::A => write!(f, "A"),
            Winner::B => write!(f, "B"),
            Winner::Tie => write!(f, "tie"),
        }
    }
}

/// Per-criterion pair of scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct CriterionScore {
    #[serde(rename = "A")]
    pub a: f64,
    #[serde(rename = "B")]
    pub b: f64,
}

/// Structured scores recovered from a judge reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct ParsedScore {
    pub winner: Option<Winner>,
    pub score_a: Option<f64>,
    pub score_b: Option<f64>,
    pub breakdown: Option<BTreeMap<String, CriterionScore>>,
}

impl ParsedScore {
    /// Only a winner is known.
    pub fn winner_only(winner: Winner) -> Self {
        Self {
            winner: Some(winner),
            ..Default::default()
        }
    }
}

/// Outcome of judging one pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct JudgeResult {
    pub status: JudgeStatus,
    /// Judge reply, or the error text when the call failed.
    pub raw_text: String,
    pub scores: Option<ParsedScore>,
    pub elapsed_ms: Option<u64>,
}

impl JudgeResult {
    pub fn complete(raw_text: String, scores: Option<ParsedScore>, elapsed_ms: u64) -> Self {
        Self {
            status: JudgeStatus::Complete,
            raw_text,
            scores,
            elapsed_ms: Some(elapsed_ms),
        }
    }

    pub fn failed(error: impl fmt::Display, elapsed_ms: Option<u64>) -> Self {
        Self {
            status: JudgeStatus::Error,
            raw_text: format!("Error: {}", error),
            scores: None,
            elapsed_ms,
        }
    }

    pub fn winner(&self) -> Option<Winner> {
        self.scores.as_ref().and_then(|s| s.winner)
    }
}

/// One prompt run against both skills, plus its judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct EvaluationItem {
    /// 1-indexed, contiguous within a batch.
    pub id: u32,
    pub prompt: String,
    pub result_a: GenerationResult,
    pub result_b: GenerationResult,
    pub screenshot_a: Option<String>,
    pub screenshot_b: Option<String>,
    pub judge: JudgeResult,
}

impl EvaluationItem {
    pub fn new(id: u32, prompt: impl Into<String>) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            result_a: GenerationResult::pending(),
            result_b: GenerationResult::pending(),
            screenshot_a: None,
            screenshot_b: None,
            judge: JudgeResult::default(),
        }
    }

    /// Fresh pending items for a batch of prompts, in prompt order.
    pub fn batch(prompts: &[String]) -> Vec<Self> {
        prompts
            .iter()
            .enumerate()
            .map(|(idx, prompt)| Self::new(idx as u32 + 1, prompt.clone()))
            .collect()
    }

    pub fn result(&self, side: Side) -> &GenerationResult {
        match side {
            Side::A => &self.result_a,
            Side::B => &self.result_b,
        }
    }

    pub fn result_mut(&mut self, side: Side) -> &mut GenerationResult {
        match side {
            Side::A => &mut self.result_a,
            Side::B => &mut self.result_b,
        }
    }

    /// Both skills produced output.
    pub fn is_generated(&self) -> bool {
        self.result_a.is_complete() && self.result_b.is_complete()
    }

    pub fn is_judged(&self) -> bool {
        self.judge.status == JudgeStatus::Complete
    }

    /// Eligible for the judging stage.
    pub fn is_judgeable(&self) -> bool {
        self.is_generated() && !self.is_judged()
    }
}

/// Phase of the run state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Generating,
    Judging,
    Complete,
}

impl Phase {
    pub fn is_running(self) -> bool {
        matches!(self, Phase::Generating | Phase::Judging)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Generating => write!(f, "generating"),
            Phase::Judging => write!(f, "judging"),
            Phase::Complete => write!(f, "complete"),
        }
    }
}

/// Progress counter for the stage in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub phase: Phase,
}

/// Canonical state of the active evaluation, owned by the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct RunState {
    /// Bumped on every fresh generation run and on clear.
    pub run_id: u64,
    pub evaluations: Vec<EvaluationItem>,
    pub phase: Phase,
    pub progress: Progress,
    pub error: Option<String>,
    /// Unix milliseconds.
    pub started_at: Option<i64>,
    pub ended_at: Option<i64>,
}

impl RunState {
    /// Replace items by id with updated copies.
    pub fn merge(&mut self, updated: &[EvaluationItem]) {
        for item in updated {
            self.merge_one(item);
        }
    }

    pub fn merge_one(&mut self, updated: &EvaluationItem) {
        if let Some(slot) = self.evaluations.iter_mut().find(|e| e.id == updated.id) {
            *slot = updated.clone();
        }
    }

    /// Bring a state persisted mid-run back to a resumable shape.
    ///
    /// Returns true when anything was changed.
    pub fn recover_interrupted(&mut self) -> bool {
        let interrupted = self.phase.is_running();
        let mut changed = interrupted;
        if interrupted {
            self.phase = Phase::Idle;
        }
        for item in &mut self.evaluations {
            for side in [Side::A, Side::B] {
                let result = item.result_mut(side);
                if interrupted && matches!(result.status, GenStatus::Pending | GenStatus::Running) {
                    *result = GenerationResult::failure("interrupted before completion", None);
                }
            }
            if item.judge.status == JudgeStatus::Running {
                item.judge = JudgeResult::default();
                changed = true;
            }
        }
        changed
    }
}
