//! Derive an evaluation configuration from the two skill documents.
//!
//! Generation never fails outright: any problem past the input checks yields
//! the built-in fallback configuration with `generation_error` set. A failed
//! partial regeneration hands back the existing configuration instead.

use crate::criteria::{Criterion, EvalFile, OutputType, Skill};
use crate::error::{Result, SkillEvalError};
use crate::llm::{GatewayRequest, ModelGateway, Prompts};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Default number of prompts requested.
pub const DEFAULT_PROMPT_COUNT: usize = 50;

/// Which parts of the configuration to (re)generate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GenerationScope {
    #[default]
    All,
    Criteria,
    Prompts,
    OutputType,
}

impl fmt::Display for GenerationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Criteria => write!(f, "criteria"),
            Self::Prompts => write!(f, "prompts"),
            Self::OutputType => write!(f, "output-type"),
        }
    }
}

impl FromStr for GenerationScope {
    type Err = SkillEvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "criteria" => Ok(Self::Criteria),
            "prompts" => Ok(Self::Prompts),
            "output-type" | "output_type" | "outputtype" => Ok(Self::OutputType),
            other => Err(SkillEvalError::InvalidConfig(format!(
                "Unknown generation scope: {}",
                other
            ))),
        }
    }
}

/// A generated (or fallback) evaluation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedConfig {
    pub output_type: OutputType,
    #[serde(default)]
    pub output_type_reasoning: String,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
}

impl GeneratedConfig {
    /// Three generic criteria, text output, no prompts.
    pub fn fallback() -> Self {
        let rubric = |c: Criterion, levels: [&str; 5]| {
            levels
                .iter()
                .enumerate()
                .fold(c, |c, (i, anchor)| c.with_level(5 - i as u8, *anchor))
        };

        Self {
            output_type: OutputType::Text,
            output_type_reasoning: "Default fallback - unable to determine from skills".to_string(),
            criteria: vec![
                rubric(
                    Criterion::new("correctness", "Correctness", "Does the output correctly fulfill the request?"),
                    [
                        "Perfectly correct with no errors",
                        "Mostly correct with minor issues",
                        "Partially correct",
                        "Significant errors present",
                        "Fundamentally incorrect",
                    ],
                ),
                rubric(
                    Criterion::new("quality", "Quality", "Overall quality of the output"),
                    [
                        "Exceptional quality",
                        "Good quality",
                        "Acceptable quality",
                        "Below average quality",
                        "Poor quality",
                    ],
                ),
                rubric(
                    Criterion::new("completeness", "Completeness", "How complete and thorough is the output?"),
                    [
                        "Thoroughly complete with extras",
                        "Complete",
                        "Mostly complete",
                        "Incomplete",
                        "Severely incomplete",
                    ],
                ),
            ],
            prompts: Vec::new(),
            generation_error: None,
        }
    }

    /// Structural problems worth reporting. None of them are fatal.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        for (i, criterion) in self.criteria.iter().enumerate() {
            if criterion.id.trim().is_empty()
                || criterion.name.trim().is_empty()
                || criterion.description.trim().is_empty()
            {
                problems.push(format!("criterion {} missing required fields", i));
            }
            if criterion.rubric.len() != 5 {
                problems.push(format!("criterion {} rubric should have 5 levels", i));
            }
        }
        for (i, prompt) in self.prompts.iter().enumerate() {
            if prompt.trim().is_empty() {
                problems.push(format!("prompt {} must be a non-empty string", i));
            }
        }
        problems
    }

    /// Keep `existing` except for the parts `scope` regenerated.
    fn merged_into(self, existing: &GeneratedConfig, scope: GenerationScope) -> Self {
        Self {
            output_type: if scope == GenerationScope::OutputType {
                self.output_type
            } else {
                existing.output_type
            },
            output_type_reasoning: if self.output_type_reasoning.is_empty() {
                existing.output_type_reasoning.clone()
            } else {
                self.output_type_reasoning
            },
            criteria: if scope == GenerationScope::Criteria && !self.criteria.is_empty() {
                self.criteria
            } else {
                existing.criteria.clone()
            },
            prompts: if scope == GenerationScope::Prompts && !self.prompts.is_empty() {
                self.prompts
            } else {
                existing.prompts.clone()
            },
            generation_error: None,
        }
    }

    /// On-disk evaluation file referencing the two skill documents.
    pub fn into_eval_file(self, skill_a: PathBuf, skill_b: PathBuf) -> EvalFile {
        EvalFile {
            skill_a,
            skill_b,
            output_type: self.output_type,
            criteria: self.criteria,
            prompts: self.prompts,
            base_system_prompt: None,
        }
    }
}

/// Model reply before validation; every field may be missing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    output_type: Option<String>,
    #[serde(default)]
    output_type_reasoning: Option<String>,
    #[serde(default)]
    criteria: Vec<Criterion>,
    #[serde(default)]
    prompts: Vec<String>,
}

/// Asks the model for criteria, prompts, and output type.
pub struct ConfigGenerator {
    gateway: Arc<dyn ModelGateway>,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl ConfigGenerator {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            gateway,
            api_key: api_key.into(),
            model: model.into(),
            max_tokens,
            timeout,
        }
    }

    /// Generate a configuration for `scope`.
    ///
    /// Partial scopes merge into `existing` (or the fallback when absent);
    /// an empty regenerated part leaves the existing one in place.
    /// Only missing skill content is an error.
    pub async fn generate(
        &self,
        skill_a: &Skill,
        skill_b: &Skill,
        scope: GenerationScope,
        prompt_count: usize,
        existing: Option<&GeneratedConfig>,
    ) -> Result<GeneratedConfig> {
        if skill_a.content.trim().is_empty() || skill_b.content.trim().is_empty() {
            return Err(SkillEvalError::InvalidConfig(
                "Both skill files are required".to_string(),
            ));
        }

        info!(%scope, prompt_count, model = %self.model, "generating evaluation config");
        match self.request(skill_a, skill_b, scope, prompt_count, existing).await {
            Ok(generated) => {
                for problem in generated.problems() {
                    warn!(%problem, "generated config has a problem");
                }
                Ok(match existing {
                    Some(existing) if scope != GenerationScope::All => generated.merged_into(existing, scope),
                    None if scope != GenerationScope::All => {
                        generated.merged_into(&GeneratedConfig::fallback(), scope)
                    }
                    _ => generated,
                })
            }
            Err(e) => {
                let base = match existing {
                    Some(existing) if scope != GenerationScope::All => {
                        warn!(error = %e, "config generation failed, keeping existing config");
                        existing.clone()
                    }
                    _ => {
                        warn!(error = %e, "config generation failed, using fallback");
                        GeneratedConfig::fallback()
                    }
                };
                Ok(GeneratedConfig {
                    generation_error: Some(e.to_string()),
                    ..base
                })
            }
        }
    }

    async fn request(
        &self,
        skill_a: &Skill,
        skill_b: &Skill,
        scope: GenerationScope,
        prompt_count: usize,
        existing: Option<&GeneratedConfig>,
    ) -> Result<GeneratedConfig> {
        let keep = existing.map(|c| c.output_type).unwrap_or_default();
        let task = match scope {
            GenerationScope::All => format!(
                "Generate a complete configuration with:\n\
                 - Output type (text/visual/both)\n\
                 - 4-6 evaluation criteria with rubrics\n\
                 - {} test prompts\n{}",
                prompt_count,
                Prompts::config_example()
            ),
            GenerationScope::Criteria => format!(
                "Generate only the evaluation criteria (4-6 criteria with rubrics).\n\
                 Keep outputType as: {}\nDo not generate prompts, use empty array.",
                keep
            ),
            GenerationScope::Prompts => format!(
                "Generate only {} test prompts.\n\
                 Keep outputType as: {}\nDo not generate criteria, use empty array.",
                prompt_count, keep
            ),
            GenerationScope::OutputType => "Determine only the appropriate output type (text/visual/both).\n\
                 Do not generate criteria or prompts, use empty arrays."
                .to_string(),
        };

        let message = Prompts::config_request(
            (&skill_a.name, &skill_a.content),
            (&skill_b.name, &skill_b.content),
            &task,
        );
        let request = GatewayRequest::new(&self.api_key, &self.model, message, self.max_tokens)
            .with_system(Prompts::config_generator())
            .json();

        let reply = tokio::time::timeout(self.timeout, self.gateway.call(request))
            .await
            .map_err(|_| SkillEvalError::Timeout(self.timeout))??;

        let raw: RawConfig = serde_json::from_str(&reply).map_err(|e| {
            SkillEvalError::LlmParse(format!("Failed to parse generated configuration: {}", e))
        })?;

        let output_type = match raw.output_type.as_deref().map(OutputType::from_str) {
            Some(Ok(output_type)) => output_type,
            Some(Err(e)) => {
                warn!(error = %e, "generated config has an invalid output type");
                OutputType::default()
            }
            None => OutputType::default(),
        };

        Ok(GeneratedConfig {
            output_type,
            output_type_reasoning: raw.output_type_reasoning.unwrap_or_default(),
            criteria: raw.criteria,
            prompts: raw.prompts,
            generation_error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String>,
        last: Mutex<Option<GatewayRequest>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                last: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl ModelGateway for Scripted {
        async fn call(&self, request: GatewayRequest) -> Result<String> {
            *self.last.lock().unwrap() = Some(request);
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(SkillEvalError::LlmApi(e.to_string())),
            }
        }
    }

    fn generator(gateway: Arc<Scripted>) -> ConfigGenerator {
        ConfigGenerator::new(gateway, "key", "gen", 8192, Duration::from_secs(5))
    }

    fn skills() -> (Skill, Skill) {
        (Skill::new("a.md", "Design UIs"), Skill::new("b.md", "Design UIs better"))
    }

    const FULL: &str = r#"{
        "outputType": "visual",
        "outputTypeReasoning": "HTML output",
        "criteria": [{"id": "polish", "name": "Polish", "description": "Looks good",
                      "rubric": {"1": "a", "2": "b", "3": "c", "4": "d", "5": "e"}}],
        "prompts": ["Build a navbar", "Build a footer"]
    }"#;

    #[test]
    fn test_fallback_shape() {
        let fallback = GeneratedConfig::fallback();
        assert_eq!(fallback.output_type, OutputType::Text);
        let ids: Vec<&str> = fallback.criteria.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["correctness", "quality", "completeness"]);
        assert!(fallback.criteria.iter().all(|c| c.rubric.len() == 5));
        assert_eq!(fallback.criteria[0].anchor(5), Some("Perfectly correct with no errors"));
        assert_eq!(fallback.criteria[0].anchor(1), Some("Fundamentally incorrect"));
        assert!(fallback.prompts.is_empty());
        assert!(fallback.problems().is_empty());
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("output-type".parse::<GenerationScope>().unwrap(), GenerationScope::OutputType);
        assert_eq!("Prompts".parse::<GenerationScope>().unwrap(), GenerationScope::Prompts);
        assert!("everything".parse::<GenerationScope>().is_err());
    }

    #[tokio::test]
    async fn test_full_generation() {
        let gateway = Scripted::ok(FULL);
        let (a, b) = skills();
        let config = generator(gateway.clone())
            .generate(&a, &b, GenerationScope::All, 2, None)
            .await
            .unwrap();

        assert_eq!(config.output_type, OutputType::Visual);
        assert_eq!(config.criteria.len(), 1);
        assert_eq!(config.prompts, vec!["Build a navbar", "Build a footer"]);
        assert!(config.generation_error.is_none());

        let request = gateway.last.lock().unwrap().clone().unwrap();
        assert!(request.json_mode);
        assert_eq!(request.model, "gen");
        match request.content {
            crate::llm::MessageContent::Text(text) => {
                assert!(text.contains("## Skill A: a.md"));
                assert!(text.contains("2 test prompts"));
                assert!(text.contains("Example Output"));
            }
            crate::llm::MessageContent::Blocks(_) => panic!("expected a text message"),
        }
    }

    #[tokio::test]
    async fn test_partial_scope_keeps_existing() {
        let existing = GeneratedConfig {
            prompts: vec!["keep me".to_string()],
            ..GeneratedConfig::fallback()
        };
        let (a, b) = skills();
        let config = generator(Scripted::ok(FULL))
            .generate(&a, &b, GenerationScope::Criteria, 10, Some(&existing))
            .await
            .unwrap();

        assert_eq!(config.output_type, OutputType::Text);
        assert_eq!(config.criteria[0].id, "polish");
        assert_eq!(config.prompts, vec!["keep me"]);
        assert_eq!(config.output_type_reasoning, "HTML output");
    }

    #[tokio::test]
    async fn test_unparseable_reply_falls_back() {
        let (a, b) = skills();
        let config = generator(Scripted::ok("I cannot help with that"))
            .generate(&a, &b, GenerationScope::All, 5, None)
            .await
            .unwrap();
        assert_eq!(config.criteria, GeneratedConfig::fallback().criteria);
        assert!(config.generation_error.unwrap().contains("Failed to parse"));
    }

    #[tokio::test]
    async fn test_api_error_falls_back() {
        let gateway = Arc::new(Scripted {
            reply: Err(SkillEvalError::LlmApi("rate limited".into())),
            last: Mutex::new(None),
        });
        let (a, b) = skills();
        let config = generator(gateway)
            .generate(&a, &b, GenerationScope::All, 5, None)
            .await
            .unwrap();
        assert!(config.generation_error.unwrap().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_failed_partial_scope_keeps_existing() {
        let gateway = Arc::new(Scripted {
            reply: Err(SkillEvalError::Http("connection refused".into())),
            last: Mutex::new(None),
        });
        let existing = GeneratedConfig {
            output_type: OutputType::Visual,
            output_type_reasoning: String::new(),
            criteria: vec![Criterion::new("mine", "Mine", "My own criterion")],
            prompts: vec!["user prompt 1".to_string(), "user prompt 2".to_string()],
            generation_error: None,
        };
        let (a, b) = skills();
        let config = generator(gateway)
            .generate(&a, &b, GenerationScope::Prompts, 5, Some(&existing))
            .await
            .unwrap();

        assert_eq!(config.prompts, vec!["user prompt 1", "user prompt 2"]);
        assert_eq!(config.criteria[0].id, "mine");
        assert_eq!(config.output_type, OutputType::Visual);
        assert!(config.generation_error.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_empty_partial_reply_keeps_existing() {
        let existing = GeneratedConfig {
            prompts: vec!["keep me".to_string()],
            ..GeneratedConfig::fallback()
        };
        let (a, b) = skills();
        let config = generator(Scripted::ok(r#"{"outputType": "text", "criteria": [], "prompts": []}"#))
            .generate(&a, &b, GenerationScope::Prompts, 5, Some(&existing))
            .await
            .unwrap();
        assert_eq!(config.prompts, vec!["keep me"]);
        assert!(config.generation_error.is_none());
    }

    #[tokio::test]
    async fn test_empty_skill_is_error() {
        let (a, _) = skills();
        let empty = Skill::new("b.md", "   ");
        let result = generator(Scripted::ok(FULL))
            .generate(&a, &empty, GenerationScope::All, 5, None)
            .await;
        assert!(matches!(result, Err(SkillEvalError::InvalidConfig(_))));
    }

    #[test]
    fn test_into_eval_file() {
        let file = GeneratedConfig::fallback().into_eval_file("a.md".into(), "b.md".into());
        assert_eq!(file.skill_a, PathBuf::from("a.md"));
        assert_eq!(file.criteria.len(), 3);
        let yaml = serde_yaml::to_string(&file).unwrap();
        assert!(yaml.contains("output_type: text"));
    }
}
