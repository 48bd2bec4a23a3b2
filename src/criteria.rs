//! Evaluation configuration: the two skills, rubric criteria and prompts.

use crate::error::{Result, SkillEvalError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Whether evaluated outputs are judged as text, as rendered visuals, or both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    #[default]
    Text,
    Visual,
    Both,
}

impl OutputType {
    /// Screenshots are captured for visual and mixed outputs.
    pub fn needs_screenshots(self) -> bool {
        matches!(self, Self::Visual | Self::Both)
    }

    /// Source text is shown to the judge for text and mixed outputs.
    pub fn includes_source(self) -> bool {
        matches!(self, Self::Text | Self::Both)
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Visual => write!(f, "visual"),
            Self::Both => write!(f, "both"),
        }
    }
}

impl FromStr for OutputType {
    type Err = SkillEvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "visual" => Ok(Self::Visual),
            "both" => Ok(Self::Both),
            other => Err(SkillEvalError::InvalidConfig(format!(
                "Invalid output type: {}",
                other
            ))),
        }
    }
}

/// A named, rubric-scored dimension of quality (1-5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Slug-like identifier, used as the breakdown key.
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Level ("1".."5") to anchor text.
    #[serde(default)]
    pub rubric: BTreeMap<String, String>,
}

impl Criterion {
    pub fn new(id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            rubric: BTreeMap::new(),
        }
    }

    pub fn with_level(mut self, level: u8, anchor: impl Into<String>) -> Self {
        self.rubric.insert(level.to_string(), anchor.into());
        self
    }

    /// Anchor text for one rubric level, if present.
    pub fn anchor(&self, level: u8) -> Option<&str> {
        self.rubric.get(&level.to_string()).map(String::as_str)
    }

    /// Soft problems with this criterion.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.id.trim().is_empty() || self.name.trim().is_empty() {
            warnings.push(format!("criterion '{}' is missing an id or name", self.name));
        }
        if self.rubric.len() != 5 {
            warnings.push(format!(
                "criterion '{}' rubric has {} levels, expected 5",
                self.id,
                self.rubric.len()
            ));
        }
        warnings
    }
}

/// A skill document: the system prompt under test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    /// Display name (usually the file name).
    pub name: String,
    pub content: String,
}

impl Skill {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Read a skill document from disk, naming it after the file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SkillEvalError::io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, content })
    }

    /// The system prompt for generation, optionally prefixed by a base prompt.
    pub fn system_prompt(&self, base: Option<&str>) -> String {
        match base.map(str::trim).filter(|b| !b.is_empty()) {
            Some(base) => format!("{}\n\n{}", base, self.content),
            None => self.content.clone(),
        }
    }
}

/// Everything a run needs besides credentials and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    pub skill_a: Skill,
    pub skill_b: Skill,
    #[serde(default)]
    pub output_type: OutputType,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub base_system_prompt: Option<String>,
}

/// On-disk evaluation file: skills are referenced by path.
#[derive(Debug, Serialize, Deserialize)]
pub struct EvalFile {
    pub skill_a: PathBuf,
    pub skill_b: PathBuf,
    #[serde(default)]
    pub output_type: OutputType,
    #[serde(default)]
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_system_prompt: Option<String>,
}

impl EvalConfig {
    /// Load an evaluation file, resolving skill paths relative to it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SkillEvalError::io(path, e))?;
        let file: EvalFile = serde_yaml::from_str(&content).map_err(|e| {
            SkillEvalError::Config(format!("Failed to parse evaluation file: {}", e))
        })?;

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let resolve = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { base.join(p) };

        Ok(Self {
            skill_a: Skill::from_file(&resolve(&file.skill_a))?,
            skill_b: Skill::from_file(&resolve(&file.skill_b))?,
            output_type: file.output_type,
            criteria: file.criteria,
            prompts: file.prompts,
            base_system_prompt: file.base_system_prompt,
        })
    }

    /// Hard requirements for generating outputs.
    pub fn check_generation(&self) -> Result<()> {
        if self.skill_a.content.trim().is_empty() || self.skill_b.content.trim().is_empty() {
            return Err(SkillEvalError::InvalidConfig(
                "Both skill documents must be non-empty".to_string(),
            ));
        }
        if self.prompts.is_empty() {
            return Err(SkillEvalError::InvalidConfig(
                "At least one prompt is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Hard requirements for judging.
    pub fn check_judging(&self) -> Result<()> {
        if self.criteria.is_empty() {
            return Err(SkillEvalError::InvalidConfig(
                "At least one criterion is required to judge".to_string(),
            ));
        }
        Ok(())
    }

    /// Soft problems worth reporting but not fatal.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings: Vec<String> = self.criteria.iter().flat_map(Criterion::warnings).collect();

        let mut seen = HashSet::new();
        for criterion in &self.criteria {
            if !seen.insert(criterion.id.as_str()) {
                warnings.push(format!("duplicate criterion id '{}'", criterion.id));
            }
        }

        for (i, prompt) in self.prompts.iter().enumerate() {
            if prompt.trim().is_empty() {
                warnings.push(format!("prompt {} is blank", i + 1));
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn full_criterion(id: &str) -> Criterion {
        (1..=5).fold(Criterion::new(id, id.to_uppercase(), "desc"), |c, level| {
            c.with_level(level, format!("level {level}"))
        })
    }

    #[test]
    fn test_output_type_flags() {
        assert!(!OutputType::Text.needs_screenshots());
        assert!(OutputType::Text.includes_source());
        assert!(OutputType::Visual.needs_screenshots());
        assert!(!OutputType::Visual.includes_source());
        assert!(OutputType::Both.needs_screenshots());
        assert!(OutputType::Both.includes_source());
        assert_eq!("Visual".parse::<OutputType>().unwrap(), OutputType::Visual);
        assert!("video".parse::<OutputType>().is_err());
    }

    #[test]
    fn test_rubric_level_warning() {
        assert!(full_criterion("ok").warnings().is_empty());
        let short = Criterion::new("short", "Short", "").with_level(5, "great");
        let warnings = short.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("1 levels"));
    }

    #[test]
    fn test_system_prompt_prefix() {
        let skill = Skill::new("a.md", "Be terse.");
        assert_eq!(skill.system_prompt(None), "Be terse.");
        assert_eq!(skill.system_prompt(Some("  ")), "Be terse.");
        assert_eq!(skill.system_prompt(Some("Base")), "Base\n\nBe terse.");
    }

    #[test]
    fn test_config_checks_and_warnings() {
        let mut config = EvalConfig {
            skill_a: Skill::new("a.md", "A"),
            skill_b: Skill::new("b.md", "B"),
            output_type: OutputType::Text,
            criteria: vec![full_criterion("x"), full_criterion("x")],
            prompts: vec!["one".into(), " ".into()],
            base_system_prompt: None,
        };
        assert!(config.check_generation().is_ok());
        assert!(config.check_judging().is_ok());

        let warnings = config.warnings();
        assert!(warnings.iter().any(|w| w.contains("duplicate criterion id 'x'")));
        assert!(warnings.iter().any(|w| w.contains("prompt 2 is blank")));

        config.prompts.clear();
        assert!(config.check_generation().is_err());
        config.criteria.clear();
        assert!(config.check_judging().is_err());
    }

    #[test]
    fn test_load_resolves_relative_skills() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("alpha.md"), "Skill alpha").unwrap();
        std::fs::write(dir.path().join("beta.md"), "Skill beta").unwrap();
        let eval_path = dir.path().join("eval.yaml");
        std::fs::write(
            &eval_path,
            r#"
skill_a: alpha.md
skill_b: beta.md
output_type: both
criteria:
  - id: clarity
    name: Clarity
    description: Is it clear?
    rubric:
      "5": Crystal clear
      "3": Mostly clear
      "1": Confusing
prompts:
  - Explain monads
"#,
        )
        .unwrap();

        let config = EvalConfig::load(&eval_path).unwrap();
        assert_eq!(config.skill_a.name, "alpha.md");
        assert_eq!(config.skill_b.content, "Skill beta");
        assert_eq!(config.output_type, OutputType::Both);
        assert_eq!(config.criteria[0].anchor(3), Some("Mostly clear"));
        assert_eq!(config.prompts, vec!["Explain monads".to_string()]);
    }

    #[test]
    fn test_load_missing_skill_is_io_error() {
        let dir = TempDir::new().unwrap();
        let eval_path = dir.path().join("eval.yaml");
        std::fs::write(&eval_path, "skill_a: nope.md\nskill_b: nope2.md\n").unwrap();
        assert!(matches!(
            EvalConfig::load(&eval_path),
            Err(SkillEvalError::Io { .. })
        ));
    }
}
