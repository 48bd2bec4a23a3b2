//! LLM prompts for judging and configuration generation.

use crate::criteria::{Criterion, OutputType};
use std::fmt::Write;

/// Collection of prompts used by the judge and the config generator.
pub struct Prompts;

impl Prompts {
    /// System prompt for the judge, built from the live criteria list.
    ///
    /// Deterministic in `(criteria, output_type)`. Only rubric anchors 5, 3
    /// and 1 are included to keep the prompt short.
    pub fn judge_system(criteria: &[Criterion], output_type: OutputType) -> String {
        let visual = output_type.needs_screenshots();
        let source = output_type.includes_source();

        let mut prompt = String::from(
            "You are an expert evaluator comparing two AI-generated outputs. You will receive:\n\
             1. The original user prompt that both were given\n",
        );

        let mut n = 2;
        if visual {
            let _ = writeln!(prompt, "{}. A SCREENSHOT of Result A showing the rendered output", n);
            let _ = writeln!(prompt, "{}. A SCREENSHOT of Result B showing the rendered output", n + 1);
            n += 2;
        }
        if source {
            let _ = writeln!(prompt, "{}. The source content of both results", n);
        }
        prompt.push('\n');

        if visual {
            prompt.push_str(
                "IMPORTANT: Base visual assessments primarily on the SCREENSHOTS. \
                 They show exactly how each output renders.\n\n",
            );
        }

        prompt.push_str("Rate each criterion from 1-5 and give a brief justification.\n\n");

        for (i, criterion) in criteria.iter().enumerate() {
            let _ = writeln!(prompt, "### {}. {} (1-5)", i + 1, criterion.name);
            if !criterion.description.is_empty() {
                let _ = writeln!(prompt, "{}", criterion.description);
            }
            for level in [5u8, 3, 1] {
                if let Some(anchor) = criterion.anchor(level) {
                    let _ = writeln!(prompt, "- {}: {}", level, anchor);
                }
            }
            prompt.push('\n');
        }

        let max_total = criteria.len() * 5;
        prompt.push_str(
            "## Required Output Format\n\n\
             ### First Impressions\n\
             **Result A**: [2-3 sentence impression]\n\
             **Result B**: [2-3 sentence impression]\n\n\
             ### Scores\n\n\
             | Criterion | Result A | Result B |\n\
             |-----------|----------|----------|\n",
        );
        for criterion in criteria {
            let _ = writeln!(prompt, "| {} | X/5 | X/5 |", criterion.name);
        }
        let _ = writeln!(prompt, "| **TOTAL** | XX/{max_total} | XX/{max_total} |");

        prompt.push_str(
            "\n### Winner\n\
             **[A or B]** - [Brief justification in 1-2 sentences]\n\n\
             ### JSON Summary\n\
             ```json\n\
             {\n  \"winner\": \"A\" or \"B\",\n  \"scoreA\": XX,\n  \"scoreB\": XX,\n  \"breakdown\": {\n",
        );
        let breakdown: Vec<String> = criteria
            .iter()
            .map(|c| format!("    \"{}\": {{\"A\": X, \"B\": X}}", c.id))
            .collect();
        prompt.push_str(&breakdown.join(",\n"));
        prompt.push_str("\n  }\n}\n```");

        prompt
    }

    /// Closing line of the judge message, matching the evidence provided.
    pub fn judge_closing(output_type: OutputType) -> &'static str {
        match (output_type.needs_screenshots(), output_type.includes_source()) {
            (true, true) => "\n\nPlease evaluate both outputs based on the screenshots and source content.",
            (true, false) => "\n\nPlease evaluate both outputs based on the screenshots above.",
            _ => "\n\nPlease evaluate both outputs based on the content above.",
        }
    }

    /// System prompt for deriving an evaluation config from two skills.
    pub fn config_generator() -> &'static str {
        r#"You are a configuration generator for an AI skill evaluation tool.

Given two skill files that will be compared against each other, analyze them and generate an evaluation configuration.

Work out:
1. What domain/task the skills are designed for
2. What kind of output the skills will produce
3. What criteria would fairly evaluate their outputs
4. What prompts would effectively test their capabilities

## Output Type

- "visual" if skills produce HTML/CSS, UI components, or other rendered artifacts
- "text" if skills produce code, prose, data, or other non-visual output
- "both" if outputs benefit from seeing the rendered result AND the source

## Criteria

Generate 4-6 criteria that are specific to what the skills claim to do, can be judged objectively, cover different aspects (correctness, quality, style, edge cases) and each carry a 1-5 rubric.

## Prompts

Generate the requested number of realistic user requests that exercise what the skills claim to do. Mix difficulty (roughly 20% easy, 60% medium, 20% hard) and include edge cases.

## Output Format

Respond with valid JSON in exactly this structure:
{
  "outputType": "text" | "visual" | "both",
  "outputTypeReasoning": "Brief explanation",
  "criteria": [
    {
      "id": "snake_case_id",
      "name": "Human Readable Name",
      "description": "What this criterion measures",
      "rubric": {"5": "...", "4": "...", "3": "...", "2": "...", "1": "..."}
    }
  ],
  "prompts": ["Prompt 1", "Prompt 2"]
}"#
    }

    /// User message for the config generator: both skills, then the task.
    pub fn config_request(
        skill_a: (&str, &str),
        skill_b: (&str, &str),
        task: &str,
    ) -> String {
        format!(
            "Please analyze these two skill files and generate evaluation configuration.\n\n\
             ## Skill A: {}\n```\n{}\n```\n\n\
             ## Skill B: {}\n```\n{}\n```\n\n{}",
            skill_a.0, skill_a.1, skill_b.0, skill_b.1, task
        )
    }

    /// Worked example appended to full-config requests.
    pub fn config_example() -> &'static str {
        r#"
## Example Output (for a frontend design skill)

This shows the expected format. Adapt criteria and prompts to the actual skill domain:
{
  "outputType": "visual",
  "outputTypeReasoning": "Skills produce HTML/CSS components that should be visually evaluated",
  "criteria": [
    {
      "id": "prompt_adherence",
      "name": "Prompt Adherence",
      "description": "How well does the output match what was requested?",
      "rubric": {
        "5": "Matches every requirement with thoughtful extras",
        "4": "Matches all explicit requirements",
        "3": "Matches most requirements, minor omissions",
        "2": "Partial match, significant gaps",
        "1": "Does not address the prompt"
      }
    },
    {
      "id": "code_quality",
      "name": "Code Quality",
      "description": "Clean, semantic HTML/CSS with sensible structure",
      "rubric": {
        "5": "Exemplary organization and semantics",
        "4": "Good code quality",
        "3": "Functional but messy",
        "2": "Poor organization",
        "1": "Broken or unmaintainable"
      }
    }
  ],
  "prompts": [
    "Build a responsive landing page for a SaaS product that tracks team OKRs",
    "Create a dark mode toggle with smooth transitions",
    "Design an accessible contact form with validation feedback"
  ]
}"#
    }
}
