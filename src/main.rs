//! Skill Eval CLI
//!
//! Compare two skill documents head to head with an LLM judge.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use skill_eval::{
    autoconfig::{ConfigGenerator, GenerationScope, DEFAULT_PROMPT_COUNT},
    config::{Config, RunSettings},
    criteria::{EvalConfig, Skill},
    eval::{ExportFormat, Progress, RunController, RunStats},
    llm::LlmClient,
    logging,
    persistence::RunStore,
    render::{NoRenderer, Renderer, ScreenshotClient},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Skill Eval - head-to-head evaluation of LLM skill documents
#[derive(Parser)]
#[command(name = "skill-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Csv,
}

impl From<Format> for ExportFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => ExportFormat::Json,
            Format::Csv => ExportFormat::Csv,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Generate outputs for every prompt from both skills
    Generate {
        /// Path to the evaluation file
        #[arg(default_value = "eval.yaml")]
        eval: PathBuf,
    },

    /// Judge every pair that has both outputs and no verdict yet
    Judge {
        /// Path to the evaluation file
        #[arg(default_value = "eval.yaml")]
        eval: PathBuf,
    },

    /// Generate, then judge
    Run {
        /// Path to the evaluation file
        #[arg(default_value = "eval.yaml")]
        eval: PathBuf,
    },

    /// Show the current run
    Status {
        /// Output the full run state as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export results
    Export {
        /// Path to the evaluation file
        #[arg(default_value = "eval.yaml")]
        eval: PathBuf,

        #[arg(short, long, value_enum, default_value = "json")]
        format: Format,

        /// Output path (defaults to skill-eval-<date>.<ext>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Discard the current run
    Clear,

    /// Draft an evaluation file from two skill documents
    Autoconfig {
        #[arg(long)]
        skill_a: PathBuf,

        #[arg(long)]
        skill_b: PathBuf,

        /// Number of test prompts to request
        #[arg(long, default_value_t = DEFAULT_PROMPT_COUNT)]
        prompts: usize,

        /// What to generate: all, criteria, prompts, output-type
        #[arg(long, default_value = "all")]
        scope: GenerationScope,

        /// Output path for the evaluation file; partial scopes merge into it
        #[arg(short, long, default_value = "eval.yaml")]
        output: PathBuf,
    },

    /// Check the screenshot server
    Health,

    /// Test LLM connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Generate { eval } => cmd_generate(eval).await,
        Commands::Judge { eval } => cmd_judge(eval).await,
        Commands::Run { eval } => cmd_run(eval).await,
        Commands::Status { json } => cmd_status(json),
        Commands::Export {
            eval,
            format,
            output,
        } => cmd_export(eval, format.into(), output),
        Commands::Clear => cmd_clear(),
        Commands::Autoconfig {
            skill_a,
            skill_b,
            prompts,
            scope,
            output,
        } => cmd_autoconfig(skill_a, skill_b, prompts, scope, output).await,
        Commands::Health => cmd_health().await,
        Commands::Test => cmd_test().await,
    }
}

fn load_config() -> Result<Config> {
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_eval(path: &Path) -> Result<EvalConfig> {
    let eval = EvalConfig::load(path)
        .with_context(|| format!("Failed to load evaluation file '{}'", path.display()))?;
    for warning in eval.warnings() {
        println!("  warning: {}", warning);
    }
    Ok(eval)
}

fn controller(config: &Config, eval: Option<&EvalConfig>) -> RunController {
    let renderer: Arc<dyn Renderer> = match eval {
        Some(eval) if eval.output_type.needs_screenshots() => {
            Arc::new(ScreenshotClient::new(config.render.clone()))
        }
        _ => Arc::new(NoRenderer),
    };

    RunController::new(
        Arc::new(LlmClient::new(config.llm.api_base.clone())),
        renderer,
        RunSettings::from_config(config),
    )
    .with_store(RunStore::new(&config.run.state_path))
}

fn print_progress(progress: Progress) {
    println!("  [{}] {}/{}", progress.phase, progress.current, progress.total);
}

fn print_stats(stats: &RunStats) {
    println!("  Evaluations:  {}", stats.total_evals);
    println!("  Generated:    {}", stats.generated_count);
    println!("  Judged:       {}", stats.judged_count);
    println!("  A wins:       {}", stats.a_wins);
    println!("  B wins:       {}", stats.b_wins);
    println!("  Ties:         {}", stats.ties);
    if stats.unscored > 0 {
        println!("  Unscored:     {}", stats.unscored);
    }
    if stats.judge_errors > 0 {
        println!("  Judge errors: {}", stats.judge_errors);
    }
    if let (Some(a), Some(b)) = (stats.avg_score_a, stats.avg_score_b) {
        println!("  Avg score:    A {:.2} / B {:.2}", a, b);
    }
    for (id, avg) in &stats.criteria {
        println!("    {:<20} A {:.2} / B {:.2} (n={})", id, avg.a, avg.b, avg.samples);
    }
}

async fn generate(controller: &RunController, eval: &EvalConfig) -> Result<()> {
    println!(
        "Generating {} prompts x 2 skills with {}",
        eval.prompts.len(),
        controller.settings().gen_model
    );
    let start = Instant::now();
    let stats = controller
        .run_generations(eval, print_progress)
        .await
        .context("Generation failed")?;
    println!(
        "\nGenerated {}/{} pairs in {:.2?}",
        stats.generated_count,
        stats.total_evals,
        start.elapsed()
    );
    Ok(())
}

async fn judge(controller: &RunController, eval: &EvalConfig) -> Result<()> {
    println!(
        "Judging with {} ({} output)",
        controller.settings().judge_model,
        eval.output_type
    );
    let start = Instant::now();
    let stats = controller
        .run_judgments(eval, print_progress)
        .await
        .context("Judging failed")?;
    println!("\nJudging finished in {:.2?}", start.elapsed());
    print_stats(&stats);
    Ok(())
}

async fn cmd_generate(eval_path: PathBuf) -> Result<()> {
    let config = load_config()?;
    let eval = load_eval(&eval_path)?;
    let controller = controller(&config, Some(&eval));
    generate(&controller, &eval).await
}

async fn cmd_judge(eval_path: PathBuf) -> Result<()> {
    let config = load_config()?;
    let eval = load_eval(&eval_path)?;
    let controller = controller(&config, Some(&eval));
    judge(&controller, &eval).await
}

async fn cmd_run(eval_path: PathBuf) -> Result<()> {
    let config = load_config()?;
    let eval = load_eval(&eval_path)?;
    let controller = controller(&config, Some(&eval));
    generate(&controller, &eval).await?;
    println!();
    judge(&controller, &eval).await
}

fn cmd_status(json: bool) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let controller = controller(&config, None);
    let state = controller.snapshot();

    if json {
        let json_str = serde_json::to_string_pretty(&state).context("Failed to serialize run state")?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("Run Status");
    println!("{}", "─".repeat(40));
    println!("  Phase:        {}", state.phase);
    println!("  Run id:       {}", state.run_id);
    if let Some(error) = &state.error {
        println!("  Last error:   {}", error);
    }
    if let (Some(start), Some(end)) = (state.started_at, state.ended_at) {
        println!("  Elapsed:      {:.1}s", (end - start) as f64 / 1000.0);
    }
    print_stats(&controller.stats());

    if !state.evaluations.is_empty() {
        println!("{}", "─".repeat(40));
        for item in &state.evaluations {
            let prompt: String = item.prompt.chars().take(50).collect();
            let verdict = item
                .judge
                .winner()
                .map(|w| w.to_string())
                .unwrap_or_else(|| format!("{:?}", item.judge.status).to_lowercase());
            println!(
                "{:>4}. A:{:<8} B:{:<8} judge:{:<8} {}",
                item.id,
                format!("{:?}", item.result_a.status).to_lowercase(),
                format!("{:?}", item.result_b.status).to_lowercase(),
                verdict,
                prompt
            );
        }
    }

    Ok(())
}

fn cmd_export(eval_path: PathBuf, format: ExportFormat, output: Option<PathBuf>) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let eval = load_eval(&eval_path)?;
    let state = controller(&config, None).snapshot();
    if state.evaluations.is_empty() {
        anyhow::bail!("Nothing to export. Run 'generate' first.");
    }

    let now = chrono::Utc::now();
    let output = output.unwrap_or_else(|| PathBuf::from(format.default_filename(now)));
    let rendered = format
        .render(&eval, &state.evaluations, now)
        .context("Failed to render export")?;
    std::fs::write(&output, rendered)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;

    println!("Exported {} evaluations to {}", state.evaluations.len(), output.display());
    Ok(())
}

fn cmd_clear() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    RunStore::new(&config.run.state_path)
        .clear()
        .context("Failed to clear run state")?;
    println!("Run state cleared.");
    Ok(())
}

async fn cmd_autoconfig(
    skill_a: PathBuf,
    skill_b: PathBuf,
    prompt_count: usize,
    scope: GenerationScope,
    output: PathBuf,
) -> Result<()> {
    let config = load_config()?;
    let a = Skill::from_file(&skill_a).context("Failed to read skill A")?;
    let b = Skill::from_file(&skill_b).context("Failed to read skill B")?;

    let existing = if output.exists() {
        let eval = EvalConfig::load(&output).context("Failed to load existing evaluation file")?;
        Some(skill_eval::GeneratedConfig {
            output_type: eval.output_type,
            output_type_reasoning: String::new(),
            criteria: eval.criteria,
            prompts: eval.prompts,
            generation_error: None,
        })
    } else {
        None
    };

    println!("Generating {} config with {}...", scope, config.llm.gen_model);
    let generator = ConfigGenerator::new(
        Arc::new(LlmClient::new(config.llm.api_base.clone())),
        config.llm.api_key.clone(),
        config.llm.gen_model.clone(),
        config.llm.max_tokens,
        Duration::from_secs(config.run.call_timeout_secs),
    );
    let generated = generator
        .generate(&a, &b, scope, prompt_count, existing.as_ref())
        .await
        .context("Config generation failed")?;

    if let Some(error) = &generated.generation_error {
        if existing.is_some() {
            println!("Generation failed, left '{}' unchanged: {}", output.display(), error);
            return Ok(());
        }
        println!("Generation failed, wrote fallback config: {}", error);
    } else if !generated.output_type_reasoning.is_empty() {
        println!("  Output type:  {} ({})", generated.output_type, generated.output_type_reasoning);
    }
    println!("  Criteria:     {}", generated.criteria.len());
    println!("  Prompts:      {}", generated.prompts.len());

    let file = generated.into_eval_file(skill_a, skill_b);
    let yaml = serde_yaml::to_string(&file).context("Failed to serialize evaluation file")?;
    std::fs::write(&output, yaml)
        .with_context(|| format!("Failed to write '{}'", output.display()))?;
    println!("\nEvaluation file saved to: {}", output.display());

    Ok(())
}

async fn cmd_health() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    println!("Checking screenshot server at {}...", config.render.url);

    let health = ScreenshotClient::new(config.render).health().await;
    if health.available {
        println!("  Status:   {}", health.status.as_deref().unwrap_or("ok"));
        println!(
            "  Browser:  {}",
            if health.browser_running { "running" } else { "not started" }
        );
    } else {
        println!(
            "  Unavailable: {}",
            health.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

async fn cmd_test() -> Result<()> {
    println!("Testing LLM connection...\n");

    let config = Config::load().context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:     {}", config.llm.api_base);
    println!("  Gen model:    {}", config.llm.gen_model);
    println!("  Judge model:  {}", config.llm.judge_model);
    let key_preview: String = config.llm.api_key.chars().take(8).collect();
    println!("  API Key:      {}...", key_preview);
    println!();

    if let Err(e) = config.validate() {
        println!("Configuration error: {}", e);
        return Ok(());
    }

    let client = LlmClient::new(config.llm.api_base.clone());

    println!("Sending test request...");
    match client
        .test_connection(&config.llm.api_key, &config.llm.gen_model)
        .await
    {
        Ok(()) => println!("Connection successful!"),
        Err(e) => println!("Connection failed: {}", e),
    }

    Ok(())
}
