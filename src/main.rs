use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use effluent::config;
use effluent::{predict_report, run, EngineError, ModelBundle, PointReport, RunOutput, SurrogateEvaluator};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Parser, Debug)]
#[command(name = "effluent")]
#[command(version)]
#[command(about = "Multi-objective set-point optimization with NSGA-II and TOPSIS decision support")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output path for the JSON result bundle
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search the Pareto set and select an operating point
    Optimize,
    /// Predict every model target at a given operating point
    Predict {
        /// Control value as NAME=VALUE (repeat for each control)
        #[arg(long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,
    },
    /// Validate a configuration file and its model bundle
    Validate,
    /// Print version information
    Version,
}

// ============================================================================
// JSON Output Structures
// ============================================================================

#[derive(Serialize)]
struct Manifest {
    schema_version: String,
    engine_version: String,
    study: String,
    timestamp_utc: String,
    platform: String,
    config_hash: String,
    config_snapshot: config::Root,
}

#[derive(Serialize)]
struct OptimizationOutput {
    manifest: Manifest,
    objectives: Vec<String>,
    controls: Vec<String>,
    result: RunOutput,
    best_point: PointReport,
    wall_time_ms: f64,
}

#[derive(Serialize)]
struct PredictionOutput {
    manifest: Manifest,
    point: PointReport,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn compute_hash(data: &str) -> String {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn create_manifest(cfg: &config::Root, cfg_text: &str) -> Manifest {
    Manifest {
        schema_version: SCHEMA_VERSION.to_string(),
        engine_version: VERSION.to_string(),
        study: cfg.study.name.clone(),
        timestamp_utc: chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        platform: std::env::consts::OS.to_string(),
        config_hash: compute_hash(cfg_text),
        config_snapshot: cfg.clone(),
    }
}

fn load_config(path: Option<&Path>) -> Result<(config::Root, String, PathBuf)> {
    let path = path.context("--config required")?;
    let cfg_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg = config::Root::parse(&cfg_text)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;
    cfg.validate()?;
    info!(study = %cfg.study.name, version = %cfg.study.version, "configuration loaded");
    Ok((cfg, cfg_text, path.to_path_buf()))
}

fn load_models(cfg: &config::Root, cfg_path: &Path) -> Result<ModelBundle> {
    let models_path = cfg.models_path(cfg_path);
    let models = ModelBundle::load(&models_path)?;
    if let Some(missing) = cfg.objectives.iter().find(|t| !models.contains(t)) {
        let err = EngineError::Evaluation {
            target: missing.clone(),
            reason: "no model registered for target".to_string(),
        };
        return Err(anyhow::Error::new(err)
            .context(format!("model bundle {} is incomplete", models_path.display())));
    }
    info!(path = %models_path.display(), targets = models.len(), "model bundle loaded");
    Ok(models)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), "JSON bundle written");
    Ok(())
}

fn print_point(point: &PointReport) {
    println!("  Predictions:");
    for (target, value) in &point.predictions {
        match point.removal.get(target) {
            Some(r) => println!(
                "    {:<14} {:>12.4}   (inlet {:.2}, removal {:.1}%)",
                target, value, r.inlet, r.removal_pct
            ),
            None => println!("    {:<14} {:>12.4}", target, value),
        }
    }
}

// ============================================================================
// Run Modes
// ============================================================================

fn run_optimize(cfg: &config::Root, cfg_text: &str, cfg_path: &Path, out: Option<&Path>) -> Result<()> {
    let models = load_models(cfg, cfg_path)?;
    let controls = cfg.control_names();
    let evaluator = SurrogateEvaluator::new(
        &models,
        cfg.process.clone(),
        controls.clone(),
        cfg.objectives.clone(),
    )?
    .parallel(cfg.optimizer.parallel);

    let start = Instant::now();
    let result = run(&cfg.run_settings()?, &evaluator)?;
    let wall_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    let best_point = predict_report(&models, &cfg.process, &controls, &result.best_decision)?;

    println!();
    println!("  Pareto set size: {}  (generations: {}, evaluations: {}{})",
             result.pareto_decisions.len(),
             result.generations,
             result.evaluations,
             if result.stopped_early { ", stopped early" } else { "" });
    if let Some(hv) = result.hypervolume {
        println!("  Hypervolume (2D): {:.4}", hv);
    }
    println!("  Weights ({}): {:?}", result.weight_method, result.weights.as_slice());
    if let Some(summary) = &result.score_summary {
        println!("  TOPSIS scores: mean {:.4}, max {:.4}, std {:.4}",
                 summary.mean, summary.max, summary.std_dev);
    }
    println!();
    println!("  Selected operating point (TOPSIS score {:.4}):", result.scores[result.best_index]);
    for (name, value) in controls.iter().zip(&result.best_decision) {
        println!("    {:<14} {:>12.4}", name, value);
    }
    print_point(&best_point);

    println!();
    println!("  Top {} candidates:", result.ranking.len());
    let header: Vec<String> = controls.iter().chain(&cfg.objectives).map(|s| format!("{:>14}", s)).collect();
    println!("  {:>4} {:>8} {}", "#", "score", header.join(" "));
    println!("  {}", "-".repeat(14 + 15 * header.len()));
    for (pos, cand) in result.ranking.iter().enumerate() {
        let values: Vec<String> = result.pareto_decisions[cand.index]
            .iter()
            .chain(&result.pareto_objectives[cand.index])
            .map(|v| format!("{:>14.4}", v))
            .collect();
        println!("  {:>4} {:>8.4} {}", pos + 1, cand.score, values.join(" "));
    }

    if let Some(path) = out {
        let output = OptimizationOutput {
            manifest: create_manifest(cfg, cfg_text),
            objectives: cfg.objectives.clone(),
            controls,
            result,
            best_point,
            wall_time_ms,
        };
        write_json(path, &output)?;
    }

    Ok(())
}

fn parse_assignments(cfg: &config::Root, set: &[String]) -> Result<Vec<f64>> {
    let mut given: BTreeMap<&str, f64> = BTreeMap::new();
    for item in set {
        let (name, value) = item
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got '{}'", item))?;
        let value: f64 = value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: '{}'", name, value))?;
        given.insert(name.trim(), value);
    }

    let mut x = Vec::with_capacity(cfg.controls.len());
    for c in &cfg.controls {
        let v = *given
            .get(c.name.as_str())
            .with_context(|| format!("missing --set {}=<value>", c.name))?;
        if v < c.lower || v > c.upper {
            bail!("{}={} outside [{}, {}]", c.name, v, c.lower, c.upper);
        }
        x.push(v);
    }
    if let Some(extra) = given.keys().find(|k| !cfg.controls.iter().any(|c| c.name == **k)) {
        bail!("unknown control '{}'", extra);
    }
    Ok(x)
}

fn run_predict(cfg: &config::Root, cfg_text: &str, cfg_path: &Path, set: &[String], out: Option<&Path>) -> Result<()> {
    let x = parse_assignments(cfg, set)?;
    let models = load_models(cfg, cfg_path)?;
    let point = predict_report(&models, &cfg.process, &cfg.control_names(), &x)?;

    println!();
    for (name, value) in &point.controls {
        println!("    {:<14} {:>12.4}", name, value);
    }
    print_point(&point);

    if let Some(path) = out {
        let output = PredictionOutput {
            manifest: create_manifest(cfg, cfg_text),
            point,
        };
        write_json(path, &output)?;
    }
    Ok(())
}

fn validate_config(cfg: &config::Root, cfg_path: &Path) -> Result<()> {
    let models = load_models(cfg, cfg_path)?;

    println!("config valid: {}", cfg_path.display());
    println!("  study: {} v{}", cfg.study.name, cfg.study.version);
    println!("  objectives: {}", cfg.objectives.join(", "));
    for c in &cfg.controls {
        println!("  control: {} in [{}, {}]", c.name, c.lower, c.upper);
    }
    println!("  optimizer: pop_size={}, generations={}, seed={}",
             cfg.optimizer.pop_size, cfg.optimizer.generations, cfg.optimizer.seed);
    println!("  weights: {}", cfg.weights.label());
    println!("  models: {}", models.targets().collect::<Vec<_>>().join(", "));
    Ok(())
}

fn print_version() {
    println!("effluent {}", VERSION);
    println!();
    println!("  Schema Version:    {}", SCHEMA_VERSION);
    println!("  Platform:          {}", std::env::consts::OS);
    println!("  Architecture:      {}", std::env::consts::ARCH);
    println!();
    println!("  Search:    NSGA-II (SBX crossover, polynomial mutation)");
    println!("  Weights:   manual, presets (energy-first, quality-first, balanced), entropy");
    println!("  Decision:  TOPSIS, all objectives minimized");
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Version => {
            print_version();
            Ok(())
        }
        Commands::Validate => {
            let (cfg, _, cfg_path) = load_config(args.config.as_deref())?;
            validate_config(&cfg, &cfg_path)
        }
        Commands::Optimize => {
            let (cfg, cfg_text, cfg_path) = load_config(args.config.as_deref())?;
            run_optimize(&cfg, &cfg_text, &cfg_path, args.out.as_deref())
        }
        Commands::Predict { set } => {
            let (cfg, cfg_text, cfg_path) = load_config(args.config.as_deref())?;
            run_predict(&cfg, &cfg_text, &cfg_path, &set, args.out.as_deref())
        }
    }
}
