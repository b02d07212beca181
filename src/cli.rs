use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use aotc_utils::logger;
use aotc_value::{ArgValue, ArgsExt, Tensor};

use crate::config::CompileConfig;
use crate::jit::cache::{CacheRegistry, EntrySummary, RegistryStats, ResolveOutcome};
use crate::jit::compiler::{Compiler, CompilerRegistry};
use crate::jit::dispatch::Dispatch;
use crate::jit::function::UserFunction;
use crate::jit::signature::HasherStrategy;

#[derive(Parser, Debug)]
#[command(name = "aotc", version, about = "Compilation cache driver")]
pub struct AotcCli {
    #[arg(long, global = true)]
    /// Signature hasher: `dynamic` or `static`. Overrides AOTC_HASHER.
    hasher: Option<HasherStrategy>,

    #[arg(long, global = true)]
    /// Compiler backend. Overrides AOTC_BACKEND.
    backend: Option<String>,

    #[arg(long, global = true)]
    /// Print the report as JSON.
    json: bool,

    #[arg(short, long, global = true)]
    /// Enable debug logging.
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl AotcCli {
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Environment config with command-line overrides applied.
    pub fn compile_config(&self) -> Result<CompileConfig> {
        let mut config = CompileConfig::from_env().context("invalid AOTC_* environment")?;
        if let Some(hasher) = self.hasher {
            config.hasher = hasher;
        }
        if let Some(backend) = &self.backend {
            config.backend.clone_from(backend);
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Adds tensors over a range of extents, twice, and counts compiles.
    Sweep {
        #[arg(long, default_value_t = 10)]
        from: usize,
        #[arg(long, default_value_t = 20)]
        to: usize,
        /// Every axis gets the same extent.
        #[arg(long, default_value_t = 1)]
        rank: usize,
    },
    /// Broadcast add of (10, 20) + (20,) followed by (10, 20) + (10, 20).
    Broadcast,
    /// Resolves one signature from many threads at once.
    Race {
        #[arg(long, default_value_t = 8)]
        threads: usize,
        /// Time each compile takes, so callers overlap.
        #[arg(long, default_value_t = 25)]
        compile_delay_ms: u64,
    },
}

pub fn run() -> Result<()> {
    let cli = AotcCli::parse();
    logger::init_logging_with(cli.verbose);
    let config = cli.compile_config()?;
    debug!(hasher = %config.hasher, backend = %config.backend, "resolved config");

    let registry = CacheRegistry::global();
    let report = match cli.command() {
        Command::Sweep { from, to, rank } => {
            handle_sweep(&registry, &config, *from, *to, *rank)?
        }
        Command::Broadcast => handle_broadcast(&registry, &config)?,
        Command::Race {
            threads,
            compile_delay_ms,
        } => handle_race(
            &registry,
            &config,
            *threads,
            Duration::from_millis(*compile_delay_ms),
        )?,
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        );
    } else {
        print_report(&report);
    }
    Ok(())
}

fn elementwise_add() -> UserFunction {
    UserFunction::new("add", |args: &[ArgValue]| {
        args.expect_arity(2)?;
        Ok(vec![args.tensor(0)?.add(args.tensor(1)?)?.into()])
    })
}

fn handle_sweep(
    registry: &Arc<CacheRegistry>,
    config: &CompileConfig,
    from: usize,
    to: usize,
    rank: usize,
) -> Result<Report> {
    ensure!(from < to, "empty extent range {from}..{to}");
    ensure!(rank > 0, "rank must be at least 1");

    let mut scenario = Scenario::new("sweep", elementwise_add(), config, registry, None)?;
    for pass in 1..=2 {
        for extent in from..to {
            let shape = vec![extent; rank];
            let args = [
                ArgValue::from(Tensor::arange(&shape)),
                ArgValue::from(Tensor::full(&shape, 1.0)),
            ];
            scenario.call(format!("pass {pass} {shape:?}"), &args)?;
        }
    }
    Ok(scenario.finish())
}

fn handle_broadcast(registry: &Arc<CacheRegistry>, config: &CompileConfig) -> Result<Report> {
    let mut scenario = Scenario::new("broadcast", elementwise_add(), config, registry, None)?;
    let matrix = Tensor::full(&[10, 20], 1.0).requires_grad(true);
    let row = Tensor::arange(&[20]).requires_grad(true);

    scenario.call(
        "(10, 20) + (20,)",
        &[ArgValue::from(matrix.clone()), ArgValue::from(row)],
    )?;
    scenario.call(
        "(10, 20) + (10, 20)",
        &[ArgValue::from(matrix.clone()), ArgValue::from(matrix)],
    )?;
    Ok(scenario.finish())
}

fn handle_race(
    registry: &Arc<CacheRegistry>,
    config: &CompileConfig,
    threads: usize,
    delay: Duration,
) -> Result<Report> {
    ensure!(threads > 0, "need at least one thread");

    let inner = CompilerRegistry::global().get(&config.backend)?;
    let slow = move |function: &UserFunction, args: &[ArgValue], backend: &str| {
        thread::sleep(delay);
        inner.compile(function, args, backend)
    };
    let slow: Arc<dyn Compiler> = Arc::new(slow);
    let mut scenario = Scenario::new("race", elementwise_add(), config, registry, Some(slow))?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .context("failed to start worker pool")?;
    let args = [
        ArgValue::from(Tensor::full(&[64], 2.0)),
        ArgValue::from(Tensor::full(&[64], 3.0)),
    ];
    let dispatch = &scenario.dispatch;
    let outcomes = pool.install(|| {
        (0..threads)
            .into_par_iter()
            .map(|_| dispatch.resolve(&args).map(|resolved| resolved.outcome))
            .collect::<Result<Vec<_>, _>>()
    })?;

    for (worker, outcome) in outcomes.into_iter().enumerate() {
        scenario.record(format!("worker {worker}"), outcome);
    }
    Ok(scenario.finish())
}

/// Runs calls through one dispatch and records what each call did.
struct Scenario {
    name: &'static str,
    config: CompileConfig,
    dispatch: Dispatch,
    registry: Arc<CacheRegistry>,
    baseline: u64,
    steps: Vec<Step>,
}

impl Scenario {
    fn new(
        name: &'static str,
        function: UserFunction,
        config: &CompileConfig,
        registry: &Arc<CacheRegistry>,
        compiler: Option<Arc<dyn Compiler>>,
    ) -> Result<Self> {
        let mut builder = Dispatch::builder(function)
            .config(config.clone())
            .registry(Arc::clone(registry));
        if let Some(compiler) = compiler {
            builder = builder.compiler(compiler);
        }
        let dispatch = builder.build()?;
        Ok(Self {
            name,
            config: config.clone(),
            dispatch,
            registry: Arc::clone(registry),
            baseline: registry.recompilation_count(),
            steps: Vec::new(),
        })
    }

    fn call(&mut self, label: impl Into<String>, args: &[ArgValue]) -> Result<()> {
        let resolved = self.dispatch.resolve(args)?;
        let out = resolved.entry.artifact().invoke(args)?;
        debug!(outputs = out.len(), "invoked artifact");
        self.record(label.into(), resolved.outcome);
        Ok(())
    }

    fn record(&mut self, label: String, outcome: ResolveOutcome) {
        self.steps.push(Step {
            label,
            outcome,
            recompilations: self.recompilations(),
        });
    }

    fn recompilations(&self) -> u64 {
        self.registry.recompilation_count() - self.baseline
    }

    fn entries(&self) -> Vec<EntrySummary> {
        let Some(cache) = self.dispatch.cache() else {
            return Vec::new();
        };
        let mut entries = cache
            .keys()
            .iter()
            .filter_map(|key| cache.get(key))
            .map(|entry| entry.summary())
            .collect::<Vec<_>>();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    fn finish(self) -> Report {
        Report {
            entries: self.entries(),
            scenario: self.name,
            hasher: self.config.hasher,
            backend: self.config.backend.clone(),
            calls: self.steps.len(),
            recompilations: self.recompilations(),
            steps: self.steps,
            stats: self.registry.stats(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Report {
    scenario: &'static str,
    hasher: HasherStrategy,
    backend: String,
    calls: usize,
    recompilations: u64,
    steps: Vec<Step>,
    entries: Vec<EntrySummary>,
    stats: RegistryStats,
}

#[derive(Debug, Serialize)]
struct Step {
    label: String,
    outcome: ResolveOutcome,
    recompilations: u64,
}

fn print_report(report: &Report) {
    println!(
        "{} {} ({} hasher, backend `{}`)",
        "scenario".bold(),
        report.scenario,
        report.hasher,
        report.backend
    );
    for step in &report.steps {
        let outcome = match step.outcome {
            ResolveOutcome::Hit => "hit".green(),
            ResolveOutcome::Compiled => "compiled".yellow(),
            ResolveOutcome::Awaited => "awaited".cyan(),
        };
        println!("{:>28}  {:<9} {:>3}", step.label, outcome, step.recompilations);
    }
    println!(
        "{} {} over {} calls",
        "recompilations".green().bold(),
        report.recompilations,
        report.calls
    );
    for entry in &report.entries {
        println!(
            "  {} {} ({:.2} ms)",
            "entry".dimmed(),
            entry.key,
            entry.metadata.compilation_time.as_secs_f64() * 1000.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn isolated() -> Arc<CacheRegistry> {
        Arc::new(CacheRegistry::new())
    }

    #[test]
    fn hasher_flag_parses_both_spellings() {
        let cli = AotcCli::parse_from(["aotc", "--hasher", "static", "broadcast"]);
        assert_eq!(cli.hasher, Some(HasherStrategy::StaticShape));

        let cli = AotcCli::parse_from(["aotc", "broadcast", "--hasher", "DynamicShapeHasher"]);
        assert_eq!(cli.hasher, Some(HasherStrategy::DynamicShape));
    }

    #[test]
    fn broadcast_recompiles_on_rank_change() {
        let config = CompileConfig::default();
        let report = handle_broadcast(&isolated(), &config).unwrap();
        assert_eq!(report.recompilations, 2);
        assert_eq!(report.steps[1].outcome, ResolveOutcome::Compiled);

        assert_eq!(report.entries.len(), 2);
        assert!(report.entries.iter().all(|entry| entry.example.len() == 2));
        assert_ne!(report.entries[0].key, report.entries[1].key);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["entries"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn sweep_second_pass_only_hits() {
        let config = CompileConfig::default().with_hasher(HasherStrategy::StaticShape);
        let report = handle_sweep(&isolated(), &config, 3, 7, 2).unwrap();
        assert_eq!(report.calls, 8);
        assert_eq!(report.recompilations, 4);
        assert!(report.steps[4..].iter().all(|s| s.outcome == ResolveOutcome::Hit));
    }

    #[test]
    fn race_compiles_once() {
        let config = CompileConfig::default();
        let report = handle_race(&isolated(), &config, 4, Duration::from_millis(20)).unwrap();
        assert_eq!(report.recompilations, 1);
        let compiled = report
            .steps
            .iter()
            .filter(|s| s.outcome == ResolveOutcome::Compiled)
            .count();
        assert_eq!(compiled, 1);
    }
}
