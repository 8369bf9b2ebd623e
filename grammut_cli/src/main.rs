mod config;
mod feedback;
mod grammar;

use config::DriverConfig;
use feedback::UniqueOutputFeedback;
use grammut_core::corpus::InterestingTrees;
use grammut_core::grammar::{Grammar, RuleGrammar};
use grammut_core::mutator::{GrammarMutator, GrammarMutatorContext, MutationStats, Mutator};
use grammut_core::sample::Sample;
use grammut_core::strategies::Strategy;

use clap::Parser;
use log::{debug, info};
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    #[clap(short, long)]
    threads: Option<usize>,
    #[clap(short, long)]
    iterations: Option<u64>,
    #[clap(short, long)]
    seed: Option<u64>,
}

struct WorkerReport {
    worker: usize,
    stats: MutationStats,
    discovered: usize,
}

fn load_config(cli: &Cli) -> Result<DriverConfig, anyhow::Error> {
    let mut config = match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from specified path: {config_path:?}");
            DriverConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from("grammut.toml");
            if default_config_path.exists() {
                info!("No config file specified via CLI, loading default: {default_config_path:?}");
                DriverConfig::load_from_file(&default_config_path)?
            } else {
                info!("No config file specified and default 'grammut.toml' not found, using built-in defaults.");
                DriverConfig::default()
            }
        }
    };

    if let Some(threads) = cli.threads {
        config.driver.threads = threads;
    }
    if let Some(iterations) = cli.iterations {
        config.driver.iterations = iterations;
    }
    if let Some(seed) = cli.seed {
        config.driver.seed = seed;
    }
    config.validate()?;
    Ok(config)
}

fn save_output(dir: &Path, digest: md5::Digest, output: &[u8]) -> Result<(), anyhow::Error> {
    let path = dir.join(format!("{digest:x}"));
    std::fs::write(&path, output)
        .map_err(|e| anyhow::anyhow!("Failed to write output {:?}: {}", path, e))
}

/// Keeps a sample if its rendering is new, creating its mutation context.
fn keep_if_new(
    grammar: &RuleGrammar,
    mutator: &mut GrammarMutator<RuleGrammar>,
    feedback: &mut UniqueOutputFeedback,
    output_dir: Option<&Path>,
    sample: &Sample,
    samples: &mut Vec<Sample>,
    contexts: &mut Vec<GrammarMutatorContext>,
) -> Result<bool, anyhow::Error> {
    let rendered = grammar.render(&grammar.decode_sample(sample)?);
    let Some(digest) = feedback.observe(&rendered) else {
        return Ok(false);
    };
    if let Some(dir) = output_dir {
        save_output(dir, digest, &rendered)?;
    }
    // Contexts register their tree in the shared corpus, so only new outputs get one.
    contexts.push(mutator.create_sample_context(sample)?);
    samples.push(sample.clone());
    Ok(true)
}

fn run_worker(
    worker: usize,
    grammar: Arc<RuleGrammar>,
    interesting_trees: InterestingTrees,
    config: &DriverConfig,
) -> Result<WorkerReport, anyhow::Error> {
    let settings = &config.driver;
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed.wrapping_add(worker as u64));
    let mut mutator =
        GrammarMutator::new(Arc::clone(&grammar), interesting_trees, config.mutator.clone())?;
    let mut feedback = UniqueOutputFeedback::new();
    let output_dir = settings.output_dir.as_deref();

    let mut samples = Vec::new();
    let mut contexts = Vec::new();
    for _ in 0..settings.initial_samples {
        let mut sample = Sample::default();
        mutator.generate_sample(&mut sample, &mut rng)?;
        keep_if_new(
            &grammar,
            &mut mutator,
            &mut feedback,
            output_dir,
            &sample,
            &mut samples,
            &mut contexts,
        )?;
    }
    debug!("Worker {worker} starts with {} samples", samples.len());

    let report_interval = settings.report_interval.max(1);
    for i in 0..settings.iterations {
        let index = rng.next_u64() as usize % samples.len();
        mutator.init_round(&samples[index], &contexts[index]);

        let mut sample = samples[index].clone();
        mutator.mutate(&mut sample, &mut rng, &samples)?;
        keep_if_new(
            &grammar,
            &mut mutator,
            &mut feedback,
            output_dir,
            &sample,
            &mut samples,
            &mut contexts,
        )?;

        if worker == 0 && i > 0 && i % report_interval == 0 {
            info!(
                "Iter: {}/{}, Samples: {}, Shared trees: {}",
                i,
                settings.iterations,
                samples.len(),
                mutator.interesting_trees().len()
            );
        }
    }

    Ok(WorkerReport {
        worker,
        stats: mutator.stats().clone(),
        discovered: feedback.len(),
    })
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    debug!("Effective configuration: {config:#?}");

    if let Some(dir) = &config.driver.output_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow::anyhow!("Failed to create output dir {:?}: {}", dir, e))?;
    }

    let grammar = Arc::new(grammar::expression_grammar()?);
    let interesting_trees = config.mutator.interesting_trees();

    info!(
        "Starting {} workers for {} iterations each...",
        config.driver.threads, config.driver.iterations
    );
    let start_time = Instant::now();

    let reports = thread::scope(|scope| {
        let handles: Vec<_> = (0..config.driver.threads)
            .map(|worker| {
                let grammar = Arc::clone(&grammar);
                let interesting_trees = interesting_trees.clone();
                let config = &config;
                scope.spawn(move || run_worker(worker, grammar, interesting_trees, config))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("Worker thread panicked"))
                    .and_then(|result| result)
            })
            .collect::<Result<Vec<_>, anyhow::Error>>()
    })?;

    let elapsed_total = start_time.elapsed();
    let mut total = MutationStats::default();
    for report in &reports {
        debug!(
            "Worker {} discovered {} outputs in {} requests",
            report.worker, report.discovered, report.stats.requests
        );
        total.merge(&report.stats);
    }

    let secs = elapsed_total.as_secs_f64();
    let per_sec = if secs > 0.0 {
        total.requests as f64 / secs
    } else {
        0.0
    };
    println!("Mutation finished in {elapsed_total:.2?}.");
    println!(
        "Requests: {}, Mutations/sec: {:.2}, Shared trees: {}, Discovered: {}",
        total.requests,
        per_sec,
        interesting_trees.len(),
        reports.iter().map(|r| r.discovered).sum::<usize>()
    );
    println!(
        "Regenerations: {}, Unproductive requests: {}",
        total.regenerations, total.unproductive_requests
    );
    for strategy in Strategy::ALL {
        println!(
            "  {:<14} attempts: {:>8}  successes: {:>8}",
            strategy.name(),
            total.attempts(strategy),
            total.successes(strategy)
        );
    }

    Ok(())
}
