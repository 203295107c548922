//! cohortsift - iterative feature reduction for cohort subgroup discovery

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};

use cohortsift::checkpoint::DigestStatus;
use cohortsift::collab::{clusterer_for, ranker_for};
use cohortsift::prep::{combine_datasets, debug_dataset_name, write_debug_dataset};
use cohortsift::reports::{best_clusterings, category_counts};
use cohortsift::{
    decay_schedule, ArtifactLayout, CheckpointLocator, ConfigKey, PipelineController,
    PipelineControllerConfig, PipelineRequest, PipelineSettings, Result, SiftError,
};

#[derive(Parser)]
#[command(name = "cohortsift")]
#[command(version = "0.1.0")]
#[command(about = "Iterative feature reduction and re-clustering of cohort data", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Artifact root (overrides the dataDir setting)
    #[arg(short, long, global = true, env = "COHORTSIFT_ROOT")]
    root: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run or resume the reduce-and-recluster pipeline for one configuration
    Pipeline {
        #[arg(long)]
        cohort: String,

        #[arg(long)]
        dataset: String,

        /// Number of clusters
        #[arg(short = 'k', long)]
        n_clusters: usize,

        /// Total iterations the configuration should have
        #[arg(short = 'n', long)]
        n_iterations: usize,

        /// Continue from the last complete iteration
        #[arg(long)]
        resume: bool,

        /// Clustering method (overrides the clusterMethod setting)
        #[arg(short, long)]
        method: Option<String>,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Show the checkpoint state of a configuration
    Status {
        cohort: String,
        dataset: String,
        n_clusters: usize,

        /// Clustering method (overrides the clusterMethod setting)
        #[arg(short, long)]
        method: Option<String>,

        /// Recompute artifact digests
        #[arg(long)]
        verify: bool,
    },

    /// Report the best clustering score of a dataset across all configurations
    Best {
        cohort: String,
        dataset: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Per-cluster category counts of one variable
    Counts {
        /// Clustering CSV
        clustering: PathBuf,
        /// Data CSV holding the variable
        data: PathBuf,
        /// Column to count
        variable: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inner-join datasets of a cohort into a new base dataset
    Combine {
        cohort: String,
        /// Name of the combined dataset
        target: String,
        /// Datasets to join, in order
        #[arg(required = true, num_args = 2..)]
        sources: Vec<String>,
    },

    /// Build a debug dataset from randomly chosen columns
    Subsample {
        cohort: String,
        dataset: String,
        /// Number of columns to keep
        n_features: usize,

        /// Shuffle seed
        #[arg(long, default_value = "0")]
        seed: u64,
    },

    /// Print the feature-count decay schedule
    Schedule {
        /// Feature count of the base dataset
        n_features: usize,
        /// Iteration budget
        n_iterations: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or validate project configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration files
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "cohortsift=debug,info"
    } else {
        "cohortsift=info,warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = run(cli, &project_path).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, project_path: &Path) -> Result<()> {
    let settings = PipelineSettings::load(project_path)?;
    let root = cli
        .root
        .clone()
        .unwrap_or_else(|| settings.resolve_data_dir(project_path));
    let layout = ArtifactLayout::new(&root);

    match cli.command {
        Commands::Pipeline {
            cohort,
            dataset,
            n_clusters,
            n_iterations,
            resume,
            method,
            progress,
        } => {
            settings.validate()?;
            if n_iterations == 0 {
                return Err(SiftError::invalid_config("nIterations", "must be at least 1"));
            }

            let method = method.unwrap_or_else(|| settings.cluster_method.clone());
            let clusterer = clusterer_for(&method, &settings)?;
            let ranker = ranker_for(&settings)?;
            let key = ConfigKey::new(cohort, dataset, method, n_clusters);

            println!(
                "{} {} ({} iterations, ranker {})",
                if resume { "Resuming" } else { "Running" }.cyan().bold(),
                key,
                n_iterations,
                ranker.name()
            );

            let controller = PipelineController::new(layout, clusterer, ranker).with_config(
                PipelineControllerConfig::from_settings(&settings).with_progress(progress),
            );
            let outcome = controller
                .run(&PipelineRequest::new(key, n_iterations).with_resume(resume))
                .await?;

            if outcome.iterations.is_empty() {
                println!(
                    "{} Nothing to do: {} iterations already complete",
                    "OK".green().bold(),
                    outcome.start.iteration
                );
            }
            for it in &outcome.iterations {
                println!(
                    "   iter{}: {} features, score {:.2}, kept {}",
                    it.iteration, it.n_kept_feats, it.score, it.keep
                );
            }
            if !outcome.iterations.is_empty() {
                println!(
                    "\n{} {} iteration(s) written under {}",
                    "OK".green().bold(),
                    outcome.iterations.len(),
                    root.display()
                );
            }
        }

        Commands::Status {
            cohort,
            dataset,
            n_clusters,
            method,
            verify,
        } => {
            let method = method.unwrap_or_else(|| settings.cluster_method.clone());
            let key = ConfigKey::new(cohort, dataset, method, n_clusters);
            let locator = CheckpointLocator::new(layout);
            let records = locator.scan(&key)?;

            println!("\n{} {}", "Status:".cyan().bold(), key);
            println!("{}", "─".repeat(40));

            if records.is_empty() {
                println!("   No iterations yet");
                return Ok(());
            }

            for record in &records {
                let marker = if record.is_complete() {
                    "✓".green()
                } else {
                    "✗".red()
                };
                match &record.manifest {
                    Some(manifest) => {
                        println!("   {} {}", marker, manifest.summary());
                        if verify {
                            for (kind, status) in manifest.verify(&record.dir) {
                                let label = match status {
                                    DigestStatus::Ok => "ok".green(),
                                    DigestStatus::Mismatch => "modified".yellow(),
                                    DigestStatus::Missing => "missing".red(),
                                };
                                println!("       {kind}: {label}");
                            }
                        }
                    }
                    None => println!(
                        "   {} iter{}: no manifest ({} artifact kinds on disk)",
                        marker,
                        record.iteration,
                        record.files.len()
                    ),
                }
            }

            let start = locator.locate(&key, true)?;
            let seed = start
                .n_kept_feats
                .map_or_else(|| "all".to_string(), |n| n.to_string());
            println!(
                "\n   Resume point: iteration {} ({} features)",
                start.iteration, seed
            );
            if !start.stale.is_empty() {
                println!(
                    "   {} {} director(ies) would be discarded on resume",
                    "Warning:".yellow(),
                    start.stale.len()
                );
            }
        }

        Commands::Best {
            cohort,
            dataset,
            json,
        } => {
            let best = best_clusterings(&layout, &cohort, &dataset)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&best)?);
            } else {
                println!("BEST SCORE: {:.2}", best.score);
                for c in &best.clusterings {
                    println!("{}", c.path.display());
                }
                println!(
                    "\n   {} clustering(s) scanned under {}/{}",
                    best.scanned, cohort, dataset
                );
            }
        }

        Commands::Counts {
            clustering,
            data,
            variable,
            json,
        } => {
            let counts = category_counts(
                &clustering,
                &data,
                &variable,
                &settings.id_column,
                &settings.cluster_column,
            )?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                print!("{}", counts.render());
            }
        }

        Commands::Combine {
            cohort,
            target,
            sources,
        } => {
            let combined =
                combine_datasets(&layout, &cohort, &sources, &target, &settings.id_column)?;
            println!(
                "{} {}/{}: {} rows, {} features",
                "OK".green().bold(),
                cohort,
                target,
                combined.n_rows(),
                combined.n_features()
            );
        }

        Commands::Subsample {
            cohort,
            dataset,
            n_features,
            seed,
        } => {
            let sampled =
                write_debug_dataset(&layout, &cohort, &dataset, n_features, seed, &settings.id_column)?;
            println!(
                "{} {}/{}: {}",
                "OK".green().bold(),
                cohort,
                debug_dataset_name(&dataset),
                sampled.feature_names().join(", ")
            );
        }

        Commands::Schedule {
            n_features,
            n_iterations,
            json,
        } => {
            let steps = decay_schedule(n_features, n_iterations)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&steps)?);
            } else {
                for step in &steps {
                    println!(
                        "iter{}: {} features -> keep {}",
                        step.iteration, step.n_kept_feats, step.keep
                    );
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                if json {
                    println!("{}", serde_json::to_string_pretty(&settings)?);
                } else {
                    println!("\n{} Pipeline Settings", "Config:".cyan().bold());
                    println!("{}", "─".repeat(40));
                    println!("   Data dir: {}", root.display());
                    println!("   Identifier column: {}", settings.id_column);
                    println!("   Cluster column: {}", settings.cluster_column);
                    println!("   Cluster method: {}", settings.cluster_method);
                    println!("   Ranker: {:?}", settings.ranker);
                    println!("   Cluster timeout: {}s", settings.cluster_timeout_secs);
                    println!("   Rank timeout: {}s", settings.rank_timeout_secs);
                }
            }

            ConfigAction::Validate => {
                settings.validate()?;
                println!(
                    "{} {}",
                    "OK".green().bold(),
                    PipelineSettings::settings_path(project_path).display()
                );
            }
        },
    }

    Ok(())
}
