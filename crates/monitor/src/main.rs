//! cluster-monitor: autonomous Kubernetes health agent.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_monitor::{
    standard_tools, AgentConfig, KubeClusterReader, KubectlExecutor, MonitoringAgent,
    OpenAiEngine, ToolContext,
};
use incident_memory::{IncidentStore, Metadata};
use notify::Notifier;

/// Monitor a Kubernetes cluster, recall past incidents and alert humans.
#[derive(Parser)]
#[command(name = "cluster-monitor")]
#[command(about = "Autonomous Kubernetes health agent")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring agent
    Run {
        /// Run a single cycle, print the result and exit
        #[arg(long)]
        single_run: bool,

        /// Seconds between cycles (overrides MONITORING_INTERVAL)
        #[arg(long)]
        interval: Option<u64>,

        /// kubeconfig context (overrides KUBERNETES_CONTEXT)
        #[arg(long)]
        context: Option<String>,

        /// Default namespace for pod lookups (overrides KUBERNETES_NAMESPACE)
        #[arg(long)]
        namespace: Option<String>,

        /// Chat model (overrides OPENAI_MODEL)
        #[arg(long)]
        openai_model: Option<String>,

        /// Never modify the cluster (drops the kubectl_exec tool)
        #[arg(long)]
        read_only: bool,
    },

    /// Inspect or edit the incident memory
    Memory {
        #[command(subcommand)]
        action: MemoryCommand,
    },
}

#[derive(Subcommand)]
enum MemoryCommand {
    /// List every stored incident
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Store a problem and its solution
    Add {
        /// Problem description
        problem: String,

        /// How it was resolved
        solution: String,

        /// Extra metadata as key=value (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Find incidents similar to a description
    Search {
        /// Symptom to search for
        query: String,

        /// Maximum number of results
        #[arg(short = 'n', long, default_value = "3")]
        limit: usize,

        /// Minimum similarity (0.0-1.0)
        #[arg(long, default_value = "0.7")]
        threshold: f32,
    },

    /// Delete one incident by ID
    Delete {
        /// Incident ID (e.g. problem_3)
        id: String,
    },

    /// Remove every incident and reset numbering
    Clear {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let mut config = AgentConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            single_run,
            interval,
            context,
            namespace,
            openai_model,
            read_only,
        } => {
            if let Some(secs) = interval {
                config.monitoring_interval = Duration::from_secs(secs);
            }
            if context.is_some() {
                config.kubernetes_context = context;
            }
            if let Some(namespace) = namespace {
                config.kubernetes_namespace = namespace;
            }
            if let Some(model) = openai_model {
                config.openai_model = model;
            }
            config.read_only = read_only;

            run_agent(&config, single_run).await
        }
        Commands::Memory { action } => run_memory(&config, action).await,
    }
}

fn init_tracing(verbose: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if verbose => EnvFilter::new("debug,hyper=info,kube_client=info"),
        Err(_) => {
            let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            EnvFilter::try_new(level.to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
        }
    };

    let file_layer = match std::env::var("LOG_FILE").ok().filter(|p| !p.is_empty()) {
        Some(path) => {
            let path = PathBuf::from(path);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(std::sync::Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(file_layer)
        .with(filter)
        .init();

    Ok(())
}

async fn open_store(config: &AgentConfig) -> Result<Arc<IncidentStore>> {
    let store = IncidentStore::open(config.store_config(), config.embedder())
        .await
        .with_context(|| format!("Failed to open incident store in {}", config.store_dir.display()))?;
    Ok(Arc::new(store))
}

async fn run_agent(config: &AgentConfig, single_run: bool) -> Result<()> {
    let api_key = config.require_api_key()?;

    let store = open_store(config).await?;
    let notifier = Arc::new(Notifier::from_env());
    let cluster = KubeClusterReader::connect(
        config.kubernetes_context.as_deref(),
        config.kubernetes_namespace.clone(),
    )
    .await
    .context("Failed to connect to Kubernetes")?;

    let executor = if config.read_only {
        info!("Read-only mode: kubectl_exec disabled");
        None
    } else {
        Some(Arc::new(KubectlExecutor::new(config.kubernetes_context.clone())))
    };

    let tools = standard_tools(&ToolContext {
        cluster: Arc::new(cluster),
        executor,
        store,
        notifier: notifier.clone(),
    });

    let engine = OpenAiEngine::new(api_key, &config.openai_model)
        .with_base_url(&config.openai_api_base)
        .with_timeout(config.engine_timeout);

    let agent = MonitoringAgent::new(
        Arc::new(engine),
        Arc::new(tools),
        notifier,
        config.driver_settings(),
    )?;

    info!(
        model = %config.openai_model,
        namespace = %config.kubernetes_namespace,
        "Starting cluster monitor"
    );

    if single_run {
        let result = agent.monitor_once().await;
        println!("{result}");
    } else {
        agent.monitor_loop(shutdown_signal()).await;
    }

    Ok(())
}

async fn run_memory(config: &AgentConfig, action: MemoryCommand) -> Result<()> {
    let store = open_store(config).await?;

    match action {
        MemoryCommand::List { json } => {
            let records = store.list_all().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("{}", "No incidents recorded.".bright_black());
            } else {
                for record in records {
                    println!(
                        "{} {}",
                        record.id.cyan().bold(),
                        record.created_at.format("%Y-%m-%d %H:%M").to_string().bright_black()
                    );
                    println!("  {} {}", "Problem: ".bold(), record.problem_description);
                    println!("  {} {}", "Solution:".bold(), record.solution);
                    if !record.metadata.is_empty() {
                        println!(
                            "  {} {}",
                            "Metadata:".bold(),
                            serde_json::to_string(&record.metadata)?
                        );
                    }
                    println!();
                }
            }
        }
        MemoryCommand::Add {
            problem,
            solution,
            meta,
        } => {
            let metadata = parse_metadata(&meta)?;
            let id = store.add(&problem, &solution, metadata).await?;
            println!("{} Stored incident {}", "✓".green().bold(), id.cyan());
        }
        MemoryCommand::Search {
            query,
            limit,
            threshold,
        } => {
            let hits = store.find_similar(&query, limit, threshold).await?;
            if hits.is_empty() {
                println!("{}", "No similar problems found.".bright_black());
            }
            for hit in hits {
                println!(
                    "{} {}",
                    hit.id.cyan().bold(),
                    format!("(similarity {:.2})", hit.similarity).yellow()
                );
                println!("  {} {}", "Problem: ".bold(), hit.problem);
                println!("  {} {}", "Solution:".bold(), hit.solution);
                println!();
            }
        }
        MemoryCommand::Delete { id } => {
            if store.delete(&id).await? {
                println!("{} Deleted {}", "✓".green().bold(), id.cyan());
            } else {
                println!("{} No incident with ID {}", "⚠".yellow().bold(), id);
            }
        }
        MemoryCommand::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear the incident store without --yes");
            }
            store.clear_all().await?;
            println!("{} Incident store cleared", "✓".green().bold());
        }
    }

    Ok(())
}

/// `key=value` pairs; values that parse as bool or number keep that type.
fn parse_metadata(pairs: &[String]) -> Result<Metadata> {
    let mut metadata = Metadata::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .with_context(|| format!("Metadata '{pair}' is not in KEY=VALUE form"))?;
        let value = match value {
            "true" => serde_json::Value::Bool(true),
            "false" => serde_json::Value::Bool(false),
            other => other
                .parse::<i64>()
                .map(serde_json::Value::from)
                .or_else(|_| other.parse::<f64>().map(serde_json::Value::from))
                .unwrap_or_else(|_| serde_json::Value::from(other)),
        };
        metadata.insert(key.trim().to_string(), value);
    }
    Ok(metadata)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
