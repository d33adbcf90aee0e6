// src/main.rs
use clap::{Parser, Subcommand};
use memfuse::agents::{PlannerLaneRequest, UserRef};
use memfuse::ingest::IngestRequest;
use memfuse::learning::FeedbackSubmission;
use memfuse::monitoring::{export_prometheus, init_tracing};
use memfuse::{EngineConfig, MemoryEngine};
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "memfuse")]
#[command(about = "Memory ingestion, hybrid retrieval and agent lanes")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest a text file into vector memory and wait for the job to finish
    Ingest {
        file: PathBuf,
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "universe")]
        scope: String,
    },
    /// Show an ingestion job
    Job { id: String },
    /// Hybrid search over memory and the web
    Search {
        query: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Record satisfaction feedback for a query
    Feedback {
        query: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        satisfaction: f64,
        /// Ids of results that were useful
        #[arg(long = "result", value_name = "ID")]
        results: Vec<String>,
        #[arg(long)]
        text: Option<String>,
    },
    /// Run the planner lane (memory -> planner)
    Plan {
        goal: String,
        #[arg(long, conflicts_with = "email", required_unless_present = "email")]
        user: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        context: Option<String>,
    },
    /// Run the full reasoning lane
    Reason {
        query: String,
        #[arg(long, conflicts_with = "email", required_unless_present = "email")]
        user: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Run batch weight learning over recent feedback
    Learn {
        #[arg(long)]
        user: Option<String>,
    },
    /// Feedback and performance report
    Stats {
        #[arg(long, default_value_t = 7)]
        days: u32,
        #[arg(long)]
        user: Option<String>,
    },
    /// Delete expired external cache entries
    PruneCache {
        #[arg(long)]
        max_age_hours: Option<u64>,
    },
    /// Print Prometheus metrics
    Metrics,
}

fn user_ref(user: Option<String>, email: Option<String>) -> UserRef {
    match (user, email) {
        (Some(id), _) => UserRef::Id(id),
        (None, Some(email)) => UserRef::Email(email),
        (None, None) => UserRef::Id(String::new()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;
    let _guard = init_tracing(&config.monitoring)?;
    let engine = MemoryEngine::from_config(&config).await?;

    match cli.command {
        Command::Ingest { file, owner, scope } => {
            let content = tokio::fs::read_to_string(&file).await?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());
            let handle = engine
                .pipeline
                .start_pipeline(IngestRequest {
                    content,
                    filename,
                    owner_id: owner,
                    agent_scope: scope,
                })
                .await?;
            info!(job_id = %handle.job_id(), "Waiting for ingestion job");
            let job_id = handle.job_id().to_string();
            match handle.wait().await {
                Some(job) => print_json(&job)?,
                None => eprintln!("job {} finished without a final state", job_id),
            }
        }
        Command::Job { id } => match engine.pipeline.get_job(&id).await {
            Some(job) => print_json(&job)?,
            None => eprintln!("job {} not found", id),
        },
        Command::Search { query, user, limit } => {
            let response = engine.fuser.search(&query, &user, limit).await;
            println!("{}", response.context_text);
            print_json(&response.results)?;
        }
        Command::Feedback { query, user, satisfaction, results, text } => {
            // The split is resolved later from the search metric for this query
            let record = engine
                .feedback
                .submit_feedback(FeedbackSubmission {
                    query,
                    user_id: user,
                    result_ids: results,
                    satisfaction,
                    feedback: text,
                    context: None,
                })
                .await?;
            print_json(&record)?;
        }
        Command::Plan { goal, user, email, context } => {
            let result = engine
                .orchestrator
                .run_planner_lane(PlannerLaneRequest {
                    goal,
                    user: user_ref(user, email),
                    context,
                })
                .await?;
            print_json(&result)?;
        }
        Command::Reason { query, user, email } => {
            let result = engine
                .orchestrator
                .run_reasoning_lane(&query, &user_ref(user, email))
                .await?;
            print_json(&result)?;
        }
        Command::Learn { user } => {
            let summary = engine.feedback.run_batch_learning(user.as_deref()).await?;
            print_json(&summary)?;
        }
        Command::Stats { days, user } => {
            let report = engine
                .feedback
                .run_self_improvement(user.as_deref(), days, false)
                .await?;
            print_json(&report)?;
            if let Some(user) = user {
                print_json(&engine.feedback.get_user_performance_stats(&user, days).await?)?;
                print_json(&engine.controller.get_adaptive_weights(&user).await?)?;
            }
        }
        Command::PruneCache { max_age_hours } => {
            let max_age = max_age_hours.unwrap_or(config.fusion.cache_max_age_hours);
            let removed = engine.cache.prune_expired(max_age).await?;
            println!("removed {} expired cache entries", removed);
            print_json(&engine.cache.stats().await?)?;
        }
        Command::Metrics => print!("{}", export_prometheus()),
    }

    Ok(())
}
