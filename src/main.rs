use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

mod config;
mod db;
mod engine;
mod graph;
mod logging;
mod metrics;
mod models;
mod scoring;
mod sequencer;

use config::EngineConfig;
use engine::Recommender;

#[derive(Parser)]
#[command(name = "learning-path")]
#[command(about = "Prerequisite-aware learning path recommendations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo curriculum and learner
    Seed,
    /// Import knowledge points from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the recommended learning path as JSON
    #[command(group(
        ArgGroup::new("who")
            .args(["learner", "email"])
            .required(true)
            .multiple(false)
    ))]
    Recommend {
        #[arg(long)]
        learner: Option<Uuid>,
        #[arg(long)]
        email: Option<String>,
        /// Override the configured maximum number of entries
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Report whether enough points were completed to rebuild the path
    Recalibrate {
        #[arg(long)]
        completed: usize,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let imported = db::import_csv(&pool, &csv).await?;
            println!("Imported {imported} knowledge points from {}.", csv.display());
        }
        Commands::Recommend {
            learner,
            email,
            limit,
            config,
        } => {
            let mut engine_config = EngineConfig::resolve(config.as_deref())?;
            if let Some(limit) = limit {
                engine_config.max_recommendations = limit.min(engine_config.max_recommendations);
            }

            let pool = connect().await?;
            let learner_id = match (learner, email) {
                (Some(id), _) => id,
                (None, Some(email)) => db::find_learner_by_email(&pool, &email).await?,
                (None, None) => anyhow::bail!("either --learner or --email is required"),
            };

            let recommender = Recommender::new(db::PgLearnerData::new(pool), engine_config);
            let path = recommender.recommend(learner_id).await?;
            println!("{}", serde_json::to_string_pretty(&path)?);
        }
        Commands::Recalibrate { completed, config } => {
            let engine_config = EngineConfig::resolve(config.as_deref())?;
            let due = engine::should_recalibrate(completed, engine_config.recalibration_threshold);
            println!("{due}");
        }
    }

    Ok(())
}
