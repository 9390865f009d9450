//! # Course Tutor CLI (`tutor`)
//!
//! Ingests course material from the learning platform and answers student
//! questions, generates quizzes, and builds learning paths from it.
//!
//! ## Usage
//!
//! ```bash
//! tutor --config ./config/tutor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `tutor init` | Create the SQLite database and run schema migrations |
//! | `tutor courses` | List courses on the platform |
//! | `tutor ingest <course>` | Rebuild a course's knowledge index |
//! | `tutor summary <course>` | Show what is indexed for a course |
//! | `tutor clear <course>` | Remove a course's knowledge |
//! | `tutor ask <course> "<question>"` | Ask the tutor a question |
//! | `tutor quiz <course> "<topic>"` | Generate a multiple-choice question |
//! | `tutor path <course>` | Build a learning path for a student |
//! | `tutor serve` | Start the HTTP API |
//!
//! Results are printed to stdout; logs go to stderr.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use course_tutor::config::{self, Config};
use course_tutor::ingest::format_report;
use course_tutor::tutor::TutorService;
use course_tutor::{db, migrate, server};

/// Course Tutor: retrieval-augmented tutoring over learning-platform courses.
#[derive(Parser)]
#[command(name = "tutor", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/tutor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// List courses visible to the configured platform account.
    Courses,

    /// Ingest a course, replacing everything previously indexed for it.
    Ingest {
        course_id: i64,

        /// Fetch and chunk only; embed and write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarize the indexed knowledge of a course.
    Summary { course_id: i64 },

    /// Remove all indexed knowledge of a course.
    Clear { course_id: i64 },

    /// Ask a question about a course.
    Ask {
        course_id: i64,
        question: String,

        #[arg(long, default_value_t = 1)]
        student: i64,
    },

    /// Generate a multiple-choice question on a topic.
    Quiz { course_id: i64, topic: String },

    /// Build a learning path from a student's quiz scores.
    Path {
        course_id: i64,

        #[arg(long, default_value_t = 1)]
        student: i64,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing(cfg: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn service(cfg: &Config) -> anyhow::Result<TutorService> {
    TutorService::from_config(cfg)
        .await
        .context("Failed to start tutor service")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg);

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg).await?;
            migrate::run_migrations(&pool).await?;
            pool.close().await;
            println!("Database initialized successfully.");
        }
        Commands::Courses => print_json(&service(&cfg).await?.courses().await?)?,
        Commands::Ingest { course_id, dry_run } => {
            let tutor = service(&cfg).await?;
            let report = if dry_run {
                tutor.preview_ingest(course_id).await?
            } else {
                tutor.ingest(course_id).await?
            };
            print!("{}", format_report(&report, dry_run));
        }
        Commands::Summary { course_id } => {
            print_json(&service(&cfg).await?.get_summary(course_id).await?)?
        }
        Commands::Clear { course_id } => {
            let removed = service(&cfg).await?.clear(course_id).await?;
            println!("cleared course {} ({} chunks removed)", course_id, removed);
        }
        Commands::Ask {
            course_id,
            question,
            student,
        } => print_json(&service(&cfg).await?.ask(course_id, &question, student).await?)?,
        Commands::Quiz { course_id, topic } => {
            print_json(&service(&cfg).await?.make_quiz(course_id, &topic).await?)?
        }
        Commands::Path { course_id, student } => {
            print_json(&service(&cfg).await?.learning_path(course_id, student).await?)?
        }
        Commands::Serve => server::run_server(&cfg).await?,
    }

    Ok(())
}
