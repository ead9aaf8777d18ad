use std::io::BufRead;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use civil::config::Config;
use civil::moderation::pipeline::DecisionPipeline;

/// Civil: moderation for outgoing chat messages.
///
/// Sends each message through a rotating pool of Gemini keys, falls back to
/// Groq, and lets the message through unmodified if neither answers in time.
#[derive(Parser)]
#[command(name = "civil", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Moderate one or more messages and print the verdicts
    Moderate {
        /// Messages to moderate, in order
        texts: Vec<String>,

        /// Read messages from stdin, one per line
        #[arg(long)]
        stdin: bool,

        /// Show every provider attempt
        #[arg(long)]
        trace: bool,
    },

    /// Show configured providers, key counts, and timeouts
    Status,

    /// Check every configured key against its provider
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("civil=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Moderate { texts, stdin, trace } => {
            let config = Config::load()?;
            let mut texts = texts;
            if stdin {
                for line in std::io::stdin().lock().lines() {
                    let line = line.context("Failed to read message from stdin")?;
                    if !line.trim().is_empty() {
                        texts.push(line);
                    }
                }
            }
            if texts.is_empty() {
                anyhow::bail!("Nothing to moderate. Pass messages as arguments or use --stdin.");
            }

            // One pool for the whole process, shared by every message.
            let pool = config.credential_pool();
            let pipeline = DecisionPipeline::from_config(&config, pool)?;

            info!(count = texts.len(), "Moderating messages");
            for text in &texts {
                let outcome = pipeline.moderate_with_trace(&config.request(text.as_str())).await;
                civil::output::terminal::display_verdict(text, &outcome, trace);
            }
        }

        Commands::Status => {
            let config = Config::load()?;
            let pool = config.credential_pool();
            let pipeline = DecisionPipeline::from_config(&config, pool.clone())?;
            civil::status::show(&config, &pool, &pipeline);
        }

        Commands::Probe => {
            let config = Config::load()?;
            config.require_any_provider()?;

            println!(
                "Probing {} key(s)...",
                config.gemini_keys.len() + usize::from(config.groq_api_key.is_some())
            );
            let results = civil::probe::probe_all(&config).await?;
            civil::output::terminal::display_probe_results(&results);
            println!(
                "{}",
                "Probes don't count against the pipeline's quota tracking.".dimmed()
            );
        }
    }

    Ok(())
}
