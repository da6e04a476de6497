use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sql_agent::config::{AppConfig, Provider};
use sql_agent::store::{load_csv, CsvSource, SqliteStore};
use sql_agent::web::{self, AppState};
use sql_agent::{Agent, ToolRegistry};

/// Ask questions about a SQLite customer database in plain language.
#[derive(Debug, Parser)]
#[command(name = "sql-agent", version, about)]
struct Cli {
    /// SQLite database file (overrides SQL_AGENT_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Model name (overrides SQL_AGENT_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Model provider: gemini or openai (overrides SQL_AGENT_PROVIDER)
    #[arg(long, global = true)]
    provider: Option<Provider>,

    /// Maximum model calls per question, 0 for no limit (overrides SQL_AGENT_MAX_STEPS)
    #[arg(long, global = true)]
    max_steps: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the chat page
    Serve {
        #[arg(long, default_value = "127.0.0.1:8501")]
        addr: SocketAddr,
    },
    /// Answer one question and print the answer
    Ask { question: String },
    /// Import a customers CSV from a path or http(s) URL
    Load { source: String },
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(provider) = self.provider {
            if provider != config.provider {
                config.provider = provider;
                config.api_key = std::env::var(provider.api_key_var()).ok();
                config.base_url = match provider {
                    Provider::Openai => std::env::var("OPENAI_API_BASE_URL").ok(),
                    Provider::Gemini => None,
                };
            }
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = (max_steps > 0).then_some(max_steps);
        }
    }
}

fn build_agent(config: &AppConfig) -> anyhow::Result<Agent> {
    let llm_client = config.llm_client().context("Failed to create model client")?;
    let store = Arc::new(SqliteStore::new(&config.db_path));
    Ok(Agent::new(llm_client, ToolRegistry::new(store), config.agent_config()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sql_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    cli.apply(&mut config);
    tracing::debug!(?config, "Configuration loaded");

    match cli.command {
        Command::Serve { addr } => {
            let agent = build_agent(&config)?;
            web::serve(addr, AppState::new(agent)).await?;
        }
        Command::Ask { question } => {
            let agent = build_agent(&config)?;
            let answer = agent.invoke(&question).await?;
            println!("{answer}");
        }
        Command::Load { source } => {
            let store = SqliteStore::create(&config.db_path);
            let report = load_csv(&CsvSource::from(source.as_str()), &store)
                .await
                .with_context(|| format!("Failed to load {source}"))?;
            println!(
                "Loaded {} rows into {}",
                report.rows_inserted,
                config.db_path.display()
            );
            if !report.ignored_columns.is_empty() {
                println!("Ignored columns: {}", report.ignored_columns.join(", "));
            }
        }
    }

    Ok(())
}
