use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::output::print_status;
use crate::providers::github::sign;
use crate::server;
use crate::store::Store;

#[derive(Parser)]
#[command(name = "cilens-hooks")]
#[command(author, version, about = "GitHub Actions webhook receiver", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./cilens-hooks.{toml,json,yaml,yml})
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the configured one
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive webhooks and reconcile them into the database
    Serve {
        /// Listen address, e.g. 0.0.0.0:8080
        #[arg(short, long)]
        bind: Option<String>,

        #[arg(short, long, env = "WEBHOOK_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },
    /// Summarise the intake backlog and recently reconciled jobs
    Status {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print a single job as JSON
        #[arg(long, conflicts_with = "run")]
        job: Option<i64>,

        /// Print a single workflow run as JSON
        #[arg(long)]
        run: Option<i64>,
    },
    /// Write a configuration file with every default filled in
    Init {
        #[arg(default_value = "cilens-hooks.toml")]
        path: PathBuf,
    },
    /// Print the signature header GitHub would send for a payload file
    Sign {
        file: PathBuf,

        #[arg(short, long, env = "WEBHOOK_SECRET", hide_env_values = true)]
        secret: Option<String>,
    },
}

impl Cli {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(database) = &self.database {
            config.storage.database = Some(database.clone());
        }
        Ok(config)
    }

    fn to_json(&self, value: &impl serde::Serialize) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }

    async fn execute_serve(&self, bind: Option<&str>, secret: Option<&str>) -> Result<()> {
        let mut config = self.load_config()?;
        if let Some(bind) = bind {
            config.server.bind = bind.to_owned();
        }
        if let Some(secret) = secret {
            config.webhook.secret = Some(secret.to_owned());
        }

        info!(
            "Using database: {}",
            config.storage.database_path().display()
        );
        server::serve(&config).await
    }

    async fn execute_status(&self, limit: usize, job: Option<i64>, run: Option<i64>) -> Result<()> {
        let config = self.load_config()?;
        let database = config.storage.database_path();
        if !database.exists() {
            bail!("No database found at {}", database.display());
        }

        let store = Store::open(&database)
            .with_context(|| format!("Failed to open database: {}", database.display()))?;

        if let Some(id) = job {
            let job = store
                .get_job(id)
                .await?
                .with_context(|| format!("Job {id} has not been reconciled"))?;
            println!("{}", self.to_json(&job)?);
            return Ok(());
        }

        if let Some(id) = run {
            let run = store
                .get_run(id)
                .await?
                .with_context(|| format!("Run {id} has not been reconciled"))?;
            println!("{}", self.to_json(&run)?);
            return Ok(());
        }

        let counts = store.intake_counts().await?;
        let jobs = store.recent_jobs(limit).await?;
        print_status(&database, &counts, &jobs);

        Ok(())
    }

    fn execute_init(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("Refusing to overwrite {}", path.display());
        }

        Config::default().save(path)?;
        info!("Configuration written to: {}", path.display());
        Ok(())
    }

    fn execute_sign(&self, file: &Path, secret: Option<&str>) -> Result<()> {
        let config = self.load_config()?;
        let Some(secret) = secret.or(config.webhook.secret.as_deref()) else {
            bail!("No webhook secret given; pass --secret or set WEBHOOK_SECRET");
        };

        let body = std::fs::read(file)
            .with_context(|| format!("Failed to read payload: {}", file.display()))?;
        println!("{}", sign(secret.as_bytes(), &body)?);

        Ok(())
    }

    pub async fn execute(&self) -> Result<()> {
        match &self.command {
            Commands::Serve { bind, secret } => {
                self.execute_serve(bind.as_deref(), secret.as_deref()).await
            }
            Commands::Status { limit, job, run } => {
                self.execute_status(*limit, *job, *run).await
            }
            Commands::Init { path } => Self::execute_init(path),
            Commands::Sign { file, secret } => self.execute_sign(file, secret.as_deref()),
        }
    }
}
