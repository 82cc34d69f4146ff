//! tasq CLI entry point.
//!
//! `demo` は Redis に対して client と launcher を両方動かすデモです。
//! `enqueue` / `stats` / `scheduled` / `retries` / `dead` / `locate` は運用向けの小さなコマンドです。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use tasq_core::app::Inspector;
use tasq_core::impls::{RedisOpt, RedisStore};
use tasq_core::queue::Keys;
use tasq_core::{Client, Config, HandlerError, Launcher, Task, TaskId, handler_fn};

#[derive(Debug, Parser)]
#[command(name = "tasq", version, about = "Redis-backed task queue")]
struct Cli {
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(flatten)]
    conn: ConnArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct ConnArgs {
    /// JSON config file; flags below override its values.
    #[arg(long, global = true, env = "TASQ_CONFIG")]
    config: Option<std::path::PathBuf>,

    #[arg(long, global = true, env = "TASQ_REDIS_ADDR")]
    redis_addr: Option<String>,

    #[arg(long, global = true, env = "TASQ_REDIS_PASSWORD", hide_env_values = true)]
    redis_password: Option<String>,

    #[arg(long, global = true, env = "TASQ_REDIS_DB")]
    redis_db: Option<i64>,

    #[arg(long, global = true, env = "TASQ_KEY_PREFIX")]
    key_prefix: Option<String>,

    #[arg(long, global = true, env = "TASQ_POOL_SIZE")]
    pool_size: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Enqueue a few sample tasks and process them until Ctrl-C.
    Demo {
        #[arg(long, default_value = "default")]
        queue: String,
    },
    /// Submit one task.
    Enqueue {
        task_type: String,
        /// Payload as a JSON object.
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long, default_value = "default")]
        queue: String,
        #[arg(long, default_value_t = 0)]
        delay_secs: u64,
        #[arg(long)]
        retry: Option<u32>,
    },
    /// Print structure sizes as JSON.
    Stats {
        #[arg(long = "queue", default_value = "default")]
        queues: Vec<String>,
    },
    /// List delayed tasks waiting for their due time, as JSON lines.
    Scheduled,
    /// List tasks waiting for a retry, as JSON lines.
    Retries,
    /// List dead tasks as JSON lines.
    Dead,
    /// Print where a task currently sits (empty once done or executing).
    Locate {
        id: String,
        #[arg(long = "queue", default_value = "default")]
        queues: Vec<String>,
    },
}

impl ConnArgs {
    fn load(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Config::from_json(&raw)?
            }
            None => Config::default(),
        };
        if let Some(addr) = &self.redis_addr {
            config.redis.addr = addr.clone();
        }
        if self.redis_password.is_some() {
            config.redis.password = self.redis_password.clone();
        }
        if let Some(db) = self.redis_db {
            config.redis.db = db;
        }
        if let Some(prefix) = &self.key_prefix {
            config.key_prefix = prefix.clone();
        }
        if let Some(size) = self.pool_size {
            config.pool_size = size;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log-level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    let config = cli.conn.load()?;
    match cli.command {
        Command::Demo { queue } => demo(config, &queue).await,
        Command::Enqueue {
            task_type,
            payload,
            queue,
            delay_secs,
            retry,
        } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("payload is not valid JSON")?;
            let task = Task::from_value(task_type, payload)?;
            let client = Client::connect(&config).await?;
            let delay = Duration::from_secs(delay_secs);
            let id = match retry {
                Some(limit) => client.enqueue_with_retry(&queue, task, delay, limit).await?,
                None => client.enqueue(&queue, task, delay).await?,
            };
            println!("{id}");
            Ok(())
        }
        Command::Stats { queues } => {
            let inspector = inspector(&config.redis, &config.key_prefix).await?;
            let names: Vec<&str> = queues.iter().map(String::as_str).collect();
            let counts = inspector.counts(&names).await?;
            println!("{}", serde_json::to_string_pretty(&counts)?);
            Ok(())
        }
        listing @ (Command::Scheduled | Command::Retries | Command::Dead) => {
            let inspector = inspector(&config.redis, &config.key_prefix).await?;
            let entries = match listing {
                Command::Scheduled => inspector.scheduled().await?,
                Command::Retries => inspector.retries().await?,
                _ => inspector.dead().await?,
            };
            for entry in entries {
                println!("{}", serde_json::to_string(&entry)?);
            }
            Ok(())
        }
        Command::Locate { id, queues } => {
            let inspector = inspector(&config.redis, &config.key_prefix).await?;
            let names: Vec<&str> = queues.iter().map(String::as_str).collect();
            let states = inspector.locate(&names, &TaskId::new(id)).await?;
            println!("{}", serde_json::to_string(&states)?);
            Ok(())
        }
    }
}

async fn inspector(redis: &RedisOpt, prefix: &str) -> anyhow::Result<Inspector> {
    let store = RedisStore::connect(redis).await?;
    Ok(Inspector::new(Arc::new(store), Keys::new(prefix)))
}

async fn handle_demo_task(task: Task) -> Result<(), HandlerError> {
    match task.task_type() {
        "send_email" => {
            let email = task.get_str("email").ok_or("send_email needs an email")?;
            let subject = task.get_str("subject").unwrap_or_default();
            info!(email, subject, "sending email");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        "process_image" => {
            let filename = task
                .get_str("filename")
                .ok_or("process_image needs a filename")?;
            info!(filename, "processing image");
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        "generate_report" => {
            let kind = task.get_str("type").ok_or("generate_report needs a type")?;
            info!(kind, "generating report");
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        other => warn!(task_type = other, "unknown task type; ignoring"),
    }
    Ok(())
}

async fn demo(config: Config, queue: &str) -> anyhow::Result<()> {
    let client = Client::connect(&config).await?;
    let mut launcher = Launcher::connect(config)
        .await?
        .handle(queue, handler_fn(handle_demo_task))?
        .build()?;
    launcher.start()?;

    let samples = [
        ("send_email", serde_json::json!({ "email": "user1@example.com", "subject": "Welcome to our service!" })),
        ("process_image", serde_json::json!({ "filename": "profile_photo.jpg" })),
        ("send_email", serde_json::json!({ "email": "user2@example.com", "subject": "Your order is confirmed" })),
    ];
    for (task_type, payload) in samples {
        let id = client
            .enqueue(queue, Task::from_value(task_type, payload)?, Duration::ZERO)
            .await?;
        info!(task_id = %id, task_type, "enqueued");
    }

    let report = Task::from_value("generate_report", serde_json::json!({ "type": "daily_sales" }))?;
    let id = client.enqueue(queue, report, Duration::from_secs(5)).await?;
    info!(task_id = %id, "scheduled report in 5s");

    info!("processing; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    launcher.terminate().await?;
    Ok(())
}
