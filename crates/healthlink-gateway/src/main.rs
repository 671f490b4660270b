use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use healthlink_accounts::AccountDirectory;
use healthlink_agent::openai::OpenAiProvider;
use healthlink_agent::{LlmProvider, MessageGenerator};
use healthlink_core::config::HealthlinkConfig;
use healthlink_memory::ConversationStore;
use healthlink_scheduler::{
    CheckinEngine, EngineSettings, ExecutionRecorder, RateLimiter, SqliteLockProvider,
};
use healthlink_whatsapp::{Dispatcher, EvolutionClient};
use rusqlite::Connection;
use tracing::{info, warn};

/// HealthLink proactive check-in service.
#[derive(Parser, Debug)]
#[command(name = "healthlink-gateway", version, about, long_about = None)]
struct Cli {
    /// Config file. Falls back to HEALTHLINK_CONFIG, then ~/.healthlink/healthlink.toml.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the check-in loop until ctrl-c (default).
    Run,
    /// Run a single cycle now and print its report.
    Tick,
    /// Print a tenant's check-in usage for today.
    Usage {
        #[arg(long)]
        tenant: String,
    },
    /// Store an inbound patient reply and mark the pending check-in answered.
    Inbound {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        patient: String,
        #[arg(long)]
        text: String,
        /// Gateway message id; redeliveries with the same id are ignored.
        #[arg(long)]
        message_id: Option<String>,
    },
    /// Print the latest executions of a schedule.
    History {
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        schedule: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Set or clear a tenant's custom persona prompt.
    Prompt {
        #[arg(long)]
        tenant: String,
        /// New prompt; omit to fall back to the account type's default.
        #[arg(long)]
        text: Option<String>,
    },
    /// Check that the messaging gateway is reachable.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "healthlink_gateway=info,healthlink_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > HEALTHLINK_CONFIG env > ~/.healthlink/healthlink.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("HEALTHLINK_CONFIG").ok());
    let config = HealthlinkConfig::load(config_path.as_deref())?;

    let db_path = config.database.path.clone();
    ensure_parent_dir(&db_path);
    info!(path = %db_path, "opening SQLite database");

    let conn = Connection::open(&db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;

    // run all schema migrations (idempotent)
    healthlink_accounts::db::init_db(&conn)?;
    healthlink_memory::db::init_db(&conn)?;
    healthlink_scheduler::db::init_db(&conn)?;
    info!("database migrations complete");

    let db = Arc::new(Mutex::new(conn));

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            if !config.scheduler.enabled {
                warn!("scheduler.enabled is false; nothing to run");
                return Ok(());
            }
            let engine = build_engine(&config, &db_path, db)?;
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let handle = tokio::spawn(engine.run(shutdown_rx));

            tokio::signal::ctrl_c().await?;
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
            handle.await?;
        }
        Commands::Tick => {
            let engine = build_engine(&config, &db_path, db)?;
            let report = engine.run_cycle(Utc::now()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Usage { tenant } => {
            let limiter = RateLimiter::new(db, config.rate_limits.clone());
            let usage = limiter.tenant_usage(&tenant, Utc::now().date_naive())?;
            println!("{}", serde_json::to_string_pretty(&usage)?);
        }
        Commands::Inbound {
            tenant,
            patient,
            text,
            message_id,
        } => {
            let now = Utc::now();
            let history = ConversationStore::new(db.clone());
            let turn = history.save_user_message(&tenant, &patient, &text, message_id.as_deref(), now)?;
            let answered = ExecutionRecorder::new(db).record_patient_response(&tenant, &patient, now)?;
            info!(turn_id = turn.id, answered = ?answered, "inbound message stored");
        }
        Commands::History {
            tenant,
            schedule,
            limit,
        } => {
            let records = ExecutionRecorder::new(db).list_for_schedule(&tenant, &schedule, limit)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Prompt { tenant, text } => {
            AccountDirectory::new(db).set_custom_prompt(&tenant, text.as_deref())?;
            info!(tenant = %tenant, "custom prompt saved");
        }
        Commands::Status => {
            let dispatcher = build_dispatcher(&config)?;
            let up = dispatcher.gateway_available().await;
            println!("{}", serde_json::json!({ "gateway": "evolution", "available": up }));
        }
    }
    Ok(())
}

/// Wire the check-in engine. The lock gets its own connection to the same
/// file so a lease wait never holds the store's mutex.
fn build_engine(
    config: &HealthlinkConfig,
    db_path: &str,
    db: Arc<Mutex<Connection>>,
) -> anyhow::Result<CheckinEngine> {
    let holder = config
        .scheduler
        .instance_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let lock = SqliteLockProvider::new(Connection::open(db_path)?, holder)?;
    info!(holder = %lock.holder(), lock = %config.scheduler.lock_name, "lock provider ready");

    let provider: Option<Arc<dyn LlmProvider>> = match OpenAiProvider::from_config(&config.chat)? {
        Some(p) => Some(Arc::new(p)),
        None => {
            warn!("chat.api_key not set; only schedules with a fixed message can be sent");
            None
        }
    };
    let history = Arc::new(ConversationStore::new(db.clone()));
    let generator = MessageGenerator::new(provider, history)
        .with_model(config.chat.model.clone(), config.chat.max_tokens)
        .with_history_turns(config.scheduler.history_turns);

    Ok(CheckinEngine::new(
        db,
        config.rate_limits.clone(),
        generator,
        build_dispatcher(config)?,
        Arc::new(lock),
        EngineSettings::from_config(&config.scheduler),
    ))
}

fn build_dispatcher(config: &HealthlinkConfig) -> anyhow::Result<Dispatcher> {
    let client = EvolutionClient::new(&config.whatsapp)?;
    Ok(Dispatcher::new(
        Arc::new(client),
        Duration::from_secs(config.whatsapp.timeout_secs),
    ))
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
