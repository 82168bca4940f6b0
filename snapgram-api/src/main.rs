use serde::Deserialize;
use server::{ServerState, SessionConfig};
use snapgram_common::{
    snowflake::{ProcessId, WorkerId},
    util::PositiveDuration,
};
use snapgram_db::{Database, DbClient, DbError, MemoryDatabase};
use snapgram_store::LocalStore;
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

const fn default_database_max_connections() -> u32 {
    10
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

const fn default_upload_limit_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: Option<String>,
    #[serde(default = "default_database_max_connections")]
    database_max_connections: u32,
    #[serde(default = "default_upload_dir")]
    upload_dir: PathBuf,
    #[serde(default = "default_upload_limit_bytes")]
    upload_limit_bytes: usize,
    session_lifetime_seconds: Option<PositiveDuration>,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "snapgram_api=debug,\
                snapgram_db=debug,\
                snapgram_store=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn connect_database(env: &Env) -> Result<Arc<dyn Database>, InitError> {
    if let Some(url) = &env.database_url {
        let client = DbClient::connect(
            url,
            env.database_max_connections,
            env.worker_id,
            env.process_id,
        )
        .await?;
        info!("Connected to database");
        Ok(Arc::new(client))
    } else {
        warn!("DATABASE_URL is not set, keeping everything in memory");
        Ok(Arc::new(MemoryDatabase::new(env.worker_id, env.process_id)))
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Could not listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let state = ServerState {
        db: connect_database(&env).await?,
        store: Arc::new(LocalStore::new(env.upload_dir.clone())),
        sessions: SessionConfig {
            lifetime: env.session_lifetime_seconds,
        },
    };
    let app = server::app(state, env.upload_limit_bytes);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
