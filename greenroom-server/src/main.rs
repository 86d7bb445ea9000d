use std::sync::Arc;

use log::{error, info};
use thiserror::Error;
use tokio::runtime;

use greenroom_core::{
    DatabaseError, Greenroom, HttpAssessmentEngine, HttpLiveSessionGateway, PgDatabase,
};
use greenroom_server::{init_logger, run_server, Config, ConfigError, ServerContext};

#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Could not initialize database: {0}")]
    Database(#[from] DatabaseError),
}

impl StartupError {
    fn hint(&self) -> &'static str {
        match self {
            StartupError::Config(_) => "Check that every required environment variable is set.",
            StartupError::Database(_) => {
                "Make sure the Postgres instance behind DATABASE_URL is running, then try again."
            }
        }
    }
}

fn main() {
    init_logger();

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("greenroom-async")
        .build()
        .expect("async runtime is built");

    if let Err(error) = runtime.block_on(run()) {
        error!("Greenroom failed to start!");
        error!("{error}");
        error!("Hint: {}", error.hint());
    }
}

async fn run() -> Result<(), StartupError> {
    let config = Config::from_env()?;

    info!("Connecting to database...");
    let database = PgDatabase::new(&config.database_url).await?;

    let engine = HttpAssessmentEngine::new(config.assessment.clone());
    let gateway = HttpLiveSessionGateway::new(config.live_session.clone());

    let greenroom = Greenroom::new(config.greenroom(), database, engine, gateway);
    let context = ServerContext {
        greenroom: Arc::new(greenroom),
    };

    info!("Initialized successfully.");

    run_server(context, config.port).await;

    Ok(())
}
