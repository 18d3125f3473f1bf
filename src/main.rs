use anyhow::Result;
use swasthvault::config::{self, Config};
use swasthvault::db;
use swasthvault::policy::{MEDICAL_RECORDS, USERS};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} initializer v{}", config::APP_NAME, config::APP_VERSION);

    let mut config = Config::from_env()?;
    if let Some(path) = std::env::args_os().nth(1) {
        config.database_path = path.into();
    }

    let vault = db::init_db(&config)?;

    tracing::info!(
        path = %config.database_path.display(),
        accounts = vault.count(USERS)?,
        visits = vault.count(MEDICAL_RECORDS)?,
        "vault ready"
    );
    Ok(())
}
