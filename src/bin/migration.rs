use tracing::info;

use wisata_api::{config, migrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    info!("Applying database migrations");
    migrator::run_migration(cfg.database_url()).await
}
