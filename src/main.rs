use std::env;

use log::info;
use spaced_drill::api::{app_router, ApiState};
use spaced_drill::db::Db;
use spaced_drill::DrillConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DrillConfig::from_env()?;
    let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://drill.db?mode=rwc".to_string());
    let bind = env::var("DRILL_BIND").unwrap_or_else(|_| "127.0.0.1:3000".to_string());

    let db = Db::connect(&database_url).await?;
    let matrix = db.load_matrix().await?;
    info!(
        "loaded {} optimal factors, scheduling with {:?}",
        matrix.len(),
        config.algorithm
    );

    let app = app_router(ApiState::new(db, config, matrix));
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("listening on {}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}
