mod config;
mod db;
mod monitor;
mod notify;
mod scheduler;
mod sim;
mod state;
mod status;
mod web;

use anyhow::Result;
use std::{env, sync::Arc};
use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use db::Db;
use state::SystemState;
use web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let db_url = env::var("DB_URL").unwrap_or_else(|_| "sqlite:plants.db?mode=rwc".to_string());
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let web_port: u16 = env::var("WEB_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8080);

    // ── Database ────────────────────────────────────────────────────
    let db = Db::connect(&db_url).await?;
    db.migrate().await?;

    // ── Config file (sampler settings + seed users/plants) ──────────
    let cfg = config::load(&config_path)?;
    config::apply(&cfg, &db).await?;

    let plants = db.list_plant_ids().await?;
    if plants.is_empty() {
        warn!("no plants in the database yet; sampler will idle until one is created");
    }
    info!(plants = plants.len(), "db ready");

    // ── Shared state ────────────────────────────────────────────────
    let shared = SystemState::shared(cfg.sampler.enabled);
    shared
        .write()
        .await
        .record_system("hub started".to_string());

    let settings = cfg.sampler.settings();

    // ── Web server ──────────────────────────────────────────────────
    let app = AppState {
        db: db.clone(),
        shared: Arc::clone(&shared),
        sampler: Arc::new(Mutex::new(cfg.sampler.generator(1))),
        policy: settings.policy,
    };
    let web_shared = Arc::clone(&shared);
    tokio::spawn(async move {
        if let Err(e) = web::serve(app, web_port).await {
            error!("web server stopped: {e:#}");
            web_shared
                .write()
                .await
                .record_error(format!("web server stopped: {e:#}"));
        }
    });

    // ── Background sampler ──────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler_task = if cfg.sampler.enabled {
        Some(tokio::spawn(scheduler::run(
            db.clone(),
            cfg.sampler.generator(0),
            settings,
            Arc::clone(&shared),
            shutdown_rx,
        )))
    } else {
        info!("sampler disabled in config");
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    // Receiver may already be gone if the sampler is disabled.
    let _ = shutdown_tx.send(true);

    if let Some(task) = sampler_task {
        if let Err(e) = task.await {
            error!("sampler task failed: {e}");
        }
    }

    db.close().await;
    info!("bye");
    Ok(())
}
