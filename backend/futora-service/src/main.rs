use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{anyhow, Context, Result};
use futora_service::{
    config::{self, StoreBackend},
    db, logging,
    repository::{MemoryStore, PgStore, Repositories},
    routes,
    state::AppState,
};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<()> {
    logging::init_tracing();
    let cfg = config::Config::from_env().context("Failed to load configuration")?;

    let repos = match (cfg.store_backend, cfg.database.clone()) {
        (StoreBackend::Postgres, Some(db_cfg)) => {
            let pool = db::init_pool(db_cfg)
                .await
                .context("Failed to initialize database")?;
            Repositories::from_store(Arc::new(PgStore::new(pool)))
        }
        (StoreBackend::Postgres, None) => {
            return Err(anyhow!(
                "postgres backend selected without database configuration"
            ));
        }
        (StoreBackend::Memory, _) => {
            tracing::warn!("using in-memory store, data will not survive a restart");
            Repositories::from_store(Arc::new(MemoryStore::new()))
        }
    };

    let state = AppState::new(repos, &cfg.chat);

    let bind_addr = format!("{}:{}", cfg.app.host, cfg.app.port);
    tracing::info!(
        %bind_addr,
        resolution_strategy = ?cfg.chat.resolution_strategy,
        id_allocation = ?cfg.chat.id_allocation,
        unread_aggregation = ?cfg.chat.unread_aggregation,
        "starting futora-service"
    );

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .with_context(|| format!("Failed to bind {bind_addr}"))?
    .run()
    .await
    .map_err(|e| anyhow!("HTTP server error: {}", e))
}
