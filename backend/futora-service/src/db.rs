use db_pool::{create_pool, migrate, DbConfig};
use sqlx::migrate::Migrator;
use sqlx::PgPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub async fn init_pool(cfg: DbConfig) -> Result<PgPool, crate::error::AppError> {
    cfg.log_config();
    let pool = create_pool(cfg)
        .await
        .map_err(|e| crate::error::AppError::StartServer(format!("db: {e}")))?;
    migrate(&pool, &MIGRATOR).await?;
    Ok(pool)
}
