/// Configuration management for futora-service
///
/// Loads configuration from environment variables (a `.env` file is honoured).
use crate::error::AppError;
use crate::services::conversation_service::{IdAllocation, ResolutionStrategy};
use crate::services::unread::AggregationMode;
use db_pool::{parse_env_with_default, DbConfig};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

pub const SERVICE_NAME: &str = "futora-service";

/// Where conversations, messages and follows live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Process-local store; data is lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(AppError::Config(format!("unknown STORE_BACKEND: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
}

/// Behaviour knobs of the chat core
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub resolution_strategy: ResolutionStrategy,
    pub id_allocation: IdAllocation,
    pub unread_aggregation: AggregationMode,
    /// Buffered events per change-feed receiver before it reports lag
    pub change_feed_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            resolution_strategy: ResolutionStrategy::AtomicPair,
            id_allocation: IdAllocation::Client,
            unread_aggregation: AggregationMode::Aggregate,
            change_feed_capacity: 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub store_backend: StoreBackend,
    /// Present only for the postgres backend
    pub database: Option<DbConfig>,
    pub chat: ChatConfig,
}

fn parse_var<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr<Err = AppError>,
{
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.parse(),
        _ => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let app = AppConfig {
            host: env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env_with_default("PORT", 8080),
        };

        let store_backend = parse_var("STORE_BACKEND", StoreBackend::Postgres)?;
        let database = match store_backend {
            StoreBackend::Postgres => {
                Some(DbConfig::from_env(SERVICE_NAME).map_err(AppError::Config)?)
            }
            StoreBackend::Memory => None,
        };

        let defaults = ChatConfig::default();
        let change_feed_capacity =
            parse_env_with_default("CHANGE_FEED_CAPACITY", defaults.change_feed_capacity);
        if change_feed_capacity == 0 {
            return Err(AppError::Config(
                "CHANGE_FEED_CAPACITY must be greater than zero".into(),
            ));
        }

        let chat = ChatConfig {
            resolution_strategy: parse_var("RESOLUTION_STRATEGY", defaults.resolution_strategy)?,
            id_allocation: parse_var("ID_ALLOCATION", defaults.id_allocation)?,
            unread_aggregation: parse_var("UNREAD_AGGREGATION", defaults.unread_aggregation)?,
            change_feed_capacity,
        };

        Ok(Config {
            app,
            store_backend,
            database,
            chat,
        })
    }
}
