//! Prometheus metrics for the pool and the queries run through it

use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};
use sqlx::{pool::PoolConnection, PgPool, Postgres};
use std::future::Future;
use std::time::Instant;

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

lazy_static::lazy_static! {
    static ref POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Pool connections by state (idle, in_use, max)",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref POOL_ACQUIRE_SECONDS: HistogramVec = register_histogram_vec!(
        "db_pool_acquire_duration_seconds",
        "Time spent waiting for a pooled connection",
        &["service"],
        LATENCY_BUCKETS.to_vec()
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref QUERY_SECONDS: HistogramVec = register_histogram_vec!(
        "db_query_duration_seconds",
        "Round trip time of named queries",
        &["service", "query"],
        LATENCY_BUCKETS.to_vec()
    ).expect("Prometheus metrics registration should succeed at startup");

    static ref DB_ERRORS: IntCounterVec = register_int_counter_vec!(
        "db_errors_total",
        "Failed acquisitions and queries by error class",
        &["service", "source", "class"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

fn error_class(e: &sqlx::Error) -> &'static str {
    match e {
        sqlx::Error::PoolTimedOut => "timeout",
        sqlx::Error::PoolClosed => "closed",
        sqlx::Error::RowNotFound => "not_found",
        sqlx::Error::Database(db) if db.is_unique_violation() => "unique_violation",
        sqlx::Error::Database(_) => "database",
        sqlx::Error::Io(_) => "io",
        _ => "other",
    }
}

pub(crate) fn update_pool_metrics(pool: &PgPool, service: &str) {
    let idle = pool.num_idle() as i64;
    let in_use = pool.size() as i64 - idle;
    let max = pool.options().get_max_connections() as i64;

    for (state, value) in [("idle", idle), ("in_use", in_use), ("max", max)] {
        POOL_CONNECTIONS
            .with_label_values(&[service, state])
            .set(value);
    }
}

/// `pool.acquire()` that records wait time and failures for `service`
pub async fn acquire_with_metrics(
    pool: &PgPool,
    service: &str,
) -> Result<PoolConnection<Postgres>, sqlx::Error> {
    let start = Instant::now();
    let result = pool.acquire().await;

    POOL_ACQUIRE_SECONDS
        .with_label_values(&[service])
        .observe(start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        DB_ERRORS
            .with_label_values(&[service, "acquire", error_class(e)])
            .inc();
    }

    result
}

/// Run a query future and record its latency under `query`.
///
/// Failures are counted by class; the result is passed through untouched.
pub async fn timed<T, F>(service: &str, query: &str, fut: F) -> Result<T, sqlx::Error>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    let start = Instant::now();
    let result = fut.await;

    QUERY_SECONDS
        .with_label_values(&[service, query])
        .observe(start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        DB_ERRORS
            .with_label_values(&[service, query, error_class(e)])
            .inc();
    }

    result
}
