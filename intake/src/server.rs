use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::limiters::client::ClientLimiter;
use crate::limiters::window::SubmissionLimiter;
use crate::payment::PAYMENT_HEADER;
use crate::prometheus::setup_metrics_recorder;
use crate::redis::{Client, LocalClient, RedisClient};
use crate::router::{self, SheetNames};
use crate::rsvp::RSVP_HEADER;
use crate::stores::fs::FsBlobStore;
use crate::stores::memory::MemoryRowStore;
use crate::stores::postgres::PgRowStore;
use crate::stores::{RowStore, StoreError};
use crate::time::SystemTime;

/// Creates both sheets with their headers, so they exist before the first
/// submission and can be shared with whoever reads them.
pub async fn bootstrap_sheets(
    rows: &(dyn RowStore + Send + Sync),
    sheets: &SheetNames,
) -> Result<(), StoreError> {
    rows.get_or_create_sheet(&sheets.rsvp, &RSVP_HEADER).await?;
    rows.get_or_create_sheet(&sheets.payment, &PAYMENT_HEADER).await?;
    Ok(())
}

async fn build_app<R>(config: &Config, rows: R) -> Router
where
    R: RowStore + Send + Sync + 'static,
{
    let sheets = config.sheet_names();
    bootstrap_sheets(&rows, &sheets)
        .await
        .expect("failed to create sheets");

    let redis: Arc<dyn Client + Send + Sync> = match &config.redis_url {
        Some(url) => {
            Arc::new(RedisClient::new(url.clone()).expect("failed to create redis client"))
        }
        None => {
            tracing::warn!("REDIS_URL is unset, rate limits only apply to this replica");
            Arc::new(LocalClient::new())
        }
    };

    let limiter = SubmissionLimiter::new(
        redis,
        Arc::new(SystemTime {}),
        config.redis_key_prefix.clone(),
        config.window_limits(),
    );

    let client_limiter = match config.client_limit_enabled {
        false => None,
        true => {
            let client_limiter = ClientLimiter::new(
                config.client_per_second_limit,
                config.client_burst_limit,
            );

            if config.export_prometheus {
                let client_limiter = client_limiter.clone();
                tokio::spawn(async move {
                    client_limiter.report_metrics().await;
                });
            }

            {
                // Ensure that the rate limiter state does not grow unbounded
                let client_limiter = client_limiter.clone();
                tokio::spawn(async move {
                    client_limiter.clean_state().await;
                });
            }
            Some(client_limiter)
        }
    };

    let blobs = FsBlobStore::new(
        &config.slip_storage_dir,
        &config.slip_folder,
        &config.public_base_url,
    );

    let metrics = match config.export_prometheus {
        true => Some(setup_metrics_recorder().expect("failed to install metrics recorder")),
        false => None,
    };

    router::router(
        SystemTime {},
        rows,
        blobs,
        limiter,
        client_limiter,
        sheets,
        Some(PathBuf::from(&config.slip_storage_dir)),
        config.max_body_bytes,
        metrics,
    )
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = match &config.database_url {
        Some(url) => {
            let rows = PgRowStore::new(url, config.max_pg_connections)
                .expect("failed to create postgres pool");
            rows.migrate().await.expect("failed to run migrations");
            build_app(&config, rows).await
        }
        None => {
            tracing::warn!("DATABASE_URL is unset, submissions are kept in memory only");
            build_app(&config, MemoryRowStore::new()).await
        }
    };

    tracing::info!(
        "listening on {:?}",
        listener.local_addr().expect("listener has no local address")
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .expect("failed to start serving")
}
