use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

use outreach::{
    application::{handlers::dispatcher::Dispatcher, services::delivery::DeliveryService},
    config::Config,
    infrastructure::{
        messaging::whatsapp::WhatsAppClient,
        repositories::postgres::{
            PostgresContactRepository, PostgresContentRepository, PostgresDeliveryLogRepository,
            PostgresScheduleRepository,
        },
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = Config::try_parse().map_err(anyhow::Error::msg)?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!().run(&pool).await?;

    let schedules = PostgresScheduleRepository::new(pool.clone());
    let contents = PostgresContentRepository::new(pool.clone());
    let contacts = PostgresContactRepository::new(pool.clone());
    let delivery_log = PostgresDeliveryLogRepository::new(pool.clone());

    let gateway = WhatsAppClient::new(
        config.whatsapp_api_token.clone(),
        config.whatsapp_phone_number_id.clone(),
    );
    let delivery = Arc::new(DeliveryService::new(gateway, delivery_log));

    let dispatcher = Arc::new(Dispatcher::new(schedules, contents, contacts, delivery));

    info!(
        batch_size = config.dispatch_batch_size,
        interval_secs = config.dispatch_interval_secs,
        "dispatch loop starting"
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.dispatch_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match dispatcher.run_cycle(config.dispatch_batch_size).await {
                    Ok(report) => {
                        if report.dispatched > 0 || report.failed > 0 {
                            info!(
                                dispatched = report.dispatched,
                                failed = report.failed,
                                "cycle complete"
                            );
                        }
                    }
                    Err(err) => error!(error = %err, "dispatch cycle failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                dispatcher.request_stop();
                break;
            }
        }
    }

    Ok(())
}
