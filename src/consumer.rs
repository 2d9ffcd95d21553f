//! RabbitMQ consumer loop: pulls scan requests off the configured queue and
//! dispatches them onto a bounded pool of scan tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::RabbitMqConfig;
use crate::scan_orchestrator::{self, SharedResources};
use crate::scan_request::ScanRequest;

const RETRY_ATTEMPTS: u32 = crate::utils::constants::DEFAULT_RETRY_ATTEMPTS;
const RETRY_DELAY: Duration = Duration::from_secs(crate::utils::constants::DEFAULT_RETRY_DELAY_SECS);

/// Connects with a fixed retry policy; infra that never comes up after
/// `RETRY_ATTEMPTS` is treated as fatal (the process exits and relies on a
/// supervisor to restart it).
async fn connect_with_retry(config: &RabbitMqConfig) -> Result<Connection> {
    let url = config.connection_url();
    let mut last_err = None;

    for attempt in 1..=RETRY_ATTEMPTS {
        match Connection::connect(&url, ConnectionProperties::default()).await {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                warn!(attempt, error = %e, "rabbitmq connection attempt failed");
                last_err = Some(e);
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }

    Err(anyhow::anyhow!(
        "failed to connect to rabbitmq after {RETRY_ATTEMPTS} attempts: {}",
        last_err.map(|e| e.to_string()).unwrap_or_default()
    ))
}

async fn open_channel(conn: &Connection, config: &RabbitMqConfig, max_tabs: u16) -> Result<Channel> {
    let channel = conn.create_channel().await.context("failed to open amqp channel")?;
    channel
        .basic_qos(max_tabs, BasicQosOptions::default())
        .await
        .context("failed to set prefetch")?;
    channel
        .queue_declare(&config.url_queue, QueueDeclareOptions::default(), FieldTable::default())
        .await
        .context("failed to declare queue")?;
    Ok(channel)
}

/// Runs forever, consuming deliveries and dispatching each to a scan task.
/// `max_tabs` bounds both the AMQP prefetch and the number of scans that
/// may run concurrently.
pub async fn run(config: &RabbitMqConfig, max_tabs: usize, shared: SharedResources) -> Result<()> {
    let connection = connect_with_retry(config).await?;
    let channel = open_channel(&connection, config, max_tabs as u16).await?;

    let mut consumer = channel
        .basic_consume(
            &config.url_queue,
            "pagescan-worker",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("failed to start consuming")?;

    let permits = Arc::new(Semaphore::new(max_tabs));
    info!(queue = %config.url_queue, max_tabs, "consumer loop started");

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(d) => d,
            Err(e) => {
                error!(error = %e, "failed to receive delivery");
                continue;
            }
        };

        let request = match ScanRequest::from_bytes(&delivery.data, &shared.emulation) {
            Ok(req) => req,
            Err(e) => {
                warn!(error = %e, "rejecting malformed scan request");
                if let Err(e) = delivery.nack(BasicNackOptions { requeue: false, ..Default::default() }).await {
                    error!(error = %e, "failed to nack malformed delivery");
                }
                continue;
            }
        };

        let permit = permits.clone().acquire_owned().await.expect("semaphore never closed");
        let shared = shared.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let url = request.url.clone();
            match scan_orchestrator::run_scan(request, shared).await {
                Ok(()) => {
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        error!(error = %e, url, "failed to ack completed scan");
                    }
                }
                Err(e) => {
                    warn!(error = %e, url, "scan failed; requeuing");
                    if let Err(e) = delivery.nack(BasicNackOptions { requeue: true, ..Default::default() }).await {
                        error!(error = %e, url, "failed to nack failed scan");
                    }
                }
            }
        });
    }

    Ok(())
}
