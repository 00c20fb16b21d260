use anyhow::Context;
use parkline_api::{app, AppState};
use parkline_billing::BillingCalculator;
use parkline_core::{Notifier, SensorFeed};
use parkline_engine::{ReconciliationPoller, SlotService};
use parkline_store::app_config::Config;
use parkline_store::{BlynkClient, DbClient, MailRelayNotifier, SqliteLedger, WhatsAppNotifier};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parkline_api=debug,parkline_engine=info,parkline_store=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Parkline API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to open database")?;
    db.migrate().await.context("Failed to run migrations")?;

    let ledger = Arc::new(SqliteLedger::new(&db, BillingCalculator::new(config.billing.clone())));
    let timeout = config.notifications.timeout();

    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    let blynk = match &config.blynk {
        Some(blynk_config) => {
            let client = Arc::new(BlynkClient::new(blynk_config, timeout).context("Failed to build Blynk client")?);
            notifiers.push(client.clone());
            tracing::info!("Blynk sensor feed enabled ({})", blynk_config.server);
            Some(client)
        }
        None => {
            tracing::warn!("Blynk credentials not found, sensor sync and event log disabled");
            None
        }
    };

    match &config.whatsapp {
        Some(whatsapp_config) => {
            notifiers.push(Arc::new(
                WhatsAppNotifier::new(whatsapp_config, timeout).context("Failed to build WhatsApp client")?,
            ));
            tracing::info!("WhatsApp notifications enabled");
        }
        None => tracing::warn!("WhatsApp credentials not found, WhatsApp notifications disabled"),
    }

    match &config.mail {
        Some(mail_config) => {
            notifiers.push(Arc::new(
                MailRelayNotifier::new(mail_config, timeout).context("Failed to build mail client")?,
            ));
            tracing::info!("Email notifications enabled");
        }
        None => tracing::warn!("Mail relay not configured, email notifications disabled"),
    }

    let sensor: Option<Arc<dyn SensorFeed>> = blynk.map(|client| client as Arc<dyn SensorFeed>);

    let poller = sensor.clone().map(|sensor| {
        Arc::new(ReconciliationPoller::new(
            ledger.clone(),
            sensor,
            config.poller.interval(),
        ))
    });

    let poller_task = match (&poller, config.poller.enabled) {
        (Some(poller), true) => Some(poller.clone().spawn()),
        (Some(_), false) => {
            tracing::warn!("Background sensor polling disabled by config");
            None
        }
        (None, _) => None,
    };

    let service = Arc::new(SlotService::new(ledger, sensor, notifiers, timeout));
    let app = app(AppState { service, poller });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(task) = poller_task {
        task.abort();
    }
    tracing::info!("Parkline API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}
