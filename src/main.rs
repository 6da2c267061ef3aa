use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use pcforge_api::adapters::payment::RestPaymentGateway;
use pcforge_api::adapters::shipping::RestShippingCarrier;
use pcforge_api::config;
use pcforge_api::db;
use pcforge_api::events;
use pcforge_api::services::shipping_queue::ShippingQueue;
use pcforge_api::{app, AppState};

const EVENT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    info!(environment = %cfg.environment, "starting pcforge-api");

    let db = Arc::new(
        db::establish_connection_from_app_config(&cfg)
            .await
            .context("failed to connect to database")?,
    );
    if cfg.auto_migrate {
        db::init_schema(&db).await.context("schema init failed")?;
    }

    let (event_sender, event_rx) = events::channel(EVENT_BUFFER);
    tokio::spawn(events::process_events(event_rx));

    let gateway = Arc::new(
        RestPaymentGateway::new(
            cfg.gateway.base_url.clone(),
            cfg.gateway.key_id.clone(),
            cfg.gateway.key_secret.clone(),
            Duration::from_secs(cfg.gateway.timeout_secs),
        )
        .map_err(|e| anyhow::anyhow!("payment gateway init: {e}"))?,
    );
    let carrier = Arc::new(
        RestShippingCarrier::new(
            cfg.carrier.base_url.clone(),
            cfg.carrier.email.clone(),
            cfg.carrier.password.clone(),
            Duration::from_secs(cfg.carrier.timeout_secs),
        )
        .map_err(|e| anyhow::anyhow!("shipping carrier init: {e}"))?,
    );

    let shipping_queue = ShippingQueue::start(
        db.clone(),
        carrier.clone(),
        &cfg.carrier,
        event_sender.clone(),
    );

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let state = Arc::new(AppState::new(
        db,
        cfg,
        gateway,
        carrier,
        shipping_queue,
        event_sender,
    ));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");

    axum::serve(listener, app(state))
        .await
        .context("server error")?;
    Ok(())
}
