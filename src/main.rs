//! `docflow-tail` entry point.
//!
//! Connects to the real-time server, subscribes to the shared channels and
//! logs every event until Ctrl-C.

use tracing_subscriber::EnvFilter;

use docflow_realtime::{ClientConfig, Credential, PresenceStatus, RealtimeClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("REALTIME_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = ClientConfig::from_env()?;
    let credential = std::env::var("REALTIME_TOKEN").ok().map(Credential::from);
    tracing::info!(url = %config.server_url, transport = %config.transport, "starting docflow-tail");

    let client = RealtimeClient::from_config(config)?;

    // Log connection indicator changes
    let mut states = client.state_changes();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            tracing::info!(%state, "connection state");
        }
    });

    client.connect(credential).await?;

    client.subscribe_to_activity_feed(|event| {
        tracing::info!(
            id = %event.id,
            user = %event.user_id,
            action = %event.action,
            resource = event.resource_type.as_deref().unwrap_or("-"),
            "activity"
        );
    });
    client.subscribe_to_document_status(|update| {
        tracing::info!(
            document = %update.document_id,
            status = %update.status,
            previous = update.previous_status.as_deref().unwrap_or("-"),
            "document status"
        );
    });
    client.subscribe_to_user_presence(|update| {
        tracing::info!(user = %update.user_id, status = ?update.status, "presence");
    });
    if let Ok(user_id) = std::env::var("REALTIME_USER_ID") {
        client.subscribe_to_notifications(&user_id, |notification| {
            tracing::info!(
                id = %notification.id,
                kind = notification.kind.as_deref().unwrap_or("-"),
                message = %notification.message,
                "notification"
            );
        });
    }
    if let Ok(department) = std::env::var("REALTIME_DEPARTMENT") {
        client.subscribe_to_department(&department, |broadcast| {
            tracing::info!(
                kind = broadcast.kind.as_deref().unwrap_or("-"),
                message = broadcast.message.as_deref().unwrap_or("-"),
                "department broadcast"
            );
        });
    }
    client.update_presence(PresenceStatus::Online);

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    client.update_presence(PresenceStatus::Offline);
    client.disconnect();

    Ok(())
}
