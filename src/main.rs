use std::sync::Arc;

use referral_notifier::{
    app,
    config::load_config,
    service::NotificationService,
    smtp::{Mailer, SmtpNotifier, StartTlsConnector},
};

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt::init();

    // Config
    let config = load_config().expect("failed to load configuration");
    if let Err(e) = config.smtp.validate() {
        // Requests still get a 500 with this error until the env is fixed.
        tracing::warn!("{e}");
    }

    // Service creation
    let connector = StartTlsConnector::new().expect("failed to build TLS client config");
    let mailer: Arc<dyn Mailer> = Arc::new(SmtpNotifier::new(config.smtp, connector));
    let service = NotificationService::new(mailer, config.recipients);

    // Router config
    let router = app(Arc::new(service), config.server.request_timeout);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.server.port))
        .await
        .expect("failed to bind listener");

    // Starting router
    tracing::info!(
        "Started listening on {}",
        listener.local_addr().expect("listener has no local address")
    );
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("failed to start server");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
