use axum::routing::get;

const DEFAULT_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bizhub::telemetry::init_tracing();

    let metrics = bizhub::telemetry::setup_metrics_recorder()?;
    let state = bizhub::initialize_state().await?;

    let app = bizhub::app(state)
        // `GET /metrics` renders the Prometheus exposition format.
        .route("/metrics", get(move || async move { metrics.render() }));

    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let listener =
        tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;

    tracing::info!(%port, "server started");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install ctrl-c handler");
    }
}
