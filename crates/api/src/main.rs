use agroflow_api::app::AppConfig;

#[tokio::main]
async fn main() {
    agroflow_observability::init();

    let config = AppConfig::from_env();
    if config.google_maps_api_key.is_none() {
        tracing::warn!("GOOGLE_MAPS_API_KEY not set; route processing will be rejected");
    }

    let app = agroflow_api::app::build_app(&config);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.bind_addr));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
