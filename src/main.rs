use amplipost::{AppState, StartupError, config::Config, routes, telemetry};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!(".env not loaded: {e}");
    }
    telemetry::init();

    let config = Config::from_env().map_err(StartupError::from)?;
    let app_state = AppState::from_config(&config)?;

    let listener = tokio::net::TcpListener::bind(&config.host).await?;
    tracing::info!(host = %config.host, "listening");

    let app = routes::build_router(app_state, &config.static_dir);

    axum::serve(listener, app).await?;
    Ok(())
}
