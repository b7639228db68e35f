use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::AppState;
use smart_core::{ConfigValues, SmartConfig, SmartService};

/// Main entry point for the SMART client web application
///
/// Resolves configuration from the environment once, then serves the browser-facing
/// routes and Swagger UI.
///
/// # Environment Variables
/// - `SMART_REST_ADDR`: server address (default: "0.0.0.0:3000")
/// - `SMART_CLIENT_ID`: OAuth client id (required)
/// - `SMART_ENV`: `development` or `production`, selecting the redirect URI
/// - other `SMART_*` variables override the sandbox endpoints and fetched resources
///
/// # Errors
/// Returns an error if:
/// - the configuration is missing or invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smart_run=info".parse()?)
                .add_directive("smart_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = Arc::new(SmartConfig::resolve(ConfigValues::from_env())?);
    let rest_addr = std::env::var("SMART_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    tracing::info!("++ Starting SMART client on {}", rest_addr);
    tracing::info!(
        "++ Environment {:?}, redirect URI {}, FHIR base {}",
        cfg.environment(),
        cfg.redirect_uri(),
        cfg.fhir_base_url()
    );

    let service = SmartService::new(cfg)?;
    let app = api_rest::router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
