//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, InMemorySessionStore, OpenAiContentAdapter},
    config::Config,
    error::ApiError,
    web::{self, cookie::SessionCookie, rest::ApiDoc, state::AppState},
};
use axum::{
    http::{
        header::{ACCEPT, CONTENT_TYPE},
        HeaderValue, Method,
    },
    Router,
};
use std::sync::Arc;
use study_gate_core::{flow::StudyFlow, ports::CodeStore, ports::SeedOutcome};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = DbAdapter::connect(&config.database_url).await?;
    let db_adapter = DbAdapter::new(db_pool, config.code_spec)
        .with_export_path(config.codes_export_path.clone());
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Seed the Code Pool ---
    match db_adapter.initialize().await? {
        SeedOutcome::Generated(count) => info!(
            "Generated {} access codes, exported to {}",
            count,
            config.codes_export_path.display()
        ),
        SeedOutcome::AlreadySeeded => info!("Access code pool already seeded."),
    }
    let stats = db_adapter.stats().await?;
    info!("Access codes: {} total, {} used", stats.total, stats.used);

    // --- 4. Initialize Service Adapters ---
    if config.content_api_key.is_none() {
        info!("GROQ_API_KEY is not set; content requests will fail until it is configured.");
    }
    let content_adapter = Arc::new(OpenAiContentAdapter::new(
        config.content_api_key.as_deref(),
        &config.content_api_base,
        config.content_model.clone(),
    ));

    let flow = StudyFlow::new(Arc::new(db_adapter), content_adapter)
        .with_question_count(config.question_count)
        .with_content_timeout(config.content_timeout);

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        flow,
        sessions: Arc::new(InMemorySessionStore::new(config.session_ttl)),
        cookie: SessionCookie::new(
            &config.session_secret,
            config.cookie_secure,
            config.session_ttl,
        ),
    });

    let origin = HeaderValue::from_str(&config.cors_origin).map_err(|e| {
        ApiError::Internal(format!("Invalid CORS origin '{}': {}", config.cors_origin, e))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    let app = Router::new()
        .merge(web::router(app_state).layer(cors))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
