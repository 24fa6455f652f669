use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stampline_clients::{GeminiClient, GeminiConfig, SdWebUiClient, SdWebUiConfig};
use stampline_core::notify::NotificationSink;
use stampline_events::{EventBus, EventPersistence, LogNotifier, SlackConfig, SlackNotifier};
use stampline_pipeline::{EngineConfig, EngineContext, WorkflowEngine};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stampline_api::config::ServerConfig;
use stampline_api::router::build_app_router;
use stampline_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();

    // --- Tracing ---
    init_tracing(config.json_logs);
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    if let Some(dir) = config.database_dir() {
        std::fs::create_dir_all(&dir).expect("Failed to create database directory");
    }

    let pool = stampline_db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    stampline_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    stampline_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Generation clients ---
    let gemini_config = GeminiConfig::from_env().expect("GEMINI_API_KEY must be set");
    let prompts = Arc::new(GeminiClient::new(gemini_config).expect("Failed to build Gemini client"));

    let sd_config = SdWebUiConfig::from_env();
    let images = Arc::new(SdWebUiClient::new(sd_config).expect("Failed to build SD WebUI client"));
    if !images.ping().await {
        tracing::warn!("SD WebUI is not reachable; image stages will fail until it is");
    }

    // --- Notification sink ---
    let sink: Arc<dyn NotificationSink> = match SlackConfig::from_env() {
        Some(slack) => {
            tracing::info!(channel = %slack.channel_id, "Delivering notifications to Slack");
            Arc::new(SlackNotifier::new(slack).expect("Failed to build Slack client"))
        }
        None => {
            tracing::info!("SLACK_BOT_TOKEN not set, notifications go to the log only");
            Arc::new(LogNotifier)
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(EventPersistence::run(
        pool.clone(),
        event_bus.subscribe(),
    ));
    tracing::info!("Event persistence started");

    // --- Workflow engine ---
    let engine = WorkflowEngine::new(
        EngineContext {
            pool: pool.clone(),
            prompts,
            images,
            sink,
            events: Arc::clone(&event_bus),
        },
        engine_config,
    );

    match engine.resume_interrupted().await {
        Ok(handles) => tracing::info!(count = handles.len(), "Resumed interrupted sets"),
        Err(e) => tracing::error!(error = %e, "Failed to resume interrupted sets"),
    }

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine: engine.clone(),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // No new stages are accepted. Sets still generating when the process
    // exits are resumed on the next start.
    engine.shutdown();
    drop(engine);

    // Dropping the last bus sender closes the channel and ends persistence.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence_handle).await;
    tracing::info!("Graceful shutdown complete");
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "stampline_api=debug,stampline_pipeline=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wait for SIGINT or SIGTERM (on Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
