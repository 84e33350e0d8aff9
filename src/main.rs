use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wemorize::{
    AppState, AuthTokenRepoState, InMemoryAuthTokenRepository, InMemorySessionRepository,
    InMemoryUserRepository, LogMailer, MailerState, SessionRepoState, UserRepoState,
    config::{AppConfig, Env},
    create_router,
};

/// main
///
/// Loads configuration, initialises logging, wires the in-memory collaborators into the
/// shared state and serves the router with client addresses attached.
#[tokio::main]
async fn main() -> ExitCode {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("FATAL: invalid configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    // 2. Logging Filter Setup
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "wemorize=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!(
        instance = %config.instance_name,
        base_url = %config.base_url,
        registration = config.enable_registration,
        "Application starting in {:?} mode",
        config.env
    );

    // 4. Unified State Assembly
    let listen_addr = config.listen_addr.clone();
    let app_state = AppState {
        sessions: Arc::new(InMemorySessionRepository::new()) as SessionRepoState,
        auth_tokens: Arc::new(InMemoryAuthTokenRepository::new()) as AuthTokenRepoState,
        users: Arc::new(InMemoryUserRepository::new()) as UserRepoState,
        mailer: Arc::new(LogMailer) as MailerState,
        config,
    };

    // 5. Router and Server Startup
    let app = create_router(app_state);

    let listener = match TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %listen_addr, error = %err, "Could not bind listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Listening on {}", listen_addr);

    // Sessions are bound to the client address, so the server must expose it.
    if let Err(err) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!(error = %err, "Server terminated");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
