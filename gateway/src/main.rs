use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use clap::{Parser, Subcommand};
use http::{
    HeaderName, HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE, RANGE},
};
use tokio::net::TcpListener;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use anyhow::anyhow;

use tts_gateway::{
    ServerConfig,
    core::{AdmissionMode, SystemClock, VoiceRegistry},
    routes,
    state::AppState,
    store::open_store,
};

/// TTS Gateway - authenticated, rate-limited speech synthesis proxy
#[derive(Parser, Debug)]
#[command(name = "tts-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run (defaults to `serve`)
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP server
    Serve,

    /// Create the database schema and install the default voices
    InitDb,
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(config_path) => {
            println!("Loading configuration from {}", config_path.display());
            ServerConfig::from_file(&config_path).map_err(|e| anyhow!(e.to_string()))
        }
        None => ServerConfig::from_env().map_err(|e| anyhow!(e.to_string())),
    }
}

async fn init_db(config: &ServerConfig) -> anyhow::Result<()> {
    let store = open_store(&config.db_path, Arc::new(SystemClock))
        .map_err(|e| anyhow!("Failed to open store at {}: {}", config.db_path.display(), e))?;
    let added = VoiceRegistry::new(store)
        .seed_defaults()
        .await
        .map_err(|e| anyhow!("Failed to seed default voices: {}", e))?;
    println!(
        "Database ready at {} ({} default voice(s) added)",
        config.db_path.display(),
        added
    );
    Ok(())
}

fn allowed_headers() -> [HeaderName; 6] {
    [
        CONTENT_TYPE,
        AUTHORIZATION,
        RANGE,
        HeaderName::from_static("x-api-key"),
        HeaderName::from_static("x-request-id"),
        HeaderName::from_static("x-admin-token"),
    ]
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers(allowed_headers())
        .expose_headers([
            HeaderName::from_static("x-request-id"),
            HeaderName::from_static("x-gen-duration"),
        ]);

    match origins {
        Some("*") => base.allow_origin(Any).allow_credentials(false),
        Some(list) => {
            // Parse comma-separated origins
            let origins: Vec<HeaderValue> = list
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            base.allow_origin(origins).allow_credentials(false)
        }
        None => {
            info!(
                "CORS not configured, defaulting to same-origin only. \
                 Set ALLOWED_ORIGINS to enable cross-origin access."
            );
            base
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let config = load_config(cli.config)?;

    if let Some(Commands::InitDb) = cli.command {
        return init_db(&config).await;
    }

    if config.admission == AdmissionMode::CheckOnly {
        warn!("ADMISSION_MODE=check_only: concurrent requests may exceed rate limits and quotas");
    }
    if !config.has_admin_token() {
        warn!("TTS_ADMIN_TOKEN not set; /v1/admin endpoints will reject every request");
    }

    let address = config.address();
    let tls_config = config.tls.clone();
    let ip_rate_limit = config
        .ip_rate_limit_rps
        .map(|rps| (rps, config.ip_rate_limit_burst));
    let cors = cors_layer(config.cors_allowed_origins.as_deref());
    println!("Starting server on {address}");

    let app_state = AppState::new(config)
        .await
        .map_err(|e| anyhow!("Failed to initialize application state: {}", e))?;

    // Per-IP throttling, only when configured
    let governor_layer = match ip_rate_limit {
        Some((rps, burst)) => {
            let governor_config = GovernorConfigBuilder::default()
                .per_second(u64::from(rps))
                .burst_size(burst)
                .key_extractor(SmartIpKeyExtractor)
                .finish()
                .ok_or_else(|| anyhow!("Invalid per-IP rate limit configuration"))?;
            info!(rps, burst, "Per-IP rate limiting enabled");
            Some(GovernorLayer::new(governor_config))
        }
        None => None,
    };

    // Security headers
    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("timing-allow-origin"),
            HeaderValue::from_static("*"),
        ));

    let app: Router = routes::api::create_api_router(app_state)
        .layer(cors)
        .layer(tower::util::option_layer(governor_layer))
        .layer(security_headers);

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    if let Some(tls) = tls_config {
        let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
            .await
            .map_err(|e| {
                anyhow!(
                    "Failed to load TLS certificates from {} and {}: {}",
                    tls.cert_path.display(),
                    tls.key_path.display(),
                    e
                )
            })?;

        println!("Server listening on https://{} (TLS enabled)", socket_addr);

        axum_server::bind_rustls(socket_addr, rustls_config)
            .serve(app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|e| anyhow!("TLS server error: {}", e))?;
    } else {
        println!("Server listening on http://{}", socket_addr);

        let listener = TcpListener::bind(&socket_addr).await?;
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
    }

    Ok(())
}
