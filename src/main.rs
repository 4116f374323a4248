use anyhow::Result;
use photo_gateway::{
    AppState, app,
    config::{AppConfig, Mode, StoreBackend},
    services::{
        file_service::FileService,
        key_scheme::PublicUrls,
        token_service::{TokenService, TokenValidator},
    },
    store::{MemoryObjectStore, ObjectStore, S3ObjectStore, s3::STORE_HOST},
};
use std::{io::ErrorKind, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    if let Mode::IssueToken {
        user_id,
        ttl_minutes,
    } = mode
    {
        let key = cfg
            .jwt_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("JWT_KEY must be set to issue tokens"))?;
        let token = TokenService::new(key)
            .generate_access_token(user_id, chrono::Duration::minutes(ttl_minutes))?;
        println!("{token}");
        return Ok(());
    }

    tracing::info!("Starting photo-gateway with config: {:?}", cfg);

    // --- Object store ---
    let store: Arc<dyn ObjectStore> = match cfg.backend {
        StoreBackend::S3 => Arc::new(S3ObjectStore::new(&cfg.s3)),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory object store; uploads are lost on restart");
            Arc::new(MemoryObjectStore::new())
        }
    };

    let files = FileService::new(
        store,
        PublicUrls::new(cfg.s3.bucket.clone(), STORE_HOST),
        cfg.allowed_extensions.clone(),
    );

    let auth = cfg.jwt_key.as_deref().map(|key| {
        tracing::info!("Bearer authentication enabled for file routes");
        Arc::new(TokenService::new(key)) as Arc<dyn TokenValidator>
    });

    let router = app(AppState { files, auth }, cfg.max_upload_bytes);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
