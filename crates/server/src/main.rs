use std::{net::SocketAddr, path::PathBuf, str::FromStr};

use anyhow::anyhow;
use axum::serve;
use futures::TryFutureExt;
use log::{error, info};
use sprinklerd::{
    app, build_app_state, get_config_info, get_log_level, prepare_persistence_dir,
    run_persistence, setup_logger,
};
use tokio::{net::TcpListener, signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = get_config_info();
    let log_level = get_log_level(&cli);

    setup_logger()
        .level(log_level)
        .level_for("sprinklerd", log_level)
        .level_for("http_response", log_level)
        .level_for("http_request", log_level)
        .apply()?;

    let host = cli.host();
    let port = cli.port();
    let persistence_dir = PathBuf::from(cli.persistence_dir());

    let socket_addr = SocketAddr::from_str(&format!("{}:{}", host, port))
        .map_err(|e| anyhow!("invalid address: {}", e))?;

    let listener = TcpListener::bind(socket_addr)
        .map_err(|e| anyhow!("error binding to socket: {}", e))
        .await?;

    info!("sprinklerd starting...");
    info!("  Listen: http://{}", socket_addr);
    info!("  Docs:   http://{}/docs", socket_addr);
    info!("  Persistence: {} ({})", persistence_dir.display(), if cli.local_persistence() { "enabled" } else { "disabled" });

    let app_state = build_app_state(&cli).map_err(|e| {
        error!("error building app: {}", e);
        e
    })?;

    if cli.local_persistence() {
        prepare_persistence_dir(&persistence_dir)?;
        app_state.store.restore_from(&persistence_dir).await;
        tokio::spawn(run_persistence(
            app_state.store.clone(),
            persistence_dir.clone(),
            cli.persist_interval(),
        ));
    }

    let app = app(app_state.clone());

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if cli.local_persistence() {
        info!("persisting observations before shutdown");
        if let Err(e) = app_state.store.persist_to(&persistence_dir).await {
            error!("final observation persistence failed: {}", e);
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
