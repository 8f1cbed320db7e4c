use std::sync::Arc;

use danci_mastery::config::Config;
use danci_mastery::db::StoreBackend;
use danci_mastery::logging::init_tracing;
use danci_mastery::mastery::MasteryEngine;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = init_tracing(&config.log_level, config.file_logs.as_ref());

    let store = match StoreBackend::open(&config.db).await {
        Ok(store) => store,
        Err(err) => {
            tracing::error!(error = %err, "failed to open stat store");
            std::process::exit(1);
        }
    };

    let engine = Arc::new(MasteryEngine::new(Arc::new(store), config.mastery.clone()));
    let app = danci_mastery::create_app_with(engine);

    let addr = config.bind_addr();
    tracing::info!(%addr, decay = config.mastery.decay, "mastery service listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(%addr, error = %err, "bind listener failed");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
