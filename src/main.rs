#![warn(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::single_match_else, clippy::missing_errors_doc)]

use crate::{
    config::RuntimeConfiguration, routes::router, state::TallyState, store::postgres::PgStore,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, process::ExitCode, sync::Arc};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[macro_use]
extern crate tracing;

mod config;
mod data;
mod error;
mod extract;
mod routes;
mod state;
mod store;

async fn shutdown_signal(store: Arc<PgStore>) {
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
        () = ctrl_c => {},
        () = terminate => {},
    }

    warn!("signal received, starting graceful shutdown");
    store.sensible_shutdown().await;
}

enum Command {
    Serve,
    Reset,
}

impl Command {
    fn from_args() -> Option<Self> {
        match env::args().nth(1).as_deref() {
            None | Some("serve") => Some(Self::Serve),
            Some("reset") => Some(Self::Reset),
            Some(_) => None,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv_result = dotenvy::dotenv();

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish(),
    )
    .expect("unable to set tracing subscriber");

    info!("`tracing` online");
    if let Err(e) = dotenv_result {
        warn!(?e, "unable to load .env, using the process environment");
    }

    let Some(command) = Command::from_args() else {
        error!("usage: tally [serve|reset]");
        return ExitCode::FAILURE;
    };

    let config = RuntimeConfiguration::new().expect("unable to create config");
    let store = Arc::new(
        PgStore::connect(PgPoolOptions::new(), &config.db_config())
            .await
            .expect("unable to open database"),
    );

    if matches!(command, Command::Reset) {
        let result = store.reset().await;
        store.sensible_shutdown().await;
        return match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(?e, "Error resetting database");
                ExitCode::FAILURE
            }
        };
    }

    store.migrate().await.expect("unable to migrate database");

    let app = router()
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(TallyState::new(store.clone()));

    let server_ip = config.server_ip();
    let listener = TcpListener::bind(server_ip)
        .await
        .expect("unable to listen on server ip");

    info!(?server_ip, "Listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(store))
        .await
        .expect("unable to serve app");

    ExitCode::SUCCESS
}
