// SPDX-License-Identifier: MIT

//! `dmakrd` — the dmakr continuous-integration trigger daemon.

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match dmakr_daemon::Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "invalid configuration");
            std::process::exit(2);
        }
    };

    if let Err(err) = dmakr_daemon::run(config).await {
        tracing::error!(error = %err, "daemon failed");
        std::process::exit(1);
    }
}
