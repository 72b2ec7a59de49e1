/*
 * 5D Labs Agent Platform - Bare Metal Remediation
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! Remediation controller - reboots unhealthy bare metal hosts
//!
//! Watches `Metal3Remediation` resources, raises reboot markers on the backing
//! `BareMetalHost` and marks the host unhealthy once retries are exhausted.

use clap::Parser;
use remediation::{run_remediation_controller, RemediationConfig};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "remediation-controller")]
#[command(about = "Reboot-based remediation for bare metal hosts", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the mounted configuration file
    #[arg(long, env = "REMEDIATION_CONFIG", default_value = "/config/config.yaml")]
    config: String,

    /// Namespace to watch
    #[arg(long, env = "NAMESPACE", default_value = "default")]
    namespace: String,
}

fn load_config(path: &str) -> anyhow::Result<RemediationConfig> {
    let config = match RemediationConfig::from_mounted_file(path) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration, using defaults: {}", e);
            RemediationConfig::default()
        }
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,remediation=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!(
        "Starting remediation controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config(&args.config)?;
    let namespace = config.namespace(&args.namespace).to_string();

    let client = kube::Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    tokio::select! {
        result = run_remediation_controller(client, namespace, config) => {
            result?;
        }
        () = shutdown_signal() => {}
    }

    info!("Remediation controller stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }
}
