//! Inferscale controller - autoscaling for AI inference workloads

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{routing::get, Router};
use clap::Parser;
use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, CustomResourceExt};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use inferscale::controller::{error_policy, reconcile, Context};
use inferscale::crd::AutoscalerPolicy;
use inferscale::metrics::{exporter, MetricsSource, PrometheusSource};
use inferscale::scaling::{default_registry, plugin};

/// Inferscale - declarative autoscaling operator for AI inference workloads
#[derive(Parser, Debug)]
#[command(name = "inferscale", version, about, long_about = None)]
struct Cli {
    /// Generate the CRD manifest and exit
    #[arg(long)]
    crd: bool,

    /// The address the metric endpoint binds to
    #[arg(long, default_value = "0.0.0.0:8080")]
    metrics_bind_address: SocketAddr,

    /// The address the probe endpoint binds to
    #[arg(long, default_value = "0.0.0.0:8081")]
    health_probe_bind_address: SocketAddr,

    /// Enable leader election for the controller manager
    #[arg(long)]
    leader_elect: bool,

    /// The address of the Prometheus server supplying scaling signals
    #[arg(long, default_value = "http://prometheus:9090")]
    metrics_source_address: String,

    /// Directory containing custom algorithm plugins (shared objects)
    #[arg(long)]
    plugin_dir: Option<PathBuf>,
}

/// Names in `after` that are not in `before`
fn list_diff(before: &[String], after: &[String]) -> Vec<String> {
    after
        .iter()
        .filter(|name| !before.contains(name))
        .cloned()
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        // Generate CRD YAML
        let crd = serde_yaml::to_string(&AutoscalerPolicy::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    tracing::info!("Inferscale controller starting...");

    if cli.leader_elect {
        // Election is delegated to the deployment environment; a single
        // active controller is assumed in this build.
        tracing::warn!(
            "leader election is not performed by this build; running as the sole active controller"
        );
    }

    // Load custom algorithm plugins before the controller starts; the
    // registry only accepts writes during startup.
    let registry = default_registry();
    if let Some(plugin_dir) = &cli.plugin_dir {
        tracing::info!(directory = %plugin_dir.display(), "loading custom algorithm plugins");
        let before = registry.list();
        if let Err(e) = plugin::load_and_register(plugin_dir, &registry) {
            tracing::error!(error = %e, "failed to load some plugins, continuing with available algorithms");
        }
        let after = registry.list();
        tracing::info!(algorithms = ?list_diff(&before, &after), "algorithms added by plugins");
        tracing::info!(algorithms = ?after, "registered algorithms");
    }

    // Create the metrics source for scaling signals
    let metrics_source: Option<Arc<dyn MetricsSource>> = if cli.metrics_source_address.is_empty() {
        None
    } else {
        match PrometheusSource::new(cli.metrics_source_address.clone()) {
            Ok(source) => {
                tracing::info!(address = %cli.metrics_source_address, "metrics source configured");
                Some(Arc::new(source))
            }
            Err(e) => {
                tracing::error!(error = %e, "unable to create metrics source, continuing without metrics");
                None
            }
        }
    };

    // Create Kubernetes client
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    let ctx = Arc::new(Context::new(client.clone(), metrics_source));

    // Serve controller metrics
    let metrics_router = Router::new().route("/metrics", get(|| async { exporter::render() }));
    let metrics_addr = cli.metrics_bind_address;
    tracing::info!(addr = %metrics_addr, "metrics endpoint listening");
    let metrics_server = tokio::spawn(async move {
        match tokio::net::TcpListener::bind(metrics_addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, metrics_router).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to bind metrics endpoint"),
        }
    });

    // Serve health probes
    let health_router = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }));
    let probe_addr = cli.health_probe_bind_address;
    tracing::info!(addr = %probe_addr, "health probe endpoint listening");
    let health_server = tokio::spawn(async move {
        match tokio::net::TcpListener::bind(probe_addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, health_router).await {
                    tracing::error!(error = %e, "health probe server error");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to bind health probe endpoint"),
        }
    });

    tracing::info!("Starting AutoscalerPolicy controller...");

    let policies: Api<AutoscalerPolicy> = Api::all(client);
    Controller::new(policies, WatcherConfig::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(action) => {
                    tracing::debug!(?action, "Reconciliation completed");
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Reconciliation error");
                }
            }
        })
        .await;

    metrics_server.abort();
    health_server.abort();

    tracing::info!("Inferscale controller shutting down");
    Ok(())
}
