//! # canopy - command-line entry point
//!
//! - `canopy reconcile --fixture world.yaml [--config canopy.toml] [--passes N]` seeds an
//!   in-memory world from the fixture, runs passes and prints the parents as JSON.
//! - `canopy check-config canopy.toml` validates a reconciler configuration.
//!
//! Ctrl+C cancels the pass in flight; the world is still printed as it stands.
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info` on stderr, so stdout only
//! carries the JSON result.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use canopy::cli::{Cli, Commands};
use canopy::{Fixture, World};
use canopy_reconciler::{ReconcileContext, ReconcilerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Reconcile {
            fixture,
            config,
            passes,
            children,
        } => {
            let config = load_config(config.as_deref())?;
            let fixture = Fixture::from_file(&fixture)
                .with_context(|| format!("Failed to load fixture {}", fixture.display()))?;

            let token = CancellationToken::new();
            tokio::spawn(cancel_on_ctrl_c(token.clone()));
            let ctx = ReconcileContext::with_token(token);

            let start_time = Instant::now();
            let world = fixture
                .run(&ctx, config, passes)
                .await
                .context("Failed to start reconciler")?;
            info!(
                parents = world.parents.len(),
                failures = world.failures,
                "Finished in {:?}",
                start_time.elapsed()
            );
            if world.failures > 0 {
                warn!(failures = world.failures, "Some passes failed; see the parent conditions");
            }
            print_world(&world, children)
        }
        Commands::CheckConfig { path } => {
            let config = ReconcilerConfig::from_file(&path)
                .with_context(|| format!("Invalid configuration {}", path.display()))?;
            println!(
                "{}",
                serde_json::to_string_pretty(&config).context("Failed to render configuration")?
            );
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Cancel in-flight passes on Ctrl+C.
async fn cancel_on_ctrl_c(token: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, cancelling reconciliation");
            token.cancel();
        }
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}

fn load_config(path: Option<&Path>) -> Result<ReconcilerConfig> {
    match path {
        Some(path) => ReconcilerConfig::from_file(path)
            .with_context(|| format!("Invalid configuration {}", path.display())),
        None => Ok(ReconcilerConfig::default()),
    }
}

fn print_world(world: &World, with_children: bool) -> Result<()> {
    let rendered = if with_children {
        serde_json::to_string_pretty(world)
    } else {
        serde_json::to_string_pretty(&world.parents)
    }
    .context("Failed to render result")?;
    println!("{rendered}");
    Ok(())
}
