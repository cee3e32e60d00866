//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API against an in-memory patient store and development upload links.
//!
//! ## Intended use
//! Useful for development and for trying the API through Swagger UI without AWS credentials.
//! Nothing survives a restart. The workspace's main `phcare-run` binary serves the same router
//! against the configured backend.

use api_rest::AppState;
use phcare_core::config::env;
use phcare_core::{
    core_config_from_lookup, InMemoryPatientStore, LocalUploadSigner, PatientsHandler,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the development REST API server.
///
/// # Environment Variables
/// - `PHCARE_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `PHCARE_WRITE_ROLE`, `PHCARE_UPLOAD_PREFIX`, `PHCARE_LOCAL_UPLOAD_URL`: as for `phcare-run`
/// - `PHCARE_GROUPS_HEADER`: header carrying group claims (default: "x-caller-groups")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the configuration is invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("phcare_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("PHCARE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = core_config_from_lookup(|name| match name {
        env::BACKEND => Some("local".into()),
        _ => std::env::var(name).ok(),
    })?;

    tracing::info!("-- Starting PHCare REST API (in-memory) on {}", addr);

    let handler = PatientsHandler::new(
        &cfg,
        Arc::new(InMemoryPatientStore::new()),
        Arc::new(LocalUploadSigner::new(cfg.local_upload_url())?),
    );

    let mut state = AppState::new(handler);
    if let Ok(header) = std::env::var("PHCARE_GROUPS_HEADER") {
        state = state.with_groups_header(&header)?;
    }

    api_rest::serve(&addr, state).await?;
    Ok(())
}
