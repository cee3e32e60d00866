use api_rest::AppState;
use phcare_core::core_config_from_lookup;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the PHCare patients service.
///
/// Resolves configuration from the environment, connects the configured storage backend, and
/// serves the REST API (with OpenAPI/Swagger UI).
///
/// # Environment Variables
/// - `PHCARE_BACKEND`: "aws" (default) or "local"
/// - `STORAGE_PATIENTS_NAME`: DynamoDB table of patient records (required for aws)
/// - `STORAGE_EHRDOCS_BUCKETNAME`: S3 bucket for clinical documents (required for aws)
/// - `PHCARE_UPLOAD_PREFIX`: key prefix of uploaded documents (default: "public")
/// - `PHCARE_WRITE_ROLE`: group claim required for writes (default: "Doctor")
/// - `PATIENT_DATA_DIR`: root of the local file store (default: "patient_data")
/// - `PHCARE_LOCAL_UPLOAD_URL`: base of local development upload links
/// - `PHCARE_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `PHCARE_GROUPS_HEADER`: header carrying group claims (default: "x-caller-groups")
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If configuration, backend setup, or the server fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("phcare_run=info".parse()?)
                .add_directive("phcare_core=info".parse()?)
                .add_directive("phcare_storage=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("PHCARE_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = core_config_from_lookup(|name| std::env::var(name).ok())?;
    tracing::info!(
        backend = ?cfg.backend(),
        write_role = cfg.write_role(),
        upload_prefix = cfg.upload_prefix(),
        "++ Starting PHCare REST on {}",
        rest_addr
    );

    let handler = phcare_storage::connect(&cfg).await?.into_handler(&cfg);

    let mut state = AppState::new(handler);
    if let Ok(header) = std::env::var("PHCARE_GROUPS_HEADER") {
        state = state.with_groups_header(&header)?;
    }

    api_rest::serve(&rest_addr, state).await?;
    Ok(())
}
