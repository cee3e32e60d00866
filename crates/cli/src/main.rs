use clap::{Parser, Subcommand};
use http::Method;
use phcare_core::config::env;
use phcare_core::{
    core_config_from_lookup, ApiRequest, ApiResponse, CallerIdentity, GatewayEvent,
    PatientsHandler,
};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "phcare")]
#[command(about = "PHCare patients service CLI")]
struct Cli {
    /// Storage backend ("aws" or "local")
    #[arg(long, global = true, env = "PHCARE_BACKEND")]
    backend: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one API Gateway proxy event through the handler and print the response envelope
    Invoke {
        /// Path to the event JSON, or "-" for stdin
        #[arg(long)]
        event: PathBuf,
    },
    /// List patients, optionally filtered by a name substring
    List {
        /// Case-sensitive substring of FirstName or LastName
        #[arg(long, short)]
        query: Option<String>,
    },
    /// Show one patient
    Get {
        /// Patient identifier
        id: String,
    },
    /// Issue an upload link for a patient document
    UploadLink {
        /// Patient identifier
        id: String,
        /// Original file name
        file_name: String,
        /// MIME type of the document
        file_type: String,
        /// Group claims to act with
        #[arg(long, env = "PHCARE_CLI_GROUPS", default_value = "Doctor")]
        groups: String,
    },
}

fn read_event(path: &Path) -> std::io::Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin().read_to_string(&mut raw)?;
        Ok(raw)
    } else {
        std::fs::read_to_string(path)
    }
}

async fn invoke(
    handler: &PatientsHandler,
    raw_event: &str,
) -> Result<ApiResponse, Box<dyn std::error::Error>> {
    let request = GatewayEvent::from_json(raw_event)?.into_request()?;
    Ok(handler.handle(request).await)
}

fn print_response(response: &ApiResponse) -> Result<(), Box<dyn std::error::Error>> {
    if response.status_code.is_success() {
        let body = response.body_json()?;
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        eprintln!("Error ({}): {}", response.status_code, response.body);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("No command given. Use --help for usage.");
        return Ok(());
    };

    let backend = cli.backend;
    let cfg = core_config_from_lookup(|name| match name {
        env::BACKEND => backend.clone(),
        _ => std::env::var(name).ok(),
    })?;
    let handler = phcare_storage::connect(&cfg).await?.into_handler(&cfg);
    let reader = CallerIdentity::anonymous().with_subject("phcare-cli");

    match command {
        Commands::Invoke { event } => {
            let raw = read_event(&event)?;
            let response = invoke(&handler, &raw).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::List { query } => {
            let mut request = ApiRequest::new(Method::GET, "/patients", reader);
            if let Some(query) = query {
                request = request.with_query("q", query);
            }
            let response = handler.handle(request).await;
            match response.body_json()? {
                serde_json::Value::Array(patients) if patients.is_empty() => {
                    println!("No patients found.");
                }
                _ => print_response(&response)?,
            }
        }
        Commands::Get { id } => {
            let request = ApiRequest::new(Method::GET, format!("/patients/{id}"), reader);
            print_response(&handler.handle(request).await)?;
        }
        Commands::UploadLink {
            id,
            file_name,
            file_type,
            groups,
        } => {
            let caller = CallerIdentity::from_group_claims([groups]).with_subject("phcare-cli");
            let body = serde_json::json!({ "fileName": file_name, "fileType": file_type });
            let request =
                ApiRequest::new(Method::POST, format!("/patients/{id}/documents"), caller)
                    .with_body(body.to_string());
            print_response(&handler.handle(request).await)?;
        }
    }

    Ok(())
}
