//! Command-line access to the SMART client flow.
//!
//! Configuration comes from the same `SMART_*` environment variables as the web server
//! (`.env` is loaded when present). Logs go to stderr so command output can be piped.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fhir::{PatientSummary, QuestionnaireResponse, ResourceKind};
use smart_core::auth::{authorize_url, new_state};
use smart_core::{
    http::build_client, ConfigValues, ResourceFetcher, ResponseSubmitter, SmartConfig,
    TokenExchange,
};
use smart_types::{AccessToken, NonEmptyText};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "smart")]
#[command(about = "SMART-on-FHIR patient client CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print an authorize URL with a fresh state value
    AuthorizeUrl,
    /// Exchange an authorization code for an access token
    Exchange {
        /// Authorization code from the redirect
        code: String,
    },
    /// Fetch the configured resources for a patient
    Fetch {
        /// Bearer access token
        #[arg(long)]
        token: String,
        /// Patient id from the token response
        #[arg(long)]
        patient: String,
    },
    /// Submit a QuestionnaireResponse JSON file
    Submit {
        /// Bearer access token
        #[arg(long)]
        token: String,
        /// Patient id used as subject when the response has none
        #[arg(long)]
        patient: Option<String>,
        /// Path to the QuestionnaireResponse JSON
        file: PathBuf,
    },
    /// Print the patient summary for a Patient JSON file
    Summary {
        /// Path to the Patient JSON
        file: PathBuf,
    },
}

fn load_config() -> anyhow::Result<Arc<SmartConfig>> {
    let cfg = SmartConfig::resolve(ConfigValues::from_env())
        .context("failed to resolve SMART configuration")?;
    Ok(Arc::new(cfg))
}

fn read_json(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("smart_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::AuthorizeUrl) => {
            let cfg = load_config()?;
            let state = new_state();
            println!("state: {state}");
            println!("{}", authorize_url(&cfg, &state));
        }
        Some(Commands::Exchange { code }) => {
            let cfg = load_config()?;
            let code = NonEmptyText::new(&code).context("authorization code")?;
            let exchange = TokenExchange::new(build_client()?, cfg);
            let token = exchange.exchange(&code).await?;
            println!("access_token: {}", token.access_token.expose());
            println!("patient: {}", token.patient.as_deref().unwrap_or("<none>"));
            if let Some(token_type) = &token.token_type {
                println!("token_type: {token_type}");
            }
            if let Some(expires_in) = token.expires_in {
                println!("expires_in: {expires_in}");
            }
            if let Some(scope) = &token.scope {
                println!("scope: {scope}");
            }
        }
        Some(Commands::Fetch { token, patient }) => {
            let cfg = load_config()?;
            let token = AccessToken::new(&token).context("access token")?;
            let fetcher = ResourceFetcher::new(build_client()?, cfg.clone());
            let resources = fetcher.fetch_all(&token, &patient).await;
            for kind in cfg.resources() {
                println!("== {kind}");
                match resources.get(*kind) {
                    Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
                    None => println!("(not available)"),
                }
            }
        }
        Some(Commands::Submit {
            token,
            patient,
            file,
        }) => {
            let cfg = load_config()?;
            let token = AccessToken::new(&token).context("access token")?;
            let mut response = QuestionnaireResponse::parse(&read_json(&file)?)?;
            if let Some(id) = cfg.questionnaire_id() {
                response.set_questionnaire_if_absent(&format!("{}/{id}", ResourceKind::Questionnaire));
            }
            if let Some(patient) = &patient {
                response.set_subject_if_absent(patient);
            }
            let submitter = ResponseSubmitter::new(build_client()?, cfg);
            let receipt = submitter.submit(&token, &response).await?;
            println!(
                "Submitted QuestionnaireResponse (status {}, id {})",
                receipt.status,
                receipt.id.as_deref().unwrap_or("<unknown>")
            );
        }
        Some(Commands::Summary { file }) => {
            let value: serde_json::Value = serde_json::from_str(&read_json(&file)?)?;
            let summary = PatientSummary::from_resource(&value)?;
            for path in &summary.skipped {
                eprintln!("skipped unreadable field {path}");
            }
            if let Some(id) = &summary.id {
                println!("Patient Id: {id}");
            }
            for line in summary.lines() {
                println!("{}: {}", line.label, line.value);
            }
        }
        None => {
            println!("Use 'smart --help' for commands");
        }
    }

    Ok(())
}
