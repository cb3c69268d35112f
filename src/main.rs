//! TriageX command-line front end.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use triagex::api::{HttpPatientStore, PatientStore};
use triagex::config;
use triagex::service::TriageService;
use triagex::triage::{TriageClassifier, TriageFactors, TriageLevel};

#[derive(Parser)]
#[command(name = "triagex", about = "Mass-casualty triage toolkit")]
struct Cli {
    /// Override the persistence API base URL
    #[arg(long)]
    api_base: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Recalculate a patient's triage from their current records
    Recalculate { patient_id: String },
    /// Apply a manual triage override
    Override {
        patient_id: String,
        /// red, yellow, green, or black
        level: TriageLevel,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Classify triage factors from a JSON file, no backend involved
    Classify {
        #[arg(long)]
        file: PathBuf,
    },
    /// List patients with their current triage level and status
    Board,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config().context("failed to load configuration")?;
    let api_base = cli.api_base.unwrap_or(config.api_base);

    match cli.command {
        Commands::Recalculate { patient_id } => {
            let service = TriageService::new(Arc::new(HttpPatientStore::new(api_base)));
            let result = service.recalculate_patient_triage(&patient_id).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Override {
            patient_id,
            level,
            reason,
        } => {
            let service = TriageService::new(Arc::new(HttpPatientStore::new(api_base)));
            service
                .apply_triage_override(&patient_id, level, reason)
                .await
                .context("failed to apply triage override")?;
            println!("Override applied: patient {patient_id} -> {level} ({})", level.status());
        }
        Commands::Classify { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let factors: TriageFactors =
                serde_json::from_str(&raw).context("invalid triage factors JSON")?;
            let result = TriageClassifier::new().classify(&factors);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Board => {
            let store = HttpPatientStore::new(api_base);
            let patients = store.list_patients().await.context("failed to list patients")?;
            for patient in &patients {
                println!(
                    "{:>6}  {:<8}  {:<12}  {}",
                    patient.id, patient.triage_level, patient.triage_status, patient.name
                );
            }
        }
    }

    Ok(())
}
