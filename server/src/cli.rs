// server/src/cli.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use models::{CptCode, PatientId};
use rpmbill::config::BillingConfig;
use rpmbill::scheduler::RuleScheduler;
use rpmbill::stores::Stores;

#[derive(Parser)]
#[command(name = "rpmbill", about = "RPM billing-eligibility engine", version)]
pub struct Cli {
    /// Path to a TOML configuration file. Without one, defaults plus
    /// environment overrides apply.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted.
    Run,
    /// Run a single batch pass over all due rules and exit.
    RunOnce,
    /// Re-evaluate one CPT code for one patient.
    RunRule {
        /// CPT code to evaluate, e.g. 99457.
        #[arg(long)]
        cpt: String,
        /// Patient to re-evaluate.
        #[arg(long)]
        patient: PatientId,
    },
}

pub async fn start_cli() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => BillingConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => BillingConfig::from_env()?,
    };

    let stores = Stores::open(&config.storage)?;
    let scheduler = RuleScheduler::new(stores, config.scheduler.clone());

    match cli.command {
        Command::Run => {
            info!("starting billing scheduler");
            scheduler.run_forever().await;
            Ok(())
        }
        Command::RunOnce => {
            let summary = scheduler.run_all_rules().await;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::RunRule { cpt, patient } => {
            let code: CptCode = cpt.parse()?;
            let outcome = scheduler.run_rule_for_patient(code, patient).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_rule_requires_an_explicit_code() {
        let parsed = Cli::try_parse_from(["rpmbill", "run-rule", "--cpt", "99457", "--patient", "42"]);
        assert!(parsed.is_ok());
        let missing = Cli::try_parse_from(["rpmbill", "run-rule", "--patient", "42"]);
        assert!(missing.is_err());
    }
}
