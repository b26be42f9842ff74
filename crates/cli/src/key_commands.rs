use {anyhow::Result, clap::Subcommand, tracing::warn};

use {custodian_config::CustodianConfig, custodian_vault::RotationReport};

use crate::runtime;

#[derive(Subcommand)]
pub enum KeysAction {
    /// Generate a new master key, retire the current one and re-wrap every
    /// stored DEK.
    Add {
        /// Free-form note stored with the key.
        #[arg(long)]
        description: Option<String>,
    },
    /// List master keys, newest first.
    List,
}

pub async fn handle_keys(config: &CustodianConfig, action: KeysAction) -> Result<()> {
    let vault = runtime::open_vault(config).await?;

    match action {
        KeysAction::Add { description } => {
            let change = vault.add_master_key(None, description.as_deref()).await?;
            println!("Active key: {}", change.key_id);
            if let Some(retired) = change.retired_key_id {
                println!("Retired:    {retired}");
            }
            if let Some(report) = change.rotation {
                print_report(&report);
                if !report.is_complete() {
                    anyhow::bail!(
                        "{} envelope(s) could not be migrated; fix them and run `custodian rotate`",
                        report.failed.len()
                    );
                }
            }
        },
        KeysAction::List => {
            let keys = vault.keys().list().await?;
            if keys.is_empty() {
                println!("No master keys. Run `custodian keys add` to create one.");
            }
            for key in &keys {
                println!(
                    "  {}  {:<8} {}  {}",
                    key.key_id,
                    key.status.as_str(),
                    key.created_at,
                    key.description.as_deref().unwrap_or("")
                );
            }
        },
    }

    Ok(())
}

/// `custodian rotate`: finish migrating envelopes to the active key.
pub async fn handle_rotate(config: &CustodianConfig) -> Result<()> {
    let vault = runtime::open_vault(config).await?;
    let report = vault.resume_rotation().await?;
    print_report(&report);
    if !report.is_complete() {
        anyhow::bail!("{} envelope(s) still pending", report.failed.len());
    }
    Ok(())
}

pub fn print_report(report: &RotationReport) {
    println!(
        "Rotation to {}: {} migrated, {} already current, {} failed",
        report.target_key_id,
        report.migrated,
        report.already_current,
        report.failed.len()
    );
    for failure in &report.failed {
        warn!(owner_id = %failure.owner_id, reason = %failure.reason, "envelope not migrated");
    }
}
