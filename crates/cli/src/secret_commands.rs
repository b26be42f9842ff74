use {
    anyhow::Result,
    base64::{Engine, engine::general_purpose::STANDARD as BASE64},
    clap::Subcommand,
};

use custodian_config::CustodianConfig;

use crate::runtime;

#[derive(Subcommand)]
pub enum SecretsAction {
    /// Encrypt a value for an owner under a fresh DEK and store the envelope.
    Put {
        #[arg(long)]
        owner: String,
        /// Plaintext to store.
        #[arg(long)]
        data: String,
        /// Treat `--data` as base64 and store the decoded bytes.
        #[arg(long)]
        base64: bool,
    },
    /// Decrypt an owner's stored value. The token must verify as that owner.
    Get {
        #[arg(long)]
        owner: String,
        #[arg(long, env = "CUSTODIAN_TOKEN")]
        token: String,
    },
}

pub async fn handle_secrets(config: &CustodianConfig, action: SecretsAction) -> Result<()> {
    let vault = runtime::open_vault(config).await?;

    match action {
        SecretsAction::Put {
            owner,
            data,
            base64,
        } => {
            let plaintext = if base64 {
                BASE64.decode(data.trim())?
            } else {
                data.into_bytes()
            };
            let sealed = vault.store_secret(&owner, &plaintext).await?;
            println!("{}", serde_json::to_string_pretty(&sealed)?);
        },
        SecretsAction::Get { owner, token } => {
            let plaintext = vault.retrieve_secret(Some(&token), &owner).await?;
            match String::from_utf8(plaintext) {
                Ok(text) => println!("{text}"),
                Err(e) => println!("{}", BASE64.encode(e.into_bytes())),
            }
        },
    }

    Ok(())
}
