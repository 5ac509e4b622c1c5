use std::collections::HashSet;

use anyhow::Context;
use farm_core::signer::{AccountSigner, LocalAccount};

/// Parses every configured key, skipping blanks and duplicate addresses.
pub fn load_accounts(private_keys: &[String]) -> anyhow::Result<Vec<LocalAccount>> {
    let mut seen = HashSet::new();
    let mut accounts = Vec::with_capacity(private_keys.len());

    for (index, key) in private_keys.iter().enumerate() {
        if key.trim().is_empty() {
            continue;
        }
        let account = LocalAccount::from_private_key(key)
            .with_context(|| format!("Invalid private key at position {index}"))?;
        if !seen.insert(account.address()) {
            tracing::warn!(account = %account.address(), "Duplicate private key ignored");
            continue;
        }
        accounts.push(account);
    }

    if accounts.is_empty() {
        anyhow::bail!("No private keys configured; set APP__WALLET__PRIVATE_KEYS");
    }

    tracing::info!(accounts = accounts.len(), "Accounts loaded");
    Ok(accounts)
}
