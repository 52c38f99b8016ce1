use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, StoreBackend};
use crate::db::{Database, DbError};
use crate::migrations::{MigrationError, run_migrations};

use super::error::ClientRuleError;
use super::file_store::JsonFileClientRuleStore;
use super::sql_store::SqlClientRuleStore;
use super::types::{
    ClientRule, ClientRuleDraft, ConflictField, DEFAULT_SUFFIX_RULE, InsertOutcome, RuleConflict,
};

/// Base used when neither the name nor the prefix has any alphanumeric characters.
pub const FALLBACK_KEY_BASE: &str = "client";

/// Persistence for client rules. Every method returns owned copies; callers
/// can mutate what they receive without touching stored state.
#[async_trait]
pub trait ClientRuleStore: Send + Sync {
    fn backend(&self) -> StoreBackend;

    /// All rules in backend order.
    async fn list(&self) -> Result<Vec<ClientRule>, ClientRuleError>;

    async fn get(&self, key: &str) -> Result<Option<ClientRule>, ClientRuleError>;

    /// Insert unless the name or prefix already exists (case-insensitive), in
    /// which case the colliding rule is reported and nothing is written.
    async fn insert(&self, draft: ClientRuleDraft) -> Result<InsertOutcome, ClientRuleError>;

    /// Replace the fields of `key`. Fails with `RuleNotFound` or, when another
    /// record already uses the name or prefix, `DuplicateRule`.
    async fn update(&self, key: &str, draft: ClientRuleDraft)
    -> Result<ClientRule, ClientRuleError>;

    /// Remove `key`, returning the removed rule.
    async fn remove(&self, key: &str) -> Result<ClientRule, ClientRuleError>;

    async fn health_check(&self) -> Result<(), ClientRuleError> {
        self.list().await.map(|_| ())
    }
}

/// Rules seeded into a fresh JSON store and shown when the backend is down.
pub fn default_rules() -> Vec<ClientRule> {
    [("am", "AMさま", "AMS_KTC"), ("af", "AFさま", "KTC_SSP")]
        .into_iter()
        .map(|(key, name, prefix)| ClientRule {
            key: key.to_string(),
            name: name.to_string(),
            prefix: prefix.to_string(),
            suffix_rule: DEFAULT_SUFFIX_RULE.to_string(),
        })
        .collect()
}

/// Case-insensitive comparison key for names and prefixes (full Unicode lowercase).
pub fn fold_case(value: &str) -> String {
    value.to_lowercase()
}

/// Find the first rule whose name or prefix collides with the draft, ignoring
/// `exclude_key`. Name collisions win over prefix collisions.
pub fn find_conflict(
    rules: &[ClientRule],
    draft: &ClientRuleDraft,
    exclude_key: Option<&str>,
) -> Option<RuleConflict> {
    let name = fold_case(&draft.name);
    let prefix = fold_case(&draft.prefix);
    let candidates = || {
        rules
            .iter()
            .filter(move |rule| Some(rule.key.as_str()) != exclude_key)
    };

    if let Some(existing) = candidates().find(|rule| fold_case(&rule.name) == name) {
        return Some(RuleConflict {
            field: ConflictField::Name,
            value: draft.name.clone(),
            existing: existing.clone(),
        });
    }

    candidates()
        .find(|rule| fold_case(&rule.prefix) == prefix)
        .map(|existing| RuleConflict {
            field: ConflictField::Prefix,
            value: draft.prefix.clone(),
            existing: existing.clone(),
        })
}

/// Derive a stable key from the name (then prefix, then a fixed base) by
/// keeping lowercase alphanumerics, appending 2, 3, ... until unused.
pub fn generate_key(name: &str, prefix: &str, existing: &HashSet<String>) -> String {
    let base = [name, prefix]
        .into_iter()
        .map(alphanumeric_lowercase)
        .find(|candidate| !candidate.is_empty())
        .unwrap_or_else(|| FALLBACK_KEY_BASE.to_string());

    let mut candidate = base.clone();
    let mut counter = 1u64;
    while existing.contains(&candidate) {
        counter += 1;
        candidate = format!("{base}{counter}");
    }
    candidate
}

fn alphanumeric_lowercase(value: &str) -> String {
    value
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|ch| ch.is_alphanumeric())
        .collect()
}

#[derive(Debug, Error)]
pub enum StoreSetupError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Construct the configured backend. The choice holds for the life of the process.
pub async fn open_store(config: &Config) -> Result<Arc<dyn ClientRuleStore>, StoreSetupError> {
    match config.store.backend {
        StoreBackend::Database => {
            let db = Database::new(&config.paths.database).await?;
            run_migrations(&db).await?;
            tracing::info!(
                remote = db.is_remote(),
                "client rules stored in database"
            );
            Ok(Arc::new(SqlClientRuleStore::new(db)))
        }
        StoreBackend::File => {
            tracing::info!(
                path = %config.paths.clients_file.display(),
                "client rules stored in JSON file"
            );
            Ok(Arc::new(JsonFileClientRuleStore::new(
                config.paths.clients_file.clone(),
            )))
        }
    }
}
