//! Client rules persisted as a single JSON array on local disk.
//!
//! Every operation reads the whole file and every mutation rewrites it
//! (temp file + rename). A per-store mutex spans each read-modify-write so two
//! requests in the same process cannot both pass the uniqueness check.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::StoreBackend;

use super::error::ClientRuleError;
use super::store::{ClientRuleStore, default_rules, find_conflict, generate_key};
use super::types::{ClientRule, ClientRuleDraft, InsertOutcome};

pub struct JsonFileClientRuleStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileClientRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seed the file with the built-in defaults when it does not exist yet.
    async fn ensure_file(&self) -> Result<(), ClientRuleError> {
        let exists = tokio::fs::try_exists(&self.path).await.map_err(|err| {
            ClientRuleError::CorruptStore(format!(
                "cannot inspect {}: {err}",
                self.path.display()
            ))
        })?;
        if exists {
            return Ok(());
        }

        tracing::info!(path = %self.path.display(), "seeding client rule file with defaults");
        self.save(&default_rules()).await
    }

    async fn load(&self) -> Result<Vec<ClientRule>, ClientRuleError> {
        self.ensure_file().await?;

        let text = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            ClientRuleError::CorruptStore(format!(
                "cannot read {}: {err}",
                self.path.display()
            ))
        })?;

        parse_rules(&text)
    }

    async fn save(&self, rules: &[ClientRule]) -> Result<(), ClientRuleError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|err| {
                    ClientRuleError::Persistence(format!(
                        "cannot create {}: {err}; check the server's write permissions",
                        parent.display()
                    ))
                })?;
            }
        }

        let payload = serde_json::to_vec_pretty(rules)
            .map_err(|err| ClientRuleError::Persistence(err.to_string()))?;

        let temp_path = self
            .path
            .with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&temp_path, payload).await.map_err(|err| {
            ClientRuleError::Persistence(format!(
                "cannot write {}: {err}; check the server's write permissions",
                temp_path.display()
            ))
        })?;

        if let Err(err) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(ClientRuleError::Persistence(format!(
                "cannot replace {}: {err}",
                self.path.display()
            )));
        }

        Ok(())
    }
}

fn parse_rules(text: &str) -> Result<Vec<ClientRule>, ClientRuleError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| ClientRuleError::CorruptStore(format!("invalid JSON: {err}")))?;

    if !value.is_array() {
        return Err(ClientRuleError::CorruptStore(
            "expected a JSON array of client rules".to_string(),
        ));
    }

    serde_json::from_value(value)
        .map_err(|err| ClientRuleError::CorruptStore(format!("malformed client rule: {err}")))
}

#[async_trait]
impl ClientRuleStore for JsonFileClientRuleStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::File
    }

    async fn list(&self) -> Result<Vec<ClientRule>, ClientRuleError> {
        let _guard = self.write_lock.lock().await;
        self.load().await
    }

    async fn get(&self, key: &str) -> Result<Option<ClientRule>, ClientRuleError> {
        let rules = self.list().await?;
        Ok(rules.into_iter().find(|rule| rule.key == key))
    }

    async fn insert(&self, draft: ClientRuleDraft) -> Result<InsertOutcome, ClientRuleError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.load().await?;

        if let Some(conflict) = find_conflict(&rules, &draft, None) {
            return Ok(InsertOutcome::Conflict(conflict));
        }

        let existing_keys: HashSet<String> = rules.iter().map(|rule| rule.key.clone()).collect();
        let key = generate_key(&draft.name, &draft.prefix, &existing_keys);
        let rule = draft.into_rule(key);
        rules.push(rule.clone());
        self.save(&rules).await?;

        Ok(InsertOutcome::Created(rule))
    }

    async fn update(
        &self,
        key: &str,
        draft: ClientRuleDraft,
    ) -> Result<ClientRule, ClientRuleError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.load().await?;

        let index = rules
            .iter()
            .position(|rule| rule.key == key)
            .ok_or_else(|| ClientRuleError::RuleNotFound(key.to_string()))?;

        if let Some(conflict) = find_conflict(&rules, &draft, Some(key)) {
            return Err(ClientRuleError::DuplicateRule(conflict.message()));
        }

        let target = &mut rules[index];
        target.name = draft.name;
        target.prefix = draft.prefix;
        target.suffix_rule = draft.suffix_rule;
        let updated = target.clone();

        self.save(&rules).await?;
        Ok(updated)
    }

    async fn remove(&self, key: &str) -> Result<ClientRule, ClientRuleError> {
        let _guard = self.write_lock.lock().await;
        let mut rules = self.load().await?;

        let index = rules
            .iter()
            .position(|rule| rule.key == key)
            .ok_or_else(|| ClientRuleError::RuleNotFound(key.to_string()))?;
        let removed = rules.remove(index);

        self.save(&rules).await?;
        Ok(removed)
    }
}
