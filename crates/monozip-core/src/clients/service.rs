use std::sync::Arc;

use chrono::{Local, NaiveDate};

use crate::config::StoreBackend;
use crate::dates::{format_mmdd, format_yyyymmdd, parse_date_or};

use super::error::ClientRuleError;
use super::store::{ClientRuleStore, default_rules};
use super::types::{
    AddOutcome, AvailableClients, CUSTOM_CLIENT_KEY, ClientListing, ClientRuleDraft,
    DEFAULT_SUFFIX_RULE, DeleteOutcome, GeneratedPassword, InsertOutcome, UpdateOutcome,
};

/// Password derivation and rule management on top of whichever store the
/// process was started with. Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct ClientRuleService {
    store: Arc<dyn ClientRuleStore>,
}

impl ClientRuleService {
    pub fn new(store: Arc<dyn ClientRuleStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> StoreBackend {
        self.store.backend()
    }

    pub async fn health_check(&self) -> Result<(), ClientRuleError> {
        self.store.health_check().await
    }

    /// Stored rules in backend order followed by the custom entry.
    pub async fn list_available(&self) -> Result<Vec<ClientListing>, ClientRuleError> {
        let rules = self.store.list().await?;
        Ok(with_custom_entry(rules.iter().map(ClientListing::from_rule)))
    }

    /// Like [`list_available`](Self::list_available), but shows the built-in
    /// defaults when the backend cannot be read. Nothing is written.
    pub async fn list_available_or_defaults(&self) -> Result<AvailableClients, ClientRuleError> {
        match self.list_available().await {
            Ok(clients) => Ok(AvailableClients {
                clients,
                fallback: false,
            }),
            Err(
                err @ (ClientRuleError::BackendUnavailable(_) | ClientRuleError::CorruptStore(_)),
            ) => {
                tracing::warn!(error = %err, backend = self.backend().as_str(), "listing built-in client rules");
                Ok(AvailableClients {
                    clients: with_custom_entry(default_rules().iter().map(ClientListing::from_rule)),
                    fallback: true,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// `prefix` followed by the zero-padded month and day.
    pub async fn derive_fixed(&self, key: &str, date: NaiveDate) -> Result<String, ClientRuleError> {
        let rule = self
            .store
            .get(key)
            .await?
            .ok_or_else(|| ClientRuleError::RuleNotFound(key.to_string()))?;
        Ok(format!("{}{}", rule.prefix, format_mmdd(date)))
    }

    /// Route a generate request: custom text for the sentinel key, the stored
    /// rule otherwise. Fixed rules default to today; custom text only gets a
    /// date suffix when one is supplied.
    pub async fn generate(
        &self,
        client_key: &str,
        raw_date: Option<&str>,
        custom_input: Option<&str>,
    ) -> Result<GeneratedPassword, ClientRuleError> {
        self.generate_on(client_key, raw_date, custom_input, Local::now().date_naive())
            .await
    }

    pub async fn generate_on(
        &self,
        client_key: &str,
        raw_date: Option<&str>,
        custom_input: Option<&str>,
        today: NaiveDate,
    ) -> Result<GeneratedPassword, ClientRuleError> {
        let client_key = client_key.trim();
        if client_key.is_empty() {
            return Err(ClientRuleError::InvalidInput(
                "Select a client.".to_string(),
            ));
        }

        if client_key == CUSTOM_CLIENT_KEY {
            let date = match raw_date.map(str::trim) {
                None | Some("") => None,
                Some(raw) => Some(parse_date_or(Some(raw), today)?),
            };
            let password = derive_custom(custom_input.unwrap_or_default(), date)?;
            return Ok(GeneratedPassword { password, date });
        }

        let date = parse_date_or(raw_date, today)?;
        let password = self.derive_fixed(client_key, date).await?;
        Ok(GeneratedPassword {
            password,
            date: Some(date),
        })
    }

    /// Create a rule. A name or prefix that already exists is not an error:
    /// the existing rule comes back with `created = false`.
    pub async fn add(
        &self,
        name: &str,
        prefix: &str,
        suffix_rule: Option<&str>,
    ) -> Result<AddOutcome, ClientRuleError> {
        let draft = validate_draft(name, prefix, suffix_rule)?;

        match self.store.insert(draft).await? {
            InsertOutcome::Created(rule) => {
                tracing::info!(key = %rule.key, name = %rule.name, "client rule created");
                let message = format!("{} was added.", rule.name);
                Ok(AddOutcome {
                    created: true,
                    rule: Some(rule),
                    message,
                })
            }
            InsertOutcome::Conflict(conflict) => {
                tracing::warn!(
                    field = ?conflict.field,
                    existing_key = %conflict.existing.key,
                    "client rule already registered"
                );
                Ok(AddOutcome {
                    created: false,
                    message: conflict.message(),
                    rule: Some(conflict.existing),
                })
            }
        }
    }

    pub async fn update(
        &self,
        key: &str,
        name: &str,
        prefix: &str,
        suffix_rule: Option<&str>,
    ) -> Result<UpdateOutcome, ClientRuleError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ClientRuleError::InvalidInput(
                "Select the client to update.".to_string(),
            ));
        }
        let draft = validate_draft(name, prefix, suffix_rule)?;

        let rule = self.store.update(key, draft).await?;
        tracing::info!(key = %rule.key, name = %rule.name, "client rule updated");
        let message = format!("{} was updated.", rule.name);
        Ok(UpdateOutcome {
            updated: true,
            rule,
            message,
        })
    }

    pub async fn delete(&self, key: &str) -> Result<DeleteOutcome, ClientRuleError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(ClientRuleError::InvalidInput(
                "Select the client to delete.".to_string(),
            ));
        }
        if key == CUSTOM_CLIENT_KEY {
            return Err(ClientRuleError::ImmutableRule(
                "Custom cannot be deleted.".to_string(),
            ));
        }

        let rule = self.store.remove(key).await?;
        tracing::info!(key = %rule.key, name = %rule.name, "client rule deleted");
        let message = format!("{} was deleted.", rule.name);
        Ok(DeleteOutcome {
            deleted: true,
            rule,
            message,
        })
    }
}

/// Trimmed free text, optionally followed by the full `YYYYMMDD` date.
pub fn derive_custom(free_text: &str, date: Option<NaiveDate>) -> Result<String, ClientRuleError> {
    let text = free_text.trim();
    if text.is_empty() {
        return Err(ClientRuleError::InvalidInput(
            "Enter the free-form text.".to_string(),
        ));
    }

    Ok(match date {
        Some(date) => format!("{text}{}", format_yyyymmdd(date)),
        None => text.to_string(),
    })
}

fn validate_draft(
    name: &str,
    prefix: &str,
    suffix_rule: Option<&str>,
) -> Result<ClientRuleDraft, ClientRuleError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ClientRuleError::InvalidInput(
            "Enter a client name.".to_string(),
        ));
    }
    let prefix = prefix.trim();
    if prefix.is_empty() {
        return Err(ClientRuleError::InvalidInput(
            "Enter a prefix.".to_string(),
        ));
    }
    let suffix_rule = suffix_rule
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_SUFFIX_RULE);

    Ok(ClientRuleDraft {
        name: name.to_string(),
        prefix: prefix.to_string(),
        suffix_rule: suffix_rule.to_string(),
    })
}

fn with_custom_entry(listings: impl Iterator<Item = ClientListing>) -> Vec<ClientListing> {
    let mut clients: Vec<ClientListing> = listings.collect();
    clients.push(ClientListing::custom());
    clients
}
