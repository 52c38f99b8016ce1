use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reserved key for free-form password composition. Never stored.
pub const CUSTOM_CLIENT_KEY: &str = "custom";

/// Suffix description used when a rule is saved without one.
pub const DEFAULT_SUFFIX_RULE: &str = "MMDD (month and day of the target date)";

pub const CUSTOM_CLIENT_LABEL: &str = "Custom (free input)";
pub const CUSTOM_CLIENT_RULE: &str = "Free text + optional date (YYYYMMDD)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRule {
    pub key: String,
    pub name: String,
    pub prefix: String,
    #[serde(default = "default_suffix_rule")]
    pub suffix_rule: String,
}

fn default_suffix_rule() -> String {
    DEFAULT_SUFFIX_RULE.to_string()
}

/// Validated, trimmed fields for a rule that does not have a key yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRuleDraft {
    pub name: String,
    pub prefix: String,
    pub suffix_rule: String,
}

impl ClientRuleDraft {
    pub fn into_rule(self, key: String) -> ClientRule {
        ClientRule {
            key,
            name: self.name,
            prefix: self.prefix,
            suffix_rule: self.suffix_rule,
        }
    }
}

/// Which field of a rule collided with an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictField {
    Name,
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleConflict {
    pub field: ConflictField,
    /// The submitted value that collided.
    pub value: String,
    pub existing: ClientRule,
}

impl RuleConflict {
    pub fn message(&self) -> String {
        format!("{} is already registered.", self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(ClientRule),
    Conflict(RuleConflict),
}

/// One row of the client picker shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientListing {
    pub key: String,
    pub label: String,
    pub rule_description: String,
    pub prefix: String,
    pub suffix_rule: String,
}

impl ClientListing {
    pub fn from_rule(rule: &ClientRule) -> Self {
        Self {
            key: rule.key.clone(),
            label: rule.name.clone(),
            rule_description: format!("{} + MMDD", rule.prefix),
            prefix: rule.prefix.clone(),
            suffix_rule: rule.suffix_rule.clone(),
        }
    }

    pub fn custom() -> Self {
        Self {
            key: CUSTOM_CLIENT_KEY.to_string(),
            label: CUSTOM_CLIENT_LABEL.to_string(),
            rule_description: CUSTOM_CLIENT_RULE.to_string(),
            prefix: String::new(),
            suffix_rule: String::new(),
        }
    }

    pub fn is_custom(&self) -> bool {
        self.key == CUSTOM_CLIENT_KEY
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableClients {
    pub clients: Vec<ClientListing>,
    /// True when the listing shows built-in defaults because the backend failed.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    pub created: bool,
    pub rule: Option<ClientRule>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub updated: bool,
    pub rule: ClientRule,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub deleted: bool,
    pub rule: ClientRule,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedPassword {
    pub password: String,
    /// The date that fed the suffix; absent for custom text without a date.
    pub date: Option<NaiveDate>,
}
