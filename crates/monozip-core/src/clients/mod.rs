//! Client naming rules: storage backends and password derivation.

pub mod error;
pub mod file_store;
pub mod service;
pub mod sql_store;
pub mod store;
pub mod types;

pub use error::ClientRuleError;
pub use file_store::JsonFileClientRuleStore;
pub use service::{ClientRuleService, derive_custom};
pub use sql_store::SqlClientRuleStore;
pub use store::{ClientRuleStore, StoreSetupError, default_rules, open_store};
pub use types::{
    AddOutcome, AvailableClients, CUSTOM_CLIENT_KEY, ClientListing, ClientRule, ClientRuleDraft,
    ConflictField, DEFAULT_SUFFIX_RULE, DeleteOutcome, GeneratedPassword, InsertOutcome,
    RuleConflict, UpdateOutcome,
};
