pub mod archive;
pub mod clients;
pub mod config;
pub mod dates;
pub mod db;
pub mod migrations;
pub mod telemetry;

pub use archive::{
    ArchiveAlgorithm, ArchiveBuilder, ArchiveEntry, ArchiveError, EntryCollector,
    ZipArchiveBuilder,
};
pub use clients::{
    AddOutcome, AvailableClients, CUSTOM_CLIENT_KEY, ClientListing, ClientRule, ClientRuleError,
    ClientRuleService, ClientRuleStore, DeleteOutcome, GeneratedPassword, UpdateOutcome,
    open_store,
};
pub use config::{Config, StoreBackend};
pub use db::Database;
pub use telemetry::{TelemetryError, TelemetryGuard, init_logging, init_telemetry};
