use std::sync::Arc;

use chrono::NaiveDate;
use monozip_core::clients::{JsonFileClientRuleStore, SqlClientRuleStore};
use monozip_core::migrations::run_migrations;
use monozip_core::{
    CUSTOM_CLIENT_KEY, ClientRuleError, ClientRuleService, ClientRuleStore, Database,
    StoreBackend,
};
use tempfile::TempDir;

async fn file_service(dir: &TempDir) -> ClientRuleService {
    let path = dir.path().join("clients.json");
    std::fs::write(&path, "[]").expect("empty store");
    ClientRuleService::new(Arc::new(JsonFileClientRuleStore::new(path)))
}

async fn sql_service(dir: &TempDir) -> ClientRuleService {
    let db_name = format!("db_{}.sqlite", uuid::Uuid::new_v4());
    let db = Database::new(&dir.path().join(db_name))
        .await
        .expect("create db");
    run_migrations(&db).await.expect("migrations");
    ClientRuleService::new(Arc::new(SqlClientRuleStore::new(db)))
}

fn march_fifth() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 5).expect("date")
}

async fn exercise_lifecycle(service: &ClientRuleService) {
    let added = service.add("Acme", "ACM", None).await.expect("add");
    assert!(added.created);
    let acme = added.rule.expect("rule");
    assert!(!acme.key.is_empty());

    let listing = service.list_available().await.expect("list");
    assert_eq!(listing.len(), 2);
    assert_eq!(listing.last().expect("custom").key, CUSTOM_CLIENT_KEY);

    assert_eq!(
        service
            .derive_fixed(&acme.key, march_fifth())
            .await
            .expect("derive"),
        "ACM0305"
    );

    let again = service.add("Acme", "ACM", None).await.expect("re-add");
    assert!(!again.created);
    assert_eq!(again.rule.as_ref(), Some(&acme));
    assert_eq!(service.list_available().await.expect("list").len(), 2);

    let beta = service
        .add("Beta", "BET", Some("MMDD of the shipment"))
        .await
        .expect("add beta")
        .rule
        .expect("beta");

    let err = service
        .update(&acme.key, "beta", "ACM", None)
        .await
        .expect_err("collides with beta");
    assert!(matches!(err, ClientRuleError::DuplicateRule(_)));

    let renamed = service
        .update(&acme.key, "Acme Corp", "ACM", None)
        .await
        .expect("rename");
    assert_eq!(renamed.rule.key, acme.key);
    assert_eq!(renamed.rule.name, "Acme Corp");

    let err = service
        .delete(CUSTOM_CLIENT_KEY)
        .await
        .expect_err("sentinel");
    assert!(matches!(err, ClientRuleError::ImmutableRule(_)));

    let deleted = service.delete(&beta.key).await.expect("delete beta");
    assert_eq!(deleted.rule.key, beta.key);
    let err = service
        .derive_fixed(&beta.key, march_fifth())
        .await
        .expect_err("beta gone");
    assert!(matches!(err, ClientRuleError::RuleNotFound(_)));

    let custom = service
        .generate_on(CUSTOM_CLIENT_KEY, Some("2024-03-05"), Some(" team "), march_fifth())
        .await
        .expect("custom");
    assert_eq!(custom.password, "team20240305");
}

#[tokio::test]
async fn file_backend_lifecycle() {
    let dir = TempDir::new().expect("temp dir");
    let service = file_service(&dir).await;
    assert_eq!(service.backend(), StoreBackend::File);
    exercise_lifecycle(&service).await;
}

#[tokio::test]
async fn database_backend_lifecycle() {
    let dir = TempDir::new().expect("temp dir");
    let service = sql_service(&dir).await;
    assert_eq!(service.backend(), StoreBackend::Database);
    exercise_lifecycle(&service).await;
}

#[tokio::test]
async fn database_listing_is_alphabetical_and_file_listing_is_insertion_ordered() {
    let dir = TempDir::new().expect("temp dir");
    let file = file_service(&dir).await;
    let sql = sql_service(&dir).await;

    for service in [&file, &sql] {
        for (name, prefix) in [("Zulu", "ZUL"), ("alpha", "ALP"), ("Mike", "MIK")] {
            service.add(name, prefix, None).await.expect("add");
        }
    }

    let labels = |entries: Vec<monozip_core::ClientListing>| -> Vec<String> {
        entries.into_iter().map(|entry| entry.label).collect()
    };

    assert_eq!(
        labels(file.list_available().await.expect("file list")),
        vec!["Zulu", "alpha", "Mike", "Custom (free input)"]
    );
    assert_eq!(
        labels(sql.list_available().await.expect("sql list")),
        vec!["alpha", "Mike", "Zulu", "Custom (free input)"]
    );
}

#[tokio::test]
async fn non_ascii_case_variants_are_duplicates_on_both_backends() {
    let dir = TempDir::new().expect("temp dir");
    let file = file_service(&dir).await;
    let sql = sql_service(&dir).await;

    for service in [&file, &sql] {
        let first = service.add("Ärzte", "ÄPX", None).await.expect("first add");
        assert!(first.created);
        let second = service.add("ärzte", "äpx", None).await.expect("second add");
        assert!(!second.created, "{}", second.message);
        assert_eq!(second.rule, first.rule);
        assert_eq!(second.message, "ärzte is already registered.");

        let labels: Vec<String> = service
            .list_available()
            .await
            .expect("list")
            .into_iter()
            .map(|entry| entry.label)
            .collect();
        assert_eq!(labels, vec!["Ärzte", "Custom (free input)"]);
    }
}

#[tokio::test]
async fn corrupt_file_fails_reads_with_corrupt_store() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("clients.json");
    std::fs::write(&path, r#"{"not": "a list"}"#).expect("write");
    let store = JsonFileClientRuleStore::new(path);
    let service = ClientRuleService::new(Arc::new(store));

    let err = service.list_available().await.expect_err("list");
    assert!(matches!(err, ClientRuleError::CorruptStore(_)));
    let err = service
        .derive_fixed("am", march_fifth())
        .await
        .expect_err("derive");
    assert!(matches!(err, ClientRuleError::CorruptStore(_)));
    let err = service.health_check().await.expect_err("health");
    assert!(matches!(err, ClientRuleError::CorruptStore(_)));
}

#[tokio::test]
async fn store_returns_independent_copies() {
    let dir = TempDir::new().expect("temp dir");
    let store = JsonFileClientRuleStore::new(dir.path().join("clients.json"));

    let mut first = store.list().await.expect("list");
    first[0].prefix.push_str("-tampered");
    first.clear();

    let second = store.list().await.expect("list again");
    assert_eq!(second, monozip_core::clients::default_rules());
}
