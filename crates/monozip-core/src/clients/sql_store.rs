use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use libsql::{Connection, Row, params};

use crate::config::StoreBackend;
use crate::db::Database;

use super::error::ClientRuleError;
use super::store::{ClientRuleStore, find_conflict, fold_case};
use super::types::{ClientRule, ClientRuleDraft, InsertOutcome, RuleConflict};

const CLIENT_RULE_COLUMNS: &str = "id, name, prefix, suffix_rule";

/// Client rules kept in the `client_rules` table. Keys are the generated row
/// ids; uniqueness is backed by unique indexes on the case-folded
/// `name_key` / `prefix_key` columns.
#[derive(Clone)]
pub struct SqlClientRuleStore {
    db: Database,
}

impl SqlClientRuleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Collision scan over every stored rule. Folding happens in Rust so
    /// non-ASCII case variants match; the `*_key` indexes back this up.
    async fn find_conflict(
        &self,
        conn: &Connection,
        draft: &ClientRuleDraft,
        exclude_key: Option<&str>,
    ) -> Result<Option<RuleConflict>, ClientRuleError> {
        let rules = list_rules(conn).await?;
        Ok(find_conflict(&rules, draft, exclude_key))
    }
}

async fn list_rules(conn: &Connection) -> Result<Vec<ClientRule>, ClientRuleError> {
    let mut rows = conn
        .query(
            &format!(
                "SELECT {CLIENT_RULE_COLUMNS}
                 FROM client_rules
                 ORDER BY name COLLATE NOCASE, id"
            ),
            (),
        )
        .await?;

    let mut rules = Vec::new();
    while let Some(row) = rows.next().await? {
        rules.push(row_to_client_rule(row)?);
    }
    Ok(rules)
}

#[async_trait]
impl ClientRuleStore for SqlClientRuleStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::Database
    }

    async fn list(&self) -> Result<Vec<ClientRule>, ClientRuleError> {
        let conn = self.db.connection().await?;
        list_rules(&conn).await
    }

    async fn get(&self, key: &str) -> Result<Option<ClientRule>, ClientRuleError> {
        let Some(id) = parse_id(key) else {
            return Ok(None);
        };

        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {CLIENT_RULE_COLUMNS} FROM client_rules WHERE id = ?1"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row_to_client_rule(row)?)),
            None => Ok(None),
        }
    }

    async fn insert(&self, draft: ClientRuleDraft) -> Result<InsertOutcome, ClientRuleError> {
        let conn = self.db.connection().await?;
        if let Some(conflict) = self.find_conflict(&conn, &draft, None).await? {
            return Ok(InsertOutcome::Conflict(conflict));
        }

        let now = now_rfc3339();
        let inserted = conn
            .query(
                &format!(
                    "INSERT INTO client_rules
                        (name, prefix, suffix_rule, name_key, prefix_key, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                     RETURNING {CLIENT_RULE_COLUMNS}"
                ),
                params![
                    draft.name.as_str(),
                    draft.prefix.as_str(),
                    draft.suffix_rule.as_str(),
                    fold_case(&draft.name),
                    fold_case(&draft.prefix),
                    now
                ],
            )
            .await;

        let mut rows = match inserted {
            Ok(rows) => rows,
            Err(err) if is_unique_violation(&err) => {
                // Lost a race with another writer; report what won.
                return match self.find_conflict(&conn, &draft, None).await? {
                    Some(conflict) => Ok(InsertOutcome::Conflict(conflict)),
                    None => Err(err.into()),
                };
            }
            Err(err) => return Err(err.into()),
        };

        match rows.next().await? {
            Some(row) => Ok(InsertOutcome::Created(row_to_client_rule(row)?)),
            None => Err(ClientRuleError::BackendUnavailable(
                "insert returned no row".into(),
            )),
        }
    }

    async fn update(
        &self,
        key: &str,
        draft: ClientRuleDraft,
    ) -> Result<ClientRule, ClientRuleError> {
        let id = parse_id(key).ok_or_else(|| ClientRuleError::RuleNotFound(key.to_string()))?;
        if self.get(key).await?.is_none() {
            return Err(ClientRuleError::RuleNotFound(key.to_string()));
        }

        let conn = self.db.connection().await?;
        let own_key = id.to_string();
        if let Some(conflict) = self.find_conflict(&conn, &draft, Some(&own_key)).await? {
            return Err(ClientRuleError::DuplicateRule(conflict.message()));
        }

        let now = now_rfc3339();
        let updated = conn
            .query(
                &format!(
                    "UPDATE client_rules
                     SET name = ?1,
                         prefix = ?2,
                         suffix_rule = ?3,
                         name_key = ?4,
                         prefix_key = ?5,
                         updated_at = ?6
                     WHERE id = ?7
                     RETURNING {CLIENT_RULE_COLUMNS}"
                ),
                params![
                    draft.name.as_str(),
                    draft.prefix.as_str(),
                    draft.suffix_rule.as_str(),
                    fold_case(&draft.name),
                    fold_case(&draft.prefix),
                    now,
                    id
                ],
            )
            .await;

        let mut rows = match updated {
            Ok(rows) => rows,
            Err(err) if is_unique_violation(&err) => {
                return Err(ClientRuleError::DuplicateRule(format!(
                    "{} or {} is already registered.",
                    draft.name, draft.prefix
                )));
            }
            Err(err) => return Err(err.into()),
        };

        match rows.next().await? {
            Some(row) => row_to_client_rule(row),
            None => Err(ClientRuleError::RuleNotFound(key.to_string())),
        }
    }

    async fn remove(&self, key: &str) -> Result<ClientRule, ClientRuleError> {
        let id = parse_id(key).ok_or_else(|| ClientRuleError::RuleNotFound(key.to_string()))?;
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("DELETE FROM client_rules WHERE id = ?1 RETURNING {CLIENT_RULE_COLUMNS}"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => row_to_client_rule(row),
            None => Err(ClientRuleError::RuleNotFound(key.to_string())),
        }
    }

    async fn health_check(&self) -> Result<(), ClientRuleError> {
        self.db.health_check().await.map_err(Into::into)
    }
}

fn parse_id(key: &str) -> Option<i64> {
    key.trim().parse().ok()
}

fn is_unique_violation(err: &libsql::Error) -> bool {
    err.to_string().contains("UNIQUE constraint failed")
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn row_to_client_rule(row: Row) -> Result<ClientRule, ClientRuleError> {
    let id: i64 = row.get(0)?;
    Ok(ClientRule {
        key: id.to_string(),
        name: row.get(1)?,
        prefix: row.get(2)?,
        suffix_rule: row.get(3)?,
    })
}
