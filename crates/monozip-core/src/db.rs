use std::{env, path::Path, sync::Arc};

use libsql::{Builder, Connection, Database as LibSqlDatabase};
use thiserror::Error;

/// Shared handle to the libsql database that backs the SQL client rule store.
///
/// The location can be a local file, `:memory:`, or a remote `libsql://` /
/// `http(s)://` URL. Remote databases authenticate with `LIBSQL_AUTH_TOKEN`.
#[derive(Clone)]
pub struct Database {
    inner: Arc<LibSqlDatabase>,
    remote: bool,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("failed to build database: {0}")]
    Build(libsql::Error),
    #[error("failed to open connection: {0}")]
    Connect(libsql::Error),
    #[error("failed to execute statement: {0}")]
    Statement(libsql::Error),
    #[error("missing required LIBSQL_AUTH_TOKEN for remote database")]
    MissingAuthToken,
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: String,
        source: std::io::Error,
    },
}

impl Database {
    pub async fn new(location: &Path) -> Result<Self, DbError> {
        let location = location.to_string_lossy();
        let remote = is_remote(&location);
        let inner = if remote {
            let auth_token = env::var("LIBSQL_AUTH_TOKEN")
                .ok()
                .filter(|token| !token.is_empty())
                .ok_or(DbError::MissingAuthToken)?;

            Builder::new_remote(location.to_string(), auth_token)
                .build()
                .await
        } else {
            if let Some(parent) = Path::new(location.as_ref()).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    // libsql will not create missing directories for a local file.
                    std::fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
                        path: parent.display().to_string(),
                        source,
                    })?;
                }
            }
            Builder::new_local(location.to_string()).build().await
        }
        .map_err(DbError::Build)?;

        Ok(Self {
            inner: Arc::new(inner),
            remote,
        })
    }

    pub async fn connection(&self) -> Result<Connection, DbError> {
        self.inner.connect().map_err(DbError::Connect)
    }

    pub async fn health_check(&self) -> Result<(), DbError> {
        let conn = self.connection().await?;
        let mut rows = conn
            .query("SELECT 1", ())
            .await
            .map_err(DbError::Statement)?;
        let _ = rows.next().await.map_err(DbError::Statement)?;
        Ok(())
    }

    pub fn is_remote(&self) -> bool {
        self.remote
    }
}

fn is_remote(location: &str) -> bool {
    location.starts_with("libsql://")
        || location.starts_with("http://")
        || location.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use tempfile::TempDir;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    #[tokio::test]
    async fn local_database_creates_missing_parent_directory() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("nested/state/monozip.sqlite");

        let db = Database::new(&db_path).await.expect("create db");
        assert!(!db.is_remote());
        db.health_check().await.expect("health check passes");
        assert!(db_path.parent().expect("parent").exists());
    }

    #[tokio::test]
    async fn unusable_parent_directory_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "file").expect("write");

        match Database::new(&blocker.join("state/monozip.sqlite")).await {
            Err(DbError::CreateDir { path, .. }) => assert!(path.ends_with("state"), "{path}"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("directory under a regular file should fail"),
        }
    }

    #[tokio::test]
    async fn in_memory_database_is_healthy() {
        let db = Database::new(Path::new(":memory:")).await.expect("db");
        db.health_check().await.expect("health check passes");
    }

    #[tokio::test]
    async fn remote_missing_auth_token_errors() {
        let _guard = ENV_LOCK.lock().expect("lock env");
        unsafe { env::remove_var("LIBSQL_AUTH_TOKEN") };
        let result = Database::new(Path::new("libsql://example.com/db")).await;
        match result {
            Ok(_) => panic!("remote db should require auth token"),
            Err(DbError::MissingAuthToken) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn detects_remote_locations() {
        assert!(is_remote("libsql://db.example.com"));
        assert!(is_remote("https://db.example.com"));
        assert!(!is_remote("/var/lib/monozip/monozip.db"));
        assert!(!is_remote(":memory:"));
    }
}
