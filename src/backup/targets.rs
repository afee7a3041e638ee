// dbbackup/src/backup/targets.rs
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{Connection, Row};

use crate::config::DatabaseConfig;
use crate::errors::{BackupError, Result};

/// Databases that are never backed up unless system databases are requested.
pub const SYSTEM_DATABASES: &[&str] = &["information_schema", "mysql", "performance_schema", "sys"];

/// CLI switches that select the resolver mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetFlags {
    pub all_databases: bool,
    pub include_system_databases: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TargetRequest {
    /// Explicitly configured databases. Ignored when `all_databases` is set.
    pub configured: Vec<String>,
    pub flags: TargetFlags,
}

impl TargetRequest {
    pub fn new(configured: &[String], flags: TargetFlags) -> Self {
        let configured = if flags.all_databases {
            Vec::new()
        } else {
            configured.to_vec()
        };
        TargetRequest { configured, flags }
    }
}

/// What the dump should contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// Export everything the server has, system databases included.
    Everything,
    /// Export these databases, in catalogue order.
    Databases(Vec<String>),
}

/// Live list of databases on the server.
#[async_trait]
pub trait DatabaseCatalogue: Send + Sync {
    /// Validates credentials by opening (and closing) a connection.
    async fn check_connection(&self) -> Result<()>;

    /// Returns every database name in server order.
    async fn list_databases(&self) -> Result<Vec<String>>;
}

pub struct MySqlCatalogue {
    options: MySqlConnectOptions,
}

impl MySqlCatalogue {
    pub fn new(database: &DatabaseConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&database.host)
            .port(database.port)
            .username(&database.username)
            .password(&database.password);
        MySqlCatalogue { options }
    }

    async fn connect(&self) -> Result<MySqlConnection> {
        MySqlConnection::connect_with(&self.options)
            .await
            .map_err(|e| BackupError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl DatabaseCatalogue for MySqlCatalogue {
    async fn check_connection(&self) -> Result<()> {
        let conn = self.connect().await?;
        conn.close()
            .await
            .map_err(|e| BackupError::ConnectionFailed(e.to_string()))
    }

    async fn list_databases(&self) -> Result<Vec<String>> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query("SHOW DATABASES")
            .fetch_all(&mut conn)
            .await
            .map_err(|e| BackupError::ConnectionFailed(format!("SHOW DATABASES failed: {}", e)))?;

        // Some servers report the column as binary.
        let names = rows
            .iter()
            .map(|row| {
                row.try_get::<String, _>(0).or_else(|_| {
                    row.try_get::<Vec<u8>, _>(0)
                        .map(|raw| String::from_utf8_lossy(&raw).into_owned())
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| BackupError::ConnectionFailed(format!("Unexpected SHOW DATABASES row: {}", e)))?;

        conn.close()
            .await
            .map_err(|e| BackupError::ConnectionFailed(e.to_string()))?;
        Ok(names)
    }
}

/// Decides which databases take part in this run.
pub async fn resolve_targets(
    request: &TargetRequest,
    catalogue: &dyn DatabaseCatalogue,
) -> Result<TargetSelection> {
    tracing::info!("Checking MySQL credentials");
    catalogue.check_connection().await?;

    let flags = request.flags;
    if flags.all_databases && flags.include_system_databases {
        tracing::info!("Selecting every database, system databases included");
        return Ok(TargetSelection::Everything);
    }

    tracing::info!("Fetching databases list");
    let available: Vec<String> = catalogue
        .list_databases()
        .await?
        .into_iter()
        .filter(|name| flags.include_system_databases || !SYSTEM_DATABASES.contains(&name.as_str()))
        .collect();

    if available.is_empty() {
        return Err(BackupError::NoTargetsAvailable);
    }

    if request.configured.is_empty() {
        if flags.all_databases {
            tracing::info!(count = available.len(), "Selecting all databases to backup");
        } else {
            tracing::info!(
                count = available.len(),
                "Databases list not provided, selecting all databases to backup"
            );
        }
        return Ok(TargetSelection::Databases(available));
    }

    tracing::info!("Checking databases' existence");
    let mut missing: Vec<String> = Vec::new();
    for name in &request.configured {
        if !available.contains(name) && !missing.contains(name) {
            missing.push(name.clone());
        }
    }
    if !missing.is_empty() {
        return Err(BackupError::UnknownTargets(missing));
    }

    let selected = available
        .into_iter()
        .filter(|name| request.configured.contains(name))
        .collect();
    Ok(TargetSelection::Databases(selected))
}
