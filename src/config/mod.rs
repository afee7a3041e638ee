// dbbackup/src/config/mod.rs
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

use crate::errors::{BackupError, Result};

pub const DEFAULT_CONFIG_FILE: &str = ".env";
pub const DEFAULT_TELEGRAM_API: &str = "https://api.telegram.org";
pub const DEFAULT_DB_HOST: &str = "127.0.0.1";
pub const DEFAULT_DB_PORT: u16 = 3306;
pub const DEFAULT_RETENTION_DAYS: i64 = 3;

/// Reads a flat `KEY=VALUE` file into a map without touching the process environment.
// `from_path_iter` is deprecated in favour of loading into the process env, which we avoid.
#[allow(deprecated)]
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>> {
    if !path.is_file() {
        return Err(BackupError::ConfigurationInvalid(format!(
            "{} does not exist.",
            path.display()
        )));
    }

    let entries = dotenv::from_path_iter(path).map_err(|e| {
        BackupError::ConfigurationInvalid(format!("Unable to read {}: {}", path.display(), e))
    })?;

    let mut values = HashMap::new();
    for entry in entries {
        let (key, value) = entry.map_err(|e| {
            BackupError::ConfigurationInvalid(format!("Unable to parse {}: {}", path.display(), e))
        })?;
        values.insert(key, value);
    }

    if values.is_empty() {
        return Err(BackupError::ConfigurationInvalid(format!(
            "{} is empty.",
            path.display()
        )));
    }
    Ok(values)
}

#[derive(Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub channel_id: String,
    pub api_base_url: Url,
}

impl TelegramConfig {
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self> {
        let base = optional(values, "TG_API_BASE_URL").unwrap_or(DEFAULT_TELEGRAM_API);
        let api_base_url = Url::parse(base).map_err(|e| {
            BackupError::ConfigurationInvalid(format!("Invalid TG_API_BASE_URL {}: {}", base, e))
        })?;

        Ok(TelegramConfig {
            bot_token: required_non_empty(values, "TG_BOT_TOKEN")?,
            channel_id: required_non_empty(values, "TG_BOT_CHANNEL_ID")?,
            api_base_url,
        })
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"***")
            .field("channel_id", &self.channel_id)
            .field("api_base_url", &self.api_base_url.as_str())
            .finish()
    }
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Explicitly configured databases; empty means "everything the server has".
    pub databases: Vec<String>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("databases", &self.databases)
            .finish()
    }
}

#[derive(Clone)]
pub struct SpacesConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Key prefix without trailing slash, possibly empty.
    pub root_folder: String,
}

impl fmt::Debug for SpacesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpacesConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("bucket_name", &self.bucket_name)
            .field("root_folder", &self.root_folder)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub spaces: SpacesConfig,
    pub retention_days: i64,
    pub work_dir: PathBuf,
    pub mysqldump_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_map(values: &HashMap<String, String>) -> Result<Self> {
        Ok(AppConfig {
            database: parse_database_config(values)?,
            spaces: parse_spaces_config(values)?,
            retention_days: parse_retention_days(values)?,
            work_dir: optional(values, "BACKUP_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            mysqldump_path: optional(values, "MYSQLDUMP_PATH").map(PathBuf::from),
        })
    }
}

fn parse_database_config(values: &HashMap<String, String>) -> Result<DatabaseConfig> {
    let (Some(username), Some(password)) = (values.get("DB_USERNAME"), values.get("DB_PASSWORD"))
    else {
        return Err(BackupError::ConfigurationInvalid(
            "Invalid Database config data! DB_USERNAME and DB_PASSWORD must be provided.".into(),
        ));
    };

    let port = match optional(values, "DB_PORT") {
        Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
            BackupError::ConfigurationInvalid(format!("Invalid DB_PORT: {}", raw))
        })?,
        None => DEFAULT_DB_PORT,
    };

    let databases = optional(values, "DB_DATABASE")
        .or_else(|| optional(values, "DB_DATABASES"))
        .map(parse_database_list)
        .unwrap_or_default();

    Ok(DatabaseConfig {
        host: optional(values, "DB_HOST").unwrap_or(DEFAULT_DB_HOST).to_string(),
        port,
        username: username.clone(),
        password: password.clone(),
        databases,
    })
}

fn parse_spaces_config(values: &HashMap<String, String>) -> Result<SpacesConfig> {
    let endpoint_url = required_non_empty(values, "DO_SPACES_ENDPOINT")?;
    Url::parse(&endpoint_url).map_err(|e| {
        BackupError::ConfigurationInvalid(format!(
            "Invalid DO_SPACES_ENDPOINT {}: {}",
            endpoint_url, e
        ))
    })?;

    Ok(SpacesConfig {
        endpoint_url,
        region: required_non_empty(values, "DO_SPACES_REGION")?,
        access_key_id: required_non_empty(values, "DO_SPACES_KEY")?,
        secret_access_key: required_non_empty(values, "DO_SPACES_SECRET")?,
        bucket_name: required_non_empty(values, "DO_SPACES_BUCKET")?,
        root_folder: values
            .get("DO_SPACES_ROOT_FOLDER")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or_default(),
    })
}

fn parse_retention_days(values: &HashMap<String, String>) -> Result<i64> {
    match optional(values, "BACKUP_RETENTION_DAYS") {
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(days) if days >= 0 => Ok(days),
            _ => Err(BackupError::ConfigurationInvalid(format!(
                "Invalid BACKUP_RETENTION_DAYS: {}",
                raw
            ))),
        },
        None => Ok(DEFAULT_RETENTION_DAYS),
    }
}

/// Splits a comma separated database list, dropping blanks.
fn parse_database_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn optional<'a>(values: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    values
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
}

fn required_non_empty(values: &HashMap<String, String>, key: &str) -> Result<String> {
    match values.get(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        Some(_) => Err(BackupError::ConfigurationInvalid(format!("Invalid {}: value is empty", key))),
        None => Err(BackupError::ConfigurationInvalid(format!("{} not found", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn full_map() -> HashMap<String, String> {
        [
            ("TG_BOT_TOKEN", "123:abc"),
            ("TG_BOT_CHANNEL_ID", "-100200"),
            ("DB_USERNAME", "backup"),
            ("DB_PASSWORD", "s3cret"),
            ("DO_SPACES_KEY", "key"),
            ("DO_SPACES_SECRET", "secret"),
            ("DO_SPACES_REGION", "fra1"),
            ("DO_SPACES_BUCKET", "backups"),
            ("DO_SPACES_ENDPOINT", "https://fra1.digitaloceanspaces.com"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults_are_applied() -> Result<()> {
        let config = AppConfig::from_map(&full_map())?;

        assert_eq!(config.database.host, "127.0.0.1");
        assert_eq!(config.database.port, 3306);
        assert!(config.database.databases.is_empty());
        assert_eq!(config.spaces.root_folder, "");
        assert_eq!(config.retention_days, 3);
        assert_eq!(config.work_dir, PathBuf::from("."));
        assert!(config.mysqldump_path.is_none());
        Ok(())
    }

    #[test]
    fn test_database_list_and_root_folder_are_normalised() -> Result<()> {
        let mut map = full_map();
        map.insert("DB_DATABASES".into(), " app_db, ,logs_db ".into());
        map.insert("DO_SPACES_ROOT_FOLDER".into(), "prod/mysql/".into());
        map.insert("DB_PORT".into(), "3307".into());

        let config = AppConfig::from_map(&map)?;

        assert_eq!(config.database.databases, vec!["app_db", "logs_db"]);
        assert_eq!(config.spaces.root_folder, "prod/mysql");
        assert_eq!(config.database.port, 3307);
        Ok(())
    }

    #[test]
    fn test_db_database_takes_precedence() -> Result<()> {
        let mut map = full_map();
        map.insert("DB_DATABASE".into(), "only_this".into());
        map.insert("DB_DATABASES".into(), "a,b".into());

        let config = AppConfig::from_map(&map)?;
        assert_eq!(config.database.databases, vec!["only_this"]);
        Ok(())
    }

    #[test]
    fn test_missing_required_keys_are_rejected() {
        let mut map = full_map();
        map.remove("DO_SPACES_BUCKET");
        assert!(matches!(
            AppConfig::from_map(&map),
            Err(BackupError::ConfigurationInvalid(msg)) if msg.contains("DO_SPACES_BUCKET")
        ));

        let mut map = full_map();
        map.remove("DB_PASSWORD");
        assert!(matches!(
            AppConfig::from_map(&map),
            Err(BackupError::ConfigurationInvalid(_))
        ));

        let mut map = full_map();
        map.insert("DO_SPACES_REGION".into(), "  ".into());
        assert!(AppConfig::from_map(&map).is_err());
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let mut map = full_map();
        map.insert("DB_PORT".into(), "not-a-port".into());
        assert!(AppConfig::from_map(&map).is_err());

        let mut map = full_map();
        map.insert("BACKUP_RETENTION_DAYS".into(), "-1".into());
        assert!(AppConfig::from_map(&map).is_err());
    }

    #[test]
    fn test_telegram_config() -> Result<()> {
        let telegram = TelegramConfig::from_map(&full_map())?;
        assert_eq!(telegram.api_base_url.as_str(), "https://api.telegram.org/");
        assert!(!format!("{:?}", telegram).contains("123:abc"));

        let mut map = full_map();
        map.insert("TG_BOT_TOKEN".into(), "".into());
        assert!(TelegramConfig::from_map(&map).is_err());
        Ok(())
    }

    #[test]
    fn test_debug_output_hides_secrets() -> Result<()> {
        let config = AppConfig::from_map(&full_map())?;
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("\"secret\""));
        Ok(())
    }

    #[test]
    fn test_load_env_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "# backup settings")?;
        writeln!(file, "DB_USERNAME=backup")?;
        writeln!(file, "DB_PASSWORD=\"p@ss word\"")?;
        drop(file);

        let values = load_env_file(&path)?;
        assert_eq!(values.get("DB_USERNAME").map(String::as_str), Some("backup"));
        assert_eq!(values.get("DB_PASSWORD").map(String::as_str), Some("p@ss word"));
        Ok(())
    }

    #[test]
    fn test_load_env_file_missing_or_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let missing = dir.path().join("absent.env");
        assert!(matches!(
            load_env_file(&missing),
            Err(BackupError::ConfigurationInvalid(msg)) if msg.contains("does not exist")
        ));

        let empty = dir.path().join("empty.env");
        std::fs::write(&empty, "\n# nothing here\n")?;
        assert!(matches!(
            load_env_file(&empty),
            Err(BackupError::ConfigurationInvalid(msg)) if msg.contains("is empty")
        ));
        Ok(())
    }
}
