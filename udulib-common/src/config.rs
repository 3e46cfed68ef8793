//! Configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line arguments (applied by the binary via [`CliOverrides`])
//! 2. `UDULIB_*` environment variables
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing default config file is not fatal: the service logs a warning
//! and starts on defaults. A config file named explicitly must exist.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "UDULIB_CONFIG";

/// Longest presigned URL lifetime accepted by S3-compatible stores (7 days)
pub const MAX_PRESIGN_SECS: u64 = 604_800;

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub admin: AdminConfig,
    pub storage: StorageConfig,
    pub preview: PreviewConfig,
    pub email: EmailConfig,
    pub oauth: OAuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub project_name: String,
    /// Externally reachable base URL of this service (used in generated links)
    pub public_url: String,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            project_name: "UDULib API".to_string(),
            public_url: "http://localhost:8000".to_string(),
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file; `:memory:` selects an in-memory database
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("udulib.db"),
            max_connections: 10,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    /// Access token lifetime in minutes (8 days by default)
    pub access_token_expire_minutes: i64,
    pub bcrypt_cost: u32,
    pub password_reset_expire_minutes: i64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_expire_minutes: 60 * 24 * 8,
            bcrypt_cost: 12,
            password_reset_expire_minutes: 30,
        }
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_expire_minutes", &self.access_token_expire_minutes)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("password_reset_expire_minutes", &self.password_reset_expire_minutes)
            .finish()
    }
}

/// First administrator, created at startup when missing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub email: String,
    pub username: String,
    pub password: Option<String>,
    pub full_name: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            email: "admin@udulib.local".to_string(),
            username: "admin".to_string(),
            password: None,
            full_name: "Administrator".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Minio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root directory for the local backend
    pub local_root: PathBuf,
    pub endpoint: String,
    /// Endpoint clients reach; presigned URLs are rewritten to it
    pub external_endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub secure: bool,
    pub document_bucket: String,
    pub avatar_bucket: String,
    pub major_image_bucket: String,
    pub presign_expiry_secs: u64,
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_root: default_data_dir().join("objects"),
            endpoint: "localhost:9000".to_string(),
            external_endpoint: None,
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            region: "us-east-1".to_string(),
            secure: false,
            document_bucket: "documents".to_string(),
            avatar_bucket: "avatars".to_string(),
            major_image_bucket: "major-images".to_string(),
            presign_expiry_secs: 3600,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Directory holding libpdfium; empty searches `./lib/`, `./` and then
    /// the system library path
    pub pdfium_library_dir: String,
    /// Office suite used for headless conversion to PDF
    pub office_converter: String,
    pub conversion_timeout_secs: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            pdfium_library_dir: String::new(),
            office_converter: "libreoffice".to_string(),
            conversion_timeout_secs: 60,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// SMTP relay; when unset, mail is written to the log instead
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub from_email: String,
    pub from_name: String,
    /// Base URL of the web frontend, used in emailed links
    pub frontend_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            smtp_user: None,
            smtp_password: None,
            from_email: "no-reply@udulib.local".to_string(),
            from_name: "UDULib".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_user", &self.smtp_user)
            .field("from_email", &self.from_email)
            .field("frontend_url", &self.frontend_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub google: GoogleOAuthConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleOAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    /// Frontend page receiving `?token=...` after a successful login
    pub frontend_redirect: String,
}

impl Default for GoogleOAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost:8000/api/v1/auth/google/callback".to_string(),
            frontend_redirect: "http://localhost:3000/auth/callback".to_string(),
        }
    }
}

impl GoogleOAuthConfig {
    /// Both client id and secret are present
    pub fn is_configured(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

impl std::fmt::Debug for GoogleOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuthConfig")
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .field("frontend_redirect", &self.frontend_redirect)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<PathBuf>,
}

impl Settings {
    /// Load settings from file, environment and CLI, then validate
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        let mut settings = match resolve_config_file(config_path)? {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&content)?
            }
            None => {
                warn!("No config file found, using compiled defaults");
                Self::default()
            }
        };

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        settings.apply_cli_overrides(cli);
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from TOML text; absent keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Invalid config file: {}", e)))
    }

    /// Apply `UDULIB_*` overrides using `lookup` to read variables
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("UDULIB_HOST") {
            self.server.host = v;
        }
        if let Some(port) = lookup("UDULIB_PORT").and_then(|v| parse_or_warn("UDULIB_PORT", &v)) {
            self.server.port = port;
        }
        if let Some(v) = lookup("UDULIB_PUBLIC_URL") {
            self.server.public_url = v;
        }
        if let Some(v) = lookup("UDULIB_CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(v) = lookup("UDULIB_DATABASE_PATH") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("UDULIB_JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Some(cost) = lookup("UDULIB_BCRYPT_COST").and_then(|v| parse_or_warn("UDULIB_BCRYPT_COST", &v)) {
            self.security.bcrypt_cost = cost;
        }
        if let Some(v) = lookup("UDULIB_ADMIN_EMAIL") {
            self.admin.email = v;
        }
        if let Some(v) = lookup("UDULIB_ADMIN_PASSWORD") {
            self.admin.password = Some(v);
        }
        if let Some(v) = lookup("UDULIB_STORAGE_BACKEND") {
            match v.to_ascii_lowercase().as_str() {
                "local" => self.storage.backend = StorageBackend::Local,
                "minio" => self.storage.backend = StorageBackend::Minio,
                other => warn!("Ignoring UDULIB_STORAGE_BACKEND={}: expected local or minio", other),
            }
        }
        if let Some(v) = lookup("UDULIB_MINIO_ENDPOINT") {
            self.storage.endpoint = v;
        }
        if let Some(v) = lookup("UDULIB_MINIO_EXTERNAL_ENDPOINT") {
            self.storage.external_endpoint = Some(v);
        }
        if let Some(v) = lookup("UDULIB_MINIO_ACCESS_KEY") {
            self.storage.access_key = v;
        }
        if let Some(v) = lookup("UDULIB_MINIO_SECRET_KEY") {
            self.storage.secret_key = v;
        }
        if let Some(v) = lookup("UDULIB_SMTP_HOST") {
            self.email.smtp_host = Some(v);
        }
        if let Some(v) = lookup("UDULIB_SMTP_USER") {
            self.email.smtp_user = Some(v);
        }
        if let Some(v) = lookup("UDULIB_SMTP_PASSWORD") {
            self.email.smtp_password = Some(v);
        }
        if let Some(v) = lookup("UDULIB_GOOGLE_CLIENT_ID") {
            self.oauth.google.client_id = Some(v);
        }
        if let Some(v) = lookup("UDULIB_GOOGLE_CLIENT_SECRET") {
            self.oauth.google.client_secret = Some(v);
        }
        if let Some(v) = lookup("UDULIB_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    pub fn apply_cli_overrides(&mut self, cli: &CliOverrides) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(db) = &cli.database {
            self.database.path = db.clone();
        }
    }

    /// Check ranges and fill in a random JWT secret when none is configured
    pub fn validate(&mut self) -> Result<()> {
        if self.security.jwt_secret.trim().is_empty() {
            warn!("No JWT secret configured; generated a random one (tokens will not survive restarts)");
            self.security.jwt_secret = crate::security::random_token(32);
        }
        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(Error::config(format!(
                "bcrypt_cost must be between 4 and 31, got {}",
                self.security.bcrypt_cost
            )));
        }
        if self.security.access_token_expire_minutes <= 0 {
            return Err(Error::config("access_token_expire_minutes must be positive"));
        }
        if self.security.password_reset_expire_minutes <= 0 {
            return Err(Error::config("password_reset_expire_minutes must be positive"));
        }
        if self.storage.presign_expiry_secs == 0 || self.storage.presign_expiry_secs > MAX_PRESIGN_SECS {
            return Err(Error::config(format!(
                "presign_expiry_secs must be within 1..={}, got {}",
                MAX_PRESIGN_SECS, self.storage.presign_expiry_secs
            )));
        }
        if self.storage.max_upload_bytes == 0 {
            return Err(Error::config("max_upload_bytes must be positive"));
        }
        if self.database.max_connections == 0 {
            return Err(Error::config("database.max_connections must be positive"));
        }
        Ok(())
    }

    /// Address the HTTP listener binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_or_warn<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={}: not a valid value", key, value);
            None
        }
    }
}

/// Pick the config file: explicit path, then `UDULIB_CONFIG`, then the
/// platform default location (only when it exists)
fn resolve_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    let named = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from));

    if let Some(path) = named {
        if !path.exists() {
            return Err(Error::config(format!("Config file not found: {}", path.display())));
        }
        return Ok(Some(path));
    }

    Ok(default_config_path().filter(|p| p.exists()))
}

/// `<config dir>/udulib/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("udulib").join("config.toml"))
}

/// OS-dependent data directory for the database and local objects
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("udulib"))
        .unwrap_or_else(|| PathBuf::from("./udulib_data"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let mut settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.security.access_token_expire_minutes, 11520);
        assert_eq!(settings.storage.backend, StorageBackend::Local);
        // Random secret filled in
        assert!(!settings.security.jwt_secret.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [server]
            port = 9100

            [storage]
            backend = "minio"
            endpoint = "minio:9000"
            "#,
        )
        .unwrap();

        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.storage.backend, StorageBackend::Minio);
        assert_eq!(settings.storage.endpoint, "minio:9000");
        assert_eq!(settings.storage.document_bucket, "documents");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Settings::from_toml_str("[server\nport = ").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("UDULIB_PORT", "9001"),
            ("UDULIB_JWT_SECRET", "from-env"),
            ("UDULIB_STORAGE_BACKEND", "MINIO"),
            ("UDULIB_CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.server.port, 9001);
        assert_eq!(settings.security.jwt_secret, "from-env");
        assert_eq!(settings.storage.backend, StorageBackend::Minio);
        assert_eq!(
            settings.server.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_unparseable_env_value_is_ignored() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|k| (k == "UDULIB_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(settings.server.port, 8000);
    }

    #[test]
    fn test_cli_overrides_win_over_env() {
        let mut settings = Settings::default();
        settings.apply_env_overrides(|k| (k == "UDULIB_PORT").then(|| "9001".to_string()));
        settings.apply_cli_overrides(&CliOverrides {
            port: Some(9002),
            ..Default::default()
        });
        assert_eq!(settings.server.port, 9002);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let mut settings = Settings::default();
        settings.security.bcrypt_cost = 2;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.storage.presign_expiry_secs = MAX_PRESIGN_SECS + 1;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut settings = Settings::default();
        settings.security.jwt_secret = "super-secret-value".to_string();
        settings.email.smtp_password = Some("smtp-pass".to_string());
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("super-secret-value"));
        assert!(!rendered.contains("smtp-pass"));
    }
}
