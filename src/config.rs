use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::BaseDirs;
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::auth::Credentials;
use crate::domain::ReferenceId;
use crate::error::IngestError;

pub const CONFIG_FILE_NAME: &str = "biodata-ingest.json";

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080/catgenome";
pub const DEFAULT_REFERENCE_URL: &str = "/restapi/reference/{id}/loadByBioId";
pub const DEFAULT_REGISTRATION_URL: &str = "/restapi/{category}/register";
pub const DEFAULT_PROJECT_URL: &str = "/restapi/project/save";
pub const DEFAULT_DELETE_URL: &str = "/restapi/secure/{category}/register";
pub const DEFAULT_TOKEN_URL: &str = "/oauth/token";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const ENV_SERVER: &str = "BIODATA_INGEST_SERVER";
const ENV_USER: &str = "BIODATA_INGEST_USER";
const ENV_PASSWORD: &str = "BIODATA_INGEST_PASSWORD";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub reference_url: Option<String>,
    #[serde(default)]
    pub registration_url: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub delete_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub auth: Option<AuthEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AuthEntry {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Endpoints and credentials for one remote service. Passed explicitly to
/// the HTTP client so independent runs can target different servers.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub server_url: String,
    pub reference_url: String,
    pub registration_url: String,
    pub project_url: String,
    pub delete_url: String,
    pub token_url: String,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
}

impl ResolvedConfig {
    pub fn reference_endpoint(&self, id: ReferenceId) -> String {
        self.join(&self.reference_url.replace("{id}", &id.to_string()))
    }

    pub fn registration_endpoint(&self, segment: &str) -> String {
        self.join(&self.registration_url.replace("{category}", segment))
    }

    pub fn project_endpoint(&self) -> String {
        self.join(&self.project_url)
    }

    pub fn delete_endpoint(&self, segment: &str) -> String {
        self.join(&self.delete_url.replace("{category}", segment))
    }

    pub fn token_endpoint(&self) -> String {
        self.join(&self.token_url)
    }

    // templates may also be absolute URLs, e.g. a token service on another host
    fn join(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}{}", self.server_url, path)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads config from `path`, else `./biodata-ingest.json`, else the user
    /// config directory, else built-in defaults; then applies env overrides.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let mut config = match path {
            Some(path) => Self::read(PathBuf::from(path))?,
            None => match Self::default_locations().into_iter().find(|p| p.exists()) {
                Some(found) => Self::read(found)?,
                None => {
                    tracing::debug!("no config file found, using defaults");
                    Config::default()
                }
            },
        };
        Self::apply_env(&mut config);
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        let server_url = config
            .server_url
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let parsed = Url::parse(server_url.trim())
            .map_err(|err| IngestError::InvalidConfig(format!("server_url {server_url}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(IngestError::InvalidConfig(format!(
                "server_url must be http(s): {server_url}"
            )));
        }
        let server_url = server_url.trim().trim_end_matches('/').to_string();

        let reference_url = template(config.reference_url, DEFAULT_REFERENCE_URL, "{id}")?;
        let registration_url =
            template(config.registration_url, DEFAULT_REGISTRATION_URL, "{category}")?;
        let delete_url = template(config.delete_url, DEFAULT_DELETE_URL, "{category}")?;
        let project_url = config
            .project_url
            .unwrap_or_else(|| DEFAULT_PROJECT_URL.to_string());
        let token_url = config
            .token_url
            .unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());

        let timeout_secs = config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(IngestError::InvalidConfig(
                "timeout_secs must be positive".to_string(),
            ));
        }

        let credentials = match config.auth {
            None => None,
            Some(AuthEntry {
                username: Some(username),
                password: Some(password),
                client_id,
                client_secret,
            }) => Some(Credentials {
                username,
                password,
                client_id,
                client_secret,
            }),
            Some(AuthEntry {
                username: None,
                password: None,
                ..
            }) => None,
            Some(_) => {
                return Err(IngestError::InvalidConfig(
                    "auth needs both username and password".to_string(),
                ));
            }
        };

        Ok(ResolvedConfig {
            server_url,
            reference_url,
            registration_url,
            project_url,
            delete_url,
            token_url,
            timeout: Duration::from_secs(timeout_secs),
            credentials,
        })
    }

    fn read(path: PathBuf) -> Result<Config, IngestError> {
        let content = fs::read_to_string(&path).map_err(|_| IngestError::ConfigRead(path))?;
        serde_json::from_str(&content).map_err(|err| IngestError::ConfigParse(err.to_string()))
    }

    fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(dirs) = BaseDirs::new() {
            locations.push(dirs.config_dir().join("biodata-ingest").join("config.json"));
        }
        locations
    }

    fn apply_env(config: &mut Config) {
        if let Some(server) = non_empty_env(ENV_SERVER) {
            config.server_url = Some(server);
        }
        let user = non_empty_env(ENV_USER);
        let password = non_empty_env(ENV_PASSWORD);
        if user.is_some() || password.is_some() {
            let auth = config.auth.get_or_insert_with(AuthEntry::default);
            if user.is_some() {
                auth.username = user;
            }
            if password.is_some() {
                auth.password = password;
            }
        }
    }
}

fn template(
    value: Option<String>,
    default: &str,
    placeholder: &str,
) -> Result<String, IngestError> {
    let value = value.unwrap_or_else(|| default.to_string());
    if !value.contains(placeholder) {
        return Err(IngestError::InvalidConfig(format!(
            "endpoint template {value} must contain {placeholder}"
        )));
    }
    Ok(value)
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
