use std::{
    env, fmt, io,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio::fs;
use url::Url;

use crate::{AccountAliases, Region};

const AWS_SAML_CONFIG_FILE: &str = "AWS_SAML_CONFIG_FILE";
const AWS_SAML_CONFIG_FILE_DEFAULT: &[&str] = &[".aws-saml", "config.json"];

/// SAML login configuration.
///
/// This is usually loaded from a [`ConfigFile`], where keys are camelCase (`directoryDomain`,
/// `netbiosDomain`, ...). Missing keys take their default value.
#[derive(Clone, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SamlConfig {
    /// The profile in the shared credentials file to write credentials to.
    pub profile: String,

    /// The directory user to log in as.
    pub username: String,

    /// The ADFS server, e.g. `https://sts.corp.example.com`.
    pub directory_domain: Url,

    /// Aliases for account IDs, used when displaying and selecting accounts.
    pub aliases: AccountAliases,

    /// Prefix for usernames that aren't email addresses (`CORP\username`).
    pub netbios_domain: String,

    /// The region of the STS endpoint.
    pub region: Region,

    /// Time limit for each HTTP request and each role exchange.
    pub timeout_secs: u64,

    /// How many role exchanges may be in flight at once.
    pub max_concurrent_exchanges: usize,

    /// Accept invalid TLS certificates from the identity provider.
    pub insecure_tls: bool,

    /// Select this account (alias or account ID) instead of prompting.
    #[serde(skip)]
    pub account: Option<String>,
}

impl SamlConfig {
    /// The per-request time limit.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SamlConfig {
    fn default() -> Self {
        Self {
            profile: "saml".to_string(),
            username: "john.doe".to_string(),
            directory_domain: Url::parse("https://directory.example.com")
                .expect("default directory domain is a valid URL"),
            aliases: AccountAliases::default(),
            netbios_domain: "CORP".to_string(),
            region: Region::default(),
            timeout_secs: 30,
            max_concurrent_exchanges: 8,
            insecure_tls: false,
            account: None,
        }
    }
}

/// A JSON configuration file.
///
/// The default location is `$AWS_SAML_CONFIG_FILE`, or `~/.aws-saml/config.json`. This can be
/// overridden with [`with_path`](Self::with_path).
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default)]
pub struct ConfigFile {
    path: Option<PathBuf>,
}

impl ConfigFile {
    /// Set the location of the configuration file.
    #[must_use]
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// The location of the configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if no path was set and the home directory can't be determined.
    pub fn path(&self) -> Result<PathBuf, ConfigError> {
        self.path
            .clone()
            .map_or_else(get_config_file_from_env, Ok)
    }

    /// Load the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing, unreadable or not valid configuration.
    pub async fn load(&self) -> Result<SamlConfig, ConfigError> {
        let path = self.path()?;
        let content = fs::read_to_string(&path).await.map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                ConfigError::new(format!(
                    "config file {} does not exist (run `aws-saml configure` first)",
                    path.display()
                ))
            } else {
                ConfigError::new(format!(
                    "unable to read config file {}: {error}",
                    path.display()
                ))
            }
        })?;

        serde_json::from_str(&content).map_err(|error| {
            ConfigError::new(format!("invalid config file {}: {error}", path.display()))
        })
    }

    /// Load the configuration, or the default configuration if the file doesn't exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but can't be loaded, or if it can't be determined
    /// whether it exists.
    pub async fn load_or_default(&self) -> Result<SamlConfig, ConfigError> {
        let path = self.path()?;
        match fs::try_exists(&path).await {
            Ok(true) => self.load().await,
            Ok(false) => Ok(SamlConfig::default()),
            Err(error) => Err(ConfigError::new(format!(
                "unable to access config file {}: {error}",
                path.display()
            ))),
        }
    }

    /// Write `config` to the file, creating its directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written.
    pub async fn save(&self, config: &SamlConfig) -> Result<(), ConfigError> {
        let path = self.path()?;
        let content = serde_json::to_string_pretty(config).map_err(|error| {
            ConfigError::new(format!("unable to serialize configuration: {error}"))
        })?;

        write_file(&path, &content).await.map_err(|error| {
            ConfigError::new(format!(
                "unable to write config file {}: {error}",
                path.display()
            ))
        })
    }
}

/// An error indicating missing or invalid configuration.
///
/// The error message should be sufficient to aid end-user debugging.
#[derive(Debug)]
pub struct ConfigError(String);

impl ConfigError {
    fn new(error: impl Into<String>) -> Self {
        Self(error.into())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ConfigError {}

fn get_config_file_from_env() -> Result<PathBuf, ConfigError> {
    match env::var(AWS_SAML_CONFIG_FILE) {
        Ok(path) if !path.is_empty() => return Ok(PathBuf::from(path)),
        Ok(_) | Err(env::VarError::NotPresent) => {}
        Err(env::VarError::NotUnicode(data)) => {
            return Err(ConfigError::new(format!(
                "invalid path in environment variable {AWS_SAML_CONFIG_FILE}: {data:?} contains invalid UTF-8"
            )))
        }
    }

    let mut path =
        dirs_next::home_dir().ok_or_else(|| ConfigError::new("could not determine home directory"))?;
    for segment in AWS_SAML_CONFIG_FILE_DEFAULT {
        path.push(segment);
    }
    Ok(path)
}

pub(crate) async fn write_file(path: &Path, content: &str) -> Result<(), io::Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, content).await
}
