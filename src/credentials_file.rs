//! The AWS shared credentials file.

use std::{
    env, fmt, io,
    path::{Path, PathBuf},
};

use configparser::ini::{Ini, WriteOptions};
use tokio::fs;

use crate::{config::write_file, AssumedCredential};

const AWS_SHARED_CREDENTIALS_FILE: &[&str] =
    &["AWS_SHARED_CREDENTIALS_FILE", "AWS_CREDENTIAL_PROFILES_FILE"];
const AWS_SHARED_CREDENTIALS_FILE_DEFAULT: &[&str] = &[".aws", "credentials"];
const PREAMBLE: &str = "[aws-saml:preamble]";

/// The INI-style file the AWS CLI and SDKs read static credentials from.
#[derive(Clone, Debug)]
pub struct SharedCredentialsFile {
    path: PathBuf,
}

impl SharedCredentialsFile {
    /// A credentials file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The credentials file named by `AWS_SHARED_CREDENTIALS_FILE` (or
    /// `AWS_CREDENTIAL_PROFILES_FILE`), defaulting to `~/.aws/credentials`.
    ///
    /// # Errors
    ///
    /// Returns an error if no variable is set and the home directory can't be determined.
    pub fn from_env() -> Result<Self, CredentialsFileError> {
        if let Some(path) = AWS_SHARED_CREDENTIALS_FILE
            .iter()
            .find_map(|name| env::var_os(name).filter(|path| !path.is_empty()))
        {
            return Ok(Self::new(path));
        }

        let mut path = dirs_next::home_dir()
            .ok_or_else(|| CredentialsFileError("could not determine home directory".to_string()))?;
        for segment in AWS_SHARED_CREDENTIALS_FILE_DEFAULT {
            path.push(segment);
        }
        Ok(Self::new(path))
    }

    /// The location of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `credential` into `profile`, creating the profile (and file) if needed.
    ///
    /// Other profiles, and other keys of `profile`, are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be read or written.
    pub async fn store(
        &self,
        profile: &str,
        credential: &AssumedCredential,
    ) -> Result<(), CredentialsFileError> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
            Err(error) => return Err(self.error("failed to read", &error)),
        };

        let mut profiles = parse_profiles(&content).map_err(|error| {
            CredentialsFileError(format!(
                "invalid credentials file {}: {error}",
                self.path.display()
            ))
        })?;
        for (key, value) in [
            ("aws_access_key_id", &credential.access_key_id),
            ("aws_secret_access_key", &credential.secret_access_key),
            ("aws_session_token", &credential.session_token),
        ] {
            profiles.set(profile, key, Some(value.clone()));
        }

        let content = profiles.pretty_writes(&WriteOptions::new_with_params(true, 2, 1));
        write_file(&self.path, &content)
            .await
            .map_err(|error| self.error("failed to write", &error))
    }

    fn error(&self, msg: &str, error: &io::Error) -> CredentialsFileError {
        CredentialsFileError(format!(
            "{msg} credentials file {} due to: {error}",
            self.path.display()
        ))
    }
}

/// An error reading or writing the shared credentials file.
#[derive(Debug)]
pub struct CredentialsFileError(String);

impl fmt::Display for CredentialsFileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for CredentialsFileError {}

/// Profiles in file order, with profile and key names kept as written.
///
/// Keys before the first `[profile]` header are kept in a section no profile can be named.
fn parse_profiles(content: &str) -> Result<Ini, String> {
    let mut profiles = Ini::new_cs();
    profiles.set_default_section(PREAMBLE);
    profiles.read(content.to_string())?;
    Ok(profiles)
}
