//! The directory password, kept in the system keyring so unattended logins needn't prompt.

use std::fmt;

use keyring::Entry;

const SERVICE: &str = "aws-saml";

/// The stored directory password of one user.
pub struct PasswordVault {
    username: String,
    entry: Entry,
}

impl PasswordVault {
    /// Open the keyring entry for `username`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform keyring can't be used.
    pub fn new(username: &str) -> Result<Self, VaultError> {
        let entry = Entry::new(SERVICE, username)
            .map_err(|error| VaultError::new(username, "open", &error))?;
        Ok(Self {
            username: username.to_string(),
            entry,
        })
    }

    /// Replace the stored password.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring rejects the write.
    pub fn store(&self, password: &str) -> Result<(), VaultError> {
        self.entry
            .set_password(password)
            .map_err(|error| self.error("store", &error))
    }

    /// The stored password, if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring can't be read.
    pub fn load(&self) -> Result<Option<String>, VaultError> {
        match self.entry.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(self.error("load", &error)),
        }
    }

    /// Delete the stored password, returning whether there was one.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring rejects the delete.
    pub fn remove(&self) -> Result<bool, VaultError> {
        match self.entry.delete_password() {
            Ok(()) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(error) => Err(self.error("remove", &error)),
        }
    }

    fn error(&self, action: &str, error: &keyring::Error) -> VaultError {
        VaultError::new(&self.username, action, error)
    }
}

impl fmt::Debug for PasswordVault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PasswordVault")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// An error using the system keyring.
#[derive(Debug)]
pub struct VaultError(String);

impl VaultError {
    fn new(username: &str, action: &str, error: &keyring::Error) -> Self {
        Self(format!(
            "failed to {action} the password of {username} in the system keyring: {error}"
        ))
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for VaultError {}
