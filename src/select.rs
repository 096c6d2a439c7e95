//! Choosing one account among the roles that could be assumed.

use std::{collections::BTreeMap, fmt};

use tracing::debug;

use crate::AssumedCredential;

/// Human-readable names for 12-digit AWS account IDs.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(transparent)]
pub struct AccountAliases(BTreeMap<String, String>);

impl AccountAliases {
    /// The alias of `account_id`, if one is defined.
    #[must_use]
    pub fn get(&self, account_id: &str) -> Option<&str> {
        self.0.get(account_id).map(String::as_str)
    }

    /// The alias of `account_id`, or the account ID itself if none is defined.
    #[must_use]
    pub fn display_name<'a>(&'a self, account_id: &'a str) -> &'a str {
        self.get(account_id).unwrap_or(account_id)
    }

    /// Resolve an alias to its account ID.
    ///
    /// If several accounts share the alias, the lowest account ID wins. Anything that isn't an
    /// alias is returned unchanged, so raw account IDs pass through.
    #[must_use]
    pub fn resolve<'a>(&'a self, selector: &'a str) -> &'a str {
        self.0
            .iter()
            .find(|(_, alias)| *alias == selector)
            .map_or(selector, |(account_id, _)| account_id.as_str())
    }

    /// Define or replace the alias of `account_id`.
    pub fn set(&mut self, account_id: impl Into<String>, alias: impl Into<String>) {
        self.0.insert(account_id.into(), alias.into());
    }

    /// Remove the alias of `account_id`, returning it if there was one.
    pub fn remove(&mut self, account_id: &str) -> Option<String> {
        self.0.remove(account_id)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for AccountAliases {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(account_id, alias)| (account_id.into(), alias.into()))
                .collect(),
        )
    }
}

/// One line of the interactive account menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountChoice {
    /// 1-based position in the menu.
    pub index: usize,

    /// The role that was assumed.
    pub role_arn: String,

    /// The account's alias, or its ID if it has no alias.
    pub name: String,
}

impl fmt::Display for AccountChoice {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[ {} ] {} ({})", self.index, self.role_arn, self.name)
    }
}

/// The user picked something that isn't a valid account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionError(String);

impl fmt::Display for SelectionError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for SelectionError {}

/// Build the interactive menu for `assumed`, in order.
#[must_use]
pub fn choices(assumed: &[AssumedCredential], aliases: &AccountAliases) -> Vec<AccountChoice> {
    assumed
        .iter()
        .enumerate()
        .map(|(position, credential)| AccountChoice {
            index: position + 1,
            role_arn: credential.role_arn.clone(),
            name: credential
                .account_id()
                .map_or_else(String::new, |id| aliases.display_name(id).to_string()),
        })
        .collect()
}

/// Pick the credential at the 1-based position typed by the user.
///
/// # Errors
///
/// Returns an error if `answer` isn't a number, or is out of range.
pub fn select_by_index(
    assumed: &[AssumedCredential],
    answer: &str,
) -> Result<AssumedCredential, SelectionError> {
    let answer = answer.trim();
    let index: usize = answer
        .parse()
        .map_err(|_| SelectionError(format!("'{answer}' is not a number")))?;

    index
        .checked_sub(1)
        .and_then(|position| assumed.get(position))
        .cloned()
        .ok_or_else(|| {
            SelectionError(format!(
                "'{index}' is not between 1 and {}",
                assumed.len()
            ))
        })
}

/// Pick the credential for the account named by `selector`, an alias or a 12-digit account ID.
///
/// `Ok(None)` means the selector is valid but none of `assumed` belongs to that account.
///
/// # Errors
///
/// Returns an error if `selector` is neither a known alias nor a 12-digit account ID.
pub fn select_by_account(
    assumed: &[AssumedCredential],
    aliases: &AccountAliases,
    selector: &str,
) -> Result<Option<AssumedCredential>, SelectionError> {
    let account_id = aliases.resolve(selector);
    if account_id.len() != 12 || !account_id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SelectionError(format!(
            "'{account_id}' is neither valid account ID nor predefined alias (run 'aws-saml alias' to add)"
        )));
    }

    debug!(selector, account_id, "selecting account");
    Ok(assumed
        .iter()
        .find(|credential| credential.account_id() == Some(account_id))
        .cloned())
}
