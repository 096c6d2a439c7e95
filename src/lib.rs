#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs, clippy::pedantic)]

//! Temporary AWS credentials from corporate directory (ADFS) credentials.
//!
//! The login posts the user's directory credentials to the ADFS sign-on page, reads the signed
//! SAML assertion from the response, exchanges every role the assertion grants for temporary
//! credentials with STS `AssumeRoleWithSAML`, and selects one of the accounts that could be
//! assumed.
//!
//! See [`login`] for the main entrypoint to the crate, and [`SamlFlowBuilder`] for more flexible
//! configuration.
//!
//! ```no_run
//! # #[tokio::main] async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # use aws_saml_flow::{AccountChoice, Interaction};
//! # use futures::future::BoxFuture;
//! # struct Terminal;
//! # impl Interaction for Terminal {
//! #     type Error = std::io::Error;
//! #     fn password<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<String, Self::Error>> {
//! #         Box::pin(async { Ok(String::new()) })
//! #     }
//! #     fn choose_account<'a>(&'a self, _: &'a [AccountChoice]) -> BoxFuture<'a, Result<String, Self::Error>> {
//! #         Box::pin(async { Ok("1".to_string()) })
//! #     }
//! # }
//! let credentials = aws_saml_flow::login(Terminal).await?;
//! println!("logged in to {}", credentials.role_arn);
//! # Ok(()) }
//! ```

mod assertion;
#[cfg_attr(docsrs, doc(cfg(feature = "aws-sdk")))]
#[cfg(feature = "aws-sdk")]
mod aws_sdk;
mod builder;
mod config;
mod credentials;
mod credentials_file;
mod fetcher;
mod flow;
mod login_form;
mod region;
mod select;
mod sts;
mod submit;
mod vault;

use std::fmt;

pub use crate::{
    assertion::{decode, extract_roles, RoleCandidate},
    builder::{SamlConfigSource, SamlFlowBuilder},
    config::{ConfigError, ConfigFile, SamlConfig},
    credentials::AssumedCredential,
    credentials_file::{CredentialsFileError, SharedCredentialsFile},
    flow::{AuthError, Interaction, ParseError, SamlFlow, SamlFlowError, TransportError},
    region::Region,
    select::{
        choices, select_by_account, select_by_index, AccountAliases, AccountChoice, SelectionError,
    },
    sts::{
        assume_all, Client as StsClient, ExchangeRejection, IssuedCredentials, RejectionKind,
        RoleExchange,
    },
    vault::{PasswordVault, VaultError},
};

const _: () = assert!(
    const_str::equal!(env!("CARGO_PKG_VERSION_MAJOR"), "0"),
    "client naming scheme needs updated for 1.0"
);
const CLIENT_NAME: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "@",
    "0.",
    env!("CARGO_PKG_VERSION_MINOR")
);

/// Log in with the default configuration and write the selected credentials.
///
/// Configuration is loaded from `$AWS_SAML_CONFIG_FILE` (default `~/.aws-saml/config.json`) and
/// credentials are written to the configured profile in the shared credentials file
/// (`$AWS_SHARED_CREDENTIALS_FILE`, default `~/.aws/credentials`). The `interaction` is asked
/// for the password, and for the account to use.
///
/// # Errors
///
/// An error is returned if the configuration cannot be loaded, or if there's a failure during the
/// login. You can separate configuration errors from login errors by using [`SamlFlowBuilder`]
/// instead.
pub async fn login<I: Interaction>(
    interaction: I,
) -> Result<AssumedCredential, SamlError<I::Error>> {
    let sink = SharedCredentialsFile::from_env()
        .map_err(|error| SamlError::Flow(SamlFlowError::Sink(error)))?;
    let credentials = SamlFlowBuilder::new()
        .interaction(interaction)
        .build()
        .await?
        .login(&sink)
        .await?;
    Ok(credentials)
}

/// An error indicating either misconfiguration or a failure during login.
#[derive(Debug)]
pub enum SamlError<P: std::error::Error + Send + Sync + 'static> {
    /// Configuration was missing or invalid.
    Config(ConfigError),

    /// Failure during login.
    Flow(SamlFlowError<P>),
}

impl<P: std::error::Error + Send + Sync + 'static> fmt::Display for SamlError<P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Config(error) => error.fmt(f),
            Self::Flow(error) => error.fmt(f),
        }
    }
}

impl<P: std::error::Error + Send + Sync + 'static> std::error::Error for SamlError<P> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(error) => error.source(),
            Self::Flow(error) => error.source(),
        }
    }
}

impl<P: std::error::Error + Send + Sync + 'static> From<ConfigError> for SamlError<P> {
    fn from(error: ConfigError) -> Self {
        Self::Config(error)
    }
}

impl<P: std::error::Error + Send + Sync + 'static> From<SamlFlowError<P>> for SamlError<P> {
    fn from(error: SamlFlowError<P>) -> Self {
        Self::Flow(error)
    }
}
